// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Wire Messages
//!
//! Event type keys, the legacy request/response envelopes and the helpers used
//! to pull routing information (event type, event id, guild id) out of inbound
//! messages.

use lapin::types::{AMQPValue, FieldTable};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// A free-form JSON object as handed to handlers.
pub type Payload = Map<String, Value>;

/// Header carrying the event type on notification messages.
pub const EVENT_TYPE_HEADER: &str = "event_type";

pub const EVENT_SEND_MESSAGE: &str = "SEND_MESSAGE";
pub const EVENT_MOVE_MEMBERS: &str = "MOVE_MEMBERS";
pub const EVENT_GET_VOICE_CHANNELS: &str = "GET_VOICE_CHANNELS";
pub const EVENT_GET_TEXT_CHANNELS: &str = "GET_TEXT_CHANNELS";
pub const EVENT_SEND_CONTEST_INVITATION: &str = "SEND_CONTEST_INVITATION";
pub const EVENT_GET_BOT_STATUS: &str = "GET_BOT_STATUS";

pub const EVENT_CONTEST_CREATED: &str = "contest.created";

pub const EVENT_APPLICATION_REQUESTED: &str = "application.requested";
pub const EVENT_APPLICATION_ACCEPTED: &str = "application.accepted";
pub const EVENT_APPLICATION_REJECTED: &str = "application.rejected";
pub const EVENT_APPLICATION_CANCELLED: &str = "application.cancelled";
pub const EVENT_MEMBER_WITHDRAWN: &str = "member.withdrawn";

pub const EVENT_TEAM_INVITE_SENT: &str = "team.invite.sent";
pub const EVENT_TEAM_INVITE_ACCEPTED: &str = "team.invite.accepted";
pub const EVENT_TEAM_INVITE_REJECTED: &str = "team.invite.rejected";
pub const EVENT_TEAM_MEMBER_JOINED: &str = "team.member.joined";
pub const EVENT_TEAM_MEMBER_LEFT: &str = "team.member.left";
pub const EVENT_TEAM_MEMBER_KICKED: &str = "team.member.kicked";
pub const EVENT_TEAM_LEADERSHIP_TRANSFERRED: &str = "team.leadership.transferred";
pub const EVENT_TEAM_FINALIZED: &str = "team.finalized";
pub const EVENT_TEAM_DELETED: &str = "team.deleted";

pub const EVENT_GAME_SCHEDULED: &str = "game.scheduled";
pub const EVENT_GAME_ACTIVATED: &str = "game.activated";
pub const EVENT_GAME_MATCH_DETECTING: &str = "game.match.detecting";
pub const EVENT_GAME_MATCH_DETECTED: &str = "game.match.detected";
pub const EVENT_GAME_MATCH_FAILED: &str = "game.match.failed";
pub const EVENT_GAME_FINISHED: &str = "game.finished";
pub const EVENT_CONTEST_TEAMS_READY: &str = "game.contest.teams.ready";

pub const APPLICATION_EVENTS: [&str; 4] = [
    EVENT_APPLICATION_REQUESTED,
    EVENT_APPLICATION_ACCEPTED,
    EVENT_APPLICATION_REJECTED,
    EVENT_APPLICATION_CANCELLED,
];

pub const TEAM_EVENTS: [&str; 9] = [
    EVENT_TEAM_INVITE_SENT,
    EVENT_TEAM_INVITE_ACCEPTED,
    EVENT_TEAM_INVITE_REJECTED,
    EVENT_TEAM_MEMBER_JOINED,
    EVENT_TEAM_MEMBER_LEFT,
    EVENT_TEAM_MEMBER_KICKED,
    EVENT_TEAM_LEADERSHIP_TRANSFERRED,
    EVENT_TEAM_FINALIZED,
    EVENT_TEAM_DELETED,
];

/// A request consumed from the legacy request queue.
///
/// Older publishers send `guild_id`, newer ones `discord_guild_id`; both are
/// accepted and the newer one wins.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct RequestMessage {
    #[serde(deserialize_with = "null_as_default")]
    pub correlation_id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub guild_id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub discord_guild_id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub discord_text_channel_id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub discord_user_id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub contest_id: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub user_id: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub event_type: String,
    pub payload: Option<Payload>,
    pub data: Option<Payload>,
}

impl RequestMessage {
    pub fn guild_id(&self) -> &str {
        if !self.discord_guild_id.is_empty() {
            &self.discord_guild_id
        } else {
            &self.guild_id
        }
    }
}

/// Reads an explicit JSON `null` the same way as a missing field.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Best effort correlation id of a body that did not parse as a [`RequestMessage`].
pub fn salvage_correlation_id(body: &[u8]) -> String {
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) => string_field(&map, "correlation_id").unwrap_or_default(),
        _ => String::new(),
    }
}

/// The reply published for every legacy request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseMessage {
    pub correlation_id: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Payload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ResponseMessage {
    pub fn success(correlation_id: &str, data: Option<Payload>) -> ResponseMessage {
        ResponseMessage {
            correlation_id: correlation_id.to_owned(),
            success: true,
            data,
            error: None,
        }
    }

    pub fn failure(correlation_id: &str, error: impl Into<String>) -> ResponseMessage {
        ResponseMessage {
            correlation_id: correlation_id.to_owned(),
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }
}

/// Reads the event type of a notification message.
///
/// The `event_type` header wins; otherwise the body is parsed and its top-level
/// `event_type` string is used. Empty values count as absent.
pub fn resolve_event_type(headers: Option<&FieldTable>, body: &[u8]) -> Option<String> {
    let from_header = headers
        .and_then(|table| table.inner().get(EVENT_TYPE_HEADER))
        .and_then(header_string)
        .filter(|value| !value.is_empty());

    if from_header.is_some() {
        return from_header;
    }

    #[derive(Deserialize)]
    struct Envelope {
        #[serde(default)]
        event_type: Option<String>,
    }

    serde_json::from_slice::<Envelope>(body)
        .ok()
        .and_then(|envelope| envelope.event_type)
        .filter(|value| !value.is_empty())
}

fn header_string(value: &AMQPValue) -> Option<String> {
    match value {
        AMQPValue::LongString(value) => {
            Some(String::from_utf8_lossy(value.as_bytes()).into_owned())
        }
        AMQPValue::ShortString(value) => Some(value.as_str().to_owned()),
        _ => None,
    }
}

/// Reads an identifier-like field as a string.
///
/// Discord snowflakes sometimes travel as JSON numbers, so integers are
/// accepted too. Empty strings count as absent.
pub fn string_field(payload: &Payload, key: &str) -> Option<String> {
    match payload.get(key)? {
        Value::String(value) if !value.is_empty() => Some(value.clone()),
        Value::Number(value) => Some(value.to_string()),
        _ => None,
    }
}

/// Guild of a notification payload: `discord_guild_id` first, then `guild_id`.
pub fn extract_guild_id(payload: &Payload) -> Option<String> {
    string_field(payload, "discord_guild_id").or_else(|| string_field(payload, "guild_id"))
}

pub fn extract_event_id(payload: &Payload) -> Option<String> {
    string_field(payload, "event_id")
}
