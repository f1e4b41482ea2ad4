// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Event Handlers
//!
//! One handler per event type. Command handlers (upper-snake event types)
//! validate their arguments and fail on missing ones; notification handlers
//! skip with a warning when they have nowhere to post.

mod application;
mod channel;
mod contest;
mod game;
mod message;
mod status;
mod team;
mod voice;

pub use application::{ApplicationEvent, ApplicationHandler};
pub use channel::{TextChannelsHandler, VoiceChannelsHandler};
pub use contest::{ContestCreatedHandler, ContestInvitationHandler};
pub use game::{ContestTeamsReadyHandler, GameHandler, GameStage};
pub use message::SendMessageHandler;
pub use status::BotStatusHandler;
pub use team::{TeamInviteHandler, TeamMemberHandler, TeamStatusHandler};
pub use voice::MoveMembersHandler;

use crate::{
    errors::HandlerError,
    messages::{self, Payload},
    registry::HandlerRegistry,
};
use serde::{de::DeserializeOwned, Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::sync::Arc;

pub(crate) use crate::messages::null_as_default;

/// Registers every known handler.
pub fn register_all(registry: &mut HandlerRegistry) {
    registry.register(messages::EVENT_SEND_MESSAGE, Arc::new(SendMessageHandler));
    registry.register(messages::EVENT_MOVE_MEMBERS, Arc::new(MoveMembersHandler));
    registry.register(messages::EVENT_GET_VOICE_CHANNELS, Arc::new(VoiceChannelsHandler));
    registry.register(messages::EVENT_GET_TEXT_CHANNELS, Arc::new(TextChannelsHandler));
    registry.register(messages::EVENT_SEND_CONTEST_INVITATION, Arc::new(ContestInvitationHandler));
    registry.register(messages::EVENT_GET_BOT_STATUS, Arc::new(BotStatusHandler));
    registry.register(messages::EVENT_CONTEST_CREATED, Arc::new(ContestCreatedHandler));
    registry.register(
        messages::EVENT_APPLICATION_REQUESTED,
        Arc::new(ApplicationHandler::new(ApplicationEvent::Requested)),
    );
    registry.register(
        messages::EVENT_APPLICATION_ACCEPTED,
        Arc::new(ApplicationHandler::new(ApplicationEvent::Accepted)),
    );
    registry.register(
        messages::EVENT_APPLICATION_REJECTED,
        Arc::new(ApplicationHandler::new(ApplicationEvent::Rejected)),
    );
    registry.register(
        messages::EVENT_APPLICATION_CANCELLED,
        Arc::new(ApplicationHandler::new(ApplicationEvent::Cancelled)),
    );
    registry.register(
        messages::EVENT_MEMBER_WITHDRAWN,
        Arc::new(ApplicationHandler::new(ApplicationEvent::Withdrawn)),
    );
    registry.register(messages::EVENT_TEAM_INVITE_SENT, Arc::new(TeamInviteHandler::sent()));
    registry.register(
        messages::EVENT_TEAM_INVITE_ACCEPTED,
        Arc::new(TeamInviteHandler::accepted()),
    );
    registry.register(
        messages::EVENT_TEAM_INVITE_REJECTED,
        Arc::new(TeamInviteHandler::rejected()),
    );
    registry.register(messages::EVENT_TEAM_MEMBER_JOINED, Arc::new(TeamMemberHandler::joined()));
    registry.register(messages::EVENT_TEAM_MEMBER_LEFT, Arc::new(TeamMemberHandler::left()));
    registry.register(messages::EVENT_TEAM_MEMBER_KICKED, Arc::new(TeamMemberHandler::kicked()));
    registry.register(
        messages::EVENT_TEAM_LEADERSHIP_TRANSFERRED,
        Arc::new(TeamStatusHandler::leadership_transferred()),
    );
    registry.register(messages::EVENT_TEAM_FINALIZED, Arc::new(TeamStatusHandler::finalized()));
    registry.register(messages::EVENT_TEAM_DELETED, Arc::new(TeamStatusHandler::deleted()));
    registry.register(
        messages::EVENT_GAME_SCHEDULED,
        Arc::new(GameHandler::new(GameStage::Scheduled)),
    );
    registry.register(
        messages::EVENT_GAME_ACTIVATED,
        Arc::new(GameHandler::new(GameStage::Activated)),
    );
    registry.register(
        messages::EVENT_GAME_MATCH_DETECTING,
        Arc::new(GameHandler::new(GameStage::MatchDetecting)),
    );
    registry.register(
        messages::EVENT_GAME_MATCH_DETECTED,
        Arc::new(GameHandler::new(GameStage::MatchDetected)),
    );
    registry.register(
        messages::EVENT_GAME_MATCH_FAILED,
        Arc::new(GameHandler::new(GameStage::MatchFailed)),
    );
    registry.register(
        messages::EVENT_GAME_FINISHED,
        Arc::new(GameHandler::new(GameStage::Finished)),
    );
    registry.register(messages::EVENT_CONTEST_TEAMS_READY, Arc::new(ContestTeamsReadyHandler));
}

/// Deserializes a handler payload into its typed form.
pub(crate) fn parse<T: DeserializeOwned>(payload: &Payload) -> Result<T, HandlerError> {
    Ok(serde_json::from_value(Value::Object(payload.clone()))?)
}

/// Serializes a handler result into response data.
pub(crate) fn to_data<T: Serialize>(result: &T) -> Result<Option<Payload>, HandlerError> {
    match serde_json::to_value(result)? {
        Value::Object(map) => Ok(Some(map)),
        other => Err(HandlerError::InvalidPayload(format!(
            "result is not an object: {}",
            other
        ))),
    }
}

/// Accepts chat identifiers sent either as strings or as numbers. Null reads as empty.
pub(crate) fn snowflake<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(value) => Ok(value),
        Value::Number(value) => Ok(value.to_string()),
        Value::Null => Ok(String::new()),
        other => Err(serde::de::Error::custom(format!(
            "expected an identifier, got {}",
            other
        ))),
    }
}

pub(crate) fn snowflakes<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    struct Id(#[serde(deserialize_with = "snowflake")] String);

    Ok(Option::<Vec<Id>>::deserialize(deserializer)?
        .unwrap_or_default()
        .into_iter()
        .map(|id| id.0)
        .collect())
}

pub(crate) fn mention(user_id: &str) -> String {
    format!("<@{}>", user_id)
}
