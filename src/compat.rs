// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Legacy Payload Shapes
//!
//! Three historical wire formats share the legacy request queue. This module
//! turns each of them into the flat payload handlers expect, keeping the
//! translation out of the consumer loop so it can go once the old formats do.

use crate::{
    errors::HandlerError,
    messages::{Payload, RequestMessage, APPLICATION_EVENTS, TEAM_EVENTS},
};
use serde_json::{json, Value};

/// Wire format family of a legacy request, keyed by its event type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadShape {
    /// Application events carry their fields flat on the request.
    Application,
    /// Team events carry a richer structure than the request fields capture.
    Team,
    /// Everything else nests its arguments under `payload`.
    Plain,
}

impl PayloadShape {
    pub fn of(event_type: &str) -> PayloadShape {
        if APPLICATION_EVENTS.contains(&event_type) {
            PayloadShape::Application
        } else if TEAM_EVENTS.contains(&event_type) {
            PayloadShape::Team
        } else {
            PayloadShape::Plain
        }
    }

    /// Builds the handler payload for `request`, parsed from `raw_body`.
    pub fn payload(self, request: &RequestMessage, raw_body: &[u8]) -> Result<Payload, HandlerError> {
        match self {
            PayloadShape::Application => Ok(application_payload(request)),
            PayloadShape::Team => serde_json::from_slice::<Payload>(raw_body).map_err(|err| {
                HandlerError::InvalidPayload(format!("invalid team event payload: {}", err))
            }),
            PayloadShape::Plain => Ok(request.payload.clone().unwrap_or_default()),
        }
    }
}

fn application_payload(request: &RequestMessage) -> Payload {
    let data = request
        .data
        .clone()
        .map(Value::Object)
        .unwrap_or(Value::Null);

    let value = json!({
        "event_type": request.event_type,
        "contest_id": request.contest_id,
        "user_id": request.user_id,
        "discord_user_id": request.discord_user_id,
        "discord_guild_id": request.discord_guild_id,
        "discord_text_channel_id": request.discord_text_channel_id,
        "data": data,
    });

    match value {
        Value::Object(map) => map,
        _ => Payload::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(body: &Value) -> RequestMessage {
        serde_json::from_value(body.clone()).unwrap()
    }

    #[test]
    fn test_shape_selection() {
        assert_eq!(PayloadShape::of("application.accepted"), PayloadShape::Application);
        assert_eq!(PayloadShape::of("team.member.kicked"), PayloadShape::Team);
        assert_eq!(PayloadShape::of("SEND_MESSAGE"), PayloadShape::Plain);
        assert_eq!(PayloadShape::of("member.withdrawn"), PayloadShape::Plain);
    }

    #[test]
    fn test_application_payload_ignores_nested_payload() {
        let body = json!({
            "correlation_id": "c",
            "event_type": "application.accepted",
            "contest_id": 7,
            "discord_user_id": "U1",
            "discord_text_channel_id": "C1",
            "payload": {"discord_user_id": "ignored"},
            "data": {"contest_title": "Cup"}
        });
        let req = request(&body);

        let payload = PayloadShape::Application
            .payload(&req, body.to_string().as_bytes())
            .unwrap();

        assert_eq!(payload["discord_user_id"], json!("U1"));
        assert_eq!(payload["contest_id"], json!(7));
        assert_eq!(payload["data"]["contest_title"], json!("Cup"));
    }

    #[test]
    fn test_team_payload_reparses_body() {
        let body = json!({
            "event_type": "team.invite.sent",
            "team_name": "Blue",
            "invitee_discord_id": "U2"
        });
        let req = request(&body);

        let payload = PayloadShape::Team
            .payload(&req, body.to_string().as_bytes())
            .unwrap();

        assert_eq!(payload["team_name"], json!("Blue"));
        assert_eq!(payload["invitee_discord_id"], json!("U2"));
    }

    #[test]
    fn test_plain_payload_defaults_to_empty() {
        let req = request(&json!({"event_type": "GET_TEXT_CHANNELS"}));

        assert!(PayloadShape::Plain.payload(&req, b"{}").unwrap().is_empty());
    }
}
