// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

use super::{parse, snowflake, snowflakes, to_data};
use crate::{chat::ChatClient, errors::HandlerError, messages::Payload, registry::Handler};
use async_trait::async_trait;
use opentelemetry::Context;
use serde::Deserialize;
use tracing::info;

#[derive(Debug, Deserialize)]
struct MoveMembersPayload {
    #[serde(default, deserialize_with = "snowflake")]
    from_channel_id: String,
    #[serde(default, deserialize_with = "snowflake")]
    to_channel_id: String,
    #[serde(default, deserialize_with = "snowflakes")]
    user_ids: Vec<String>,
}

/// `MOVE_MEMBERS`: moves users between two voice channels of the guild.
pub struct MoveMembersHandler;

#[async_trait]
impl Handler for MoveMembersHandler {
    async fn handle(
        &self,
        _ctx: &Context,
        chat: &dyn ChatClient,
        guild_id: &str,
        payload: &Payload,
    ) -> Result<Option<Payload>, HandlerError> {
        let args: MoveMembersPayload = parse(payload)?;

        if args.from_channel_id.is_empty() {
            return Err(HandlerError::MissingField("from_channel_id"));
        }
        if args.to_channel_id.is_empty() {
            return Err(HandlerError::MissingField("to_channel_id"));
        }

        let outcome = chat
            .move_members(
                guild_id,
                &args.from_channel_id,
                &args.to_channel_id,
                &args.user_ids,
            )
            .await?;

        info!(
            guild_id = guild_id,
            moved = outcome.moved_count,
            failed = outcome.failed_users.len(),
            "members moved"
        );

        to_data(&outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::{payload, ChatCall, RecordingChat};
    use serde_json::json;

    #[tokio::test]
    async fn test_moves_listed_users() {
        let chat = RecordingChat {
            failed_users: vec!["U2".to_owned()],
            ..RecordingChat::new()
        };

        let data = MoveMembersHandler
            .handle(
                &Context::new(),
                &chat,
                "G1",
                &payload(json!({
                    "from_channel_id": "V1",
                    "to_channel_id": "V2",
                    "user_ids": ["U1", "U2"]
                })),
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(data["moved_count"], json!(1));
        assert_eq!(data["failed_users"], json!(["U2"]));
        assert_eq!(
            chat.calls(),
            vec![ChatCall::Move {
                guild_id: "G1".to_owned(),
                from: "V1".to_owned(),
                to: "V2".to_owned(),
                user_ids: vec!["U1".to_owned(), "U2".to_owned()],
            }]
        );
    }

    #[tokio::test]
    async fn test_requires_both_channels() {
        let chat = RecordingChat::new();

        let result = MoveMembersHandler
            .handle(
                &Context::new(),
                &chat,
                "G1",
                &payload(json!({"from_channel_id": "V1"})),
            )
            .await;

        assert_eq!(result, Err(HandlerError::MissingField("to_channel_id")));
    }
}
