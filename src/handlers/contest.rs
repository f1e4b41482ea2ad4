// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

use super::{mention, null_as_default, parse, snowflake, snowflakes, to_data};
use crate::{
    chat::ChatClient, errors::HandlerError, messages::Payload, registry::Handler,
};
use async_trait::async_trait;
use opentelemetry::Context;
use serde::{Deserialize, Serialize};
use tracing::info;

/// `contest.created`: acknowledged and logged only.
pub struct ContestCreatedHandler;

#[async_trait]
impl Handler for ContestCreatedHandler {
    async fn handle(
        &self,
        _ctx: &Context,
        _chat: &dyn ChatClient,
        guild_id: &str,
        payload: &Payload,
    ) -> Result<Option<Payload>, HandlerError> {
        info!(
            guild_id = guild_id,
            contest_id = payload.get("contest_id").map(|v| v.to_string()),
            "contest created"
        );
        Ok(None)
    }
}

#[derive(Debug, Deserialize)]
struct ContestInvitationPayload {
    #[serde(default, deserialize_with = "snowflake")]
    channel_id: String,
    #[serde(default, deserialize_with = "snowflakes")]
    user_ids: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    contest_name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    message: String,
}

#[derive(Debug, Serialize)]
struct ContestInvitationResult {
    message_id: String,
    notified_users: Vec<String>,
    timestamp: String,
}

/// `SEND_CONTEST_INVITATION`: mentions the invited users in a channel.
pub struct ContestInvitationHandler;

#[async_trait]
impl Handler for ContestInvitationHandler {
    async fn handle(
        &self,
        _ctx: &Context,
        chat: &dyn ChatClient,
        _guild_id: &str,
        payload: &Payload,
    ) -> Result<Option<Payload>, HandlerError> {
        let args: ContestInvitationPayload = parse(payload)?;

        if args.channel_id.is_empty() {
            return Err(HandlerError::MissingField("channel_id"));
        }
        if args.user_ids.is_empty() {
            return Err(HandlerError::MissingField("user_ids"));
        }
        if args.contest_name.is_empty() {
            return Err(HandlerError::MissingField("contest_name"));
        }

        let mentions = args
            .user_ids
            .iter()
            .map(|id| mention(id))
            .collect::<Vec<_>>()
            .join(" ");

        let content = if args.message.is_empty() {
            format!(
                "🎮 **Contest Invitation: {}**\n\n{} You have been invited to participate in this contest!",
                args.contest_name, mentions
            )
        } else {
            format!(
                "🎮 **Contest Invitation: {}**\n\n{}\n\n{}",
                args.contest_name, args.message, mentions
            )
        };

        let sent = chat.send_message(&args.channel_id, &content).await?;

        to_data(&ContestInvitationResult {
            message_id: sent.message_id,
            notified_users: args.user_ids,
            timestamp: sent.timestamp,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::{payload, RecordingChat};
    use serde_json::json;

    #[tokio::test]
    async fn test_invitation_mentions_users() {
        let chat = RecordingChat::new();

        let data = ContestInvitationHandler
            .handle(
                &Context::new(),
                &chat,
                "G1",
                &payload(json!({
                    "channel_id": "C1",
                    "user_ids": ["U1", "U2"],
                    "contest_name": "Spring Cup"
                })),
            )
            .await
            .unwrap()
            .unwrap();

        let sent = chat.sent();
        assert_eq!(sent[0].0, "C1");
        assert!(sent[0].1.contains("Spring Cup"));
        assert!(sent[0].1.contains("<@U1> <@U2>"));
        assert_eq!(data["notified_users"], json!(["U1", "U2"]));
    }

    #[tokio::test]
    async fn test_invitation_requires_users() {
        let chat = RecordingChat::new();

        let result = ContestInvitationHandler
            .handle(
                &Context::new(),
                &chat,
                "G1",
                &payload(json!({"channel_id": "C1", "user_ids": [], "contest_name": "Cup"})),
            )
            .await;

        assert_eq!(result, Err(HandlerError::MissingField("user_ids")));
    }

    #[tokio::test]
    async fn test_contest_created_has_no_side_effect() {
        let chat = RecordingChat::new();

        let result = ContestCreatedHandler
            .handle(&Context::new(), &chat, "G1", &payload(json!({"contest_id": 3})))
            .await;

        assert_eq!(result, Ok(None));
        assert!(chat.calls().is_empty());
    }
}
