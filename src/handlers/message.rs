// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

use super::{null_as_default, parse, snowflake, to_data};
use crate::{chat::ChatClient, errors::HandlerError, messages::Payload, registry::Handler};
use async_trait::async_trait;
use opentelemetry::Context;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct SendMessagePayload {
    #[serde(default, deserialize_with = "snowflake")]
    channel_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    content: String,
}

/// `SEND_MESSAGE`: posts `content` to `channel_id`.
pub struct SendMessageHandler;

#[async_trait]
impl Handler for SendMessageHandler {
    async fn handle(
        &self,
        _ctx: &Context,
        chat: &dyn ChatClient,
        _guild_id: &str,
        payload: &Payload,
    ) -> Result<Option<Payload>, HandlerError> {
        let args: SendMessagePayload = parse(payload)?;

        if args.channel_id.is_empty() {
            return Err(HandlerError::MissingField("channel_id"));
        }
        if args.content.is_empty() {
            return Err(HandlerError::MissingField("content"));
        }

        let sent = chat.send_message(&args.channel_id, &args.content).await?;
        to_data(&sent)
    }
}
