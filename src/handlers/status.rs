// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

use super::{parse, snowflake, to_data};
use crate::{chat::ChatClient, errors::HandlerError, messages::Payload, registry::Handler};
use async_trait::async_trait;
use opentelemetry::Context;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
struct BotStatusPayload {
    #[serde(default, deserialize_with = "snowflake")]
    channel_id: String,
}

#[derive(Debug, Serialize)]
struct BotStatusResult {
    broker_connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    message_id: Option<String>,
}

fn status_line(connected: bool) -> &'static str {
    if connected {
        "Event bus status: Connected"
    } else {
        "Event bus status: Disconnected"
    }
}

/// `GET_BOT_STATUS`: reports the last known broker connectivity and, given a
/// `channel_id`, posts it there as well.
pub struct BotStatusHandler;

#[async_trait]
impl Handler for BotStatusHandler {
    async fn handle(
        &self,
        _ctx: &Context,
        chat: &dyn ChatClient,
        _guild_id: &str,
        payload: &Payload,
    ) -> Result<Option<Payload>, HandlerError> {
        let args: BotStatusPayload = parse(payload)?;
        let connected = chat.broker_connected();

        let message_id = if args.channel_id.is_empty() {
            None
        } else {
            let sent = chat
                .send_message(&args.channel_id, status_line(connected))
                .await?;
            Some(sent.message_id)
        };

        to_data(&BotStatusResult {
            broker_connected: connected,
            message_id,
        })
    }
}
