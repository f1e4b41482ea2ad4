// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

use super::to_data;
use crate::{
    chat::{ChannelInfo, ChatClient},
    errors::HandlerError,
    messages::Payload,
    registry::Handler,
};
use async_trait::async_trait;
use opentelemetry::Context;
use serde::Serialize;

#[derive(Debug, Serialize)]
struct ChannelsResult {
    channels: Vec<ChannelInfo>,
}

/// `GET_VOICE_CHANNELS`
pub struct VoiceChannelsHandler;

/// `GET_TEXT_CHANNELS`
pub struct TextChannelsHandler;

#[async_trait]
impl Handler for VoiceChannelsHandler {
    async fn handle(
        &self,
        _ctx: &Context,
        chat: &dyn ChatClient,
        guild_id: &str,
        _payload: &Payload,
    ) -> Result<Option<Payload>, HandlerError> {
        let channels = chat.list_voice_channels(guild_id).await?;
        to_data(&ChannelsResult { channels })
    }
}

#[async_trait]
impl Handler for TextChannelsHandler {
    async fn handle(
        &self,
        _ctx: &Context,
        chat: &dyn ChatClient,
        guild_id: &str,
        _payload: &Payload,
    ) -> Result<Option<Payload>, HandlerError> {
        let channels = chat.list_text_channels(guild_id).await?;
        to_data(&ChannelsResult { channels })
    }
}
