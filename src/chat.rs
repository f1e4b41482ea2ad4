// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Chat Platform Capability
//!
//! The outbound actions handlers may perform against the chat platform. The
//! bridge only depends on this trait; [`crate::discord::DiscordRestClient`] is
//! the production implementation.

use crate::errors::ChatError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A message accepted by the chat platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentMessage {
    pub message_id: String,
    pub timestamp: String,
}

/// Outcome of moving members between voice channels.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveOutcome {
    pub moved_count: usize,
    pub failed_users: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub id: String,
    pub name: String,
}

#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn send_message(&self, channel_id: &str, content: &str)
        -> Result<SentMessage, ChatError>;

    /// Sends a private message to a user.
    async fn send_direct_message(
        &self,
        user_id: &str,
        content: &str,
    ) -> Result<SentMessage, ChatError>;

    /// Moves `user_ids` from one voice channel to another. Users that can't be
    /// moved are reported in [`MoveOutcome::failed_users`] instead of failing
    /// the whole call.
    async fn move_members(
        &self,
        guild_id: &str,
        from_channel_id: &str,
        to_channel_id: &str,
        user_ids: &[String],
    ) -> Result<MoveOutcome, ChatError>;

    async fn list_voice_channels(&self, guild_id: &str) -> Result<Vec<ChannelInfo>, ChatError>;

    async fn list_text_channels(&self, guild_id: &str) -> Result<Vec<ChannelInfo>, ChatError>;

    /// Fire-and-forget broker connectivity report.
    fn report_broker_status(&self, connected: bool, error: Option<String>);

    /// Connectivity from the last [`ChatClient::report_broker_status`] call.
    fn broker_connected(&self) -> bool;
}
