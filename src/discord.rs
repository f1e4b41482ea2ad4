// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Discord REST Client
//!
//! [`ChatClient`] implementation backed by the Discord HTTP API. Every request
//! authenticates with the bot token; rate limiting and server side failures
//! map to transient [`ChatError`]s so consumers can decide to retry.

use crate::{
    chat::{ChannelInfo, ChatClient, MoveOutcome, SentMessage},
    configs::DiscordConfigs,
    errors::ChatError,
};
use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::json;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tracing::{debug, error, info, warn};

const GUILD_TEXT: u8 = 0;
const GUILD_VOICE: u8 = 2;

#[derive(Debug, Deserialize)]
struct MessageResponse {
    id: String,
    #[serde(default)]
    timestamp: String,
}

#[derive(Debug, Deserialize)]
struct DmChannelResponse {
    id: String,
}

#[derive(Debug, Clone, Deserialize)]
struct GuildChannel {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(rename = "type")]
    kind: u8,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: String,
}

#[derive(Clone)]
pub struct DiscordRestClient {
    http: reqwest::Client,
    api_base: String,
    token: String,
    status_channel_id: Option<String>,
    broker_connected: Arc<AtomicBool>,
}

impl DiscordRestClient {
    pub fn new(cfg: &DiscordConfigs) -> DiscordRestClient {
        DiscordRestClient {
            http: reqwest::Client::new(),
            api_base: cfg.api_base.clone(),
            token: cfg.token.clone(),
            status_channel_id: cfg.status_channel_id.clone(),
            broker_connected: Arc::new(AtomicBool::new(false)),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.api_base, path)
    }

    async fn request<B, T>(&self, method: Method, path: &str, body: Option<&B>) -> Result<T, ChatError>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let bytes = self.send(method, path, body).await?;
        serde_json::from_slice(&bytes)
            .map_err(|err| ChatError::Transport(format!("unexpected response body: {}", err)))
    }

    async fn send<B>(&self, method: Method, path: &str, body: Option<&B>) -> Result<Vec<u8>, ChatError>
    where
        B: Serialize + ?Sized + Sync,
    {
        debug!(method = %method, path = path, "discord request");

        let mut builder = self
            .http
            .request(method, self.url(path))
            .header(reqwest::header::AUTHORIZATION, format!("Bot {}", self.token));
        if let Some(body) = body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|err| ChatError::Transport(err.to_string()))?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|err| ChatError::Transport(err.to_string()))?;

        match status_error(status, &bytes) {
            Some(err) => Err(err),
            None => Ok(bytes.to_vec()),
        }
    }

    async fn guild_channels(&self, guild_id: &str, kind: u8) -> Result<Vec<ChannelInfo>, ChatError> {
        if guild_id.is_empty() {
            return Err(ChatError::InvalidArgument("guild_id is empty".to_owned()));
        }

        let channels: Vec<GuildChannel> = self
            .request::<(), _>(Method::GET, &format!("guilds/{}/channels", guild_id), None)
            .await?;

        Ok(channels_of_kind(channels, kind))
    }
}

/// Maps a non-success HTTP status to a [`ChatError`].
fn status_error(status: StatusCode, body: &[u8]) -> Option<ChatError> {
    if status.is_success() {
        return None;
    }
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Some(ChatError::RateLimited);
    }

    let message = serde_json::from_slice::<ApiErrorBody>(body)
        .map(|body| body.message)
        .unwrap_or_else(|_| String::from_utf8_lossy(body).into_owned());

    Some(ChatError::Api {
        status: status.as_u16(),
        message,
    })
}

fn channels_of_kind(channels: Vec<GuildChannel>, kind: u8) -> Vec<ChannelInfo> {
    channels
        .into_iter()
        .filter(|channel| channel.kind == kind)
        .map(|channel| ChannelInfo {
            id: channel.id,
            name: channel.name.unwrap_or_default(),
        })
        .collect()
}

fn status_notice(connected: bool, error: Option<&str>) -> String {
    match (connected, error) {
        (true, _) => "**[Bridge]** Connected to the event bus.".to_owned(),
        (false, Some(err)) => format!("**[Bridge]** Lost the event bus connection: {}", err),
        (false, None) => "**[Bridge]** Disconnected from the event bus.".to_owned(),
    }
}

#[async_trait]
impl ChatClient for DiscordRestClient {
    async fn send_message(&self, channel_id: &str, content: &str) -> Result<SentMessage, ChatError> {
        if channel_id.is_empty() {
            return Err(ChatError::InvalidArgument("channel_id is empty".to_owned()));
        }

        let message: MessageResponse = self
            .request(
                Method::POST,
                &format!("channels/{}/messages", channel_id),
                Some(&json!({ "content": content })),
            )
            .await?;

        Ok(SentMessage {
            message_id: message.id,
            timestamp: message.timestamp,
        })
    }

    async fn send_direct_message(&self, user_id: &str, content: &str) -> Result<SentMessage, ChatError> {
        if user_id.is_empty() {
            return Err(ChatError::InvalidArgument("user_id is empty".to_owned()));
        }

        let dm: DmChannelResponse = self
            .request(
                Method::POST,
                "users/@me/channels",
                Some(&json!({ "recipient_id": user_id })),
            )
            .await?;

        self.send_message(&dm.id, content).await
    }

    async fn move_members(
        &self,
        guild_id: &str,
        from_channel_id: &str,
        to_channel_id: &str,
        user_ids: &[String],
    ) -> Result<MoveOutcome, ChatError> {
        if from_channel_id == to_channel_id {
            return Err(ChatError::InvalidArgument(
                "source and target channels are the same".to_owned(),
            ));
        }
        if user_ids.is_empty() {
            // Voice states are only visible over the gateway.
            return Err(ChatError::Unsupported(
                "moving every member of a channel requires explicit user_ids".to_owned(),
            ));
        }

        let mut outcome = MoveOutcome::default();
        for user_id in user_ids {
            let result = self
                .send(
                    Method::PATCH,
                    &format!("guilds/{}/members/{}", guild_id, user_id),
                    Some(&json!({ "channel_id": to_channel_id })),
                )
                .await;

            match result {
                Ok(_) => outcome.moved_count += 1,
                Err(err) => {
                    warn!(user_id = %user_id, error = %err, "failed to move member");
                    outcome.failed_users.push(user_id.clone());
                }
            }
        }

        info!(
            from = from_channel_id,
            to = to_channel_id,
            moved = outcome.moved_count,
            "voice move finished"
        );
        Ok(outcome)
    }

    async fn list_voice_channels(&self, guild_id: &str) -> Result<Vec<ChannelInfo>, ChatError> {
        self.guild_channels(guild_id, GUILD_VOICE).await
    }

    async fn list_text_channels(&self, guild_id: &str) -> Result<Vec<ChannelInfo>, ChatError> {
        self.guild_channels(guild_id, GUILD_TEXT).await
    }

    fn report_broker_status(&self, connected: bool, error: Option<String>) {
        let previous = self.broker_connected.swap(connected, Ordering::SeqCst);
        info!(connected = connected, error = ?error, "broker status changed");

        let Some(channel_id) = self.status_channel_id.clone() else {
            return;
        };
        if previous == connected && error.is_none() {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };

        let client = self.clone();
        let notice = status_notice(connected, error.as_deref());
        runtime.spawn(async move {
            if let Err(err) = client.send_message(&channel_id, &notice).await {
                error!(error = %err, "failed to post broker status");
            }
        });
    }

    fn broker_connected(&self) -> bool {
        self.broker_connected.load(Ordering::SeqCst)
    }
}
