// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

use super::{mention, parse, snowflake, to_data};
use crate::{chat::ChatClient, errors::HandlerError, messages::Payload, registry::Handler};
use async_trait::async_trait;
use opentelemetry::Context;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};
use tracing::warn;

const UNKNOWN_CONTEST: &str = "unknown contest";

/// Contest application lifecycle step announced in the contest text channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplicationEvent {
    Requested,
    Accepted,
    Rejected,
    Cancelled,
    Withdrawn,
}

impl Display for ApplicationEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApplicationEvent::Requested => write!(f, "requested"),
            ApplicationEvent::Accepted => write!(f, "accepted"),
            ApplicationEvent::Rejected => write!(f, "rejected"),
            ApplicationEvent::Cancelled => write!(f, "cancelled"),
            ApplicationEvent::Withdrawn => write!(f, "withdrawn"),
        }
    }
}

impl ApplicationEvent {
    fn content(self, user_id: &str, contest_title: &str, processed_by: Option<&str>) -> String {
        let user = mention(user_id);
        match (self, processed_by) {
            (ApplicationEvent::Requested, _) => format!(
                "**[Application Received]**\n\n{} applied to join **{}**.\nPlease wait for an organizer to review it.",
                user, contest_title
            ),
            (ApplicationEvent::Accepted, Some(by)) => format!(
                "**[Application Accepted]**\n\n{}, your application to **{}** was accepted.\nApproved by: {}\nGet ready for the contest!",
                user, contest_title, mention(by)
            ),
            (ApplicationEvent::Accepted, None) => format!(
                "**[Application Accepted]**\n\n{}, your application to **{}** was accepted.\nGet ready for the contest!",
                user, contest_title
            ),
            (ApplicationEvent::Rejected, Some(by)) => format!(
                "**[Application Rejected]**\n\n{}, your application to **{}** was rejected.\nProcessed by: {}\nPlease contact an organizer for details.",
                user, contest_title, mention(by)
            ),
            (ApplicationEvent::Rejected, None) => format!(
                "**[Application Rejected]**\n\n{}, your application to **{}** was rejected.\nPlease contact an organizer for details.",
                user, contest_title
            ),
            (ApplicationEvent::Cancelled, _) => format!(
                "**[Application Cancelled]**\n\n{} cancelled their application to **{}**.",
                user, contest_title
            ),
            (ApplicationEvent::Withdrawn, _) => format!(
                "**[Participation Withdrawn]**\n\n{} withdrew from **{}**.",
                user, contest_title
            ),
        }
    }

    fn reports_processor(self) -> bool {
        matches!(self, ApplicationEvent::Accepted | ApplicationEvent::Rejected)
    }
}

#[derive(Debug, Default, Deserialize)]
struct ApplicationData {
    #[serde(default)]
    contest_title: Option<String>,
    #[serde(default, deserialize_with = "snowflake")]
    processed_by_discord_id: String,
}

#[derive(Debug, Deserialize)]
struct ApplicationPayload {
    #[serde(default, deserialize_with = "snowflake")]
    discord_text_channel_id: String,
    #[serde(default, deserialize_with = "snowflake")]
    discord_user_id: String,
    #[serde(default)]
    data: Option<ApplicationData>,
}

#[derive(Debug, Serialize)]
struct ApplicationResult {
    message_id: String,
    user_id: String,
    timestamp: String,
}

pub struct ApplicationHandler {
    event: ApplicationEvent,
}

impl ApplicationHandler {
    pub fn new(event: ApplicationEvent) -> ApplicationHandler {
        ApplicationHandler { event }
    }
}

#[async_trait]
impl Handler for ApplicationHandler {
    async fn handle(
        &self,
        _ctx: &Context,
        chat: &dyn ChatClient,
        _guild_id: &str,
        payload: &Payload,
    ) -> Result<Option<Payload>, HandlerError> {
        let event: ApplicationPayload = parse(payload)?;

        if event.discord_text_channel_id.is_empty() {
            warn!(status = %self.event, "application notification without text channel, skipping");
            return Ok(None);
        }
        if event.discord_user_id.is_empty() {
            warn!(status = %self.event, "application notification without user, skipping");
            return Ok(None);
        }

        let data = event.data.unwrap_or_default();
        let contest_title = data
            .contest_title
            .filter(|title| !title.is_empty())
            .unwrap_or_else(|| UNKNOWN_CONTEST.to_owned());
        let processed_by = Some(data.processed_by_discord_id.as_str())
            .filter(|id| self.event.reports_processor() && !id.is_empty());

        let content = self
            .event
            .content(&event.discord_user_id, &contest_title, processed_by);
        let sent = chat
            .send_message(&event.discord_text_channel_id, &content)
            .await?;

        to_data(&ApplicationResult {
            message_id: sent.message_id,
            user_id: event.discord_user_id,
            timestamp: sent.timestamp,
        })
    }
}
