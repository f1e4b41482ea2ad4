// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

use super::{null_as_default, parse, snowflake, to_data};
use crate::{chat::ChatClient, errors::HandlerError, messages::Payload, registry::Handler};
use async_trait::async_trait;
use opentelemetry::Context;
use serde::Deserialize;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameStage {
    Scheduled,
    Activated,
    MatchDetecting,
    MatchDetected,
    MatchFailed,
    Finished,
}

impl GameStage {
    fn content(self, game_id: i64) -> String {
        match self {
            GameStage::Scheduled => format!(
                "**[Game Scheduled]**\n\nGame (ID: {}) has been scheduled.\nPlease be ready at the start time!",
                game_id
            ),
            GameStage::Activated => format!(
                "**[Game Started]**\n\nGame (ID: {}) has started.\nGood luck!",
                game_id
            ),
            GameStage::MatchDetecting => format!(
                "**[Detecting Match]**\n\nLooking for the match result of game (ID: {}).\nPlease wait.",
                game_id
            ),
            GameStage::MatchDetected => format!(
                "**[Match Detected]**\n\nThe match for game (ID: {}) was detected successfully!",
                game_id
            ),
            GameStage::MatchFailed => format!(
                "**[Match Detection Failed]**\n\nCould not detect the match for game (ID: {}).\nPlease check with an organizer.",
                game_id
            ),
            GameStage::Finished => format!(
                "**[Game Finished]**\n\nGame (ID: {}) has finished.\nWell played!",
                game_id
            ),
        }
    }
}

#[derive(Debug, Deserialize)]
struct GamePayload {
    #[serde(default, deserialize_with = "null_as_default")]
    game_id: i64,
    #[serde(default, deserialize_with = "snowflake")]
    discord_text_channel_id: String,
}

/// `game.*` stage announcements in the contest text channel.
pub struct GameHandler {
    stage: GameStage,
}

impl GameHandler {
    pub fn new(stage: GameStage) -> GameHandler {
        GameHandler { stage }
    }
}

#[async_trait]
impl Handler for GameHandler {
    async fn handle(
        &self,
        _ctx: &Context,
        chat: &dyn ChatClient,
        _guild_id: &str,
        payload: &Payload,
    ) -> Result<Option<Payload>, HandlerError> {
        let event: GamePayload = parse(payload)?;

        if event.discord_text_channel_id.is_empty() {
            warn!(stage = ?self.stage, game_id = event.game_id, "game event without text channel, skipping");
            return Ok(None);
        }

        let sent = chat
            .send_message(
                &event.discord_text_channel_id,
                &self.stage.content(event.game_id),
            )
            .await?;
        to_data(&sent)
    }
}

#[derive(Debug, Deserialize)]
struct TeamsReadyPayload {
    #[serde(default, deserialize_with = "null_as_default")]
    contest_id: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    team_count: i64,
    #[serde(default, deserialize_with = "snowflake")]
    discord_text_channel_id: String,
}

/// `game.contest.teams.ready`
pub struct ContestTeamsReadyHandler;

#[async_trait]
impl Handler for ContestTeamsReadyHandler {
    async fn handle(
        &self,
        _ctx: &Context,
        chat: &dyn ChatClient,
        _guild_id: &str,
        payload: &Payload,
    ) -> Result<Option<Payload>, HandlerError> {
        let event: TeamsReadyPayload = parse(payload)?;

        if event.discord_text_channel_id.is_empty() {
            warn!(contest_id = event.contest_id, "teams ready without text channel, skipping");
            return Ok(None);
        }

        let content = format!(
            "**[Teams Ready]**\n\nAll {} teams of the contest are ready!\nThe games will start soon.",
            event.team_count
        );
        let sent = chat
            .send_message(&event.discord_text_channel_id, &content)
            .await?;
        to_data(&sent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        errors::ChatError,
        fakes::{payload, RecordingChat},
    };
    use serde_json::json;

    #[tokio::test]
    async fn test_stage_message_names_game() {
        let chat = RecordingChat::new();

        GameHandler::new(GameStage::MatchFailed)
            .handle(
                &Context::new(),
                &chat,
                "G1",
                &payload(json!({"game_id": 77, "discord_text_channel_id": "C1"})),
            )
            .await
            .unwrap();

        let sent = chat.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].1.contains("ID: 77"));
        assert!(sent[0].1.contains("Failed"));
    }

    #[tokio::test]
    async fn test_null_game_id_still_announces() {
        let chat = RecordingChat::new();

        let result = GameHandler::new(GameStage::Scheduled)
            .handle(
                &Context::new(),
                &chat,
                "G1",
                &payload(json!({"game_id": null, "discord_text_channel_id": "C1"})),
            )
            .await;

        assert!(result.is_ok());
        let sent = chat.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].1.contains("ID: 0"));
    }

    #[tokio::test]
    async fn test_skips_without_channel() {
        let chat = RecordingChat::new();

        let result = GameHandler::new(GameStage::Finished)
            .handle(&Context::new(), &chat, "G1", &payload(json!({"game_id": 1})))
            .await;

        assert_eq!(result, Ok(None));
        assert!(chat.calls().is_empty());
    }

    #[tokio::test]
    async fn test_teams_ready_surfaces_chat_errors() {
        let chat = RecordingChat::failing(ChatError::Transport("reset".to_owned()));

        let result = ContestTeamsReadyHandler
            .handle(
                &Context::new(),
                &chat,
                "G1",
                &payload(json!({"contest_id": 5, "team_count": 8, "discord_text_channel_id": "C1"})),
            )
            .await;

        assert!(matches!(result, Err(HandlerError::Chat(ChatError::Transport(_)))));
    }
}
