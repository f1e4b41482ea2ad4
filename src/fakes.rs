// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! Recording doubles shared by the unit tests.

use crate::{
    chat::{ChannelInfo, ChatClient, MoveOutcome, SentMessage},
    errors::{ChatError, HandlerError},
    messages::Payload,
    registry::Handler,
};
use async_trait::async_trait;
use opentelemetry::Context;
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ChatCall {
    Send { channel_id: String, content: String },
    Direct { user_id: String, content: String },
    Move {
        guild_id: String,
        from: String,
        to: String,
        user_ids: Vec<String>,
    },
    ListVoice(String),
    ListText(String),
    Status { connected: bool, error: Option<String> },
}

/// Chat client that records every call and answers with canned data.
#[derive(Default)]
pub(crate) struct RecordingChat {
    pub(crate) calls: Mutex<Vec<ChatCall>>,
    pub(crate) failure: Option<ChatError>,
    pub(crate) voice_channels: Vec<ChannelInfo>,
    pub(crate) text_channels: Vec<ChannelInfo>,
    pub(crate) failed_users: Vec<String>,
}

impl RecordingChat {
    pub(crate) fn new() -> RecordingChat {
        RecordingChat::default()
    }

    pub(crate) fn failing(err: ChatError) -> RecordingChat {
        RecordingChat {
            failure: Some(err),
            ..Default::default()
        }
    }

    pub(crate) fn calls(&self) -> Vec<ChatCall> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn sent(&self) -> Vec<(String, String)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                ChatCall::Send {
                    channel_id,
                    content,
                } => Some((channel_id, content)),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: ChatCall) -> Result<(), ChatError> {
        self.calls.lock().unwrap().push(call);
        match &self.failure {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn message(&self) -> SentMessage {
        let n = self.calls.lock().unwrap().len();
        SentMessage {
            message_id: format!("m{}", n),
            timestamp: "2024-05-01T12:00:00Z".to_owned(),
        }
    }
}

#[async_trait]
impl ChatClient for RecordingChat {
    async fn send_message(
        &self,
        channel_id: &str,
        content: &str,
    ) -> Result<SentMessage, ChatError> {
        self.record(ChatCall::Send {
            channel_id: channel_id.to_owned(),
            content: content.to_owned(),
        })?;
        Ok(self.message())
    }

    async fn send_direct_message(
        &self,
        user_id: &str,
        content: &str,
    ) -> Result<SentMessage, ChatError> {
        self.record(ChatCall::Direct {
            user_id: user_id.to_owned(),
            content: content.to_owned(),
        })?;
        Ok(self.message())
    }

    async fn move_members(
        &self,
        guild_id: &str,
        from_channel_id: &str,
        to_channel_id: &str,
        user_ids: &[String],
    ) -> Result<MoveOutcome, ChatError> {
        self.record(ChatCall::Move {
            guild_id: guild_id.to_owned(),
            from: from_channel_id.to_owned(),
            to: to_channel_id.to_owned(),
            user_ids: user_ids.to_vec(),
        })?;
        Ok(MoveOutcome {
            moved_count: user_ids.len() - self.failed_users.len(),
            failed_users: self.failed_users.clone(),
        })
    }

    async fn list_voice_channels(&self, guild_id: &str) -> Result<Vec<ChannelInfo>, ChatError> {
        self.record(ChatCall::ListVoice(guild_id.to_owned()))?;
        Ok(self.voice_channels.clone())
    }

    async fn list_text_channels(&self, guild_id: &str) -> Result<Vec<ChannelInfo>, ChatError> {
        self.record(ChatCall::ListText(guild_id.to_owned()))?;
        Ok(self.text_channels.clone())
    }

    fn report_broker_status(&self, connected: bool, error: Option<String>) {
        self.calls
            .lock()
            .unwrap()
            .push(ChatCall::Status { connected, error });
    }

    fn broker_connected(&self) -> bool {
        self.calls()
            .into_iter()
            .rev()
            .find_map(|call| match call {
                ChatCall::Status { connected, .. } => Some(connected),
                _ => None,
            })
            .unwrap_or(false)
    }
}

/// Handler returning a fixed result and recording what it was called with.
pub(crate) struct ScriptedHandler {
    calls: Mutex<Vec<(String, Payload)>>,
    result: Result<Option<Payload>, HandlerError>,
}

impl ScriptedHandler {
    pub(crate) fn returning(result: Result<Option<Payload>, HandlerError>) -> ScriptedHandler {
        ScriptedHandler {
            calls: Mutex::new(vec![]),
            result,
        }
    }

    pub(crate) fn ok() -> ScriptedHandler {
        ScriptedHandler::returning(Ok(None))
    }

    pub(crate) fn calls(&self) -> Vec<(String, Payload)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Handler for ScriptedHandler {
    async fn handle(
        &self,
        _ctx: &Context,
        _chat: &dyn ChatClient,
        guild_id: &str,
        payload: &Payload,
    ) -> Result<Option<Payload>, HandlerError> {
        self.calls
            .lock()
            .unwrap()
            .push((guild_id.to_owned(), payload.clone()));
        self.result.clone()
    }
}

pub(crate) fn payload(value: serde_json::Value) -> Payload {
    match value {
        serde_json::Value::Object(map) => map,
        other => panic!("expected a json object, got {}", other),
    }
}
