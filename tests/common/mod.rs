// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

#![allow(dead_code)]

use async_trait::async_trait;
use gamers_bot::{
    chat::{ChannelInfo, ChatClient, MoveOutcome, SentMessage},
    errors::{AmqpError, ChatError},
    messages::ResponseMessage,
    publisher::ResponsePublisher,
};
use lapin::types::{AMQPValue, FieldTable, LongString, ShortString};
use opentelemetry::Context;
use std::{collections::BTreeMap, sync::Mutex};

/// Chat client recording the messages it was asked to send.
#[derive(Default)]
pub struct RecordingChat {
    sent: Mutex<Vec<(String, String)>>,
    failure: Mutex<Option<ChatError>>,
    connected: Mutex<bool>,
}

impl RecordingChat {
    pub fn new() -> RecordingChat {
        RecordingChat::default()
    }

    /// Makes every following send fail with `err` until cleared.
    pub fn fail_with(&self, err: Option<ChatError>) {
        *self.failure.lock().unwrap() = err;
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }

    fn record(&self, target: &str, content: &str) -> Result<SentMessage, ChatError> {
        if let Some(err) = self.failure.lock().unwrap().clone() {
            return Err(err);
        }
        let mut sent = self.sent.lock().unwrap();
        sent.push((target.to_owned(), content.to_owned()));
        Ok(SentMessage {
            message_id: format!("msg-{}", sent.len()),
            timestamp: "2024-05-01T12:00:00Z".to_owned(),
        })
    }
}

#[async_trait]
impl ChatClient for RecordingChat {
    async fn send_message(&self, channel_id: &str, content: &str) -> Result<SentMessage, ChatError> {
        self.record(channel_id, content)
    }

    async fn send_direct_message(&self, user_id: &str, content: &str) -> Result<SentMessage, ChatError> {
        self.record(&format!("dm:{}", user_id), content)
    }

    async fn move_members(
        &self,
        _guild_id: &str,
        _from_channel_id: &str,
        _to_channel_id: &str,
        user_ids: &[String],
    ) -> Result<MoveOutcome, ChatError> {
        Ok(MoveOutcome {
            moved_count: user_ids.len(),
            failed_users: vec![],
        })
    }

    async fn list_voice_channels(&self, _guild_id: &str) -> Result<Vec<ChannelInfo>, ChatError> {
        Ok(vec![])
    }

    async fn list_text_channels(&self, _guild_id: &str) -> Result<Vec<ChannelInfo>, ChatError> {
        Ok(vec![])
    }

    fn report_broker_status(&self, connected: bool, _error: Option<String>) {
        *self.connected.lock().unwrap() = connected;
    }

    fn broker_connected(&self) -> bool {
        *self.connected.lock().unwrap()
    }
}

/// Publisher keeping every response in memory.
#[derive(Default)]
pub struct RecordingPublisher {
    responses: Mutex<Vec<ResponseMessage>>,
}

impl RecordingPublisher {
    pub fn new() -> RecordingPublisher {
        RecordingPublisher::default()
    }

    pub fn responses(&self) -> Vec<ResponseMessage> {
        self.responses.lock().unwrap().clone()
    }
}

#[async_trait]
impl ResponsePublisher for RecordingPublisher {
    async fn publish(&self, _ctx: &Context, response: &ResponseMessage) -> Result<(), AmqpError> {
        self.responses.lock().unwrap().push(response.clone());
        Ok(())
    }
}

pub fn event_type_header(event_type: &str) -> FieldTable {
    let mut headers = BTreeMap::new();
    headers.insert(
        ShortString::from("event_type"),
        AMQPValue::LongString(LongString::from(event_type.to_owned())),
    );
    FieldTable::from(headers)
}
