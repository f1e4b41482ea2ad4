// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Gamers Bot
//!
//! Bridges the platform event bus (RabbitMQ) to Discord: notification queues
//! are dispatched by event type to handlers that post to the chat platform,
//! and a legacy request queue answers correlated commands on a response queue.

mod otel;

pub mod channel;
pub mod chat;
pub mod compat;
pub mod configs;
pub mod consumer;
pub mod dedup;
pub mod discord;
pub mod errors;
pub mod exchange;
pub mod handlers;
pub mod messages;
pub mod publisher;
pub mod queue;
pub mod registry;
pub mod shutdown;
pub mod supervisor;
pub mod topology;

#[cfg(test)]
mod fakes;
