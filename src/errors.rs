// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Error Types for the Event Bridge
//!
//! This module groups the error types used across the bridge. `AmqpError` covers
//! every broker-side failure (connection, channel, topology, consuming and
//! publishing), `ChatError` covers the chat-platform capability, `HandlerError`
//! is what event handlers return and `ConfigError` is raised while reading the
//! process configuration.

use thiserror::Error;

/// Represents errors that can occur during AMQP/RabbitMQ operations.
///
/// Only connection-level variants ever reach the supervisor; message-level
/// problems are settled (ack/nack) inside the consumer loops.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AmqpError {
    /// Error establishing a connection to the RabbitMQ server
    #[error("failure to connect: {0}")]
    ConnectionError(String),

    /// Error creating a channel from an established connection
    #[error("failure to create a channel: {0}")]
    ChannelError(String),

    /// Error declaring an exchange with the given name
    #[error("failure to declare an exchange `{0}`")]
    DeclareExchangeError(String),

    /// Error declaring a queue with the given name
    #[error("failure to declare a queue `{0}`")]
    DeclareQueueError(String),

    /// Error binding a queue to an exchange
    #[error("failure to bind queue `{1}` to exchange `{0}` with key `{2}`")]
    BindingExchangeToQueueError(String, String, String),

    /// A queue binding definition breaks the topology invariants
    #[error("invalid queue binding: {0}")]
    InvalidBinding(String),

    /// Error binding a consumer to a queue
    #[error("failure to declare consumer `{0}`")]
    BindingConsumerError(String),

    /// Error publishing a message
    #[error("failure to publish: {0}")]
    PublishingError(String),

    /// Error serializing a message payload
    #[error("failure to serialize payload: {0}")]
    SerializePayloadError(String),

    /// Error acknowledging a message
    #[error("failure to ack message")]
    AckMessageError,

    /// Error negative-acknowledging a message
    #[error("failure to nack message")]
    NackMessageError,

    /// Error configuring Quality of Service parameters
    #[error("failure to configure qos `{0}`")]
    QoSDeclarationError(String),

    /// Error consuming a message, including a closed delivery stream
    #[error("failure to consume message `{0}`")]
    ConsumerError(String),
}

/// Errors raised by the chat-platform capability.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChatError {
    #[error("chat transport failure: {0}")]
    Transport(String),

    #[error("chat api returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("chat api rate limited the request")]
    RateLimited,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("unsupported operation: {0}")]
    Unsupported(String),
}

impl ChatError {
    /// Whether retrying the same call later can reasonably succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            ChatError::Transport(_) | ChatError::RateLimited => true,
            ChatError::Api { status, .. } => *status >= 500,
            ChatError::InvalidArgument(_) | ChatError::Unsupported(_) => false,
        }
    }
}

/// Errors returned by event handlers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HandlerError {
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("{0} is required")]
    MissingField(&'static str),

    #[error(transparent)]
    Chat(#[from] ChatError),
}

impl HandlerError {
    pub fn is_transient(&self) -> bool {
        match self {
            HandlerError::Chat(err) => err.is_transient(),
            _ => false,
        }
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(err: serde_json::Error) -> Self {
        HandlerError::InvalidPayload(err.to_string())
    }
}

/// Errors raised while loading the process configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} is required")]
    Missing(&'static str),

    #[error("invalid value `{value}` for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}
