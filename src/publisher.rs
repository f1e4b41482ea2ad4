// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Legacy Response Publisher
//!
//! Replies to legacy requests are published straight to the response queue
//! through the default exchange, as persistent JSON carrying the request's
//! correlation id and the current trace context.

use crate::{
    errors::AmqpError, messages::ResponseMessage, otel, queue::QueueDefinition,
    topology::Declarer,
};
use async_trait::async_trait;
use lapin::{
    options::BasicPublishOptions,
    types::{FieldTable, ShortString},
    BasicProperties, Channel,
};
use opentelemetry::Context;
use tracing::{debug, error, warn};
use uuid::Uuid;

/// Default content type for JSON messages
pub const JSON_CONTENT_TYPE: &str = "application/json";

const PERSISTENT_DELIVERY_MODE: u8 = 2;

/// Longest value an AMQP short string property can carry.
const MAX_SHORT_STRING_LEN: usize = 255;

/// Publishes the reply to a legacy request.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ResponsePublisher: Send + Sync {
    async fn publish(&self, ctx: &Context, response: &ResponseMessage) -> Result<(), AmqpError>;
}

/// RabbitMQ implementation of the `ResponsePublisher` trait.
pub struct RabbitMQPublisher {
    channel: Channel,
    queue: String,
}

impl RabbitMQPublisher {
    /// Declares the durable response queue on `channel` and returns a publisher for it.
    pub async fn new(channel: Channel, queue: &str) -> Result<RabbitMQPublisher, AmqpError> {
        channel
            .declare_queue(&QueueDefinition::new(queue).durable())
            .await?;

        Ok(RabbitMQPublisher {
            channel,
            queue: queue.to_owned(),
        })
    }

    pub async fn close(&self) {
        if let Err(err) = self.channel.close(200, "OK").await {
            debug!(error = err.to_string(), "publisher channel already closed");
        }
    }
}

/// Properties of a response message.
///
/// The correlation id property is left unset when it does not fit a short
/// string; the JSON body still carries it.
fn response_properties(ctx: &Context, correlation_id: &str) -> BasicProperties {
    let properties = BasicProperties::default()
        .with_content_type(ShortString::from(JSON_CONTENT_TYPE))
        .with_delivery_mode(PERSISTENT_DELIVERY_MODE)
        .with_message_id(ShortString::from(Uuid::new_v4().to_string()))
        .with_headers(FieldTable::from(otel::inject(ctx)));

    if correlation_id.len() > MAX_SHORT_STRING_LEN {
        warn!(
            length = correlation_id.len(),
            "correlation id too long for the message properties"
        );
        return properties;
    }
    properties.with_correlation_id(ShortString::from(correlation_id.to_owned()))
}

#[async_trait]
impl ResponsePublisher for RabbitMQPublisher {
    async fn publish(&self, ctx: &Context, response: &ResponseMessage) -> Result<(), AmqpError> {
        let body = serde_json::to_vec(response)
            .map_err(|err| AmqpError::SerializePayloadError(err.to_string()))?;

        let properties = response_properties(ctx, &response.correlation_id);

        match self
            .channel
            .basic_publish(
                "",
                &self.queue,
                BasicPublishOptions {
                    immediate: false,
                    mandatory: false,
                },
                &body,
                properties,
            )
            .await
        {
            Err(err) => {
                error!(
                    error = err.to_string(),
                    correlation_id = response.correlation_id,
                    "error publishing response"
                );
                Err(AmqpError::PublishingError(err.to_string()))
            }
            _ => {
                debug!(
                    correlation_id = response.correlation_id,
                    success = response.success,
                    "response published"
                );
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_properties_carry_short_correlation_id() {
        let properties = response_properties(&Context::new(), "abc");

        assert_eq!(
            properties.correlation_id().as_ref().map(|id| id.as_str()),
            Some("abc")
        );
        assert_eq!(*properties.delivery_mode(), Some(PERSISTENT_DELIVERY_MODE));
    }

    #[test]
    fn test_oversized_correlation_id_is_left_out() {
        let long = "x".repeat(300);
        let boundary = "y".repeat(MAX_SHORT_STRING_LEN);

        assert!(response_properties(&Context::new(), &long)
            .correlation_id()
            .is_none());
        assert!(response_properties(&Context::new(), &boundary)
            .correlation_id()
            .is_some());
    }
}
