// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # RabbitMQ Message Consumers
//!
//! The delivery loop shared by the notification and legacy consumers. Each loop
//! owns one channel, consumes with manual acknowledgment and settles every
//! delivery according to the [`Disposition`] its processor returns. Message
//! level failures never leave the loop; only broker failures do.

pub mod legacy;
pub mod notification;

use crate::{errors::AmqpError, shutdown::ShutdownSignal};
use async_trait::async_trait;
use futures_util::StreamExt;
use lapin::{
    message::Delivery,
    options::{BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicQosOptions},
    types::FieldTable,
    Channel,
};
use opentelemetry::{
    trace::{Status, TraceContextExt},
    Context, KeyValue,
};
use std::{borrow::Cow, fmt};
use tracing::{error, info};
use uuid::Uuid;

/// How a processed delivery is settled with the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Ack,
    /// Negative acknowledgment without requeue: dropped or dead-lettered.
    Reject,
    /// Negative acknowledgment with requeue.
    Requeue,
}

/// Lifecycle of a consumer loop, as reported in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    Starting,
    Consuming,
    Stopped,
    Failed,
}

impl fmt::Display for ConsumerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self {
            ConsumerState::Starting => "starting",
            ConsumerState::Consuming => "consuming",
            ConsumerState::Stopped => "stopped",
            ConsumerState::Failed => "failed",
        };
        f.write_str(state)
    }
}

/// Turns one delivery into a settlement decision.
#[async_trait]
pub trait DeliveryProcessor: Send + Sync {
    async fn process(&self, delivery: &Delivery) -> Disposition;
}

/// Consumes `queue` on `channel` until the delivery stream ends or `shutdown` fires.
///
/// Returns `Ok(())` only on cancellation. A closed stream is an error: it
/// means the channel or connection went away.
pub async fn run<P>(
    channel: &Channel,
    queue: &str,
    prefetch_count: u16,
    processor: &P,
    shutdown: &ShutdownSignal,
) -> Result<(), AmqpError>
where
    P: DeliveryProcessor + ?Sized,
{
    info!(queue = queue, state = %ConsumerState::Starting, "consumer state");

    if let Err(err) = channel
        .basic_qos(prefetch_count, BasicQosOptions { global: false })
        .await
    {
        error!(error = err.to_string(), queue = queue, "failure to configure qos");
        return Err(AmqpError::QoSDeclarationError(queue.to_owned()));
    }

    let consumer_tag = format!("{}-{}", queue, Uuid::new_v4());
    let mut consumer = match channel
        .basic_consume(
            queue,
            &consumer_tag,
            BasicConsumeOptions {
                no_local: false,
                no_ack: false,
                exclusive: false,
                nowait: false,
            },
            FieldTable::default(),
        )
        .await
    {
        Ok(consumer) => consumer,
        Err(err) => {
            error!(error = err.to_string(), queue = queue, "failure to declare consumer");
            return Err(AmqpError::BindingConsumerError(queue.to_owned()));
        }
    };

    info!(queue = queue, state = %ConsumerState::Consuming, "consumer state");

    loop {
        let next = tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                info!(queue = queue, state = %ConsumerState::Stopped, "consumer state");
                return Ok(());
            }
            next = consumer.next() => next,
        };

        let delivery = match next {
            Some(Ok(delivery)) => delivery,
            Some(Err(err)) => {
                error!(
                    error = err.to_string(),
                    queue = queue,
                    state = %ConsumerState::Failed,
                    "consumer state"
                );
                return Err(AmqpError::ConsumerError(err.to_string()));
            }
            None => {
                error!(queue = queue, state = %ConsumerState::Failed, "delivery stream closed");
                return Err(AmqpError::ConsumerError(format!(
                    "delivery stream of `{}` closed",
                    queue
                )));
            }
        };

        let disposition = processor.process(&delivery).await;
        settle(&delivery, disposition).await?;
    }
}

async fn settle(delivery: &Delivery, disposition: Disposition) -> Result<(), AmqpError> {
    match nack_options(disposition) {
        None => delivery
            .ack(BasicAckOptions { multiple: false })
            .await
            .map(|_| ())
            .map_err(|err| {
                error!(error = err.to_string(), "error whiling ack msg");
                AmqpError::AckMessageError
            }),
        Some(options) => delivery.nack(options).await.map(|_| ()).map_err(|err| {
            error!(error = err.to_string(), "error whiling nack msg");
            AmqpError::NackMessageError
        }),
    }
}

/// Nack options for a negative disposition, `None` when the delivery is acked.
pub(crate) fn nack_options(disposition: Disposition) -> Option<BasicNackOptions> {
    match disposition {
        Disposition::Ack => None,
        Disposition::Reject => Some(BasicNackOptions {
            multiple: false,
            requeue: false,
        }),
        Disposition::Requeue => Some(BasicNackOptions {
            multiple: false,
            requeue: true,
        }),
    }
}

/// Records the outcome of a delivery on the span carried by `cx`.
pub(crate) fn record_outcome(cx: &Context, disposition: Disposition, reason: Option<&str>) {
    let span = cx.span();
    span.set_attribute(KeyValue::new(
        "messaging.disposition",
        format!("{:?}", disposition).to_lowercase(),
    ));

    match disposition {
        Disposition::Ack => span.set_status(Status::Ok),
        Disposition::Reject | Disposition::Requeue => {
            let description = reason.unwrap_or("handler failure").to_owned();
            span.set_status(Status::Error {
                description: Cow::from(description),
            });
        }
    }
    span.end();
}
