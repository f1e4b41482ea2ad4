// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # RabbitMQ Topology Management
//!
//! This module declares the exchanges, queues and bindings the bridge consumes
//! from. Declarations are idempotent so the whole topology is re-declared on
//! every reconnect.
//!
//! The main components are:
//! - `Declarer` trait: the three broker primitives a topology needs
//! - `Topology` trait: interface for installing the bridge topology
//! - `AmqpTopology`: implementation of the Topology trait on top of a `Declarer`
//! - Header constants: argument names understood by RabbitMQ

use crate::{
    errors::AmqpError,
    exchange::ExchangeDefinition,
    queue::{validate_bindings, LegacyBinding, QueueBinding, QueueDefinition},
};
use async_trait::async_trait;
use lapin::{
    options::{ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions},
    types::{AMQPValue, FieldTable, LongString, ShortString},
    Channel, ExchangeKind,
};
use std::collections::BTreeMap;
use tracing::{debug, error, info};

/// Constant for the argument used to specify a dead letter exchange
pub const AMQP_HEADERS_DEAD_LETTER_EXCHANGE: &str = "x-dead-letter-exchange";
/// Constant for the argument used to specify a dead letter routing key
pub const AMQP_HEADERS_DEAD_LETTER_ROUTING_KEY: &str = "x-dead-letter-routing-key";

/// Broker primitives used to install a topology.
///
/// Implemented for `lapin::Channel`; the indirection keeps topology logic
/// testable without a running broker.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Declarer: Send + Sync {
    async fn declare_exchange(&self, def: &ExchangeDefinition) -> Result<(), AmqpError>;

    async fn declare_queue(&self, def: &QueueDefinition) -> Result<(), AmqpError>;

    async fn bind_queue(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
    ) -> Result<(), AmqpError>;
}

#[async_trait]
impl Declarer for Channel {
    async fn declare_exchange(&self, def: &ExchangeDefinition) -> Result<(), AmqpError> {
        debug!("creating exchange: {}", def.name);

        match self
            .exchange_declare(
                &def.name,
                ExchangeKind::Topic,
                ExchangeDeclareOptions {
                    passive: false,
                    durable: def.durable,
                    auto_delete: false,
                    internal: false,
                    nowait: false,
                },
                FieldTable::default(),
            )
            .await
        {
            Err(err) => {
                error!(
                    error = err.to_string(),
                    name = def.name,
                    "error to declare the exchange"
                );
                Err(AmqpError::DeclareExchangeError(def.name.clone()))
            }
            _ => {
                debug!("exchange: {} was created", def.name);
                Ok(())
            }
        }
    }

    async fn declare_queue(&self, def: &QueueDefinition) -> Result<(), AmqpError> {
        debug!("creating queue: {}", def.name);

        let mut queue_args = BTreeMap::new();

        if let Some(dlq_name) = &def.dlq_name {
            queue_args.insert(
                ShortString::from(AMQP_HEADERS_DEAD_LETTER_EXCHANGE),
                AMQPValue::LongString(LongString::from("")),
            );
            queue_args.insert(
                ShortString::from(AMQP_HEADERS_DEAD_LETTER_ROUTING_KEY),
                AMQPValue::LongString(LongString::from(dlq_name.clone())),
            );
        }

        match self
            .queue_declare(
                &def.name,
                QueueDeclareOptions {
                    passive: false,
                    durable: def.durable,
                    exclusive: false,
                    auto_delete: false,
                    nowait: false,
                },
                FieldTable::from(queue_args),
            )
            .await
        {
            Err(err) => {
                error!(error = err.to_string(), name = def.name, "error to declare the queue");
                Err(AmqpError::DeclareQueueError(def.name.clone()))
            }
            _ => {
                debug!("queue: {} was created", def.name);
                Ok(())
            }
        }
    }

    async fn bind_queue(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
    ) -> Result<(), AmqpError> {
        debug!(
            "binding queue: {} to the exchange: {} with the key: {}",
            queue, exchange, routing_key
        );

        match self
            .queue_bind(
                queue,
                exchange,
                routing_key,
                QueueBindOptions { nowait: false },
                FieldTable::default(),
            )
            .await
        {
            Err(err) => {
                error!(error = err.to_string(), "error to bind queue to exchange");
                Err(AmqpError::BindingExchangeToQueueError(
                    exchange.to_owned(),
                    queue.to_owned(),
                    routing_key.to_owned(),
                ))
            }
            _ => Ok(()),
        }
    }
}

/// Interface for installing the bridge topology.
#[async_trait]
pub trait Topology {
    /// Declares a durable topic exchange and, for every binding, a durable queue
    /// bound once per routing-key pattern.
    async fn declare_topology(
        &self,
        exchange: &str,
        bindings: &[QueueBinding],
    ) -> Result<(), AmqpError>;

    /// Declares the legacy request queue and binds it to the exchanges of
    /// older publishers. Bindings with an empty exchange name are skipped.
    async fn declare_legacy_queue(
        &self,
        queue: &str,
        bindings: &[LegacyBinding],
    ) -> Result<(), AmqpError>;
}

/// `Topology` implementation driving any `Declarer`, usually a lapin channel.
///
/// The first failing declaration aborts the installation and is returned as is.
pub struct AmqpTopology<D> {
    declarer: D,
    dead_letter: bool,
}

impl<D: Declarer> AmqpTopology<D> {
    pub fn new(declarer: D) -> AmqpTopology<D> {
        AmqpTopology {
            declarer,
            dead_letter: false,
        }
    }

    /// Declares a `<queue>.dlq` for every notification queue and routes
    /// permanently rejected messages into it.
    pub fn with_dead_letter(mut self, enabled: bool) -> Self {
        self.dead_letter = enabled;
        self
    }

    fn queue_definition(&self, name: &str) -> QueueDefinition {
        let def = QueueDefinition::new(name).durable();
        if self.dead_letter {
            def.with_dlq()
        } else {
            def
        }
    }
}

#[async_trait]
impl<D: Declarer> Topology for AmqpTopology<D> {
    async fn declare_topology(
        &self,
        exchange: &str,
        bindings: &[QueueBinding],
    ) -> Result<(), AmqpError> {
        validate_bindings(bindings)?;

        self.declarer
            .declare_exchange(&ExchangeDefinition::new(exchange).durable())
            .await?;
        info!(exchange = exchange, "exchange declared");

        for binding in bindings {
            let def = self.queue_definition(&binding.queue_name);

            if let Some(dlq_name) = def.dlq_name() {
                self.declarer
                    .declare_queue(&QueueDefinition::new(dlq_name).durable())
                    .await?;
            }

            self.declarer.declare_queue(&def).await?;

            for routing_key in &binding.routing_keys {
                self.declarer
                    .bind_queue(&binding.queue_name, exchange, routing_key)
                    .await?;
                info!(
                    queue = binding.queue_name,
                    exchange = exchange,
                    routing_key = routing_key,
                    "queue bound to exchange"
                );
            }
        }

        Ok(())
    }

    async fn declare_legacy_queue(
        &self,
        queue: &str,
        bindings: &[LegacyBinding],
    ) -> Result<(), AmqpError> {
        self.declarer
            .declare_queue(&QueueDefinition::new(queue).durable())
            .await?;

        for binding in bindings {
            if binding.exchange.is_empty() {
                continue;
            }

            self.declarer
                .declare_exchange(&ExchangeDefinition::new(&binding.exchange).durable())
                .await?;

            self.declarer
                .bind_queue(queue, &binding.exchange, &binding.routing_key)
                .await?;

            info!(
                queue = queue,
                exchange = binding.exchange,
                routing_key = binding.routing_key,
                "legacy queue bound to exchange"
            );
        }

        Ok(())
    }
}
