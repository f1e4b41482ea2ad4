// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Queue Definitions and Bindings
//!
//! This module describes the queues the bridge consumes from and how they are fed
//! by the topic exchange. A [`QueueBinding`] pairs a durable queue with the
//! ordered routing-key patterns that route into it; [`default_queue_bindings`]
//! is the fan-out policy used in production.

use crate::errors::AmqpError;
use std::collections::HashSet;

/// Suffix appended to a queue name to build its dead-letter queue name.
pub const DLQ_SUFFIX: &str = ".dlq";

/// Definition of a RabbitMQ queue with its configuration parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueDefinition {
    pub(crate) name: String,
    pub(crate) durable: bool,
    pub(crate) dlq_name: Option<String>,
}

impl QueueDefinition {
    /// Creates a new, non-durable queue definition with the given name.
    pub fn new(name: &str) -> QueueDefinition {
        QueueDefinition {
            name: name.to_owned(),
            ..Default::default()
        }
    }

    /// Makes the queue durable, persisting across broker restarts.
    pub fn durable(mut self) -> Self {
        self.durable = true;
        self
    }

    /// Adds a Dead Letter Queue (DLQ) to the queue.
    ///
    /// Messages rejected without requeue are routed through the default
    /// exchange into `<name>.dlq` instead of being dropped.
    pub fn with_dlq(mut self) -> Self {
        self.dlq_name = Some(format!("{}{}", self.name, DLQ_SUFFIX));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dlq_name(&self) -> Option<&str> {
        self.dlq_name.as_deref()
    }
}

/// A durable queue and the routing-key patterns binding it to the topic exchange.
///
/// Patterns use the broker's topic syntax: `*` matches exactly one
/// dot-separated token and `#` matches zero or more tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueBinding {
    pub queue_name: String,
    pub routing_keys: Vec<String>,
}

impl QueueBinding {
    pub fn new(queue: &str, routing_keys: &[&str]) -> QueueBinding {
        QueueBinding {
            queue_name: queue.to_owned(),
            routing_keys: routing_keys.iter().map(|k| (*k).to_owned()).collect(),
        }
    }

    /// Returns true if a message published with `routing_key` would land in this queue.
    pub fn matches(&self, routing_key: &str) -> bool {
        self.routing_keys
            .iter()
            .any(|pattern| topic_matches(pattern, routing_key))
    }
}

/// A binding of the legacy request queue to an exchange used by older publishers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyBinding {
    pub exchange: String,
    pub routing_key: String,
}

impl LegacyBinding {
    pub fn new(exchange: &str, routing_key: &str) -> LegacyBinding {
        LegacyBinding {
            exchange: exchange.to_owned(),
            routing_key: routing_key.to_owned(),
        }
    }
}

/// The notification queues and the routing keys feeding each of them.
pub fn default_queue_bindings() -> Vec<QueueBinding> {
    vec![
        QueueBinding::new("bot.contest.notifications", &["contest.#"]),
        QueueBinding::new("bot.team.notifications", &["game.team.#"]),
        QueueBinding::new(
            "bot.game.notifications",
            &[
                "game.scheduled",
                "game.activated",
                "game.match.*",
                "game.finished",
            ],
        ),
        QueueBinding::new("bot.contest.teams.ready", &["game.contest.teams.ready"]),
    ]
}

/// Checks the topology invariants: unique queue names and well-formed patterns.
pub fn validate_bindings(bindings: &[QueueBinding]) -> Result<(), AmqpError> {
    let mut seen = HashSet::new();

    for binding in bindings {
        if binding.queue_name.is_empty() {
            return Err(AmqpError::InvalidBinding("empty queue name".to_owned()));
        }

        if !seen.insert(binding.queue_name.as_str()) {
            return Err(AmqpError::InvalidBinding(format!(
                "queue `{}` is declared more than once",
                binding.queue_name
            )));
        }

        for pattern in &binding.routing_keys {
            validate_pattern(pattern)?;
        }
    }

    Ok(())
}

fn validate_pattern(pattern: &str) -> Result<(), AmqpError> {
    if pattern.is_empty() {
        return Err(AmqpError::InvalidBinding("empty routing key".to_owned()));
    }

    for token in pattern.split('.') {
        let wildcard_inside = token.len() > 1 && (token.contains('*') || token.contains('#'));
        if token.is_empty() || wildcard_inside {
            return Err(AmqpError::InvalidBinding(format!(
                "malformed routing key pattern `{}`",
                pattern
            )));
        }
    }

    Ok(())
}

/// Topic-exchange matching of a routing key against a binding pattern.
pub fn topic_matches(pattern: &str, routing_key: &str) -> bool {
    let pattern: Vec<&str> = pattern.split('.').collect();
    let key: Vec<&str> = if routing_key.is_empty() {
        vec![]
    } else {
        routing_key.split('.').collect()
    };

    match_tokens(&pattern, &key)
}

fn match_tokens(pattern: &[&str], key: &[&str]) -> bool {
    match pattern.split_first() {
        None => key.is_empty(),
        Some((&"#", rest)) => (0..=key.len()).any(|skip| match_tokens(rest, &key[skip..])),
        Some((&"*", rest)) => !key.is_empty() && match_tokens(rest, &key[1..]),
        Some((token, rest)) => key.first() == Some(token) && match_tokens(rest, &key[1..]),
    }
}
