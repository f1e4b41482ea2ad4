// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Handler Registry
//!
//! Maps an event type to the handler processing it. The registry is filled
//! before any consumer starts and shared read-only behind an `Arc` afterwards.

use crate::{chat::ChatClient, errors::HandlerError, messages::Payload};
use async_trait::async_trait;
use opentelemetry::Context;
use std::{collections::HashMap, sync::Arc};

/// Processes one class of event.
///
/// Handlers hold no per-invocation state and are called concurrently from
/// several consumer loops.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Returns the data to put in the legacy response, if any.
    async fn handle(
        &self,
        ctx: &Context,
        chat: &dyn ChatClient,
        guild_id: &str,
        payload: &Payload,
    ) -> Result<Option<Payload>, HandlerError>;
}

#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn Handler>>,
}

impl HandlerRegistry {
    pub fn new() -> HandlerRegistry {
        HandlerRegistry::default()
    }

    /// Registers `handler` for `event_type`, returning the handler it replaced.
    pub fn register(
        &mut self,
        event_type: &str,
        handler: Arc<dyn Handler>,
    ) -> Option<Arc<dyn Handler>> {
        self.handlers.insert(event_type.to_owned(), handler)
    }

    pub fn lookup(&self, event_type: &str) -> Option<Arc<dyn Handler>> {
        self.handlers.get(event_type).cloned()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(&'static str);

    #[async_trait]
    impl Handler for Fixed {
        async fn handle(
            &self,
            _ctx: &Context,
            _chat: &dyn ChatClient,
            _guild_id: &str,
            _payload: &Payload,
        ) -> Result<Option<Payload>, HandlerError> {
            Err(HandlerError::InvalidPayload(self.0.to_owned()))
        }
    }

    #[test]
    fn test_register_last_write_wins() {
        let mut registry = HandlerRegistry::new();

        let second: Arc<dyn Handler> = Arc::new(Fixed("second"));

        assert!(registry.register("team.deleted", Arc::new(Fixed("first"))).is_none());
        assert!(registry.register("team.deleted", second.clone()).is_some());

        assert_eq!(registry.len(), 1);
        let found = registry.lookup("team.deleted").unwrap();
        assert!(Arc::ptr_eq(&found, &second));
        assert!(registry.lookup("team.created").is_none());
    }
}
