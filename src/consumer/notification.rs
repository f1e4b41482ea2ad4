// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Notification Consumer
//!
//! Fire-and-forget events. Structurally broken messages are rejected for good,
//! duplicates are acknowledged without side effects and handler failures are
//! requeued until the per-event attempt cap is reached.

use super::{record_outcome, DeliveryProcessor, Disposition};
use crate::{
    chat::ChatClient,
    dedup::DedupCache,
    messages::{extract_event_id, extract_guild_id, resolve_event_type, Payload},
    otel,
    registry::HandlerRegistry,
};
use async_trait::async_trait;
use lapin::{message::Delivery, types::FieldTable};
use opentelemetry::{trace::TraceContextExt, Context};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Consumer for one notification queue.
pub struct NotificationConsumer {
    queue: String,
    registry: Arc<HandlerRegistry>,
    chat: Arc<dyn ChatClient>,
    dedup: Arc<DedupCache>,
    max_attempts: u32,
    attempts: Mutex<HashMap<String, Attempts>>,
}

/// Failed deliveries of one event and when the last one happened.
#[derive(Debug, Clone, Copy)]
struct Attempts {
    count: u32,
    last: Instant,
}

impl NotificationConsumer {
    pub fn new(
        queue: &str,
        registry: Arc<HandlerRegistry>,
        chat: Arc<dyn ChatClient>,
        dedup: Arc<DedupCache>,
    ) -> NotificationConsumer {
        NotificationConsumer {
            queue: queue.to_owned(),
            registry,
            chat,
            dedup,
            max_attempts: 0,
            attempts: Mutex::new(HashMap::new()),
        }
    }

    /// Caps the deliveries of a failing event. 0 means unlimited.
    ///
    /// Only events carrying an `event_id` can be counted; the others are
    /// requeued without limit. Counts idle for longer than the dedup TTL are
    /// forgotten.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Processes one notification and decides how to settle it.
    pub async fn dispatch(&self, headers: Option<&FieldTable>, body: &[u8]) -> Disposition {
        let event_type = resolve_event_type(headers, body);
        let span_name = event_type.as_deref().unwrap_or(self.queue.as_str());
        let (parent, span) = otel::new_span(headers, span_name);
        let cx = parent.with_span(span);

        let Some(event_type) = event_type else {
            error!(queue = self.queue, "removing message from queue - reason: missing event type");
            return self.finish(&cx, Disposition::Reject, Some("missing event type"));
        };

        let payload = match serde_json::from_slice::<Payload>(body) {
            Ok(payload) => payload,
            Err(err) => {
                error!(
                    error = err.to_string(),
                    queue = self.queue,
                    event_type = event_type,
                    "removing message from queue - reason: invalid json"
                );
                return self.finish(&cx, Disposition::Reject, Some("invalid json payload"));
            }
        };

        let event_id = extract_event_id(&payload).unwrap_or_default();
        if self.dedup.is_duplicate(&event_id) {
            info!(
                queue = self.queue,
                event_type = event_type,
                event_id = event_id,
                "duplicate event skipped"
            );
            return self.finish(&cx, Disposition::Ack, None);
        }

        let Some(handler) = self.registry.lookup(&event_type) else {
            error!(
                queue = self.queue,
                event_type = event_type,
                "removing message from queue - reason: unsupported event type"
            );
            return self.finish(&cx, Disposition::Reject, Some("unsupported event type"));
        };

        let guild_id = extract_guild_id(&payload).unwrap_or_else(|| {
            warn!(event_type = event_type, "event carries no guild id");
            String::new()
        });

        debug!(
            queue = self.queue,
            event_type = event_type,
            event_id = event_id,
            "dispatching event"
        );

        match handler
            .handle(&cx, self.chat.as_ref(), &guild_id, &payload)
            .await
        {
            Ok(_) => {
                self.clear_attempts(&event_id);
                debug!(event_type = event_type, "message successfully processed");
                self.finish(&cx, Disposition::Ack, None)
            }
            Err(err) => {
                cx.span().record_error(&err);
                self.dedup.forget(&event_id);

                let attempts = self.record_attempt(&event_id);
                if attempts > 0 && attempts >= self.max_attempts {
                    self.clear_attempts(&event_id);
                    error!(
                        error = err.to_string(),
                        event_type = event_type,
                        event_id = event_id,
                        attempts = attempts,
                        "too many attempts, rejecting event"
                    );
                    return self.finish(&cx, Disposition::Reject, Some("too many attempts"));
                }

                warn!(
                    error = err.to_string(),
                    event_type = event_type,
                    event_id = event_id,
                    attempts = attempts,
                    "error whiling handling msg, requeuing for latter"
                );
                self.finish(&cx, Disposition::Requeue, Some("handler failure"))
            }
        }
    }

    fn finish(&self, cx: &Context, disposition: Disposition, reason: Option<&str>) -> Disposition {
        record_outcome(cx, disposition, reason);
        disposition
    }

    fn record_attempt(&self, event_id: &str) -> u32 {
        if self.max_attempts == 0 || event_id.is_empty() {
            return 0;
        }
        let now = Instant::now();
        let window = self.dedup.ttl();
        let mut attempts = self.attempts.lock().unwrap_or_else(PoisonError::into_inner);
        attempts.retain(|_, entry| now.duration_since(entry.last) < window);

        let entry = attempts.entry(event_id.to_owned()).or_insert(Attempts {
            count: 0,
            last: now,
        });
        entry.count += 1;
        entry.last = now;
        entry.count
    }

    /// Events with failed deliveries still being counted.
    pub fn tracked_attempts(&self) -> usize {
        self.attempts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn clear_attempts(&self, event_id: &str) {
        if event_id.is_empty() {
            return;
        }
        self.attempts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(event_id);
    }
}

#[async_trait]
impl DeliveryProcessor for NotificationConsumer {
    async fn process(&self, delivery: &Delivery) -> Disposition {
        self.dispatch(delivery.properties.headers().as_ref(), &delivery.data)
            .await
    }
}
