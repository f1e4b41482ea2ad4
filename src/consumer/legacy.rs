// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Legacy Request/Response Consumer
//!
//! Correlated requests consumed from a single queue. Every request gets exactly
//! one [`ResponseMessage`] carrying its correlation id, except when the retry
//! policy requeues it, in which case the redelivery answers instead.

use super::{record_outcome, DeliveryProcessor, Disposition};
use crate::{
    chat::ChatClient,
    compat::PayloadShape,
    errors::HandlerError,
    messages::{self, RequestMessage, ResponseMessage},
    otel,
    publisher::ResponsePublisher,
    registry::HandlerRegistry,
};
use async_trait::async_trait;
use lapin::{message::Delivery, types::FieldTable};
use opentelemetry::{trace::TraceContextExt, Context};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// What to do with a request whose handler failed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HandlerErrorPolicy {
    /// Answer with an error and reject. Every handler error is final.
    #[default]
    Reject,
    /// Requeue once, without answering, when the error is transient and the
    /// request is on its first delivery.
    RetryOnce,
}

impl HandlerErrorPolicy {
    fn should_retry(self, err: &HandlerError, redelivered: bool) -> bool {
        match self {
            HandlerErrorPolicy::Reject => false,
            HandlerErrorPolicy::RetryOnce => err.is_transient() && !redelivered,
        }
    }
}

pub struct LegacyConsumer {
    queue: String,
    registry: Arc<HandlerRegistry>,
    chat: Arc<dyn ChatClient>,
    publisher: Arc<dyn ResponsePublisher>,
    policy: HandlerErrorPolicy,
}

impl LegacyConsumer {
    pub fn new(
        queue: &str,
        registry: Arc<HandlerRegistry>,
        chat: Arc<dyn ChatClient>,
        publisher: Arc<dyn ResponsePublisher>,
    ) -> LegacyConsumer {
        LegacyConsumer {
            queue: queue.to_owned(),
            registry,
            chat,
            publisher,
            policy: HandlerErrorPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: HandlerErrorPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Processes one request, publishes its response and decides how to settle it.
    pub async fn dispatch(
        &self,
        headers: Option<&FieldTable>,
        body: &[u8],
        redelivered: bool,
    ) -> Disposition {
        let request = match serde_json::from_slice::<RequestMessage>(body) {
            Ok(request) => request,
            Err(err) => {
                let (parent, span) = otel::new_span(headers, &self.queue);
                let cx = parent.with_span(span);
                error!(
                    error = err.to_string(),
                    queue = self.queue,
                    "failed to parse legacy request"
                );
                let correlation_id = messages::salvage_correlation_id(body);
                return self
                    .reject(&cx, &correlation_id, format!("invalid request message: {}", err))
                    .await;
            }
        };

        let (parent, span) = otel::new_span(headers, &request.event_type);
        let cx = parent.with_span(span);
        let correlation_id = request.correlation_id.as_str();

        let guild_id = request.guild_id();
        if guild_id.is_empty() {
            error!(
                correlation_id = correlation_id,
                event_type = request.event_type,
                "legacy request without guild id"
            );
            return self.reject(&cx, correlation_id, "guild_id is required").await;
        }

        let Some(handler) = self.registry.lookup(&request.event_type) else {
            error!(
                correlation_id = correlation_id,
                event_type = request.event_type,
                "unsupported event type in legacy queue"
            );
            let message = format!("unsupported event type: {}", request.event_type);
            return self.reject(&cx, correlation_id, message).await;
        };

        let payload = match PayloadShape::of(&request.event_type).payload(&request, body) {
            Ok(payload) => payload,
            Err(err) => {
                error!(
                    error = err.to_string(),
                    correlation_id = correlation_id,
                    "failed to build legacy payload"
                );
                return self.reject(&cx, correlation_id, err.to_string()).await;
            }
        };

        debug!(
            correlation_id = correlation_id,
            event_type = request.event_type,
            guild_id = guild_id,
            "dispatching legacy request"
        );

        match handler
            .handle(&cx, self.chat.as_ref(), guild_id, &payload)
            .await
        {
            Ok(data) => {
                self.respond(&cx, ResponseMessage::success(correlation_id, data))
                    .await;
                info!(
                    correlation_id = correlation_id,
                    "legacy event processed successfully"
                );
                record_outcome(&cx, Disposition::Ack, None);
                Disposition::Ack
            }
            Err(err) if self.policy.should_retry(&err, redelivered) => {
                warn!(
                    error = err.to_string(),
                    correlation_id = correlation_id,
                    "transient legacy handler failure, requeuing once"
                );
                cx.span().record_error(&err);
                record_outcome(&cx, Disposition::Requeue, Some("transient handler failure"));
                Disposition::Requeue
            }
            Err(err) => {
                error!(
                    error = err.to_string(),
                    correlation_id = correlation_id,
                    "legacy handler failed"
                );
                cx.span().record_error(&err);
                self.reject(&cx, correlation_id, err.to_string()).await
            }
        }
    }

    async fn reject(
        &self,
        cx: &Context,
        correlation_id: &str,
        error: impl Into<String>,
    ) -> Disposition {
        let error = error.into();
        self.respond(cx, ResponseMessage::failure(correlation_id, error.clone()))
            .await;
        record_outcome(cx, Disposition::Reject, Some(&error));
        Disposition::Reject
    }

    async fn respond(&self, cx: &Context, response: ResponseMessage) {
        if let Err(err) = self.publisher.publish(cx, &response).await {
            error!(
                error = err.to_string(),
                correlation_id = response.correlation_id,
                success = response.success,
                "failed to publish response"
            );
        }
    }
}

#[async_trait]
impl DeliveryProcessor for LegacyConsumer {
    async fn process(&self, delivery: &Delivery) -> Disposition {
        self.dispatch(
            delivery.properties.headers().as_ref(),
            &delivery.data,
            delivery.redelivered,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        errors::{AmqpError, ChatError},
        fakes::{payload, RecordingChat, ScriptedHandler},
        publisher::MockResponsePublisher,
        registry::Handler,
    };
    use serde_json::json;

    fn consumer(
        handler: Arc<ScriptedHandler>,
        publisher: MockResponsePublisher,
    ) -> LegacyConsumer {
        let mut registry = HandlerRegistry::new();
        registry.register("SEND_MESSAGE", handler.clone() as Arc<dyn Handler>);
        registry.register("team.invite.sent", handler as Arc<dyn Handler>);

        LegacyConsumer::new(
            "discord.commands",
            Arc::new(registry),
            Arc::new(RecordingChat::new()),
            Arc::new(publisher),
        )
    }

    fn expect_failure(publisher: &mut MockResponsePublisher, correlation_id: &'static str) {
        publisher
            .expect_publish()
            .withf(move |_, response| {
                response.correlation_id == correlation_id
                    && !response.success
                    && response.error.is_some()
            })
            .times(1)
            .returning(|_, _| Ok(()));
    }

    #[tokio::test]
    async fn test_unparseable_request_gets_uncorrelated_error() {
        let mut publisher = MockResponsePublisher::new();
        expect_failure(&mut publisher, "");
        let handler = Arc::new(ScriptedHandler::ok());
        let consumer = consumer(handler.clone(), publisher);

        assert_eq!(
            consumer.dispatch(None, b"not json", false).await,
            Disposition::Reject
        );
        assert!(handler.calls().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_field_keeps_correlation_id() {
        let mut publisher = MockResponsePublisher::new();
        expect_failure(&mut publisher, "c9");
        let consumer = consumer(Arc::new(ScriptedHandler::ok()), publisher);
        let body = json!({"correlation_id": "c9", "guild_id": "G1", "contest_id": "seven"});

        assert_eq!(
            consumer
                .dispatch(None, body.to_string().as_bytes(), false)
                .await,
            Disposition::Reject
        );
    }

    #[tokio::test]
    async fn test_null_legacy_guild_falls_back_to_discord_guild() {
        let mut publisher = MockResponsePublisher::new();
        publisher
            .expect_publish()
            .withf(|_, response| response.correlation_id == "abc" && response.success)
            .times(1)
            .returning(|_, _| Ok(()));
        let handler = Arc::new(ScriptedHandler::ok());
        let consumer = consumer(handler.clone(), publisher);
        let body = json!({
            "correlation_id": "abc",
            "guild_id": null,
            "discord_guild_id": "G1",
            "event_type": "SEND_MESSAGE",
            "payload": {"channel_id": "C1", "content": "hi"}
        });

        assert_eq!(
            consumer
                .dispatch(None, body.to_string().as_bytes(), false)
                .await,
            Disposition::Ack
        );
        assert_eq!(handler.calls()[0].0, "G1");
    }

    #[tokio::test]
    async fn test_missing_guild_is_rejected() {
        let mut publisher = MockResponsePublisher::new();
        expect_failure(&mut publisher, "c1");
        let consumer = consumer(Arc::new(ScriptedHandler::ok()), publisher);
        let body = json!({"correlation_id": "c1", "event_type": "SEND_MESSAGE"});

        assert_eq!(
            consumer
                .dispatch(None, body.to_string().as_bytes(), false)
                .await,
            Disposition::Reject
        );
    }

    #[tokio::test]
    async fn test_unsupported_event_type_is_rejected() {
        let mut publisher = MockResponsePublisher::new();
        publisher
            .expect_publish()
            .withf(|_, response| {
                response.correlation_id == "c2"
                    && response.error.as_deref() == Some("unsupported event type: KICK")
            })
            .times(1)
            .returning(|_, _| Ok(()));
        let consumer = consumer(Arc::new(ScriptedHandler::ok()), publisher);
        let body = json!({"correlation_id": "c2", "guild_id": "G1", "event_type": "KICK"});

        assert_eq!(
            consumer
                .dispatch(None, body.to_string().as_bytes(), false)
                .await,
            Disposition::Reject
        );
    }

    #[tokio::test]
    async fn test_success_publishes_data_and_acks() {
        let mut publisher = MockResponsePublisher::new();
        publisher
            .expect_publish()
            .withf(|_, response| {
                response.correlation_id == "abc"
                    && response.success
                    && response.data.as_ref().map(|d| d.contains_key("message_id")) == Some(true)
            })
            .times(1)
            .returning(|_, _| Ok(()));
        let handler = Arc::new(ScriptedHandler::returning(Ok(Some(payload(
            json!({"message_id": "m1"}),
        )))));
        let consumer = consumer(handler.clone(), publisher);
        let body = json!({
            "correlation_id": "abc",
            "discord_guild_id": "G1",
            "guild_id": "G2",
            "event_type": "SEND_MESSAGE",
            "payload": {"channel_id": "C1", "content": "hi"}
        });

        assert_eq!(
            consumer
                .dispatch(None, body.to_string().as_bytes(), false)
                .await,
            Disposition::Ack
        );

        let calls = handler.calls();
        assert_eq!(calls[0].0, "G1");
        assert_eq!(calls[0].1, payload(json!({"channel_id": "C1", "content": "hi"})));
    }

    #[tokio::test]
    async fn test_team_event_receives_full_body() {
        let mut publisher = MockResponsePublisher::new();
        publisher
            .expect_publish()
            .times(1)
            .returning(|_, _| Ok(()));
        let handler = Arc::new(ScriptedHandler::ok());
        let consumer = consumer(handler.clone(), publisher);
        let body = json!({
            "correlation_id": "t1",
            "guild_id": "G1",
            "event_type": "team.invite.sent",
            "team_name": "Blue"
        });

        consumer
            .dispatch(None, body.to_string().as_bytes(), false)
            .await;

        assert_eq!(handler.calls()[0].1["team_name"], json!("Blue"));
    }

    #[tokio::test]
    async fn test_handler_error_is_final_by_default() {
        let mut publisher = MockResponsePublisher::new();
        expect_failure(&mut publisher, "c3");
        let handler = Arc::new(ScriptedHandler::returning(Err(HandlerError::Chat(
            ChatError::RateLimited,
        ))));
        let consumer = consumer(handler, publisher);
        let body = json!({"correlation_id": "c3", "guild_id": "G1", "event_type": "SEND_MESSAGE"});

        assert_eq!(
            consumer
                .dispatch(None, body.to_string().as_bytes(), false)
                .await,
            Disposition::Reject
        );
    }

    #[tokio::test]
    async fn test_retry_once_requeues_transient_failure_silently() {
        let mut publisher = MockResponsePublisher::new();
        publisher.expect_publish().never();
        let handler = Arc::new(ScriptedHandler::returning(Err(HandlerError::Chat(
            ChatError::RateLimited,
        ))));
        let consumer = consumer(handler, publisher).with_policy(HandlerErrorPolicy::RetryOnce);
        let body = json!({"correlation_id": "c4", "guild_id": "G1", "event_type": "SEND_MESSAGE"});

        assert_eq!(
            consumer
                .dispatch(None, body.to_string().as_bytes(), false)
                .await,
            Disposition::Requeue
        );
    }

    #[tokio::test]
    async fn test_retry_once_answers_on_redelivery() {
        let mut publisher = MockResponsePublisher::new();
        expect_failure(&mut publisher, "c5");
        let handler = Arc::new(ScriptedHandler::returning(Err(HandlerError::Chat(
            ChatError::RateLimited,
        ))));
        let consumer = consumer(handler, publisher).with_policy(HandlerErrorPolicy::RetryOnce);
        let body = json!({"correlation_id": "c5", "guild_id": "G1", "event_type": "SEND_MESSAGE"});

        assert_eq!(
            consumer
                .dispatch(None, body.to_string().as_bytes(), true)
                .await,
            Disposition::Reject
        );
    }

    #[tokio::test]
    async fn test_publish_failure_does_not_change_disposition() {
        let mut publisher = MockResponsePublisher::new();
        publisher
            .expect_publish()
            .times(1)
            .returning(|_, _| Err(AmqpError::PublishingError("closed".to_owned())));
        let consumer = consumer(Arc::new(ScriptedHandler::ok()), publisher);
        let body = json!({"correlation_id": "c6", "guild_id": "G1", "event_type": "SEND_MESSAGE"});

        assert_eq!(
            consumer
                .dispatch(None, body.to_string().as_bytes(), false)
                .await,
            Disposition::Ack
        );
    }
}
