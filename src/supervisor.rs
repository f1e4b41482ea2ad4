// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Connection Supervisor
//!
//! Owns the broker connection lifecycle:
//!
//! ```text
//! Disconnected -> Connecting -> Running -> Disconnected -> ...
//!                                    \-> ShutDown (on cancellation only)
//! ```
//!
//! The [`Connector`] builds a connected [`Session`] (topology, publisher,
//! registry and consumers); the [`Supervisor`] runs it until it fails, tears
//! it down, reports the outage and tries again after a fixed backoff. It
//! never gives up on its own.

use crate::{
    channel,
    chat::ChatClient,
    configs::RabbitMQConfigs,
    consumer::{
        self,
        legacy::{HandlerErrorPolicy, LegacyConsumer},
        notification::NotificationConsumer,
        DeliveryProcessor,
    },
    dedup::DedupCache,
    errors::AmqpError,
    handlers,
    publisher::RabbitMQPublisher,
    queue::default_queue_bindings,
    registry::HandlerRegistry,
    shutdown::ShutdownSignal,
    topology::{AmqpTopology, Topology},
};
use async_trait::async_trait;
use lapin::{Channel, Connection};
use std::{fmt, sync::Arc, time::Duration};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Disconnected,
    Connecting,
    Running,
    ShutDown,
}

impl fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self {
            SupervisorState::Disconnected => "disconnected",
            SupervisorState::Connecting => "connecting",
            SupervisorState::Running => "running",
            SupervisorState::ShutDown => "shut_down",
        };
        f.write_str(state)
    }
}

/// A connected bridge: consumers ready to run over one broker connection.
#[async_trait]
pub trait Session: Send {
    /// Runs every consumer until one fails or `shutdown` fires.
    async fn run(&mut self, shutdown: &ShutdownSignal) -> Result<(), AmqpError>;

    /// Releases channels and the connection. Must be safe after a failed `run`.
    async fn close(&mut self);
}

/// Dials the broker and prepares a [`Session`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn Session>, AmqpError>;
}

pub struct Supervisor<C> {
    connector: C,
    chat: Arc<dyn ChatClient>,
    backoff: Duration,
    state: SupervisorState,
}

impl<C: Connector> Supervisor<C> {
    pub fn new(connector: C, chat: Arc<dyn ChatClient>, backoff: Duration) -> Supervisor<C> {
        Supervisor {
            connector,
            chat,
            backoff,
            state: SupervisorState::Disconnected,
        }
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    /// Connects, runs and reconnects until `shutdown` fires.
    pub async fn run(&mut self, shutdown: &ShutdownSignal) {
        while !shutdown.is_triggered() {
            self.transition(SupervisorState::Connecting);

            let connected = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                connected = self.connector.connect() => connected,
            };

            match connected {
                Ok(mut session) => {
                    self.transition(SupervisorState::Running);
                    self.chat.report_broker_status(true, None);

                    let result = session.run(shutdown).await;
                    session.close().await;

                    match result {
                        Ok(()) => self.chat.report_broker_status(false, None),
                        Err(err) => {
                            error!(error = err.to_string(), "broker session failed");
                            self.chat.report_broker_status(false, Some(err.to_string()));
                        }
                    }
                }
                Err(err) => {
                    error!(error = err.to_string(), "failure to establish broker session");
                    self.chat.report_broker_status(false, Some(err.to_string()));
                }
            }

            self.transition(SupervisorState::Disconnected);

            if !shutdown.sleep(self.backoff).await {
                break;
            }
            info!(backoff = ?self.backoff, "reconnecting to broker");
        }

        self.transition(SupervisorState::ShutDown);
    }

    fn transition(&mut self, next: SupervisorState) {
        debug!(from = %self.state, to = %next, "supervisor state");
        self.state = next;
    }
}

/// Production [`Connector`] over lapin.
pub struct AmqpConnector {
    cfg: RabbitMQConfigs,
    app_name: String,
    chat: Arc<dyn ChatClient>,
    dedup: Arc<DedupCache>,
}

impl AmqpConnector {
    pub fn new(
        cfg: RabbitMQConfigs,
        app_name: &str,
        chat: Arc<dyn ChatClient>,
        dedup: Arc<DedupCache>,
    ) -> AmqpConnector {
        AmqpConnector {
            cfg,
            app_name: app_name.to_owned(),
            chat,
            dedup,
        }
    }

    async fn declare_topology(&self, conn: &Connection) -> Result<(), AmqpError> {
        let channel = channel::open_channel(conn).await?;
        let topology = AmqpTopology::new(channel.clone()).with_dead_letter(self.cfg.dead_letter);

        let declared = async {
            topology
                .declare_topology(&self.cfg.exchange, &default_queue_bindings())
                .await?;
            topology
                .declare_legacy_queue(&self.cfg.request_queue, &self.cfg.legacy_bindings)
                .await
        }
        .await;

        close_channel(&channel).await;
        declared
    }

    async fn establish(&self, conn: &Connection) -> Result<AmqpSession, AmqpError> {
        self.declare_topology(conn).await?;

        let publisher = Arc::new(
            RabbitMQPublisher::new(channel::open_channel(conn).await?, &self.cfg.response_queue)
                .await?,
        );

        let mut registry = HandlerRegistry::new();
        handlers::register_all(&mut registry);
        let registry = Arc::new(registry);
        info!(handlers = registry.len(), "handlers registered");

        let mut processors: Vec<(String, Arc<dyn DeliveryProcessor>)> = default_queue_bindings()
            .into_iter()
            .map(|binding| {
                let consumer = NotificationConsumer::new(
                    &binding.queue_name,
                    registry.clone(),
                    self.chat.clone(),
                    self.dedup.clone(),
                )
                .with_max_attempts(self.cfg.max_handler_attempts);
                let processor: Arc<dyn DeliveryProcessor> = Arc::new(consumer);
                (binding.queue_name, processor)
            })
            .collect();

        let policy = if self.cfg.legacy_retry {
            HandlerErrorPolicy::RetryOnce
        } else {
            HandlerErrorPolicy::Reject
        };
        let legacy = LegacyConsumer::new(
            &self.cfg.request_queue,
            registry,
            self.chat.clone(),
            publisher.clone(),
        )
        .with_policy(policy);
        let legacy: Arc<dyn DeliveryProcessor> = Arc::new(legacy);
        processors.push((self.cfg.request_queue.clone(), legacy));

        Ok(AmqpSession {
            connection: None,
            publisher,
            processors,
            channels: vec![],
            prefetch_count: self.cfg.prefetch_count,
        })
    }
}

#[async_trait]
impl Connector for AmqpConnector {
    async fn connect(&self) -> Result<Box<dyn Session>, AmqpError> {
        let conn = channel::connect(&self.cfg, &self.app_name).await?;

        match self.establish(&conn).await {
            Ok(mut session) => {
                session.connection = Some(conn);
                Ok(Box::new(session))
            }
            Err(err) => {
                close_connection(&conn).await;
                Err(err)
            }
        }
    }
}

/// One connected bridge: a consumer task per queue, each on its own channel.
pub struct AmqpSession {
    connection: Option<Connection>,
    publisher: Arc<RabbitMQPublisher>,
    processors: Vec<(String, Arc<dyn DeliveryProcessor>)>,
    channels: Vec<Channel>,
    prefetch_count: u16,
}

impl AmqpSession {
    async fn spawn_consumers(
        &mut self,
        tasks: &mut JoinSet<Result<(), AmqpError>>,
        stop: &ShutdownSignal,
    ) -> Result<(), AmqpError> {
        let Some(conn) = self.connection.as_ref() else {
            return Err(AmqpError::ConnectionError("session already closed".to_owned()));
        };

        for (queue, processor) in &self.processors {
            let channel = channel::open_channel(conn).await?;
            self.channels.push(channel.clone());

            let queue = queue.clone();
            let processor = processor.clone();
            let stop = stop.clone();
            let prefetch_count = self.prefetch_count;

            tasks.spawn(async move {
                consumer::run(&channel, &queue, prefetch_count, processor.as_ref(), &stop).await
            });
        }

        Ok(())
    }
}

#[async_trait]
impl Session for AmqpSession {
    async fn run(&mut self, shutdown: &ShutdownSignal) -> Result<(), AmqpError> {
        let stop = ShutdownSignal::new();
        let mut tasks = JoinSet::new();

        let result = match self.spawn_consumers(&mut tasks, &stop).await {
            Err(err) => Err(err),
            Ok(()) => loop {
                tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => break Ok(()),
                    joined = tasks.join_next() => match joined {
                        None => break Ok(()),
                        Some(Ok(Ok(()))) => continue,
                        Some(Ok(Err(err))) => break Err(err),
                        Some(Err(err)) => {
                            break Err(AmqpError::ConsumerError(format!("consumer task aborted: {}", err)))
                        }
                    }
                }
            },
        };

        stop.trigger();
        while let Some(joined) = tasks.join_next().await {
            if let Ok(Err(err)) = joined {
                debug!(error = err.to_string(), "consumer stopped during teardown");
            }
        }

        result
    }

    async fn close(&mut self) {
        for channel in self.channels.drain(..) {
            close_channel(&channel).await;
        }
        self.publisher.close().await;

        if let Some(conn) = self.connection.take() {
            close_connection(&conn).await;
        }
    }
}

async fn close_channel(channel: &Channel) {
    if let Err(err) = channel.close(200, "OK").await {
        debug!(error = err.to_string(), "channel already closed");
    }
}

async fn close_connection(conn: &Connection) {
    if let Err(err) = conn.close(200, "OK").await {
        warn!(error = err.to_string(), "failure to close amqp connection");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::{ChatCall, RecordingChat};
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    };

    /// Session whose `run` returns a scripted outcome.
    struct FakeSession {
        outcome: Option<Result<(), AmqpError>>,
        closed: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Session for FakeSession {
        async fn run(&mut self, shutdown: &ShutdownSignal) -> Result<(), AmqpError> {
            match self.outcome.take() {
                Some(outcome) => outcome,
                None => {
                    shutdown.cancelled().await;
                    Ok(())
                }
            }
        }

        async fn close(&mut self) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn status_calls(chat: &RecordingChat) -> Vec<(bool, Option<String>)> {
        chat.calls()
            .into_iter()
            .filter_map(|call| match call {
                ChatCall::Status { connected, error } => Some((connected, error)),
                _ => None,
            })
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_dial_failures_with_backoff() {
        let chat = Arc::new(RecordingChat::new());
        let shutdown = ShutdownSignal::new();
        let attempts = Arc::new(AtomicUsize::new(0));

        let mut connector = MockConnector::new();
        let counted = attempts.clone();
        connector.expect_connect().returning(move || {
            counted.fetch_add(1, Ordering::SeqCst);
            Err(AmqpError::ConnectionError("refused".to_owned()))
        });

        let mut supervisor = Supervisor::new(connector, chat.clone(), Duration::from_secs(10));
        let stopper = shutdown.clone();
        let handle = tokio::spawn(async move {
            supervisor.run(&stopper).await;
            supervisor
        });

        tokio::time::sleep(Duration::from_secs(25)).await;
        shutdown.trigger();
        let supervisor = handle.await.unwrap();

        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert_eq!(supervisor.state(), SupervisorState::ShutDown);
        assert!(status_calls(&chat)
            .iter()
            .all(|(connected, error)| !connected && error.is_some()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_session_is_closed_and_replaced() {
        let chat = Arc::new(RecordingChat::new());
        let shutdown = ShutdownSignal::new();
        let closed = Arc::new(AtomicUsize::new(0));
        let outcomes = Arc::new(Mutex::new(vec![
            None,
            Some(Err(AmqpError::ConsumerError("channel closed".to_owned()))),
        ]));

        let mut connector = MockConnector::new();
        let sessions_closed = closed.clone();
        connector.expect_connect().returning(move || {
            let outcome = outcomes.lock().unwrap().pop().flatten();
            let session: Box<dyn Session> = Box::new(FakeSession {
                outcome,
                closed: sessions_closed.clone(),
            });
            Ok(session)
        });

        let mut supervisor = Supervisor::new(connector, chat.clone(), Duration::from_secs(10));
        let stopper = shutdown.clone();
        let handle = tokio::spawn(async move { supervisor.run(&stopper).await });

        tokio::time::sleep(Duration::from_secs(15)).await;
        shutdown.trigger();
        handle.await.unwrap();

        assert_eq!(closed.load(Ordering::SeqCst), 2);
        assert_eq!(
            status_calls(&chat),
            vec![
                (true, None),
                (false, Some("failure to consume message `channel closed`".to_owned())),
                (true, None),
                (false, None),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_during_backoff_exits_without_retry() {
        let chat = Arc::new(RecordingChat::new());
        let shutdown = ShutdownSignal::new();

        let mut connector = MockConnector::new();
        connector
            .expect_connect()
            .times(1)
            .returning(|| Err(AmqpError::ConnectionError("refused".to_owned())));

        let mut supervisor = Supervisor::new(connector, chat, Duration::from_secs(10));
        let stopper = shutdown.clone();
        let handle = tokio::spawn(async move { supervisor.run(&stopper).await });

        tokio::time::sleep(Duration::from_secs(1)).await;
        shutdown.trigger();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_already_cancelled_never_connects() {
        let shutdown = ShutdownSignal::new();
        shutdown.trigger();

        let mut connector = MockConnector::new();
        connector.expect_connect().never();

        let mut supervisor =
            Supervisor::new(connector, Arc::new(RecordingChat::new()), Duration::from_secs(10));
        supervisor.run(&shutdown).await;

        assert_eq!(supervisor.state(), SupervisorState::ShutDown);
    }
}
