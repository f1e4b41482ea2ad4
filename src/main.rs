// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

use gamers_bot::{
    chat::ChatClient,
    configs::Configs,
    dedup::DedupCache,
    discord::DiscordRestClient,
    shutdown::{wait_for_os_signal, ShutdownSignal},
    supervisor::{AmqpConnector, Supervisor},
};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let cfg = Configs::from_env().map_err(|err| {
        error!(error = err.to_string(), "failure to load configuration");
        err
    })?;

    info!(app = %cfg.app.name, version = env!("CARGO_PKG_VERSION"), "starting");

    let discord = Arc::new(DiscordRestClient::new(&cfg.discord));
    let chat: Arc<dyn ChatClient> = discord.clone();
    let shutdown = ShutdownSignal::new();

    let bridge = match cfg.rabbitmq {
        Some(rabbitmq) => {
            let dedup = DedupCache::start(rabbitmq.dedup_ttl);
            let backoff = rabbitmq.reconnect_backoff;
            let connector = AmqpConnector::new(rabbitmq, &cfg.app.name, chat.clone(), dedup);
            let mut supervisor = Supervisor::new(connector, chat, backoff);

            let signal = shutdown.clone();
            Some(tokio::spawn(async move { supervisor.run(&signal).await }))
        }
        None => {
            warn!("RABBITMQ_URL and RABBITMQ_HOST are unset, running without the event bridge");
            None
        }
    };

    wait_for_os_signal().await;
    info!("shutdown requested");
    shutdown.trigger();

    if let Some(bridge) = bridge {
        match tokio::time::timeout(cfg.app.shutdown_grace, bridge).await {
            Ok(Ok(())) => info!("event bridge stopped"),
            Ok(Err(err)) => error!(error = err.to_string(), "event bridge task failed"),
            Err(_) => warn!(grace = ?cfg.app.shutdown_grace, "event bridge did not stop in time"),
        }
    }

    info!(broker_connected = discord.broker_connected(), "shutdown complete");
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
