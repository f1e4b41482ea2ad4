// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Process Configuration
//!
//! Configuration is read from the environment, after loading `env/.env` and
//! `.env` when present. [`Configs::from_lookup`] takes any key lookup so tests
//! don't touch the process environment.

use crate::{dedup::DEFAULT_DEDUP_TTL, errors::ConfigError, queue::LegacyBinding};
use std::{str::FromStr, time::Duration};
use tracing::debug;

pub const DEFAULT_APP_NAME: &str = "gamers-bot";
pub const DEFAULT_DISCORD_API_BASE: &str = "https://discord.com/api/v10";
pub const DEFAULT_EXCHANGE: &str = "gamers.events";
pub const DEFAULT_REQUEST_QUEUE: &str = "discord.commands";
pub const DEFAULT_RESPONSE_QUEUE: &str = "discord.responses";
pub const DEFAULT_RECONNECT_BACKOFF: Duration = Duration::from_secs(10);
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(2);
pub const DEFAULT_MAX_HANDLER_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfigs {
    pub name: String,
    pub shutdown_grace: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscordConfigs {
    pub token: String,
    pub api_base: String,
    pub status_channel_id: Option<String>,
}

/// Broker connection and bridge settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RabbitMQConfigs {
    /// Full AMQP URI; takes precedence over the discrete parts below.
    pub url: Option<String>,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub vhost: String,
    pub exchange: String,
    pub request_queue: String,
    pub response_queue: String,
    pub legacy_bindings: Vec<LegacyBinding>,
    pub prefetch_count: u16,
    pub reconnect_backoff: Duration,
    pub dedup_ttl: Duration,
    /// Deliveries of one notification event before it is rejected for good. 0 disables the cap.
    pub max_handler_attempts: u32,
    pub legacy_retry: bool,
    pub dead_letter: bool,
}

impl Default for RabbitMQConfigs {
    fn default() -> Self {
        RabbitMQConfigs {
            url: None,
            host: String::new(),
            port: 5672,
            user: "guest".to_owned(),
            password: "guest".to_owned(),
            vhost: "/".to_owned(),
            exchange: DEFAULT_EXCHANGE.to_owned(),
            request_queue: DEFAULT_REQUEST_QUEUE.to_owned(),
            response_queue: DEFAULT_RESPONSE_QUEUE.to_owned(),
            legacy_bindings: vec![],
            prefetch_count: 1,
            reconnect_backoff: DEFAULT_RECONNECT_BACKOFF,
            dedup_ttl: DEFAULT_DEDUP_TTL,
            max_handler_attempts: DEFAULT_MAX_HANDLER_ATTEMPTS,
            legacy_retry: false,
            dead_letter: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Configs {
    pub app: AppConfigs,
    pub discord: DiscordConfigs,
    /// `None` when no broker is configured; the bot then runs without the bridge.
    pub rabbitmq: Option<RabbitMQConfigs>,
}

impl Configs {
    pub fn from_env() -> Result<Configs, ConfigError> {
        if dotenvy::from_filename("env/.env").is_ok() {
            debug!("loaded env/.env");
        }
        if dotenvy::dotenv().is_ok() {
            debug!("loaded .env");
        }

        Configs::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Configs, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let app = AppConfigs {
            name: get("APP_NAME").unwrap_or_else(|| DEFAULT_APP_NAME.to_owned()),
            shutdown_grace: Duration::from_secs(parse_or(
                &get,
                "SHUTDOWN_GRACE_SECS",
                DEFAULT_SHUTDOWN_GRACE.as_secs(),
            )?),
        };

        let discord = DiscordConfigs {
            token: get("DISCORD_TOKEN").ok_or(ConfigError::Missing("DISCORD_TOKEN"))?,
            api_base: get("DISCORD_API_BASE")
                .unwrap_or_else(|| DEFAULT_DISCORD_API_BASE.to_owned())
                .trim_end_matches('/')
                .to_owned(),
            status_channel_id: get("DISCORD_STATUS_CHANNEL_ID"),
        };

        let url = get("RABBITMQ_URL");
        let host = get("RABBITMQ_HOST");
        let rabbitmq = if url.is_none() && host.is_none() {
            None
        } else {
            Some(rabbitmq_configs(&get, url, host)?)
        };

        Ok(Configs {
            app,
            discord,
            rabbitmq,
        })
    }
}

fn rabbitmq_configs<F>(
    get: &F,
    url: Option<String>,
    host: Option<String>,
) -> Result<RabbitMQConfigs, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let defaults = RabbitMQConfigs::default();

    let prefetch_count: u16 = parse_or(get, "RABBITMQ_PREFETCH_COUNT", defaults.prefetch_count)?;
    if prefetch_count == 0 {
        return Err(ConfigError::Invalid {
            key: "RABBITMQ_PREFETCH_COUNT",
            value: "0".to_owned(),
            reason: "must be at least 1".to_owned(),
        });
    }

    let legacy_bindings = match get("RABBITMQ_LEGACY_BINDINGS") {
        Some(raw) => parse_legacy_bindings(&raw)?,
        None => vec![],
    };

    Ok(RabbitMQConfigs {
        url,
        host: host.unwrap_or_default(),
        port: parse_or(get, "RABBITMQ_PORT", defaults.port)?,
        user: get("RABBITMQ_USER").unwrap_or(defaults.user),
        password: get("RABBITMQ_PASSWORD").unwrap_or(defaults.password),
        vhost: get("RABBITMQ_VHOST").unwrap_or(defaults.vhost),
        exchange: get("RABBITMQ_EXCHANGE").unwrap_or(defaults.exchange),
        request_queue: get("RABBITMQ_REQUEST_QUEUE").unwrap_or(defaults.request_queue),
        response_queue: get("RABBITMQ_RESPONSE_QUEUE").unwrap_or(defaults.response_queue),
        legacy_bindings,
        prefetch_count,
        reconnect_backoff: Duration::from_secs(parse_or(
            get,
            "RABBITMQ_RECONNECT_BACKOFF_SECS",
            defaults.reconnect_backoff.as_secs(),
        )?),
        dedup_ttl: Duration::from_secs(parse_or(
            get,
            "RABBITMQ_DEDUP_TTL_SECS",
            defaults.dedup_ttl.as_secs(),
        )?),
        max_handler_attempts: parse_or(
            get,
            "RABBITMQ_MAX_HANDLER_ATTEMPTS",
            defaults.max_handler_attempts,
        )?,
        legacy_retry: parse_flag(get, "RABBITMQ_LEGACY_RETRY")?,
        dead_letter: parse_flag(get, "RABBITMQ_DEAD_LETTER")?,
    })
}

fn parse_or<F, T>(get: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get(key) {
        Some(value) => value.trim().parse().map_err(|err: T::Err| ConfigError::Invalid {
            key,
            value,
            reason: err.to_string(),
        }),
        None => Ok(default),
    }
}

fn parse_flag<F>(get: &F, key: &'static str) -> Result<bool, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(false),
        Some(value) => match value.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::Invalid {
                key,
                value,
                reason: "expected a boolean".to_owned(),
            }),
        },
    }
}

/// Parses `exchange:routing_key` pairs separated by commas.
pub fn parse_legacy_bindings(raw: &str) -> Result<Vec<LegacyBinding>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| match entry.split_once(':') {
            Some((exchange, key)) if !key.trim().is_empty() => {
                Ok(LegacyBinding::new(exchange.trim(), key.trim()))
            }
            _ => Err(ConfigError::Invalid {
                key: "RABBITMQ_LEGACY_BINDINGS",
                value: entry.to_owned(),
                reason: "expected exchange:routing_key".to_owned(),
            }),
        })
        .collect()
}
