// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # AMQP Connection and Channel Management
//!
//! Dials the broker and opens channels on an established connection. Each
//! consumer loop gets its own channel, all multiplexed over one connection.

use crate::{configs::RabbitMQConfigs, errors::AmqpError};
use lapin::{types::LongString, Channel, Connection, ConnectionProperties};
use tracing::{debug, error};

/// Builds the AMQP URI, preferring an explicit URL over the discrete parts.
///
/// The default vhost `/` is percent-encoded as the URI path requires.
pub fn amqp_uri(cfg: &RabbitMQConfigs) -> String {
    if let Some(url) = &cfg.url {
        return url.clone();
    }

    let vhost = if cfg.vhost == "/" {
        "%2f".to_owned()
    } else {
        cfg.vhost.trim_start_matches('/').to_owned()
    };

    format!(
        "amqp://{}:{}@{}:{}/{}",
        cfg.user, cfg.password, cfg.host, cfg.port, vhost
    )
}

/// Opens a connection to the broker, named after the application.
pub async fn connect(cfg: &RabbitMQConfigs, app_name: &str) -> Result<Connection, AmqpError> {
    debug!("creating amqp connection...");
    let options =
        ConnectionProperties::default().with_connection_name(LongString::from(app_name.to_owned()));

    match Connection::connect(&amqp_uri(cfg), options).await {
        Ok(conn) => {
            debug!("amqp connected");
            Ok(conn)
        }
        Err(err) => {
            error!(error = err.to_string(), "failure to connect");
            Err(AmqpError::ConnectionError(err.to_string()))
        }
    }
}

/// Opens a new channel on `conn`.
pub async fn open_channel(conn: &Connection) -> Result<Channel, AmqpError> {
    debug!("creating amqp channel...");
    match conn.create_channel().await {
        Ok(channel) => {
            debug!("channel created");
            Ok(channel)
        }
        Err(err) => {
            error!(error = err.to_string(), "error to create the channel");
            Err(AmqpError::ChannelError(err.to_string()))
        }
    }
}
