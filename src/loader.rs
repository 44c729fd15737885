// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Messaging Loader
//!
//! Constructs the messaging connection selected by the `messaging.type`
//! configuration key and hands it out behind the vendor-agnostic contract.

use crate::config::{ConfigSource, KEY_VENDOR};
use crate::connection::RabbitMqConnection;
use crate::contract::MessagingConnection;
use crate::errors::MessagingError;
use crate::vendor::MessagingVendor;
use std::sync::Arc;
use tracing::debug;

/// Loads and validates the configured messaging connection.
///
/// The returned connection has been initialised and health-checked; a
/// connection that cannot report itself ready is an error, not a value.
///
/// # Parameters
/// * `config` - Configuration source supplying `messaging.type` and the
///   vendor's connection keys
///
/// # Returns
/// The ready connection behind the vendor-agnostic contract, or a
/// MessagingError on configuration, vendor or connection failure
pub async fn load(
    config: &dyn ConfigSource,
) -> Result<Arc<dyn MessagingConnection>, MessagingError> {
    let vendor_name = config
        .get_string(KEY_VENDOR)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| MessagingError::ConfigError(format!("`{KEY_VENDOR}` is not set")))?;

    let vendor = MessagingVendor::parse(&vendor_name)
        .ok_or_else(|| MessagingError::UnsupportedVendor(vendor_name.clone()))?;
    debug!(vendor = %vendor, "loading messaging adapter");

    let connection: Arc<dyn MessagingConnection> = match vendor {
        MessagingVendor::RabbitMq => RabbitMqConnection::connect(config).await?,
        // Declared as a vendor, but no adapter has shipped for it.
        MessagingVendor::Redis => {
            return Err(MessagingError::UnsupportedVendor(vendor.to_string()))
        }
    };

    if !connection.connection_ready().await {
        return Err(MessagingError::ConnectFailed(
            "messaging connection is not ready".to_owned(),
        ));
    }

    debug!(vendor = %vendor, "messaging loaded");
    Ok(connection)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MapConfig;

    #[tokio::test]
    async fn a_missing_vendor_key_is_a_config_error() {
        let err = load(&MapConfig::new()).await.err().unwrap();
        assert!(matches!(err, MessagingError::ConfigError(_)));
    }

    #[tokio::test]
    async fn an_unknown_vendor_is_unsupported() {
        let config = MapConfig::new().with(KEY_VENDOR, "kafka");
        let err = load(&config).await.err().unwrap();
        assert_eq!(err, MessagingError::UnsupportedVendor("kafka".to_owned()));
    }

    #[tokio::test]
    async fn redis_has_no_adapter() {
        let config = MapConfig::new().with(KEY_VENDOR, "redis");
        let err = load(&config).await.err().unwrap();
        assert_eq!(err, MessagingError::UnsupportedVendor("redis".to_owned()));
    }
}
