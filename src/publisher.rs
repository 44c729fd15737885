// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Message Publishing
//!
//! The send path publishes envelopes on a short-lived channel: open, publish
//! to the configured exchange with the target routing key, close. Channels
//! are cheap broker-side and a dedicated one per send keeps publish failures
//! from poisoning shared state.

use crate::errors::MessagingError;
use crate::otel;
use lapin::{
    options::BasicPublishOptions,
    types::{FieldTable, ShortString},
    BasicProperties, Connection,
};
use std::collections::BTreeMap;
use tracing::{debug, error};
use uuid::Uuid;

/// Content type stamped on every published envelope
pub(crate) const JSON_CONTENT_TYPE: &str = "application/json";

/// Publishes an encoded envelope to the exchange.
pub(crate) async fn publish(
    connection: &Connection,
    exchange: &str,
    routing_key: &str,
    payload: &[u8],
) -> Result<(), MessagingError> {
    let channel = connection
        .create_channel()
        .await
        .map_err(|err| MessagingError::ChannelFailed(err.to_string()))?;

    let mut headers = BTreeMap::default();
    otel::inject_context(&mut headers);

    let published = match channel
        .basic_publish(
            exchange,
            routing_key,
            BasicPublishOptions {
                immediate: false,
                mandatory: false,
            },
            payload,
            BasicProperties::default()
                .with_content_type(ShortString::from(JSON_CONTENT_TYPE))
                .with_message_id(ShortString::from(Uuid::new_v4().to_string()))
                .with_headers(FieldTable::from(headers)),
        )
        .await
    {
        Err(err) => {
            error!(error = err.to_string(), routing_key, "error publishing message");
            Err(MessagingError::SendFailed(err.to_string()))
        }
        _ => Ok(()),
    };

    // The channel is per-send; close it whatever the publish outcome was.
    if let Err(err) = channel.close(0, "publish complete").await {
        debug!(error = err.to_string(), "error closing publish channel");
    }

    published
}
