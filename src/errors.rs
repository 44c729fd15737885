// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Error Types for the Messaging Client
//!
//! This module provides the closed set of error kinds for messaging operations.
//! The `MessagingError` enum covers configuration and vendor selection problems,
//! connection and channel failures, consumer registration conflicts, publish
//! failures, and handler-level outcomes.

use thiserror::Error;

/// Represents errors that can occur during messaging operations.
///
/// Infrastructure-level failures (connect, channel, publish) propagate to the
/// caller through these variants; message-content failures (non-JSON payloads,
/// foreign tags) are absorbed by the consumer and never surface here.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum MessagingError {
    /// A required configuration key is missing or invalid
    #[error("invalid messaging configuration: {0}")]
    ConfigError(String),

    /// The configured vendor has no compiled-in adapter
    #[error("no adapter available for messaging vendor `{0}`")]
    UnsupportedVendor(String),

    /// Error establishing or validating a connection to the broker
    #[error("failure to connect to the broker: {0}")]
    ConnectFailed(String),

    /// Error creating a channel on an established connection
    #[error("failure to create a channel: {0}")]
    ChannelFailed(String),

    /// Error declaring, binding or subscribing a consumer queue
    #[error("failure to set up consumer `{0}`: {1}")]
    ConsumerFailed(String, String),

    /// A processor with the same name is already registered
    #[error("processor `{0}` is already registered")]
    AlreadyRegistered(String),

    /// Error serializing or publishing an outbound message
    #[error("failure to send message: {0}")]
    SendFailed(String),

    /// Error acknowledging or rejecting a delivery
    #[error("failure to settle delivery: {0}")]
    AckFailed(String),

    /// A message handler returned an error
    #[error("handler failure: {0}")]
    HandlerError(String),

    /// A message handler panicked while processing a delivery
    #[error("handler panicked: {0}")]
    HandlerPanicked(String),
}
