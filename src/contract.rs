// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Messaging Contract
//!
//! This module defines the vendor-agnostic contract consumed by application
//! code. `MessagingConnection` is the facade over a broker connection;
//! `MessageHandler` is the callback seam for registered processors.
//!
//! Handlers are dispatched on the client's worker pool, concurrently with the
//! threads that registered them. A handler must be safe to invoke
//! concurrently and must not assume any ordering across distinct consumers.

use crate::errors::MessagingError;
use crate::message::ReceivedMessage;
use crate::vendor::MessagingVendor;
use async_trait::async_trait;
use std::sync::Arc;

/// Processes messages delivered to a registered processor.
///
/// The handler settles each message through [`ReceivedMessage::ack`] or
/// [`ReceivedMessage::reject`]; a message left unsettled when the handler
/// returns is rejected on its behalf, and a handler error or panic rejects
/// the message without requeueing it.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: &ReceivedMessage) -> Result<(), MessagingError>;
}

/// The public contract of a messaging connection.
///
/// Implementations own the physical broker link, keep registered processors
/// alive across reconnections, and wrap every payload in the application
/// envelope.
#[async_trait]
pub trait MessagingConnection: Send + Sync {
    /// The vendor backing this connection.
    fn vendor(&self) -> MessagingVendor;

    /// (Re)establishes the physical connection and replays all registered
    /// processors. Single-flight: concurrent callers are serialized.
    async fn init_connection(&self) -> Result<(), MessagingError>;

    /// Whether the connection exists, reports itself open, and can service a
    /// new channel.
    async fn connection_ready(&self) -> bool;

    /// Clears all registrations and closes the connection. Never fails.
    async fn close(&self);

    /// Publishes a fire-and-forget message to the target routing key.
    async fn send_message(&self, target_routing_key: &str, message: &str)
        -> Result<(), MessagingError>;

    /// Publishes a message carrying a callback routing key the receiver can
    /// reply to.
    async fn send_message_with_callback(
        &self,
        target_routing_key: &str,
        callback_routing_key: &str,
        message: &str,
    ) -> Result<(), MessagingError>;

    /// Registers a named processor bound to a routing-key pattern.
    ///
    /// The registration persists until explicitly unregistered and is
    /// replayed after every reconnection. Fails with
    /// [`MessagingError::AlreadyRegistered`] when the name is taken.
    async fn register_message_processor(
        &self,
        processor_name: &str,
        routing_key: &str,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<(), MessagingError>;

    /// Registers a processor under a generated name, which is returned.
    async fn register_anonymous_processor(
        &self,
        routing_key: &str,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<String, MessagingError>;

    /// Removes a processor and stops its consumer. Tolerant of the processor
    /// already being gone.
    async fn unregister_message_processor(&self, processor_name: &str);
}
