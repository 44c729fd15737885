// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Received Message Handle
//!
//! Wraps one delivery handed to a message handler. The handle exposes the
//! routing metadata and the payload, and settles the delivery with the broker
//! exactly once: whichever of `ack` or `reject` runs first wins, every later
//! call is a no-op. Deliveries a handler leaves unsettled are rejected by the
//! consumer after the handler returns.

use crate::errors::MessagingError;
use async_trait::async_trait;
use lapin::acker::Acker;
use lapin::options::{BasicAckOptions, BasicNackOptions};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Broker-side settlement of a single delivery.
///
/// Seam between the handle and the transport; the production implementation
/// wraps the lapin acker, tests substitute a mock.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub(crate) trait Acknowledger: Send + Sync {
    /// Positively acknowledges the delivery.
    async fn ack(&self) -> Result<(), MessagingError>;

    /// Negatively acknowledges the delivery without requeueing it.
    async fn reject(&self) -> Result<(), MessagingError>;
}

/// `Acknowledger` backed by a lapin delivery acker.
pub(crate) struct DeliveryAcker {
    acker: Acker,
}

impl DeliveryAcker {
    pub(crate) fn new(acker: Acker) -> DeliveryAcker {
        DeliveryAcker { acker }
    }
}

#[async_trait]
impl Acknowledger for DeliveryAcker {
    async fn ack(&self) -> Result<(), MessagingError> {
        self.acker
            .ack(BasicAckOptions { multiple: false })
            .await
            .map_err(|err| MessagingError::AckFailed(err.to_string()))
    }

    async fn reject(&self) -> Result<(), MessagingError> {
        self.acker
            .nack(BasicNackOptions {
                multiple: false,
                requeue: false,
            })
            .await
            .map_err(|err| MessagingError::AckFailed(err.to_string()))
    }
}

/// A message delivered to a registered processor.
pub struct ReceivedMessage {
    acker: Arc<dyn Acknowledger>,
    routing_key: String,
    callback_routing_key: Option<String>,
    body: String,
    acknowledged: AtomicBool,
}

impl ReceivedMessage {
    pub(crate) fn new(
        acker: Arc<dyn Acknowledger>,
        routing_key: String,
        callback_routing_key: Option<String>,
        body: String,
    ) -> ReceivedMessage {
        ReceivedMessage {
            acker,
            routing_key,
            callback_routing_key,
            body,
            acknowledged: AtomicBool::new(false),
        }
    }

    /// The routing key the message was published with.
    pub fn routing_key(&self) -> &str {
        &self.routing_key
    }

    /// The routing key to reply to, when the sender requested a callback.
    pub fn callback_routing_key(&self) -> Option<&str> {
        self.callback_routing_key.as_deref()
    }

    /// The message payload.
    pub fn message(&self) -> &str {
        &self.body
    }

    /// Whether the message has already been acknowledged or rejected.
    pub fn is_acknowledged(&self) -> bool {
        self.acknowledged.load(Ordering::Acquire)
    }

    /// Acknowledges the message. No-op if already settled.
    ///
    /// A transport failure releases the claim so the fallback rejection can
    /// still settle the delivery.
    pub async fn ack(&self) -> Result<(), MessagingError> {
        if !self.claim() {
            return Ok(());
        }
        match self.acker.ack().await {
            Ok(()) => Ok(()),
            Err(err) => {
                self.release();
                Err(err)
            }
        }
    }

    /// Rejects the message without requeueing it. No-op if already settled.
    pub async fn reject(&self) -> Result<(), MessagingError> {
        if !self.claim() {
            return Ok(());
        }
        match self.acker.reject().await {
            Ok(()) => Ok(()),
            Err(err) => {
                self.release();
                Err(err)
            }
        }
    }

    fn claim(&self) -> bool {
        self.acknowledged
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn release(&self) {
        self.acknowledged.store(false, Ordering::Release);
    }
}
