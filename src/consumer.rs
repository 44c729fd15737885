// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Message Consumption
//!
//! Materializes registered processors as broker-level consumers and processes
//! their deliveries. Every consumer owns a dedicated channel, so a slow or
//! failing handler never stalls another processor's delivery stream.
//!
//! Foreign traffic on the shared exchange (payloads that are not the
//! application envelope, or that carry a different tag) is acknowledged and
//! dropped without reaching any handler: on a shared exchange such messages
//! are expected, not errors.

use crate::contract::MessageHandler;
use crate::envelope::Envelope;
use crate::errors::MessagingError;
use crate::exchange::ExchangeSettings;
use crate::message::{Acknowledger, DeliveryAcker, ReceivedMessage};
use crate::otel;
use crate::registry::{ActiveConsumer, ProcessorRegistry};
use futures_util::{FutureExt, StreamExt};
use lapin::{
    options::{
        BasicConsumeOptions, ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
    },
    protocol::basic::AMQPProperties,
    types::FieldTable,
    Connection,
};
use opentelemetry::{
    global::{self, BoxedTracer},
    trace::{Span, Status},
};
use std::any::Any;
use std::borrow::Cow;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Declares and binds the processor's queue, starts the broker subscription,
/// and spawns its delivery loop.
///
/// The queue is exclusive to this connection and auto-deleted with it; it is
/// derived state, rebuilt by replay after every reconnection.
pub(crate) async fn spawn_consumer(
    connection: &Connection,
    exchange: &ExchangeSettings,
    registry: Arc<ProcessorRegistry>,
    processor_name: &str,
    routing_key: &str,
    handler: Arc<dyn MessageHandler>,
) -> Result<(), MessagingError> {
    let channel = connection
        .create_channel()
        .await
        .map_err(|err| MessagingError::ChannelFailed(err.to_string()))?;

    let setup_error = |err: lapin::Error| {
        MessagingError::ConsumerFailed(processor_name.to_owned(), err.to_string())
    };

    channel
        .exchange_declare(
            &exchange.name,
            exchange.kind.to_lapin(),
            ExchangeDeclareOptions::default(),
            FieldTable::default(),
        )
        .await
        .map_err(setup_error)?;

    channel
        .queue_declare(
            processor_name,
            QueueDeclareOptions {
                durable: false,
                exclusive: true,
                auto_delete: true,
                ..QueueDeclareOptions::default()
            },
            FieldTable::default(),
        )
        .await
        .map_err(setup_error)?;

    channel
        .queue_bind(
            processor_name,
            &exchange.name,
            routing_key,
            QueueBindOptions::default(),
            FieldTable::default(),
        )
        .await
        .map_err(setup_error)?;

    let mut consumer = channel
        .basic_consume(
            processor_name,
            processor_name,
            BasicConsumeOptions {
                no_local: false,
                no_ack: false,
                exclusive: false,
                nowait: false,
            },
            FieldTable::default(),
        )
        .await
        .map_err(setup_error)?;

    let instance_id = Uuid::new_v4().to_string();
    registry.track_consumer(
        processor_name,
        ActiveConsumer {
            id: instance_id.clone(),
            channel: channel.clone(),
        },
    );

    let name = processor_name.to_owned();
    tokio::spawn(async move {
        let tracer = global::tracer("amqp consumer");

        while let Some(delivery) = consumer.next().await {
            match delivery {
                Ok(delivery) => {
                    let acker = Arc::new(DeliveryAcker::new(delivery.acker.clone()));
                    if let Err(err) = dispatch(
                        &tracer,
                        &delivery.properties,
                        delivery.routing_key.as_str(),
                        &delivery.data,
                        acker,
                        &name,
                        handler.as_ref(),
                    )
                    .await
                    {
                        error!(processor = %name, error = %err, "error settling delivery");
                    }
                }
                Err(err) => error!(processor = %name, error = %err, "error receiving delivery"),
            }
        }

        info!(processor = %name, "consumer cancelled");
        registry.remove_consumer_if(&name, &instance_id);
    });

    Ok(())
}

/// Processes one delivery: envelope filtering, handler invocation, and the
/// fallback settlement that guarantees no message is left in limbo.
pub(crate) async fn dispatch(
    tracer: &BoxedTracer,
    properties: &AMQPProperties,
    routing_key: &str,
    payload: &[u8],
    acker: Arc<dyn Acknowledger>,
    processor_name: &str,
    handler: &dyn MessageHandler,
) -> Result<(), MessagingError> {
    let envelope = match Envelope::decode(payload) {
        Ok(envelope) => envelope,
        Err(_) => {
            debug!(processor = processor_name, "delivery is not a valid envelope, dropping");
            return acker.ack().await;
        }
    };

    if !envelope.is_application_message() {
        debug!(
            processor = processor_name,
            "delivery does not carry the application tag, dropping"
        );
        return acker.ack().await;
    }

    let (callback_routing_key, body) = envelope.into_parts();
    let message = ReceivedMessage::new(acker, routing_key.to_owned(), callback_routing_key, body);

    let (_ctx, mut span) = otel::consumer_span(properties, tracer, processor_name);
    debug!(processor = processor_name, routing_key, "delivery received");

    match AssertUnwindSafe(handler.handle(&message)).catch_unwind().await {
        Ok(Ok(())) => {
            if message.is_acknowledged() {
                span.set_status(Status::Ok);
                Ok(())
            } else {
                warn!(
                    processor = processor_name,
                    "message was not acknowledged or rejected by handler, auto-rejecting"
                );
                span.set_status(Status::Error {
                    description: Cow::from("delivery auto-rejected"),
                });
                message.reject().await
            }
        }
        Ok(Err(err)) => {
            error!(processor = processor_name, error = %err, "handler failed, rejecting message");
            span.record_error(&err);
            span.set_status(Status::Error {
                description: Cow::from("handler failure"),
            });
            message.reject().await
        }
        Err(panic) => {
            let err = MessagingError::HandlerPanicked(panic_message(panic));
            error!(processor = processor_name, error = %err, "rejecting message");
            span.record_error(&err);
            span.set_status(Status::Error {
                description: Cow::from("handler panicked"),
            });
            message.reject().await
        }
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(text) = panic.downcast_ref::<&str>() {
        (*text).to_owned()
    } else if let Some(text) = panic.downcast_ref::<String>() {
        text.clone()
    } else {
        "unidentified panic".to_owned()
    }
}
