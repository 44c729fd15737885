// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! End-to-end suite against a real broker.
//!
//! Ignored by default: these tests need a RabbitMQ instance listening on
//! localhost:5672 with the default guest credentials. Run them with
//! `cargo test -- --ignored`.

use async_trait::async_trait;
use messaging::config::{
    MapConfig, KEY_EXCHANGE, KEY_EXCHANGE_TYPE, KEY_HOSTNAME, KEY_VENDOR,
};
use messaging::contract::{MessageHandler, MessagingConnection};
use messaging::errors::MessagingError;
use messaging::loader;
use messaging::message::ReceivedMessage;
use messaging::vendor::MessagingVendor;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;
use uuid::Uuid;

const RECEIVE_TIMEOUT: Duration = Duration::from_secs(5);

type Received = (String, Option<String>, String);

/// Handler that forwards what it received and acknowledges.
struct CapturingHandler {
    tx: mpsc::UnboundedSender<Received>,
}

#[async_trait]
impl MessageHandler for CapturingHandler {
    async fn handle(&self, message: &ReceivedMessage) -> Result<(), MessagingError> {
        let _ = self.tx.send((
            message.routing_key().to_owned(),
            message.callback_routing_key().map(str::to_owned),
            message.message().to_owned(),
        ));
        message.ack().await
    }
}

fn capturing() -> (Arc<CapturingHandler>, mpsc::UnboundedReceiver<Received>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Arc::new(CapturingHandler { tx }), rx)
}

/// Each test gets its own exchange so runs do not interfere.
async fn connect() -> Arc<dyn MessagingConnection> {
    let config = MapConfig::new()
        .with(KEY_VENDOR, "rabbitmq")
        .with(KEY_HOSTNAME, "localhost")
        .with(KEY_EXCHANGE, &format!("messaging.test.{}", Uuid::new_v4()))
        .with(KEY_EXCHANGE_TYPE, "topic");

    loader::load(&config).await.expect("broker must be reachable")
}

#[tokio::test]
#[ignore]
async fn connection_reports_ready_and_its_vendor() {
    let connection = connect().await;

    assert_eq!(connection.vendor(), MessagingVendor::RabbitMq);
    assert!(connection.connection_ready().await);

    connection.close().await;
}

#[tokio::test]
#[ignore]
async fn a_message_round_trips_to_a_registered_processor() {
    let connection = connect().await;
    let (handler, mut rx) = capturing();

    connection
        .register_message_processor("p1", "jobs.new", handler)
        .await
        .unwrap();

    connection
        .send_message_with_callback("jobs.new", "reply.key", "hello")
        .await
        .unwrap();

    let (routing_key, callback, body) =
        timeout(RECEIVE_TIMEOUT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(routing_key, "jobs.new");
    assert_eq!(callback.as_deref(), Some("reply.key"));
    assert_eq!(body, "hello");

    connection.close().await;
}

#[tokio::test]
#[ignore]
async fn wildcard_bindings_match_concrete_routing_keys() {
    let connection = connect().await;
    let (handler, mut rx) = capturing();

    connection
        .register_message_processor("p1", "jobs.#", handler)
        .await
        .unwrap();

    connection.send_message("jobs.batch.retry", "queued").await.unwrap();

    let (routing_key, callback, body) =
        timeout(RECEIVE_TIMEOUT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(routing_key, "jobs.batch.retry");
    assert_eq!(callback, None);
    assert_eq!(body, "queued");

    connection.close().await;
}

#[tokio::test]
#[ignore]
async fn duplicate_registration_fails_without_disturbing_the_first() {
    let connection = connect().await;
    let (handler, mut rx) = capturing();
    let (other, _other_rx) = capturing();

    connection
        .register_message_processor("p1", "jobs.new", handler)
        .await
        .unwrap();

    let err = connection
        .register_message_processor("p1", "jobs.other", other)
        .await
        .unwrap_err();
    assert_eq!(err, MessagingError::AlreadyRegistered("p1".to_owned()));

    // The original consumer still receives.
    connection.send_message("jobs.new", "still alive").await.unwrap();
    let (_, _, body) = timeout(RECEIVE_TIMEOUT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(body, "still alive");

    connection.close().await;
}

#[tokio::test]
#[ignore]
async fn registrations_are_replayed_after_reinitialisation() {
    let connection = connect().await;
    let (first, mut first_rx) = capturing();
    let (second, mut second_rx) = capturing();

    connection
        .register_message_processor("p1", "jobs.first", first)
        .await
        .unwrap();
    connection
        .register_message_processor("p2", "jobs.second", second)
        .await
        .unwrap();

    // Tear the connection down and bring it back; consumers must follow.
    connection.init_connection().await.unwrap();

    connection.send_message("jobs.first", "one").await.unwrap();
    connection.send_message("jobs.second", "two").await.unwrap();

    let (_, _, body) = timeout(RECEIVE_TIMEOUT, first_rx.recv()).await.unwrap().unwrap();
    assert_eq!(body, "one");
    let (_, _, body) = timeout(RECEIVE_TIMEOUT, second_rx.recv()).await.unwrap().unwrap();
    assert_eq!(body, "two");

    connection.close().await;
}

#[tokio::test]
#[ignore]
async fn unregistered_processors_stop_receiving() {
    let connection = connect().await;
    let (handler, mut rx) = capturing();

    connection
        .register_message_processor("p1", "jobs.new", handler)
        .await
        .unwrap();
    connection.unregister_message_processor("p1").await;

    // Tolerant of the processor already being gone.
    connection.unregister_message_processor("p1").await;

    connection.send_message("jobs.new", "into the void").await.unwrap();
    match timeout(Duration::from_secs(1), rx.recv()).await {
        Ok(Some(_)) => panic!("message delivered after unregistration"),
        _ => {}
    }

    connection.close().await;
}

#[tokio::test]
#[ignore]
async fn anonymous_processors_get_generated_names() {
    let connection = connect().await;
    let (handler, mut rx) = capturing();

    let name = connection
        .register_anonymous_processor("jobs.new", handler)
        .await
        .unwrap();
    assert!(name.starts_with("processor-"));

    connection.send_message("jobs.new", "hello").await.unwrap();
    let (_, _, body) = timeout(RECEIVE_TIMEOUT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(body, "hello");

    connection.close().await;
}
