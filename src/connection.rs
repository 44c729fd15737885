// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # RabbitMQ Connection Lifecycle
//!
//! `RabbitMqConnection` owns the single physical link to the broker and
//! implements the messaging contract on top of it. The connection is replaced
//! wholesale on failure, never patched in place: reinitialisation drops every
//! broker-side consumer and rebuilds them from the registration map.
//!
//! Recovery is layered. The AMQP heartbeat detects dead links; a connection
//! error handler retries reinitialisation at a fixed interval until the link
//! is back; and the send and registration paths reinitialise on demand
//! whenever the connection is not ready.

use crate::config::{mask, ConfigSource, ConnectionSettings, KEY_DEBUG};
use crate::consumer;
use crate::contract::{MessageHandler, MessagingConnection};
use crate::envelope::Envelope;
use crate::errors::MessagingError;
use crate::exchange::ExchangeSettings;
use crate::publisher;
use crate::registry::{ProcessorRegistration, ProcessorRegistry};
use crate::vendor::MessagingVendor;
use async_trait::async_trait;
use lapin::{
    options::ExchangeDeclareOptions,
    types::{FieldTable, LongString},
    Connection, ConnectionProperties,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Fixed delay between reconnection attempts after a connection error.
const RECONNECT_INTERVAL: Duration = Duration::from_secs(5);
/// AMQP heartbeat requested from the broker, in seconds.
const HEARTBEAT_SECS: u64 = 30;
/// Connection name reported to the broker.
const CONNECTION_NAME: &str = "messaging-client";

/// RabbitMQ implementation of the messaging contract.
pub struct RabbitMqConnection {
    settings: ConnectionSettings,
    exchange: ExchangeSettings,
    connection: RwLock<Option<Arc<Connection>>>,
    reconnect: tokio::sync::Mutex<()>,
    registry: Arc<ProcessorRegistry>,
    closed: AtomicBool,
    runtime: Handle,
    self_ref: Weak<RabbitMqConnection>,
}

impl RabbitMqConnection {
    /// Connects to the broker described by the configuration source.
    ///
    /// Connection parameters are logged with the password masked; setting
    /// `messaging.debug` promotes the dump to info level.
    ///
    /// # Parameters
    /// * `config` - Configuration source supplying the RabbitMQ connection
    ///   and exchange keys
    ///
    /// # Returns
    /// An initialised, health-checked connection, or a MessagingError when
    /// the broker is unreachable or misconfigured
    pub async fn connect(
        config: &dyn ConfigSource,
    ) -> Result<Arc<RabbitMqConnection>, MessagingError> {
        let settings = ConnectionSettings::from_config(config)?;
        let exchange = ExchangeSettings::from_config(config);

        if config.get_bool(KEY_DEBUG).unwrap_or(false) {
            info!(
                hostname = %settings.hostname,
                port = settings.port,
                vhost = %settings.vhost,
                username = %settings.username,
                password = %mask(&settings.password),
                exchange = %exchange.name,
                exchange_type = %exchange.kind,
                "messaging configuration resolved"
            );
        } else {
            debug!(
                hostname = %settings.hostname,
                port = settings.port,
                vhost = %settings.vhost,
                username = %settings.username,
                password = %mask(&settings.password),
                exchange = %exchange.name,
                exchange_type = %exchange.kind,
                "messaging configuration resolved"
            );
        }

        let connection = Arc::new_cyclic(|self_ref| RabbitMqConnection {
            settings,
            exchange,
            connection: RwLock::new(None),
            reconnect: tokio::sync::Mutex::new(()),
            registry: Arc::new(ProcessorRegistry::new()),
            closed: AtomicBool::new(false),
            runtime: Handle::current(),
            self_ref: self_ref.clone(),
        });

        connection.establish().await?;
        if !connection.connection_ready().await {
            return Err(MessagingError::ConnectFailed(
                "connection validation failed after initialisation".to_owned(),
            ));
        }

        Ok(connection)
    }

    /// (Re)initialises the physical connection. Single-flight: concurrent
    /// callers queue on the reconnect lock and at most one attempt runs.
    async fn establish(&self) -> Result<(), MessagingError> {
        let _flight = self.reconnect.lock().await;

        if self.closed.load(Ordering::Acquire) {
            return Err(MessagingError::ConnectFailed("client is closed".to_owned()));
        }

        // Close the previous connection best-effort; errors are irrelevant,
        // it is being replaced either way.
        if let Some(previous) = self.swap_connection(None) {
            if previous.status().connected() {
                let _ = previous.close(0, "reinitialising").await;
            }
        }

        // Broker-side consumers are derived state; they are rebuilt against
        // the new connection by replay.
        self.registry.drain_consumers();

        let uri = self.settings.amqp_uri(HEARTBEAT_SECS);
        let options = ConnectionProperties::default()
            .with_connection_name(LongString::from(CONNECTION_NAME.to_owned()));

        let connection = Connection::connect(&uri, options)
            .await
            .map_err(|err| MessagingError::ConnectFailed(err.to_string()))?;
        info!("RabbitMQ connection established");

        // A connection can report itself open yet fail to service channels;
        // validate with a probe channel, and declare the exchange on it so
        // the send path has something to publish to.
        let probe = connection
            .create_channel()
            .await
            .map_err(|err| MessagingError::ChannelFailed(err.to_string()))?;
        probe
            .exchange_declare(
                &self.exchange.name,
                self.exchange.kind.to_lapin(),
                ExchangeDeclareOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|err| {
                MessagingError::ConnectFailed(format!("exchange declaration failed: {err}"))
            })?;
        let _ = probe.close(0, "validation probe done").await;
        debug!("RabbitMQ channel validated");

        self.install_recovery_hook(&connection);
        self.swap_connection(Some(Arc::new(connection)));

        self.replay_consumers().await;
        Ok(())
    }

    /// Re-registers every stored processor against the current connection.
    ///
    /// Attempts are independent: one processor failing to come back is logged
    /// and does not block the others.
    async fn replay_consumers(&self) {
        let snapshot = self.registry.snapshot();
        if snapshot.is_empty() {
            return;
        }

        info!(count = snapshot.len(), "re-registering consumers after reconnection");

        let Some(connection) = self.current_connection() else {
            return;
        };

        for (name, registration) in snapshot {
            match consumer::spawn_consumer(
                &connection,
                &self.exchange,
                self.registry.clone(),
                &name,
                &registration.routing_key,
                registration.handler.clone(),
            )
            .await
            {
                Ok(()) => info!(processor = %name, "consumer re-registered"),
                Err(err) => {
                    warn!(processor = %name, error = %err, "failed to re-register consumer")
                }
            }
        }
    }

    /// Arms the transport-level recovery: on a connection error, keep
    /// retrying reinitialisation at a fixed interval until the connection is
    /// ready or the client is closed.
    fn install_recovery_hook(&self, connection: &Connection) {
        let weak = self.self_ref.clone();
        let runtime = self.runtime.clone();

        connection.on_error(move |err| {
            error!(error = %err, "RabbitMQ connection error");
            let Some(client) = weak.upgrade() else {
                return;
            };
            if client.closed.load(Ordering::Acquire) {
                return;
            }
            // lapin fires this from its own reactor thread; recovery has to
            // be re-entered onto the runtime.
            runtime.spawn(async move { client.recover().await });
        });
    }

    async fn recover(self: Arc<Self>) {
        while !self.closed.load(Ordering::Acquire) {
            tokio::time::sleep(RECONNECT_INTERVAL).await;

            if self.connection_ready().await {
                return;
            }

            match self.establish().await {
                Ok(()) => {
                    info!("RabbitMQ connection recovered");
                    return;
                }
                Err(err) => warn!(error = %err, "reconnection attempt failed, retrying"),
            }
        }
    }

    async fn send_internal(
        &self,
        target_routing_key: &str,
        callback_routing_key: Option<&str>,
        message: &str,
    ) -> Result<(), MessagingError> {
        if !self.connection_ready().await {
            self.establish().await?;
        }

        let connection = self.current_connection().ok_or_else(|| {
            MessagingError::ConnectFailed("no connection available".to_owned())
        })?;

        let payload = Envelope::new(callback_routing_key, message).encode()?;
        publisher::publish(&connection, &self.exchange.name, target_routing_key, &payload).await
    }

    fn current_connection(&self) -> Option<Arc<Connection>> {
        self.connection
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn swap_connection(&self, next: Option<Arc<Connection>>) -> Option<Arc<Connection>> {
        let mut guard = self.connection.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *guard, next)
    }
}

#[async_trait]
impl MessagingConnection for RabbitMqConnection {
    fn vendor(&self) -> MessagingVendor {
        MessagingVendor::RabbitMq
    }

    async fn init_connection(&self) -> Result<(), MessagingError> {
        self.establish().await
    }

    async fn connection_ready(&self) -> bool {
        let Some(connection) = self.current_connection() else {
            return false;
        };
        if !connection.status().connected() {
            return false;
        }

        // An open connection may still be unable to service new channels
        // under resource exhaustion; probe one to be sure.
        match connection.create_channel().await {
            Ok(probe) => {
                let _ = probe.close(0, "health probe").await;
                true
            }
            Err(_) => false,
        }
    }

    async fn close(&self) {
        info!("closing RabbitMQ connection");
        self.closed.store(true, Ordering::Release);

        self.registry.clear_processors();
        self.registry.drain_consumers();

        match self.swap_connection(None) {
            Some(connection) => match connection.close(0, "client shutdown").await {
                Ok(()) => info!("RabbitMQ connection closed successfully"),
                Err(err) => warn!(error = %err, "error while closing RabbitMQ connection"),
            },
            None => warn!("RabbitMQ connection is already closed or was never initialised"),
        }
    }

    async fn send_message(
        &self,
        target_routing_key: &str,
        message: &str,
    ) -> Result<(), MessagingError> {
        self.send_internal(target_routing_key, None, message).await
    }

    async fn send_message_with_callback(
        &self,
        target_routing_key: &str,
        callback_routing_key: &str,
        message: &str,
    ) -> Result<(), MessagingError> {
        self.send_internal(target_routing_key, Some(callback_routing_key), message)
            .await
    }

    async fn register_message_processor(
        &self,
        processor_name: &str,
        routing_key: &str,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<(), MessagingError> {
        if self.registry.contains(processor_name) {
            return Err(MessagingError::AlreadyRegistered(processor_name.to_owned()));
        }

        if !self.connection_ready().await {
            self.establish().await?;
        }

        // Stored before materialization so a reconnect from here on replays
        // it; rolled back below if materialization fails.
        self.registry.insert_processor(
            processor_name,
            ProcessorRegistration {
                routing_key: routing_key.to_owned(),
                handler: handler.clone(),
            },
        )?;

        let materialized = match self.current_connection() {
            Some(connection) => {
                consumer::spawn_consumer(
                    &connection,
                    &self.exchange,
                    self.registry.clone(),
                    processor_name,
                    routing_key,
                    handler,
                )
                .await
            }
            None => Err(MessagingError::ConnectFailed(
                "no connection available".to_owned(),
            )),
        };

        match materialized {
            Ok(()) => {
                info!(processor = processor_name, routing_key, "registered message processor");
                Ok(())
            }
            Err(err) => {
                self.registry.remove_processor(processor_name);
                Err(err)
            }
        }
    }

    async fn register_anonymous_processor(
        &self,
        routing_key: &str,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<String, MessagingError> {
        let processor_name = format!("processor-{}", Uuid::new_v4());
        self.register_message_processor(&processor_name, routing_key, handler)
            .await?;
        Ok(processor_name)
    }

    async fn unregister_message_processor(&self, processor_name: &str) {
        if self.registry.remove_processor(processor_name).is_none() {
            debug!(processor = processor_name, "processor was not registered");
        }

        if let Some(active) = self.registry.take_consumer(processor_name) {
            if active.channel.status().connected() {
                if let Err(err) = active.channel.close(0, "processor unregistered").await {
                    warn!(processor = processor_name, error = %err, "error stopping consumer");
                }
            }
        }

        info!(processor = processor_name, "unregistered message processor");
    }
}
