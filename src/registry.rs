// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Consumer Registry
//!
//! Tracks what the application asked for (processor registrations) separately
//! from what currently exists on the broker (active consumers). The
//! registration map is the source of truth; broker-side consumers are
//! disposable projections of it, dropped on reconnect and rebuilt by replay.

use crate::contract::MessageHandler;
use crate::errors::MessagingError;
use lapin::Channel;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// A named processor: routing-key pattern plus handler.
#[derive(Clone)]
pub(crate) struct ProcessorRegistration {
    pub(crate) routing_key: String,
    pub(crate) handler: Arc<dyn MessageHandler>,
}

/// A live broker-side subscription bound to one registration.
///
/// The instance id distinguishes successive consumers created under the same
/// processor name, so a finished consumer task only ever removes its own
/// entry.
pub(crate) struct ActiveConsumer {
    pub(crate) id: String,
    pub(crate) channel: Channel,
}

#[derive(Default)]
pub(crate) struct ProcessorRegistry {
    processors: Mutex<HashMap<String, ProcessorRegistration>>,
    consumers: Mutex<HashMap<String, ActiveConsumer>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ProcessorRegistry {
    pub(crate) fn new() -> ProcessorRegistry {
        ProcessorRegistry::default()
    }

    pub(crate) fn contains(&self, processor_name: &str) -> bool {
        lock(&self.processors).contains_key(processor_name)
    }

    /// Stores a registration; names are unique.
    pub(crate) fn insert_processor(
        &self,
        processor_name: &str,
        registration: ProcessorRegistration,
    ) -> Result<(), MessagingError> {
        let mut processors = lock(&self.processors);
        if processors.contains_key(processor_name) {
            return Err(MessagingError::AlreadyRegistered(processor_name.to_owned()));
        }
        processors.insert(processor_name.to_owned(), registration);
        Ok(())
    }

    pub(crate) fn remove_processor(&self, processor_name: &str) -> Option<ProcessorRegistration> {
        lock(&self.processors).remove(processor_name)
    }

    /// A point-in-time copy of all registrations, for replay.
    pub(crate) fn snapshot(&self) -> Vec<(String, ProcessorRegistration)> {
        lock(&self.processors)
            .iter()
            .map(|(name, registration)| (name.clone(), registration.clone()))
            .collect()
    }

    pub(crate) fn clear_processors(&self) {
        lock(&self.processors).clear();
    }

    pub(crate) fn track_consumer(&self, processor_name: &str, consumer: ActiveConsumer) {
        lock(&self.consumers).insert(processor_name.to_owned(), consumer);
    }

    pub(crate) fn take_consumer(&self, processor_name: &str) -> Option<ActiveConsumer> {
        lock(&self.consumers).remove(processor_name)
    }

    /// Removes the consumer entry only if it still belongs to the given
    /// instance. Returns whether an entry was removed.
    pub(crate) fn remove_consumer_if(&self, processor_name: &str, instance_id: &str) -> bool {
        let mut consumers = lock(&self.consumers);
        match consumers.get(processor_name) {
            Some(active) if active.id == instance_id => {
                consumers.remove(processor_name);
                true
            }
            _ => false,
        }
    }

    /// Empties the active-consumer set, returning the drained entries.
    pub(crate) fn drain_consumers(&self) -> Vec<ActiveConsumer> {
        lock(&self.consumers).drain().map(|(_, active)| active).collect()
    }
}
