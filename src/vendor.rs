// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Messaging Vendors
//!
//! Compile-time registry of the brokers this crate knows about. Adapter
//! selection is a plain match on this enum, driven by the `messaging.type`
//! configuration key.

use std::fmt;

/// The brokers the messaging contract can be backed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessagingVendor {
    RabbitMq,
    Redis,
}

impl MessagingVendor {
    /// Parses a configured vendor name.
    pub fn parse(value: &str) -> Option<MessagingVendor> {
        match value.to_ascii_lowercase().as_str() {
            "rabbitmq" => Some(MessagingVendor::RabbitMq),
            "redis" => Some(MessagingVendor::Redis),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MessagingVendor::RabbitMq => "rabbitmq",
            MessagingVendor::Redis => "redis",
        }
    }
}

impl fmt::Display for MessagingVendor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_vendors_parse_case_insensitively() {
        assert_eq!(MessagingVendor::parse("RabbitMQ"), Some(MessagingVendor::RabbitMq));
        assert_eq!(MessagingVendor::parse("redis"), Some(MessagingVendor::Redis));
        assert_eq!(MessagingVendor::parse("kafka"), None);
    }

    #[test]
    fn display_matches_the_configured_name() {
        assert_eq!(MessagingVendor::RabbitMq.to_string(), "rabbitmq");
    }
}
