// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Exchange Configuration
//!
//! The client publishes to and binds queues against a single configured
//! exchange. This module maps the configured exchange type string onto
//! lapin's exchange kinds, passing plugin-provided types (such as the
//! recursive-topic `x-rtopic`) through as custom kinds.

use crate::config::{ConfigSource, KEY_EXCHANGE, KEY_EXCHANGE_TYPE};
use std::fmt;

/// Default exchange name when the configuration does not provide one.
pub const DEFAULT_EXCHANGE: &str = "messaging.exchange";
/// Default exchange type: the recursive-topic plugin kind.
pub const DEFAULT_EXCHANGE_TYPE: &str = "x-rtopic";

/// Represents the types of exchanges the client can declare.
///
/// The four AMQP built-ins are recognized by name; anything else is passed to
/// the broker verbatim, which is how plugin exchange types are selected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExchangeKind {
    Direct,
    Fanout,
    Topic,
    Headers,
    Custom(String),
}

impl ExchangeKind {
    /// Parses a configured exchange type string.
    pub fn parse(value: &str) -> ExchangeKind {
        match value.to_ascii_lowercase().as_str() {
            "direct" => ExchangeKind::Direct,
            "fanout" => ExchangeKind::Fanout,
            "topic" => ExchangeKind::Topic,
            "headers" => ExchangeKind::Headers,
            _ => ExchangeKind::Custom(value.to_owned()),
        }
    }

    pub(crate) fn to_lapin(&self) -> lapin::ExchangeKind {
        match self {
            ExchangeKind::Direct => lapin::ExchangeKind::Direct,
            ExchangeKind::Fanout => lapin::ExchangeKind::Fanout,
            ExchangeKind::Topic => lapin::ExchangeKind::Topic,
            ExchangeKind::Headers => lapin::ExchangeKind::Headers,
            ExchangeKind::Custom(name) => lapin::ExchangeKind::Custom(name.clone()),
        }
    }
}

impl fmt::Display for ExchangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExchangeKind::Direct => f.write_str("direct"),
            ExchangeKind::Fanout => f.write_str("fanout"),
            ExchangeKind::Topic => f.write_str("topic"),
            ExchangeKind::Headers => f.write_str("headers"),
            ExchangeKind::Custom(name) => f.write_str(name),
        }
    }
}

/// The exchange this client publishes to and binds consumer queues against.
#[derive(Debug, Clone)]
pub struct ExchangeSettings {
    pub(crate) name: String,
    pub(crate) kind: ExchangeKind,
}

impl ExchangeSettings {
    /// Reads the exchange name and type from the configuration source.
    pub fn from_config(config: &dyn ConfigSource) -> ExchangeSettings {
        ExchangeSettings {
            name: config.string_or(KEY_EXCHANGE, DEFAULT_EXCHANGE),
            kind: ExchangeKind::parse(&config.string_or(KEY_EXCHANGE_TYPE, DEFAULT_EXCHANGE_TYPE)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MapConfig;

    #[test]
    fn built_in_kinds_parse_case_insensitively() {
        assert_eq!(ExchangeKind::parse("Topic"), ExchangeKind::Topic);
        assert_eq!(ExchangeKind::parse("FANOUT"), ExchangeKind::Fanout);
        assert_eq!(ExchangeKind::parse("direct"), ExchangeKind::Direct);
        assert_eq!(ExchangeKind::parse("headers"), ExchangeKind::Headers);
    }

    #[test]
    fn plugin_kinds_pass_through_verbatim() {
        let kind = ExchangeKind::parse("x-rtopic");
        assert_eq!(kind, ExchangeKind::Custom("x-rtopic".to_owned()));
        assert!(matches!(kind.to_lapin(), lapin::ExchangeKind::Custom(name) if name == "x-rtopic"));
    }

    #[test]
    fn settings_fall_back_to_defaults() {
        let settings = ExchangeSettings::from_config(&MapConfig::new());
        assert_eq!(settings.name, DEFAULT_EXCHANGE);
        assert_eq!(settings.kind, ExchangeKind::Custom(DEFAULT_EXCHANGE_TYPE.to_owned()));
    }
}
