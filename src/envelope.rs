// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Message Envelope Codec
//!
//! Every payload this client publishes is wrapped in a small JSON envelope
//! carrying a fixed application tag, an optional reply routing key, and the
//! message body. The tag lets consumers on a shared exchange discard traffic
//! from unrelated producers without treating it as an error.

use crate::errors::MessagingError;
use serde::{Deserialize, Serialize};

/// Application tag stamped on every envelope this client produces.
pub const MESSAGE_TAG: &str = "JSON_MESSAGE";

/// Wire envelope wrapped around every application payload.
///
/// Decoding is tolerant by design: the reply key may be absent, the body
/// defaults to empty, and unknown fields are ignored, since foreign producers
/// may publish arbitrary JSON on the same exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "TAG")]
    pub(crate) tag: String,

    #[serde(
        rename = "senderCallBackKey",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub(crate) callback_routing_key: Option<String>,

    #[serde(rename = "message", default)]
    pub(crate) body: String,
}

impl Envelope {
    /// Builds an envelope for an outbound message, stamped with the
    /// application tag.
    pub fn new(callback_routing_key: Option<&str>, body: &str) -> Envelope {
        Envelope {
            tag: MESSAGE_TAG.to_owned(),
            callback_routing_key: callback_routing_key.map(str::to_owned),
            body: body.to_owned(),
        }
    }

    /// Serializes the envelope to its JSON wire form.
    pub fn encode(&self) -> Result<Vec<u8>, MessagingError> {
        serde_json::to_vec(self).map_err(|err| MessagingError::SendFailed(err.to_string()))
    }

    /// Deserializes a raw payload into an envelope.
    ///
    /// A parse failure means the payload was not produced by this client; the
    /// caller decides what to do with such traffic.
    pub fn decode(payload: &[u8]) -> Result<Envelope, serde_json::Error> {
        serde_json::from_slice(payload)
    }

    /// Whether the envelope carries this application's tag.
    pub fn is_application_message(&self) -> bool {
        self.tag == MESSAGE_TAG
    }

    /// Consumes the envelope, yielding the reply routing key and the body.
    pub fn into_parts(self) -> (Option<String>, String) {
        (self.callback_routing_key, self.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_with_callback_key() {
        let envelope = Envelope::new(Some("reply.key"), "hello");
        let decoded = Envelope::decode(&envelope.encode().unwrap()).unwrap();

        assert!(decoded.is_application_message());
        assert_eq!(decoded.into_parts(), (Some("reply.key".to_owned()), "hello".to_owned()));
    }

    #[test]
    fn round_trip_without_callback_key() {
        let envelope = Envelope::new(None, "fire and forget");
        let wire = envelope.encode().unwrap();

        // The reply key is omitted entirely, not serialized as null.
        let raw: serde_json::Value = serde_json::from_slice(&wire).unwrap();
        assert!(raw.get("senderCallBackKey").is_none());

        let decoded = Envelope::decode(&wire).unwrap();
        assert_eq!(decoded.into_parts(), (None, "fire and forget".to_owned()));
    }

    #[test]
    fn decode_rejects_non_json_payloads() {
        assert!(Envelope::decode(b"plain text frame").is_err());
    }

    #[test]
    fn decode_defaults_a_missing_body() {
        let decoded = Envelope::decode(br#"{"TAG":"JSON_MESSAGE"}"#).unwrap();
        assert!(decoded.is_application_message());
        assert_eq!(decoded.into_parts(), (None, String::new()));
    }

    #[test]
    fn decode_accepts_a_null_callback_key() {
        let decoded =
            Envelope::decode(br#"{"TAG":"JSON_MESSAGE","senderCallBackKey":null,"message":"x"}"#)
                .unwrap();
        assert_eq!(decoded.into_parts(), (None, "x".to_owned()));
    }

    #[test]
    fn foreign_tags_are_detected() {
        let decoded =
            Envelope::decode(br#"{"TAG":"SOMEONE_ELSE","message":"not ours"}"#).unwrap();
        assert!(!decoded.is_application_message());
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let decoded = Envelope::decode(
            br#"{"TAG":"JSON_MESSAGE","message":"ok","extra":{"nested":1}}"#,
        )
        .unwrap();
        assert!(decoded.is_application_message());
    }
}
