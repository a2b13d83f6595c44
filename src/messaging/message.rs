//! # Message Structures
//!
//! A [`Message`] is the unit handed to processing units: an opaque JSON body tagged
//! with the application type it was built from, plus a string property bag.
//! Messages travel between agents inside an envelope, which is a single broker
//! message carrying a JSON array of messages in send order.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use super::MessagingError;

/// Message envelope exchanged between agents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Free-form string properties; last write for a key wins
    #[serde(default)]
    properties: HashMap<String, String>,
    /// Name of the application type the body was serialized from
    body_type: String,
    /// Serialized application payload
    body: serde_json::Value,
}

impl Message {
    /// Wrap an application value, tagging it with its Rust type name
    pub fn new<T: Serialize + ?Sized>(body: &T) -> Result<Self, MessagingError> {
        Ok(Self {
            properties: HashMap::new(),
            body_type: body_type_name::<T>(),
            body: serialize_body(body)?,
        })
    }

    /// Build a message from an already-serialized body and an explicit type tag
    ///
    /// Useful when the producing and consuming agents live in different binaries
    /// and agree on a tag rather than on a Rust path.
    pub fn from_parts(body_type: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            properties: HashMap::new(),
            body_type: body_type.into(),
            body,
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Set a property, returning the previous value for the key
    pub fn set_property(
        &mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Option<String> {
        self.properties.insert(key.into(), value.into())
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    pub fn properties(&self) -> &HashMap<String, String> {
        &self.properties
    }

    pub fn body_type(&self) -> &str {
        &self.body_type
    }

    pub fn body(&self) -> &serde_json::Value {
        &self.body
    }

    /// Deserialize the body into an application type
    pub fn body_as<T: DeserializeOwned>(&self) -> Result<T, MessagingError> {
        serde_json::from_value(self.body.clone())
            .map_err(|e| MessagingError::message_deserialization(e.to_string()))
    }

    /// Replace the body wholesale; the type tag follows the new body
    pub fn set_body<T: Serialize + ?Sized>(&mut self, body: &T) -> Result<(), MessagingError> {
        self.body = serialize_body(body)?;
        self.body_type = body_type_name::<T>();
        Ok(())
    }

    pub fn into_body(self) -> serde_json::Value {
        self.body
    }
}

/// Type tag recorded for bodies built with [`Message::new`]
///
/// Derived from `std::any::type_name`, so it is only stable within one build.
/// References are stripped and borrowed forms map to their owned type, so
/// `"a"`, `&"a"` and `&String` all tag as `alloc::string::String`. Agents built
/// from different binaries should agree on an explicit tag through
/// [`Message::from_parts`] instead.
pub fn body_type_name<T: ?Sized>() -> String {
    normalize_type_name(std::any::type_name::<T>())
}

fn normalize_type_name(raw: &str) -> String {
    let mut name = raw.trim();
    loop {
        let stripped = name.trim_start_matches('&').trim_start_matches("mut ");
        if stripped == name {
            break;
        }
        name = stripped;
    }

    if name == "str" {
        return "alloc::string::String".to_string();
    }
    // [T] -> Vec<T>; fixed-size arrays keep their own tag
    if let Some(inner) = name.strip_prefix('[').and_then(|n| n.strip_suffix(']')) {
        if !inner.contains(';') {
            return format!("alloc::vec::Vec<{}>", normalize_type_name(inner));
        }
    }
    name.to_string()
}

fn serialize_body<T: Serialize + ?Sized>(body: &T) -> Result<serde_json::Value, MessagingError> {
    serde_json::to_value(body).map_err(|e| MessagingError::message_serialization(e.to_string()))
}

/// Envelope framing violations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FramingError {
    #[error("envelope payload must be a sequence of messages, found {found}")]
    NotASequence { found: &'static str },

    #[error("envelope item {index} is not a message: {reason}")]
    InvalidItem { index: usize, reason: String },

    #[error("envelope item {index} carries {found}, expected {expected}")]
    UnexpectedBodyType {
        index: usize,
        expected: String,
        found: String,
    },
}

/// Encode messages, in order, as one envelope payload
pub fn encode_envelope(messages: &[Message]) -> Result<serde_json::Value, MessagingError> {
    serde_json::to_value(messages).map_err(|e| MessagingError::message_serialization(e.to_string()))
}

/// Decode and validate an envelope payload
///
/// The payload must be a JSON array and every item must decode as a [`Message`].
/// When `expected_body_type` is given every item must also carry that tag.
pub fn decode_envelope(
    payload: serde_json::Value,
    expected_body_type: Option<&str>,
) -> Result<Vec<Message>, FramingError> {
    let items = match payload {
        serde_json::Value::Array(items) => items,
        other => {
            return Err(FramingError::NotASequence {
                found: json_kind(&other),
            })
        }
    };

    let mut messages = Vec::with_capacity(items.len());
    for (index, item) in items.into_iter().enumerate() {
        let message: Message =
            serde_json::from_value(item).map_err(|e| FramingError::InvalidItem {
                index,
                reason: e.to_string(),
            })?;

        if let Some(expected) = expected_body_type {
            if message.body_type != expected {
                return Err(FramingError::UnexpectedBodyType {
                    index,
                    expected: expected.to_string(),
                    found: message.body_type,
                });
            }
        }
        messages.push(message);
    }

    Ok(messages)
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
