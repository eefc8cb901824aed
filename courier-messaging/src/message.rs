//! Broker wire message

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::MessagingError;

/// Header carrying the topic name of the payload's message type
pub const MESSAGE_TYPE_HEADER: &str = "courier-message-type";

/// Header carrying the application that sent the message
pub const SOURCE_APP_HEADER: &str = "courier-source-app";

/// A message to be sent or received from a message broker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique message identifier
    pub id: String,
    /// Message payload as bytes
    pub payload: Vec<u8>,
    /// Message headers/properties
    pub headers: HashMap<String, String>,
    /// Topic the message is published to
    pub topic: String,
    /// Timestamp when the message was created
    pub timestamp: DateTime<Utc>,
    /// Optional correlation ID for request-response patterns
    pub correlation_id: Option<String>,
    /// Optional reply-to address
    pub reply_to: Option<String>,
    /// Message content type (e.g., "application/json")
    pub content_type: Option<String>,
}

impl Message {
    /// Create a new message with the given payload
    pub fn new<T: Into<Vec<u8>>>(topic: impl Into<String>, payload: T) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            payload: payload.into(),
            headers: HashMap::new(),
            topic: topic.into(),
            timestamp: Utc::now(),
            correlation_id: None,
            reply_to: None,
            content_type: None,
        }
    }

    /// Create a message from a JSON-serializable value
    pub fn json<T: Serialize>(topic: impl Into<String>, value: &T) -> Result<Self, MessagingError> {
        let payload =
            serde_json::to_vec(value).map_err(|e| MessagingError::Serialization(e.to_string()))?;
        let mut msg = Self::new(topic, payload);
        msg.content_type = Some("application/json".to_string());
        Ok(msg)
    }

    /// Parse the payload as JSON
    pub fn parse_json<T: for<'de> Deserialize<'de>>(&self) -> Result<T, MessagingError> {
        serde_json::from_slice(&self.payload)
            .map_err(|e| MessagingError::Deserialization(e.to_string()))
    }

    /// Add a header to the message
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key).map(String::as_str)
    }

    /// Set the correlation ID
    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    /// Set the reply-to address
    pub fn with_reply_to(mut self, reply_to: impl Into<String>) -> Self {
        self.reply_to = Some(reply_to.into());
        self
    }

    /// Topic name of the carried message type, if the sender set one
    pub fn message_type(&self) -> Option<&str> {
        self.header(MESSAGE_TYPE_HEADER)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Message {{ id: {}, topic: {}, size: {} bytes }}",
            self.id,
            self.topic,
            self.payload.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_creation() {
        let msg = Message::new("test-topic", b"hello world".to_vec());
        assert_eq!(msg.topic, "test-topic");
        assert_eq!(msg.payload, b"hello world");
        assert!(!msg.id.is_empty());
        assert!(msg.message_type().is_none());
    }

    #[test]
    fn test_message_json() {
        #[derive(Serialize, Deserialize, Debug, PartialEq)]
        struct Quote {
            sku: String,
            cents: i64,
        }

        let data = Quote {
            sku: "A-1".to_string(),
            cents: 1299,
        };

        let msg = Message::json("quotes", &data).unwrap();
        assert_eq!(msg.content_type.as_deref(), Some("application/json"));

        let parsed: Quote = msg.parse_json().unwrap();
        assert_eq!(parsed, data);
    }

    #[test]
    fn test_message_headers() {
        let msg = Message::new("topic", b"{}".to_vec())
            .with_header(MESSAGE_TYPE_HEADER, "billing.Quote")
            .with_correlation_id("corr-123")
            .with_reply_to("loopback://replies");

        assert_eq!(msg.message_type(), Some("billing.Quote"));
        assert_eq!(msg.correlation_id.as_deref(), Some("corr-123"));
        assert_eq!(msg.reply_to.as_deref(), Some("loopback://replies"));
        assert!(msg.to_string().contains("topic: topic"));
    }

    #[test]
    fn test_parse_invalid_payload() {
        let msg = Message::new("topic", b"not json".to_vec());
        let result: Result<serde_json::Value, _> = msg.parse_json();
        assert!(matches!(result, Err(MessagingError::Deserialization(_))));
    }
}
