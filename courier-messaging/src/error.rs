//! Error types for messaging operations

use thiserror::Error;

/// Errors that can occur during messaging operations
#[derive(Error, Debug)]
pub enum MessagingError {
    /// Failed to connect to the broker
    #[error("Connection failed: {0}")]
    Connection(String),

    /// Failed to publish a message
    #[error("Publish failed: {0}")]
    Publish(String),

    /// Failed to subscribe to a topic/queue
    #[error("Subscribe failed: {0}")]
    Subscribe(String),

    /// Failed to serialize a message
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// Failed to deserialize a message
    #[error("Deserialization failed: {0}")]
    Deserialization(String),

    /// Operation timed out
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Channel/connection is closed
    #[error("Channel closed: {0}")]
    ChannelClosed(String),

    /// Queue/topic not found
    #[error("Queue/topic not found: {0}")]
    NotFound(String),

    /// Queue/topic already exists
    #[error("Queue/topic already exists: {0}")]
    AlreadyExists(String),

    /// Startup configuration is invalid
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// A reply matched neither the success nor the error response type
    #[error("Cannot determine response type: received {0}")]
    UnknownResponseType(String),

    /// A reply carried a different correlation id than its request
    #[error("Correlation mismatch: expected {expected}, got {actual}")]
    CorrelationMismatch { expected: String, actual: String },

    /// The remote handler failed while processing the message
    #[error("Handler failed: {0}")]
    Handler(String),

    /// Other errors
    #[error("{0}")]
    Other(String),
}

impl MessagingError {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            MessagingError::Connection(_)
                | MessagingError::Timeout(_)
                | MessagingError::ChannelClosed(_)
        )
    }

    /// Check if this error indicates a connection issue
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            MessagingError::Connection(_) | MessagingError::ChannelClosed(_)
        )
    }
}

impl From<serde_json::Error> for MessagingError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_data() || err.is_syntax() || err.is_eof() {
            MessagingError::Deserialization(err.to_string())
        } else {
            MessagingError::Serialization(err.to_string())
        }
    }
}

/// Fatal problems detected while finalizing the bus configuration
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    /// More than one responder answers the same request type
    #[error(
        "Request type {message_type} has {count} responders registered; exactly one is allowed"
    )]
    AmbiguousResponder {
        message_type: &'static str,
        count: usize,
    },

    /// A responder was registered for a type that is not a request
    #[error("Responder registered for {message_type}, which is not a request type")]
    NotARequest { message_type: &'static str },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, MessagingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(MessagingError::Timeout("reply".into()).is_retryable());
        assert!(MessagingError::Connection("down".into()).is_connection_error());
        assert!(!MessagingError::UnknownResponseType("x".into()).is_retryable());
        assert!(!MessagingError::NotFound("q".into()).is_connection_error());
    }

    #[test]
    fn test_configuration_error_names_type() {
        let err: MessagingError = ConfigurationError::AmbiguousResponder {
            message_type: "billing::QuoteRequest",
            count: 2,
        }
        .into();

        let text = err.to_string();
        assert!(text.contains("billing::QuoteRequest"));
        assert!(text.contains('2'));
        assert!(matches!(
            err,
            MessagingError::Configuration(ConfigurationError::AmbiguousResponder { .. })
        ));
    }

    #[test]
    fn test_json_errors_map_to_deserialization() {
        let err: MessagingError = serde_json::from_str::<u32>("\"nope\"").unwrap_err().into();
        assert!(matches!(err, MessagingError::Deserialization(_)));
    }
}
