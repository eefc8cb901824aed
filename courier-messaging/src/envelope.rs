//! Transit wrapper for distributed messages

use chrono::{DateTime, Utc};
use courier_events::OriginPayload;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::config::HostIdentity;
use crate::error::MessagingError;
use crate::message::{MESSAGE_TYPE_HEADER, Message, SOURCE_APP_HEADER};
use crate::transport::Delivery;

/// Identity and correlation data carried with a message across the broker.
///
/// `correlation_id` is fixed when the envelope is created and echoed
/// unchanged by replies. `origin_app` is the first application that produced
/// the message and survives forwarding; `current_app` is whoever handled it
/// last.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope<T> {
    pub correlation_id: Uuid,
    pub created_on: DateTime<Utc>,
    pub machine_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_app: Option<String>,
    pub current_app: String,
    /// Application that answered; set on responses only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_app: Option<String>,
    pub event_id: Uuid,
    /// Topic name of `message`'s type
    pub message_type: String,
    pub message: T,
}

/// Envelope whose message has not been decoded yet
pub type RawEnvelope = Envelope<Value>;

impl<T> Envelope<T> {
    /// Wrap `message` under a fresh correlation id
    pub fn new(message_type: impl Into<String>, message: T) -> Self {
        Self {
            correlation_id: Uuid::new_v4(),
            created_on: Utc::now(),
            machine_name: String::new(),
            origin_app: None,
            current_app: String::new(),
            from_app: None,
            event_id: Uuid::new_v4(),
            message_type: message_type.into(),
            message,
        }
    }

    pub fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = correlation_id;
        self
    }

    pub fn with_origin_app(mut self, origin_app: impl Into<String>) -> Self {
        self.origin_app = Some(origin_app.into());
        self
    }

    /// Stamp host identity; an unset origin defaults to this application
    pub fn stamp(&mut self, identity: &HostIdentity) {
        self.machine_name = identity.machine_name.clone();
        self.current_app = identity.app_name.clone();
        if self.origin_app.is_none() {
            self.origin_app = Some(identity.app_name.clone());
        }
    }

    /// Origin application, falling back to the current one
    pub fn origin_app(&self) -> &str {
        self.origin_app.as_deref().unwrap_or(&self.current_app)
    }

    pub fn into_message(self) -> T {
        self.message
    }
}

impl<T: Serialize> Envelope<T> {
    /// Encode as a broker message on `topic`
    pub fn to_message(&self, topic: impl Into<String>) -> Result<Message, MessagingError> {
        Ok(Message::json(topic, self)?
            .with_correlation_id(self.correlation_id.to_string())
            .with_header(MESSAGE_TYPE_HEADER, self.message_type.clone())
            .with_header(SOURCE_APP_HEADER, self.current_app.clone()))
    }
}

impl<T: DeserializeOwned> Envelope<T> {
    pub fn from_message(message: &Message) -> Result<Self, MessagingError> {
        message.parse_json()
    }
}

impl RawEnvelope {
    /// Decode the carried message as `T`
    pub fn decode<T: DeserializeOwned>(self) -> Result<Envelope<T>, MessagingError> {
        let message = serde_json::from_value(self.message)
            .map_err(|e| MessagingError::Deserialization(e.to_string()))?;
        Ok(Envelope {
            correlation_id: self.correlation_id,
            created_on: self.created_on,
            machine_name: self.machine_name,
            origin_app: self.origin_app,
            current_app: self.current_app,
            from_app: self.from_app,
            event_id: self.event_id,
            message_type: self.message_type,
            message,
        })
    }

    /// Snapshot handed to handlers of an inbound delivery
    pub fn origin_payload(&self, delivery: &Delivery) -> OriginPayload {
        let payload = match &self.message {
            Value::Object(fields) => fields.clone(),
            Value::Null => Map::new(),
            other => {
                let mut fields = Map::new();
                fields.insert("value".to_string(), other.clone());
                fields
            }
        };

        OriginPayload {
            correlation_id: self.correlation_id,
            created_on: self.created_on,
            sent_time: Some(delivery.sent_time()),
            source_address: delivery.source_address().map(str::to_string),
            machine_name: self.machine_name.clone(),
            origin_app: self.origin_app().to_string(),
            event_id: self.event_id,
            payload,
        }
    }
}
