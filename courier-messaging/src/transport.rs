//! Broker transport contract

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::MessagingError;
use crate::message::Message;

/// Sends a reply for one specific inbound message
#[async_trait]
pub trait Replier: Send + Sync {
    async fn reply(&self, message: Message) -> Result<(), MessagingError>;
}

/// An inbound message together with its consume context
#[derive(Clone)]
pub struct Delivery {
    message: Message,
    source_address: Option<String>,
    replier: Option<Arc<dyn Replier>>,
}

impl Delivery {
    pub fn new(message: Message, source_address: Option<String>) -> Self {
        Self {
            message,
            source_address,
            replier: None,
        }
    }

    /// Attach the reply channel of a request delivery
    pub fn with_replier(mut self, replier: Arc<dyn Replier>) -> Self {
        self.replier = Some(replier);
        self
    }

    pub fn message(&self) -> &Message {
        &self.message
    }

    pub fn correlation_id(&self) -> Option<&str> {
        self.message.correlation_id.as_deref()
    }

    pub fn sent_time(&self) -> DateTime<Utc> {
        self.message.timestamp
    }

    pub fn source_address(&self) -> Option<&str> {
        self.source_address.as_deref()
    }

    pub fn can_respond(&self) -> bool {
        self.replier.is_some()
    }

    /// Reply to the sender of this delivery
    pub async fn respond(&self, response: Message) -> Result<(), MessagingError> {
        let replier = self.replier.as_ref().ok_or_else(|| {
            MessagingError::Publish(format!(
                "Message {} was not sent as a request; nothing to reply to",
                self.message.id
            ))
        })?;
        replier.reply(response).await
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("message", &self.message)
            .field("source_address", &self.source_address)
            .field("can_respond", &self.can_respond())
            .finish()
    }
}

/// Trait for handling received messages
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    /// Handle a received message
    async fn handle(&self, delivery: Delivery) -> Result<(), MessagingError>;
}

/// Function-based message handler
pub struct FnHandler<F>(pub F);

#[async_trait]
impl<F, Fut> MessageHandler for FnHandler<F>
where
    F: Fn(Delivery) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<(), MessagingError>> + Send,
{
    async fn handle(&self, delivery: Delivery) -> Result<(), MessagingError> {
        (self.0)(delivery).await
    }
}

/// Core trait for message brokers
///
/// Each endpoint subscribed to a topic receives every message published to
/// it once. A request goes to a single endpoint and resolves with the reply
/// it sends through [`Delivery::respond`].
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Publish a message
    async fn publish(&self, message: Message) -> Result<(), MessagingError>;

    /// Bind `handler` to `topic` under the named endpoint
    async fn subscribe(
        &self,
        endpoint: &str,
        topic: &str,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<(), MessagingError>;

    /// Send a request and wait for its correlated reply
    async fn request(&self, message: Message) -> Result<Message, MessagingError>;

    /// Check if connected to the broker
    fn is_connected(&self) -> bool {
        true
    }
}
