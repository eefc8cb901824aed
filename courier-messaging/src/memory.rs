//! In-process loopback transport
//!
//! Implements the full [`Transport`] contract without a broker: published
//! messages are handed to every endpoint bound to the topic on their own
//! task, and requests are correlated with their replies through a map of
//! pending oneshot channels.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::oneshot;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::config::MessagingConfig;
use crate::error::MessagingError;
use crate::message::Message;
use crate::transport::{Delivery, MessageHandler, Replier, Transport};

type PendingReplies = DashMap<String, oneshot::Sender<Result<Message, MessagingError>>>;

struct Subscriber {
    endpoint: String,
    handler: Arc<dyn MessageHandler>,
}

/// Loopback transport for tests and single-process deployments
pub struct InMemoryTransport {
    address: String,
    topics: DashMap<String, Vec<Subscriber>>,
    pending: Arc<PendingReplies>,
    request_timeout: Duration,
    published: AtomicU64,
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self {
            address: "loopback://courier".to_string(),
            topics: DashMap::new(),
            pending: Arc::new(DashMap::new()),
            request_timeout: Duration::from_secs(30),
            published: AtomicU64::new(0),
        }
    }

    pub fn from_config(config: &MessagingConfig) -> Self {
        Self::new()
            .with_address(format!("loopback://{}", config.machine_name))
            .with_request_timeout(config.request_timeout())
    }

    /// Source address reported on deliveries
    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = address.into();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Number of messages accepted by `publish`
    pub fn publish_count(&self) -> u64 {
        self.published.load(Ordering::SeqCst)
    }

    /// Requests still waiting for a reply
    pub fn pending_requests(&self) -> usize {
        self.pending.len()
    }

    /// Every `(topic, endpoint)` binding, sorted
    pub fn subscriptions(&self) -> Vec<(String, String)> {
        let mut bindings: Vec<_> = self
            .topics
            .iter()
            .flat_map(|entry| {
                let topic = entry.key().clone();
                entry
                    .value()
                    .iter()
                    .map(move |sub| (topic.clone(), sub.endpoint.clone()))
                    .collect::<Vec<_>>()
            })
            .collect();
        bindings.sort();
        bindings
    }

    fn handlers_for(&self, topic: &str) -> Vec<Arc<dyn MessageHandler>> {
        self.topics
            .get(topic)
            .map(|subs| subs.iter().map(|sub| sub.handler.clone()).collect())
            .unwrap_or_default()
    }
}

impl Default for InMemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

struct LoopbackReplier {
    pending: Arc<PendingReplies>,
    correlation_id: String,
}

#[async_trait]
impl Replier for LoopbackReplier {
    async fn reply(&self, message: Message) -> Result<(), MessagingError> {
        let (_, sender) = self.pending.remove(&self.correlation_id).ok_or_else(|| {
            MessagingError::NotFound(format!(
                "No pending request for correlation id {}",
                self.correlation_id
            ))
        })?;
        sender
            .send(Ok(message))
            .map_err(|_| MessagingError::ChannelClosed("Requester stopped waiting".to_string()))
    }
}

#[async_trait]
impl Transport for InMemoryTransport {
    async fn publish(&self, message: Message) -> Result<(), MessagingError> {
        self.published.fetch_add(1, Ordering::SeqCst);

        let handlers = self.handlers_for(&message.topic);
        if handlers.is_empty() {
            debug!(topic = %message.topic, "No endpoints bound, message dropped");
            return Ok(());
        }

        for handler in handlers {
            let delivery = Delivery::new(message.clone(), Some(self.address.clone()));
            let topic = message.topic.clone();
            tokio::spawn(async move {
                if let Err(e) = handler.handle(delivery).await {
                    warn!(topic = %topic, error = %e, "Consumer failed to handle message");
                }
            });
        }
        Ok(())
    }

    async fn subscribe(
        &self,
        endpoint: &str,
        topic: &str,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<(), MessagingError> {
        let mut subscribers = self.topics.entry(topic.to_string()).or_default();
        if subscribers.iter().any(|sub| sub.endpoint == endpoint) {
            return Err(MessagingError::AlreadyExists(format!(
                "Endpoint {} is already bound to {}",
                endpoint, topic
            )));
        }
        subscribers.push(Subscriber {
            endpoint: endpoint.to_string(),
            handler,
        });
        debug!(endpoint, topic, "Endpoint bound");
        Ok(())
    }

    #[instrument(skip(self, message), fields(topic = %message.topic))]
    async fn request(&self, mut message: Message) -> Result<Message, MessagingError> {
        let target = self
            .handlers_for(&message.topic)
            .into_iter()
            .next()
            .ok_or_else(|| {
                MessagingError::NotFound(format!("No consumer for request topic {}", message.topic))
            })?;

        let correlation_id = message
            .correlation_id
            .get_or_insert_with(|| Uuid::new_v4().to_string())
            .clone();
        message.reply_to = Some(format!("{}/replies", self.address));

        let (sender, receiver) = oneshot::channel();
        match self.pending.entry(correlation_id.clone()) {
            Entry::Occupied(_) => {
                return Err(MessagingError::AlreadyExists(format!(
                    "Request {} is already in flight",
                    correlation_id
                )));
            }
            Entry::Vacant(vacant) => {
                vacant.insert(sender);
            }
        }

        let replier = Arc::new(LoopbackReplier {
            pending: self.pending.clone(),
            correlation_id: correlation_id.clone(),
        });
        let delivery = Delivery::new(message, Some(self.address.clone())).with_replier(replier);
        let pending = self.pending.clone();
        let key = correlation_id.clone();
        tokio::spawn(async move {
            if let Err(e) = target.handle(delivery).await
                && let Some((_, sender)) = pending.remove(&key)
            {
                let _ = sender.send(Err(e));
            }
        });

        match tokio::time::timeout(self.request_timeout, receiver).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(_)) => Err(MessagingError::ChannelClosed(format!(
                "Request {} was dropped without a reply",
                correlation_id
            ))),
            Err(_) => {
                self.pending.remove(&correlation_id);
                Err(MessagingError::Timeout(format!(
                    "No reply to request {} within {:?}",
                    correlation_id, self.request_timeout
                )))
            }
        }
    }
}
