//! Startup validation and consumer registration

use std::any::TypeId;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use courier_events::{EventDescriptor, EventKind, HandlerRegistry, HandlerResolver};
use tracing::{debug, info};

use crate::config::{EntityNaming, HostIdentity};
use crate::consumer::{FanOutConsumer, RequestConsumer};
use crate::error::{ConfigurationError, MessagingError};
use crate::responder::ResponderRegistry;
use crate::transport::{MessageHandler, Transport};

/// How an adapter treats inbound messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerMode {
    /// Every local handler runs concurrently
    FanOut,
    /// The single responder answers
    Request,
}

/// One generated broker consumer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerRegistration {
    pub message_type: &'static str,
    pub topic: String,
    pub endpoint: String,
    pub mode: ConsumerMode,
}

/// Consumers produced by a successful validation
#[derive(Default)]
pub struct ConsumerRegistry {
    consumers: Vec<(ConsumerRegistration, Arc<dyn MessageHandler>)>,
}

impl ConsumerRegistry {
    pub fn registrations(&self) -> impl Iterator<Item = &ConsumerRegistration> {
        self.consumers.iter().map(|(registration, _)| registration)
    }

    /// Registration for a message type, by Rust type name
    pub fn find(&self, message_type: &str) -> Option<&ConsumerRegistration> {
        self.registrations()
            .find(|registration| registration.message_type == message_type)
    }

    pub fn len(&self) -> usize {
        self.consumers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.consumers.is_empty()
    }

    /// Bind every consumer on the transport
    pub async fn start(&self, transport: &dyn Transport) -> Result<(), MessagingError> {
        for (registration, handler) in &self.consumers {
            transport
                .subscribe(&registration.endpoint, &registration.topic, handler.clone())
                .await?;
            info!(
                endpoint = %registration.endpoint,
                topic = %registration.topic,
                mode = ?registration.mode,
                "Consumer started"
            );
        }
        Ok(())
    }

    fn push(&mut self, registration: ConsumerRegistration, handler: Arc<dyn MessageHandler>) {
        self.consumers.push((registration, handler));
    }
}

impl fmt::Debug for ConsumerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.registrations()).finish()
    }
}

/// Checks handler and responder registrations before any traffic flows.
///
/// Distributed types with handlers get a fan-out consumer. Request types get
/// a request consumer when exactly one responder answers them; none is
/// tolerated, more than one is a fatal [`ConfigurationError`].
pub struct StartupValidator {
    identity: Arc<HostIdentity>,
    naming: EntityNaming,
}

impl StartupValidator {
    pub fn new(identity: Arc<HostIdentity>, naming: EntityNaming) -> Self {
        Self { identity, naming }
    }

    pub fn validate(
        &self,
        handlers: &HandlerRegistry,
        responders: &ResponderRegistry,
        resolver: Arc<dyn HandlerResolver>,
    ) -> Result<ConsumerRegistry, ConfigurationError> {
        let mut consumers = ConsumerRegistry::default();
        let mut covered: HashSet<TypeId> = HashSet::new();

        for (descriptor, count) in responders.request_types() {
            if !descriptor.kind().is_request() {
                return Err(ConfigurationError::NotARequest {
                    message_type: descriptor.name(),
                });
            }
            if count > 1 {
                return Err(ConfigurationError::AmbiguousResponder {
                    message_type: descriptor.name(),
                    count,
                });
            }
            let Some(responder) = responders.resolve(descriptor.type_id()) else {
                continue;
            };

            let handler = RequestConsumer::new(
                descriptor,
                responder,
                self.identity.clone(),
                self.naming,
            );
            consumers.push(
                self.registration(&descriptor, ConsumerMode::Request),
                Arc::new(handler),
            );
            covered.insert(descriptor.type_id());
        }

        for descriptor in handlers.event_types() {
            if covered.contains(&descriptor.type_id()) {
                continue;
            }
            match descriptor.kind() {
                EventKind::Distributed => {
                    let handler = FanOutConsumer::new(descriptor, resolver.clone());
                    consumers.push(
                        self.registration(&descriptor, ConsumerMode::FanOut),
                        Arc::new(handler),
                    );
                }
                EventKind::Request => {
                    debug!(
                        request = descriptor.name(),
                        "No responder registered, request consumer skipped"
                    );
                }
                EventKind::Local | EventKind::Response => {}
            }
        }

        debug!(consumers = consumers.len(), "Startup validation passed");
        Ok(consumers)
    }

    fn registration(
        &self,
        descriptor: &EventDescriptor,
        mode: ConsumerMode,
    ) -> ConsumerRegistration {
        let topic = self.naming.format(descriptor.name());
        ConsumerRegistration {
            message_type: descriptor.name(),
            endpoint: self.identity.endpoint(&topic),
            topic,
            mode,
        }
    }
}
