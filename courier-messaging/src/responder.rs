//! Request responders and the per-request reply context

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use courier_events::{Event, EventDescriptor, EventHandlerError, OriginPayload};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::config::{EntityNaming, HostIdentity};
use crate::envelope::Envelope;
use crate::error::MessagingError;
use crate::transport::Delivery;

/// Answers a request type.
///
/// At most one responder may be registered per request type. The responder
/// replies through [`RequestContext::send_response`].
#[async_trait]
pub trait Responder<R: Event>: Send + Sync + 'static {
    async fn respond(&self, request: &R, ctx: &RequestContext) -> Result<(), EventHandlerError>;
}

/// Correlation context bound to one inbound request
pub struct RequestContext {
    origin: Arc<OriginPayload>,
    identity: Arc<HostIdentity>,
    naming: EntityNaming,
    delivery: Delivery,
    responded: AtomicBool,
}

impl RequestContext {
    pub fn new(
        origin: Arc<OriginPayload>,
        identity: Arc<HostIdentity>,
        naming: EntityNaming,
        delivery: Delivery,
    ) -> Self {
        Self {
            origin,
            identity,
            naming,
            delivery,
            responded: AtomicBool::new(false),
        }
    }

    /// Snapshot of the inbound request envelope
    pub fn origin(&self) -> &OriginPayload {
        &self.origin
    }

    pub fn correlation_id(&self) -> Uuid {
        self.origin.correlation_id
    }

    pub fn has_responded(&self) -> bool {
        self.responded.load(Ordering::SeqCst)
    }

    /// Reply to the request this context was created for.
    ///
    /// The reply echoes the request's correlation id and origin app, and is
    /// stamped as coming from this application.
    #[instrument(skip(self, response), fields(correlation_id = %self.origin.correlation_id))]
    pub async fn send_response<T: Event>(&self, response: T) -> Result<(), MessagingError> {
        if !T::KIND.is_response() {
            return Err(MessagingError::Publish(format!(
                "{} is not a response type",
                std::any::type_name::<T>()
            )));
        }

        let mut envelope = Envelope::new(self.naming.entity_name::<T>(), response)
            .with_correlation_id(self.origin.correlation_id)
            .with_origin_app(self.origin.origin_app.clone());
        envelope.stamp(&self.identity);
        envelope.from_app = Some(self.identity.app_name.clone());

        let message = envelope.to_message(envelope.message_type.clone())?;
        self.delivery.respond(message).await?;
        self.responded.store(true, Ordering::SeqCst);
        debug!(response = %envelope.message_type, "Response sent");
        Ok(())
    }
}

/// Type-erased responder
#[async_trait]
pub trait DynResponder: Send + Sync {
    fn responder_name(&self) -> &'static str;

    async fn respond_dyn(
        &self,
        request: &(dyn Any + Send + Sync),
        ctx: &RequestContext,
    ) -> Result<(), EventHandlerError>;
}

/// Wrapper for typed responders
pub struct TypedResponder<R: Event, P: Responder<R>> {
    responder: P,
    _phantom: PhantomData<fn() -> R>,
}

impl<R: Event, P: Responder<R>> TypedResponder<R, P> {
    pub fn new(responder: P) -> Self {
        Self {
            responder,
            _phantom: PhantomData,
        }
    }
}

#[async_trait]
impl<R: Event, P: Responder<R>> DynResponder for TypedResponder<R, P> {
    fn responder_name(&self) -> &'static str {
        std::any::type_name::<P>()
    }

    async fn respond_dyn(
        &self,
        request: &(dyn Any + Send + Sync),
        ctx: &RequestContext,
    ) -> Result<(), EventHandlerError> {
        match request.downcast_ref::<R>() {
            Some(typed) => self.responder.respond(typed, ctx).await,
            None => Err(EventHandlerError::TypeMismatch {
                expected: std::any::type_name::<R>(),
            }),
        }
    }
}

struct ResponderEntry {
    descriptor: EventDescriptor,
    responders: Vec<(TypeId, Arc<dyn DynResponder>)>,
}

/// Responders keyed by the request type they answer
#[derive(Default)]
pub struct ResponderRegistry {
    entries: HashMap<TypeId, ResponderEntry>,
    order: Vec<TypeId>,
}

impl ResponderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `responder` for `R`.
    ///
    /// Responders are counted by implementation type; registering the same
    /// type again has no effect.
    pub fn register<R, P>(&mut self, responder: P) -> &mut Self
    where
        R: Event,
        P: Responder<R>,
    {
        let request_type = TypeId::of::<R>();
        let implementation = TypeId::of::<P>();
        let order = &mut self.order;
        let entry = self.entries.entry(request_type).or_insert_with(|| {
            order.push(request_type);
            ResponderEntry {
                descriptor: EventDescriptor::of::<R>(),
                responders: Vec::new(),
            }
        });

        if entry.responders.iter().any(|(id, _)| *id == implementation) {
            debug!(
                request = std::any::type_name::<R>(),
                responder = std::any::type_name::<P>(),
                "Responder already registered"
            );
            return self;
        }
        let erased: Arc<dyn DynResponder> = Arc::new(TypedResponder::new(responder));
        entry.responders.push((implementation, erased));
        self
    }

    /// Distinct responders registered for `R`
    pub fn responder_count<R: Event>(&self) -> usize {
        self.count_for(TypeId::of::<R>())
    }

    pub fn count_for(&self, request_type: TypeId) -> usize {
        self.entries
            .get(&request_type)
            .map(|entry| entry.responders.len())
            .unwrap_or(0)
    }

    /// Every request type with its responder count, in registration order
    pub fn request_types(&self) -> Vec<(EventDescriptor, usize)> {
        self.order
            .iter()
            .filter_map(|type_id| self.entries.get(type_id))
            .map(|entry| (entry.descriptor, entry.responders.len()))
            .collect()
    }

    /// The responder for a request type
    pub fn resolve(&self, request_type: TypeId) -> Option<Arc<dyn DynResponder>> {
        self.entries
            .get(&request_type)
            .and_then(|entry| entry.responders.first())
            .map(|(_, responder)| responder.clone())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
