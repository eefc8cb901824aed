//! Distributed event bus
//!
//! Wraps the local [`EventBus`] and routes distributed event kinds through a
//! broker [`Transport`] instead of dispatching them in-process.

use std::sync::Arc;
use std::time::Duration;

use courier_events::{
    Event, EventBus, EventBusBuilder, EventHandler, ExecutionContext, HandlerRegistry,
    HandlerResolver, OriginPayload,
};
use tracing::{debug, info, instrument};

use crate::config::{EntityNaming, HostIdentity, MessagingConfig};
use crate::envelope::{Envelope, RawEnvelope};
use crate::error::{ConfigurationError, MessagingError};
use crate::memory::InMemoryTransport;
use crate::responder::{Responder, ResponderRegistry};
use crate::transport::Transport;
use crate::validator::{ConsumerRegistry, StartupValidator};

/// Reply to a request that may answer with either of two response types
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseEither<T, E> {
    Success(Envelope<T>),
    Error(Envelope<E>),
}

impl<T, E> ResponseEither<T, E> {
    pub fn is_success(&self) -> bool {
        matches!(self, ResponseEither::Success(_))
    }

    pub fn success(&self) -> Option<&T> {
        match self {
            ResponseEither::Success(envelope) => Some(&envelope.message),
            ResponseEither::Error(_) => None,
        }
    }

    pub fn error(&self) -> Option<&E> {
        match self {
            ResponseEither::Success(_) => None,
            ResponseEither::Error(envelope) => Some(&envelope.message),
        }
    }

    /// The `(success, error)` pair; exactly one side is set
    pub fn into_pair(self) -> (Option<T>, Option<E>) {
        match self {
            ResponseEither::Success(envelope) => (Some(envelope.message), None),
            ResponseEither::Error(envelope) => (None, Some(envelope.message)),
        }
    }

    pub fn into_result(self) -> Result<Envelope<T>, Envelope<E>> {
        match self {
            ResponseEither::Success(envelope) => Ok(envelope),
            ResponseEither::Error(envelope) => Err(envelope),
        }
    }
}

/// Event bus bridged to a message broker
#[derive(Clone)]
pub struct DistributedBus {
    local: EventBus,
    transport: Arc<dyn Transport>,
    identity: Arc<HostIdentity>,
    naming: EntityNaming,
    consumers: Arc<ConsumerRegistry>,
}

impl DistributedBus {
    pub fn builder(config: MessagingConfig) -> DistributedBusBuilder {
        DistributedBusBuilder::new(config)
    }

    /// Publish an event.
    ///
    /// Distributed kinds are stamped and handed to the broker; transport
    /// errors are returned. Local kinds go through the in-process bus, which
    /// never fails. Request kinds are rejected since nobody would receive
    /// the reply.
    pub async fn publish<E: Event>(
        &self,
        event: E,
        run_in_background: bool,
    ) -> Result<(), MessagingError> {
        self.publish_with_origin(Arc::new(event), run_in_background, None)
            .await
    }

    /// Publish an already shared instance; repeats inside the dedup window
    /// are dropped
    pub async fn publish_shared<E: Event>(
        &self,
        event: Arc<E>,
        run_in_background: bool,
    ) -> Result<(), MessagingError> {
        self.publish_with_origin(event, run_in_background, None)
            .await
    }

    /// Re-publish an event on behalf of an inbound message, keeping its
    /// correlation id and origin application
    pub async fn forward<E: Event>(
        &self,
        event: E,
        origin: &OriginPayload,
    ) -> Result<(), MessagingError> {
        self.publish_with_origin(Arc::new(event), false, Some(origin))
            .await
    }

    #[instrument(skip_all, fields(event = std::any::type_name::<E>()))]
    pub async fn publish_with_origin<E: Event>(
        &self,
        event: Arc<E>,
        run_in_background: bool,
        origin: Option<&OriginPayload>,
    ) -> Result<(), MessagingError> {
        if !E::KIND.is_distributed() {
            self.local.publish_shared(event, run_in_background).await;
            return Ok(());
        }
        if E::KIND.is_request() {
            return Err(MessagingError::Publish(format!(
                "{} is a request type; send it with get_response",
                std::any::type_name::<E>()
            )));
        }

        if !self.local.admit(&event) {
            return Ok(());
        }

        let topic = self.naming.entity_name::<E>();
        let mut envelope = Envelope::new(topic.clone(), &*event);
        if let Some(origin) = origin {
            envelope = envelope
                .with_correlation_id(origin.correlation_id)
                .with_origin_app(origin.origin_app.clone());
        }
        self.stamp(&mut envelope);

        let message = envelope.to_message(topic)?;
        self.transport.publish(message).await?;
        debug!(
            correlation_id = %envelope.correlation_id,
            origin_app = envelope.origin_app(),
            "Event handed to broker"
        );
        Ok(())
    }

    /// Stamp this host's identity on an outgoing envelope
    pub fn stamp<T>(&self, envelope: &mut Envelope<T>) {
        envelope.stamp(&self.identity);
    }

    /// Send a request and wait for its single correlated response
    pub async fn get_response<Req, Res>(
        &self,
        request: Req,
    ) -> Result<Envelope<Res>, MessagingError>
    where
        Req: Event,
        Res: Event,
    {
        self.get_response_for(Envelope::new(self.naming.entity_name::<Req>(), request))
            .await
    }

    /// Send a request with a caller-built envelope, e.g. to pin the correlation id
    pub async fn get_response_for<Req, Res>(
        &self,
        envelope: Envelope<Req>,
    ) -> Result<Envelope<Res>, MessagingError>
    where
        Req: Event,
        Res: Event,
    {
        let reply = self.send_request(envelope).await?;
        let mut response = reply.decode::<Res>()?;
        response.current_app = self.identity.app_name.clone();
        Ok(response)
    }

    /// Like [`get_response`](Self::get_response) but returns only the payload
    pub async fn request<Req, Res>(&self, request: Req) -> Result<Res, MessagingError>
    where
        Req: Event,
        Res: Event,
    {
        Ok(self.get_response::<Req, Res>(request).await?.into_message())
    }

    /// Send a request answered by either a success or an error response.
    ///
    /// A reply of any other type is an [`MessagingError::UnknownResponseType`].
    pub async fn get_response_either<Req, Res, Fault>(
        &self,
        request: Req,
    ) -> Result<ResponseEither<Res, Fault>, MessagingError>
    where
        Req: Event,
        Res: Event,
        Fault: Event,
    {
        let envelope = Envelope::new(self.naming.entity_name::<Req>(), request);
        let mut reply = self.send_request(envelope).await?;
        reply.current_app = self.identity.app_name.clone();

        if reply.message_type == self.naming.entity_name::<Res>() {
            Ok(ResponseEither::Success(reply.decode()?))
        } else if reply.message_type == self.naming.entity_name::<Fault>() {
            Ok(ResponseEither::Error(reply.decode()?))
        } else {
            Err(MessagingError::UnknownResponseType(reply.message_type))
        }
    }

    #[instrument(skip_all, fields(request = std::any::type_name::<Req>()))]
    async fn send_request<Req: Event>(
        &self,
        mut envelope: Envelope<Req>,
    ) -> Result<RawEnvelope, MessagingError> {
        if !Req::KIND.is_request() {
            return Err(MessagingError::Publish(format!(
                "{} is not a request type",
                std::any::type_name::<Req>()
            )));
        }

        self.stamp(&mut envelope);
        let expected = envelope.correlation_id;
        let message = envelope.to_message(self.naming.entity_name::<Req>())?;

        let reply = self.transport.request(message).await?;
        let raw = RawEnvelope::from_message(&reply)?;
        if raw.correlation_id != expected {
            return Err(MessagingError::CorrelationMismatch {
                expected: expected.to_string(),
                actual: raw.correlation_id.to_string(),
            });
        }
        debug!(
            correlation_id = %expected,
            from_app = raw.from_app.as_deref().unwrap_or_default(),
            response = %raw.message_type,
            "Response received"
        );
        Ok(raw)
    }

    pub fn local(&self) -> &EventBus {
        &self.local
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub fn identity(&self) -> &HostIdentity {
        &self.identity
    }

    pub fn consumers(&self) -> &ConsumerRegistry {
        &self.consumers
    }
}

/// Builder collecting handlers and responders before validation
pub struct DistributedBusBuilder {
    config: MessagingConfig,
    handlers: HandlerRegistry,
    responders: ResponderRegistry,
    transport: Option<Arc<dyn Transport>>,
    background: Option<Arc<dyn HandlerResolver>>,
    dedup_window: Option<Duration>,
}

impl DistributedBusBuilder {
    pub fn new(config: MessagingConfig) -> Self {
        Self {
            config,
            handlers: HandlerRegistry::new(),
            responders: ResponderRegistry::new(),
            transport: None,
            background: None,
            dedup_window: None,
        }
    }

    /// Register a shared handler instance
    pub fn handler<E, H>(mut self, handler: H) -> Self
    where
        E: Event,
        H: EventHandler<E>,
    {
        self.handlers.register::<E, H>(handler);
        self
    }

    /// Register a handler factory invoked per resolution
    pub fn handler_with<E, H, F>(mut self, factory: F) -> Self
    where
        E: Event,
        H: EventHandler<E>,
        F: Fn(ExecutionContext) -> H + Send + Sync + 'static,
    {
        self.handlers.register_with::<E, H, F>(factory);
        self
    }

    pub fn responder<R, P>(mut self, responder: P) -> Self
    where
        R: Event,
        P: Responder<R>,
    {
        self.responders.register::<R, P>(responder);
        self
    }

    /// Broker transport; defaults to an [`InMemoryTransport`]
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn background_resolver(mut self, resolver: Arc<dyn HandlerResolver>) -> Self {
        self.background = Some(resolver);
        self
    }

    pub fn dedup_window(mut self, window: Duration) -> Self {
        self.dedup_window = Some(window);
        self
    }

    /// Validate the registrations and assemble the bus.
    ///
    /// Fails when the configuration is invalid or a request type has more
    /// than one responder. Consumers are not bound yet; see
    /// [`start`](Self::start).
    pub fn build(self) -> Result<DistributedBus, ConfigurationError> {
        self.config.validate()?;
        let identity = Arc::new(self.config.identity());
        let naming = self.config.entity_naming;
        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(InMemoryTransport::from_config(&self.config)),
        };

        let registry = Arc::new(self.handlers);
        let mut local = EventBusBuilder::new(registry.clone());
        if let Some(resolver) = self.background {
            local = local.background_resolver(resolver);
        }
        if let Some(window) = self.dedup_window {
            local = local.dedup_window(window);
        }
        let local = local.build();

        let consumers = StartupValidator::new(identity.clone(), naming).validate(
            &registry,
            &self.responders,
            local.resolver(ExecutionContext::Background).clone(),
        )?;

        info!(
            app = %identity.app_name,
            machine = %identity.machine_name,
            consumers = consumers.len(),
            "Distributed bus configured"
        );

        Ok(DistributedBus {
            local,
            transport,
            identity,
            naming,
            consumers: Arc::new(consumers),
        })
    }

    /// Build the bus and bind its consumers on the transport
    pub async fn start(self) -> Result<DistributedBus, MessagingError> {
        let bus = self.build()?;
        bus.consumers.start(bus.transport.as_ref()).await?;
        Ok(bus)
    }
}
