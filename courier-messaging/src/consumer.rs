//! Broker-facing adapters that turn inbound messages back into handler calls

use std::sync::Arc;

use async_trait::async_trait;
use courier_events::{
    EventDescriptor, ExecutionContext, HandlerContext, HandlerResolver, OriginPayload, fan_out,
};
use tracing::{debug, error, warn};

use crate::config::{EntityNaming, HostIdentity};
use crate::envelope::RawEnvelope;
use crate::error::MessagingError;
use crate::responder::{DynResponder, RequestContext};
use crate::transport::{Delivery, MessageHandler};

fn unpack(
    descriptor: &EventDescriptor,
    delivery: &Delivery,
) -> Result<(Arc<OriginPayload>, Arc<dyn std::any::Any + Send + Sync>), MessagingError> {
    let raw = RawEnvelope::from_message(delivery.message())?;
    let origin = Arc::new(raw.origin_payload(delivery));
    let event = descriptor
        .decode(raw.message)
        .map_err(|e| MessagingError::Deserialization(e.to_string()))?;
    Ok((origin, event))
}

/// Runs every local handler of a distributed event concurrently.
///
/// Each handler gets its own context carrying the inbound origin snapshot.
/// Handler failures are logged and never reach the broker.
pub struct FanOutConsumer {
    descriptor: EventDescriptor,
    resolver: Arc<dyn HandlerResolver>,
}

impl FanOutConsumer {
    pub fn new(descriptor: EventDescriptor, resolver: Arc<dyn HandlerResolver>) -> Self {
        Self {
            descriptor,
            resolver,
        }
    }
}

#[async_trait]
impl MessageHandler for FanOutConsumer {
    async fn handle(&self, delivery: Delivery) -> Result<(), MessagingError> {
        let (origin, event) = unpack(&self.descriptor, &delivery)?;

        let handlers = self
            .resolver
            .resolve(self.descriptor.type_id(), ExecutionContext::Background);
        if handlers.is_empty() {
            debug!(event = self.descriptor.name(), "No handlers registered");
            return Ok(());
        }

        let correlation_id = origin.correlation_id;
        let report = fan_out(
            handlers,
            event,
            self.descriptor.name(),
            HandlerContext::remote(origin),
        )
        .await;

        if report.failed > 0 {
            warn!(
                event = self.descriptor.name(),
                %correlation_id,
                invoked = report.invoked,
                failed = report.failed,
                "Remote fan-out finished with failures"
            );
        } else {
            debug!(
                event = self.descriptor.name(),
                %correlation_id,
                invoked = report.invoked,
                "Remote fan-out finished"
            );
        }
        Ok(())
    }
}

/// Hands an inbound request to its single responder
pub struct RequestConsumer {
    descriptor: EventDescriptor,
    responder: Arc<dyn DynResponder>,
    identity: Arc<HostIdentity>,
    naming: EntityNaming,
}

impl RequestConsumer {
    pub fn new(
        descriptor: EventDescriptor,
        responder: Arc<dyn DynResponder>,
        identity: Arc<HostIdentity>,
        naming: EntityNaming,
    ) -> Self {
        Self {
            descriptor,
            responder,
            identity,
            naming,
        }
    }
}

#[async_trait]
impl MessageHandler for RequestConsumer {
    async fn handle(&self, delivery: Delivery) -> Result<(), MessagingError> {
        let (origin, request) = unpack(&self.descriptor, &delivery)?;
        let ctx = RequestContext::new(origin, self.identity.clone(), self.naming, delivery);

        if let Err(e) = self.responder.respond_dyn(&*request, &ctx).await {
            error!(
                request = self.descriptor.name(),
                responder = self.responder.responder_name(),
                correlation_id = %ctx.correlation_id(),
                error = %e,
                "Responder failed"
            );
            return Err(MessagingError::Handler(e.to_string()));
        }

        if !ctx.has_responded() {
            warn!(
                request = self.descriptor.name(),
                responder = self.responder.responder_name(),
                correlation_id = %ctx.correlation_id(),
                "Responder finished without sending a response"
            );
        }
        Ok(())
    }
}
