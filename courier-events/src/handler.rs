//! Handler traits and the type-erased wrapper stored in the registry

use crate::context::HandlerContext;
use crate::event::Event;
use async_trait::async_trait;
use std::any::Any;
use std::marker::PhantomData;

/// Outcome of a successful handler run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Propagation {
    /// Run the next handler in the chain
    Continue,
    /// End the chain; remaining handlers are skipped
    Stop,
}

impl Propagation {
    pub fn should_continue(self) -> bool {
        matches!(self, Propagation::Continue)
    }
}

impl From<bool> for Propagation {
    fn from(proceed: bool) -> Self {
        if proceed {
            Propagation::Continue
        } else {
            Propagation::Stop
        }
    }
}

pub type HandlerResult = Result<Propagation, EventHandlerError>;

/// Event handler trait
///
/// Handlers for the same event type run in descending `priority` order.
#[async_trait]
pub trait EventHandler<E: Event>: Send + Sync + 'static {
    /// Higher runs first
    fn priority(&self) -> i32 {
        0
    }

    /// Handle the event
    async fn handle(&self, event: &E, ctx: &HandlerContext) -> HandlerResult;
}

/// Event handler error
#[derive(Debug, thiserror::Error)]
pub enum EventHandlerError {
    /// The handler does not support this event yet; the chain continues
    #[error("Not implemented: {0}")]
    NotImplemented(String),

    #[error("Handler failed: {0}")]
    HandlerFailed(String),

    #[error("Event processing error: {0}")]
    ProcessingError(String),

    #[error("Type mismatch: handler expects {expected}")]
    TypeMismatch { expected: &'static str },
}

impl EventHandlerError {
    pub fn not_implemented(msg: impl Into<String>) -> Self {
        Self::NotImplemented(msg.into())
    }

    pub fn failed(msg: impl Into<String>) -> Self {
        Self::HandlerFailed(msg.into())
    }

    pub fn is_not_implemented(&self) -> bool {
        matches!(self, Self::NotImplemented(_))
    }
}

/// Type-erased event handler
#[async_trait]
pub trait DynEventHandler: Send + Sync {
    fn priority(&self) -> i32;

    /// Name of the concrete handler type, used in logs
    fn handler_name(&self) -> &'static str;

    /// Handle event (type-erased)
    async fn handle_dyn(
        &self,
        event: &(dyn Any + Send + Sync),
        ctx: &HandlerContext,
    ) -> HandlerResult;
}

/// Wrapper for typed event handlers
pub struct TypedEventHandler<E: Event, H: EventHandler<E>> {
    handler: H,
    _phantom: PhantomData<fn() -> E>,
}

impl<E: Event, H: EventHandler<E>> TypedEventHandler<E, H> {
    pub fn new(handler: H) -> Self {
        Self {
            handler,
            _phantom: PhantomData,
        }
    }
}

#[async_trait]
impl<E: Event, H: EventHandler<E>> DynEventHandler for TypedEventHandler<E, H> {
    fn priority(&self) -> i32 {
        self.handler.priority()
    }

    fn handler_name(&self) -> &'static str {
        std::any::type_name::<H>()
    }

    async fn handle_dyn(
        &self,
        event: &(dyn Any + Send + Sync),
        ctx: &HandlerContext,
    ) -> HandlerResult {
        match event.downcast_ref::<E>() {
            Some(typed_event) => self.handler.handle(typed_event, ctx).await,
            None => Err(EventHandlerError::TypeMismatch {
                expected: std::any::type_name::<E>(),
            }),
        }
    }
}
