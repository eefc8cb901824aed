//! Handler registry and handler resolution
//!
//! The registry is populated once during startup and then shared read-only
//! behind an `Arc`. Resolution goes through [`HandlerResolver`] so a hosting
//! container can hand out scoped handler instances instead.

use crate::context::ExecutionContext;
use crate::event::{Event, EventKind};
use crate::handler::{DynEventHandler, EventHandler, TypedEventHandler};
use serde_json::Value;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

type HandlerFactory = Arc<dyn Fn(ExecutionContext) -> Arc<dyn DynEventHandler> + Send + Sync>;

type Decoder = fn(Value) -> Result<Arc<dyn Any + Send + Sync>, serde_json::Error>;

fn decode_as<E: Event>(value: Value) -> Result<Arc<dyn Any + Send + Sync>, serde_json::Error> {
    let event: E = serde_json::from_value(value)?;
    Ok(Arc::new(event))
}

/// Static description of an event type
#[derive(Clone, Copy)]
pub struct EventDescriptor {
    type_id: TypeId,
    name: &'static str,
    kind: EventKind,
    decode: Decoder,
}

impl EventDescriptor {
    pub fn of<E: Event>() -> Self {
        Self {
            type_id: TypeId::of::<E>(),
            name: std::any::type_name::<E>(),
            kind: E::KIND,
            decode: decode_as::<E>,
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Fully-qualified Rust type name
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// Rebuild the concrete event from its JSON form
    pub fn decode(&self, value: Value) -> Result<Arc<dyn Any + Send + Sync>, serde_json::Error> {
        (self.decode)(value)
    }
}

impl fmt::Debug for EventDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventDescriptor")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish()
    }
}

impl PartialEq for EventDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for EventDescriptor {}

/// Source of handler instances for an event type.
///
/// Implementations return handlers in registration order; the dispatcher
/// applies priority ordering.
pub trait HandlerResolver: Send + Sync + 'static {
    fn resolve(
        &self,
        event_type: TypeId,
        context: ExecutionContext,
    ) -> Vec<Arc<dyn DynEventHandler>>;
}

struct TypeEntry {
    descriptor: EventDescriptor,
    factories: Vec<HandlerFactory>,
}

/// Maps event types to their registered handlers
#[derive(Default)]
pub struct HandlerRegistry {
    entries: HashMap<TypeId, TypeEntry>,
    order: Vec<TypeId>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a shared handler instance for `E`
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// let mut registry = HandlerRegistry::new();
    /// registry.register::<OrderPlaced, _>(AuditHandler::default());
    /// let registry = Arc::new(registry);
    /// ```
    pub fn register<E, H>(&mut self, handler: H) -> &mut Self
    where
        E: Event,
        H: EventHandler<E>,
    {
        let shared: Arc<dyn DynEventHandler> = Arc::new(TypedEventHandler::new(handler));
        self.push::<E>(Arc::new(move |_: ExecutionContext| shared.clone()))
    }

    /// Register a factory producing a fresh handler for every resolution
    pub fn register_with<E, H, F>(&mut self, factory: F) -> &mut Self
    where
        E: Event,
        H: EventHandler<E>,
        F: Fn(ExecutionContext) -> H + Send + Sync + 'static,
    {
        self.push::<E>(Arc::new(move |context: ExecutionContext| {
            Arc::new(TypedEventHandler::new(factory(context))) as Arc<dyn DynEventHandler>
        }))
    }

    fn push<E: Event>(&mut self, factory: HandlerFactory) -> &mut Self {
        let type_id = TypeId::of::<E>();
        let order = &mut self.order;
        self.entries
            .entry(type_id)
            .or_insert_with(|| {
                order.push(type_id);
                TypeEntry {
                    descriptor: EventDescriptor::of::<E>(),
                    factories: Vec::new(),
                }
            })
            .factories
            .push(factory);
        self
    }

    /// Get handler count for an event type
    pub fn handler_count<E: Event>(&self) -> usize {
        self.entries
            .get(&TypeId::of::<E>())
            .map(|entry| entry.factories.len())
            .unwrap_or(0)
    }

    /// Every event type with at least one handler, in first-registration order
    pub fn event_types(&self) -> Vec<EventDescriptor> {
        self.order
            .iter()
            .filter_map(|type_id| self.entries.get(type_id))
            .map(|entry| entry.descriptor)
            .collect()
    }

    pub fn descriptor(&self, event_type: TypeId) -> Option<EventDescriptor> {
        self.entries.get(&event_type).map(|entry| entry.descriptor)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl HandlerResolver for HandlerRegistry {
    fn resolve(
        &self,
        event_type: TypeId,
        context: ExecutionContext,
    ) -> Vec<Arc<dyn DynEventHandler>> {
        self.entries
            .get(&event_type)
            .map(|entry| entry.factories.iter().map(|make| make(context)).collect())
            .unwrap_or_default()
    }
}
