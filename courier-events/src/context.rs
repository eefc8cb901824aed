//! Execution and origin context handed to handlers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use uuid::Uuid;

/// Where a handler chain runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutionContext {
    /// Awaited by the publisher, resolved from the ambient scope
    Foreground,
    /// Detached from the publisher, resolved from a long-lived scope
    Background,
}

impl ExecutionContext {
    pub fn is_background(self) -> bool {
        matches!(self, ExecutionContext::Background)
    }
}

/// Read-only snapshot of an inbound broker envelope.
///
/// Populated before a handler runs for a message that arrived from the broker.
/// `payload` is the message re-read as a generic JSON object so that handlers
/// can look at fields without knowing the concrete type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OriginPayload {
    pub correlation_id: Uuid,
    pub created_on: DateTime<Utc>,
    pub sent_time: Option<DateTime<Utc>>,
    pub source_address: Option<String>,
    pub machine_name: String,
    pub origin_app: String,
    pub event_id: Uuid,
    pub payload: Map<String, Value>,
}

impl OriginPayload {
    /// Look up a top-level field of the generic payload snapshot
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.payload.get(name)
    }
}

/// Context passed to every handler invocation
#[derive(Debug, Clone)]
pub struct HandlerContext {
    execution: ExecutionContext,
    origin: Option<Arc<OriginPayload>>,
}

impl HandlerContext {
    /// Context for an in-process publish
    pub fn local(execution: ExecutionContext) -> Self {
        Self {
            execution,
            origin: None,
        }
    }

    /// Context for a message delivered by the broker.
    ///
    /// Remote deliveries have no waiting caller, so they always run detached.
    pub fn remote(origin: Arc<OriginPayload>) -> Self {
        Self {
            execution: ExecutionContext::Background,
            origin: Some(origin),
        }
    }

    pub fn execution(&self) -> ExecutionContext {
        self.execution
    }

    pub fn origin(&self) -> Option<&OriginPayload> {
        self.origin.as_deref()
    }

    pub fn is_remote(&self) -> bool {
        self.origin.is_some()
    }
}
