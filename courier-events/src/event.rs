//! Event definitions and capability kinds

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::Debug;

/// Capability of an event type.
///
/// The kind is a property of the type, not of an instance, and decides how the
/// bus routes it: local events are dispatched in-process, everything else is
/// handed to a broker transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Dispatched in-process only
    #[default]
    Local,
    /// Fanned out to every subscribed application through the broker
    Distributed,
    /// Answered by exactly one responder through the broker
    Request,
    /// Reply to a request, correlated by correlation id
    Response,
}

impl EventKind {
    /// Whether events of this kind travel through the broker
    pub fn is_distributed(self) -> bool {
        !matches!(self, EventKind::Local)
    }

    /// Whether this kind expects a single correlated reply
    pub fn is_request(self) -> bool {
        matches!(self, EventKind::Request)
    }

    /// Whether this kind is a reply to a request
    pub fn is_response(self) -> bool {
        matches!(self, EventKind::Response)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Local => "local",
            EventKind::Distributed => "distributed",
            EventKind::Request => "request",
            EventKind::Response => "response",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event trait
///
/// All events must implement this trait to be published through the event bus.
/// Events are serializable so that distributed kinds can cross the broker and
/// so that handlers can inspect a generic snapshot of inbound payloads.
///
/// ```rust,ignore
/// #[derive(Debug, Clone, Serialize, Deserialize)]
/// struct OrderPlaced {
///     order_id: String,
/// }
///
/// impl Event for OrderPlaced {
///     const KIND: EventKind = EventKind::Distributed;
/// }
/// ```
pub trait Event: Serialize + DeserializeOwned + Send + Sync + Debug + 'static {
    /// Routing capability of this event type
    const KIND: EventKind = EventKind::Local;

    /// Get event name
    fn event_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Plain {
        value: u32,
    }

    impl Event for Plain {}

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Ask;

    impl Event for Ask {
        const KIND: EventKind = EventKind::Request;
    }

    #[test]
    fn test_default_kind_is_local() {
        assert_eq!(Plain::KIND, EventKind::Local);
        assert!(!Plain::KIND.is_distributed());
    }

    #[test]
    fn test_request_kind_is_distributed() {
        assert!(Ask::KIND.is_distributed());
        assert!(Ask::KIND.is_request());
        assert!(!Ask::KIND.is_response());
        assert!(EventKind::Response.is_distributed());
    }

    #[test]
    fn test_event_name_defaults_to_type_name() {
        let event = Plain { value: 1 };
        assert!(event.event_name().ends_with("Plain"));
        assert_eq!(EventKind::Distributed.to_string(), "distributed");
    }
}
