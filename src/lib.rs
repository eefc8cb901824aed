// Courier - typed event publish/subscribe for Rust
//
// This library provides ordered in-process event dispatch with deduplication,
// plus a broker bridge for distributed events and correlated request/response.

// Re-export core functionality
pub use courier_events::*;

// Re-export optional crates
#[cfg(feature = "messaging")]
pub use courier_messaging;

#[cfg(feature = "log")]
pub use courier_log;

// Prelude for common imports
pub mod prelude {
    pub use crate::{
        Event,
        EventBus,
        EventBusBuilder,
        EventHandler,
        EventHandlerError,
        EventKind,
        ExecutionContext,
        HandlerContext,
        HandlerRegistry,
        HandlerResult,
        OriginPayload,
        Propagation,
    };

    #[cfg(feature = "messaging")]
    pub use courier_messaging::{
        ConfigurationError, DistributedBus, DistributedBusBuilder, Envelope, InMemoryTransport,
        MessagingConfig, MessagingError, RequestContext, Responder, ResponseEither, Transport,
    };

    pub use async_trait::async_trait;
    pub use serde::{Deserialize, Serialize};
}
