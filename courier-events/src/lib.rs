//! Event-Driven Architecture support for Courier
//!
//! This crate provides in-process event publishing and handling.
//!
//! ## Features
//!
//! - **Ordered handler chains** - Handlers run by descending priority
//! - **Stop / continue** - A handler can end the chain for the current publish
//! - **Deduplication** - Republishing the same instance inside a short window is dropped
//! - **Background dispatch** - Detached chains that outlive the publishing caller
//! - **Typed** - Handlers are bound to one event type at compile time
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use courier_events::*;
//! use async_trait::async_trait;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! struct UserCreated {
//!     user_id: String,
//!     email: String,
//! }
//!
//! impl Event for UserCreated {}
//!
//! struct WelcomeEmail;
//!
//! #[async_trait]
//! impl EventHandler<UserCreated> for WelcomeEmail {
//!     fn priority(&self) -> i32 {
//!         10
//!     }
//!
//!     async fn handle(&self, event: &UserCreated, _ctx: &HandlerContext) -> HandlerResult {
//!         println!("Sending welcome email to {}", event.email);
//!         Ok(Propagation::Continue)
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut registry = HandlerRegistry::new();
//!     registry.register::<UserCreated, _>(WelcomeEmail);
//!
//!     let bus = EventBus::new(std::sync::Arc::new(registry));
//!     bus.publish(
//!         UserCreated {
//!             user_id: "123".to_string(),
//!             email: "alice@example.com".to_string(),
//!         },
//!         false,
//!     )
//!     .await;
//! }
//! ```
//!
//! ## Error Handling
//!
//! Publishing never fails from the caller's point of view. A handler returning
//! [`EventHandlerError::NotImplemented`] is logged as a warning and the chain
//! continues; any other error is logged and ends the chain.

pub mod bus;
pub mod context;
pub mod dedup;
pub mod dispatch;
pub mod event;
pub mod handler;
pub mod registry;

pub use bus::{EventBus, EventBusBuilder, EventBusConfig};
pub use context::{ExecutionContext, HandlerContext, OriginPayload};
pub use dedup::{DEFAULT_DEDUP_WINDOW, DedupGate};
pub use dispatch::{ChainOutcome, FanOutReport, fan_out, run_chain, sort_by_priority};
pub use event::{Event, EventKind};
pub use handler::{
    DynEventHandler, EventHandler, EventHandlerError, HandlerResult, Propagation,
    TypedEventHandler,
};
pub use registry::{EventDescriptor, HandlerRegistry, HandlerResolver};
