//! # Courier Messaging
//!
//! Broker bridge for Courier events.
//!
//! Distributed event kinds published through a [`DistributedBus`] leave the
//! process wrapped in an [`Envelope`] that carries correlation and identity
//! data. Inbound messages are turned back into handler calls by consumer
//! adapters generated at startup:
//!
//! - **Distributed** events fan out to every local handler concurrently
//! - **Request** events go to their single [`Responder`], which answers
//!   through [`RequestContext::send_response`]
//!
//! Startup fails with a [`ConfigurationError`] if a request type has more
//! than one responder.
//!
//! ## Example
//!
//! ```rust,ignore
//! use courier_messaging::{DistributedBus, MessagingConfig};
//!
//! let bus = DistributedBus::builder(MessagingConfig::new("storefront"))
//!     .handler::<OrderShipped, _>(ShippingNotifier::default())
//!     .responder::<PriceQuery, _>(PriceBook::default())
//!     .start()
//!     .await?;
//!
//! bus.publish(OrderShipped { order_id: 42 }, false).await?;
//! let quote: Envelope<PriceQuoted> = bus.get_response(PriceQuery { sku: "A-1".into() }).await?;
//! ```

pub mod bridge;
pub mod config;
pub mod consumer;
pub mod envelope;
pub mod error;
pub mod memory;
pub mod message;
pub mod responder;
pub mod transport;
pub mod validator;

pub use bridge::{DistributedBus, DistributedBusBuilder, ResponseEither};
pub use config::{DEFAULT_ENV_PREFIX, EntityNaming, HostIdentity, MessagingConfig};
pub use consumer::{FanOutConsumer, RequestConsumer};
pub use envelope::{Envelope, RawEnvelope};
pub use error::{ConfigurationError, MessagingError, Result};
pub use memory::InMemoryTransport;
pub use message::{MESSAGE_TYPE_HEADER, Message, SOURCE_APP_HEADER};
pub use responder::{DynResponder, RequestContext, Responder, ResponderRegistry, TypedResponder};
pub use transport::{Delivery, FnHandler, MessageHandler, Replier, Transport};
pub use validator::{ConsumerMode, ConsumerRegistration, ConsumerRegistry, StartupValidator};
