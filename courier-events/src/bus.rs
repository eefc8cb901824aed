//! Event Bus implementation

use crate::context::{ExecutionContext, HandlerContext};
use crate::dedup::{DEFAULT_DEDUP_WINDOW, DedupGate};
use crate::dispatch::{ChainOutcome, run_chain};
use crate::event::Event;
use crate::registry::{HandlerRegistry, HandlerResolver};
use std::any::TypeId;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Event bus for in-process event publishing and handling
#[derive(Clone)]
pub struct EventBus {
    /// Resolution root tied to the publishing caller
    foreground: Arc<dyn HandlerResolver>,

    /// Long-lived resolution root for detached dispatch
    background: Arc<dyn HandlerResolver>,

    dedup: Arc<DedupGate>,

    /// Configuration
    config: Arc<EventBusConfig>,
}

/// Event bus configuration
#[derive(Debug, Clone)]
pub struct EventBusConfig {
    /// How long a published instance suppresses republishing of itself
    pub dedup_window: Duration,

    /// How often expired dedup entries are swept
    pub sweep_interval: Duration,

    /// Enable event logging
    pub enable_logging: bool,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            dedup_window: DEFAULT_DEDUP_WINDOW,
            sweep_interval: Duration::from_secs(1),
            enable_logging: true,
        }
    }
}

impl EventBus {
    /// Create an event bus resolving handlers from `registry`
    pub fn new(registry: Arc<HandlerRegistry>) -> Self {
        EventBusBuilder::new(registry).build()
    }

    /// Publish an event
    ///
    /// Handlers registered for `E` run in descending priority. With
    /// `run_in_background` the chain is spawned and this returns as soon as it
    /// is scheduled. Handler failures are logged, never returned.
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// let bus = EventBus::new(Arc::new(registry));
    /// bus.publish(OrderPlaced { order_id: "42".into() }, false).await;
    /// ```
    pub async fn publish<E: Event>(&self, event: E, run_in_background: bool) {
        self.publish_shared(Arc::new(event), run_in_background).await
    }

    /// Publish an already shared event instance.
    ///
    /// Publishing the same `Arc` again inside the dedup window is a no-op.
    pub async fn publish_shared<E: Event>(&self, event: Arc<E>, run_in_background: bool) {
        if !self.admit(&event) {
            return;
        }

        if run_in_background {
            let resolver = self.background.clone();
            let logging = self.config.enable_logging;
            tokio::spawn(async move {
                let outcome =
                    Self::dispatch(resolver.as_ref(), &*event, ExecutionContext::Background).await;
                if logging {
                    debug!(event = event.event_name(), ?outcome, "Background dispatch finished");
                }
            });
            return;
        }

        let outcome =
            Self::dispatch(self.foreground.as_ref(), &*event, ExecutionContext::Foreground).await;
        if self.config.enable_logging {
            debug!(event = event.event_name(), ?outcome, "Event dispatched");
        }
    }

    /// Check the dedup gate for `event`, logging dropped duplicates
    pub fn admit<E: Event>(&self, event: &Arc<E>) -> bool {
        self.dedup.ensure_sweeper(self.config.sweep_interval);
        if self.dedup.try_admit(event) {
            if self.config.enable_logging {
                info!(event = event.event_name(), "Publishing event");
            }
            return true;
        }
        debug!(event = event.event_name(), "Duplicate publish dropped");
        false
    }

    async fn dispatch<E: Event>(
        resolver: &dyn HandlerResolver,
        event: &E,
        execution: ExecutionContext,
    ) -> ChainOutcome {
        let handlers = resolver.resolve(TypeId::of::<E>(), execution);
        if handlers.is_empty() {
            debug!(event = event.event_name(), "No handlers registered");
            return ChainOutcome::NoHandlers;
        }
        let ctx = HandlerContext::local(execution);
        run_chain(handlers, event, event.event_name(), &ctx).await
    }

    /// Resolution root used for the given execution context
    pub fn resolver(&self, execution: ExecutionContext) -> &Arc<dyn HandlerResolver> {
        match execution {
            ExecutionContext::Foreground => &self.foreground,
            ExecutionContext::Background => &self.background,
        }
    }

    pub fn dedup_gate(&self) -> &Arc<DedupGate> {
        &self.dedup
    }

    pub fn config(&self) -> &EventBusConfig {
        &self.config
    }
}

/// Event bus builder
pub struct EventBusBuilder {
    foreground: Arc<dyn HandlerResolver>,
    background: Option<Arc<dyn HandlerResolver>>,
    config: EventBusConfig,
}

impl EventBusBuilder {
    /// Create new event bus builder
    pub fn new(registry: Arc<HandlerRegistry>) -> Self {
        Self::with_resolver(registry)
    }

    /// Start from a custom resolution root (e.g. a hosting container)
    pub fn with_resolver(resolver: Arc<dyn HandlerResolver>) -> Self {
        Self {
            foreground: resolver,
            background: None,
            config: EventBusConfig::default(),
        }
    }

    /// Use a separate resolution root for background dispatch
    pub fn background_resolver(mut self, resolver: Arc<dyn HandlerResolver>) -> Self {
        self.background = Some(resolver);
        self
    }

    pub fn dedup_window(mut self, window: Duration) -> Self {
        self.config.dedup_window = window;
        self
    }

    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.config.sweep_interval = interval;
        self
    }

    /// Enable/disable logging
    pub fn enable_logging(mut self, enabled: bool) -> Self {
        self.config.enable_logging = enabled;
        self
    }

    /// Build the event bus.
    ///
    /// Inside a tokio runtime this also starts the dedup sweeper; otherwise
    /// it starts with the first publish.
    pub fn build(self) -> EventBus {
        let dedup = Arc::new(DedupGate::new(self.config.dedup_window));
        dedup.ensure_sweeper(self.config.sweep_interval);

        EventBus {
            background: self.background.unwrap_or_else(|| self.foreground.clone()),
            foreground: self.foreground,
            dedup,
            config: Arc::new(self.config),
        }
    }
}
