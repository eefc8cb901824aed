//! Integration tests for common local dispatch workflows.
//!
//! These tests drive the in-process bus through the root crate's prelude.

use courier::prelude::*;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

// =============================================================================
// Fixtures
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StockAdjusted {
    sku: String,
    delta: i32,
}

impl Event for StockAdjusted {}

#[derive(Clone, Copy)]
enum Behaviour {
    Continue,
    Stop,
    NotImplemented,
    Fail,
    Sleep(u64),
}

struct Recorder {
    label: &'static str,
    priority: i32,
    behaviour: Behaviour,
    log: Log,
}

#[async_trait]
impl EventHandler<StockAdjusted> for Recorder {
    fn priority(&self) -> i32 {
        self.priority
    }

    async fn handle(&self, _event: &StockAdjusted, _ctx: &HandlerContext) -> HandlerResult {
        if let Behaviour::Sleep(ms) = self.behaviour {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
        self.log.lock().unwrap().push(self.label);
        match self.behaviour {
            Behaviour::Continue | Behaviour::Sleep(_) => Ok(Propagation::Continue),
            Behaviour::Stop => Ok(Propagation::Stop),
            Behaviour::NotImplemented => {
                Err(EventHandlerError::not_implemented("stock sync pending"))
            }
            Behaviour::Fail => Err(EventHandlerError::failed("warehouse offline")),
        }
    }
}

type Log = Arc<Mutex<Vec<&'static str>>>;

fn bus_with(handlers: &[(&'static str, i32, Behaviour)]) -> (EventBus, Log) {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut registry = HandlerRegistry::new();
    for &(label, priority, behaviour) in handlers {
        registry.register::<StockAdjusted, _>(Recorder {
            label,
            priority,
            behaviour,
            log: log.clone(),
        });
    }
    (EventBus::new(Arc::new(registry)), log)
}

fn adjustment() -> StockAdjusted {
    StockAdjusted {
        sku: "SKU-7".to_string(),
        delta: -2,
    }
}

// =============================================================================
// Ordering and Propagation
// =============================================================================

#[tokio::test]
async fn test_handlers_run_by_descending_priority() {
    let (bus, log) = bus_with(&[
        ("five", 5, Behaviour::Continue),
        ("ten", 10, Behaviour::Continue),
        ("one", 1, Behaviour::Continue),
    ]);

    bus.publish(adjustment(), false).await;

    assert_eq!(*log.lock().unwrap(), vec!["ten", "five", "one"]);
}

#[tokio::test]
async fn test_stop_ends_the_chain() {
    let (bus, log) = bus_with(&[("a", 10, Behaviour::Stop), ("b", 5, Behaviour::Continue)]);

    bus.publish(adjustment(), false).await;

    assert_eq!(*log.lock().unwrap(), vec!["a"]);
}

#[tokio::test]
async fn test_not_implemented_continues_the_chain() {
    let (bus, log) = bus_with(&[
        ("a", 10, Behaviour::NotImplemented),
        ("b", 5, Behaviour::Continue),
    ]);

    bus.publish(adjustment(), false).await;

    assert_eq!(*log.lock().unwrap(), vec!["a", "b"]);
}

#[tokio::test]
async fn test_failure_halts_chain_without_reaching_caller() {
    let (bus, log) = bus_with(&[("a", 10, Behaviour::Fail), ("b", 5, Behaviour::Continue)]);

    // publish has no error channel; reaching the assertion is the check
    bus.publish(adjustment(), false).await;

    assert_eq!(*log.lock().unwrap(), vec!["a"]);
}

// =============================================================================
// Deduplication
// =============================================================================

#[tokio::test]
async fn test_same_instance_inside_window_dispatches_once() {
    let (bus, log) = bus_with(&[("only", 0, Behaviour::Continue)]);
    let event = Arc::new(adjustment());

    bus.publish_shared(event.clone(), false).await;
    bus.publish_shared(event.clone(), false).await;
    assert_eq!(log.lock().unwrap().len(), 1);

    tokio::time::sleep(Duration::from_millis(200)).await;
    bus.publish_shared(event, false).await;
    assert_eq!(log.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn test_equal_but_distinct_instances_are_not_collapsed() {
    let (bus, log) = bus_with(&[("only", 0, Behaviour::Continue)]);

    bus.publish(adjustment(), false).await;
    bus.publish(adjustment(), false).await;

    assert_eq!(log.lock().unwrap().len(), 2);
}

// =============================================================================
// Background Dispatch
// =============================================================================

#[tokio::test]
async fn test_background_publish_does_not_wait_for_handlers() {
    let (bus, log) = bus_with(&[("slow", 0, Behaviour::Sleep(150))]);

    let started = Instant::now();
    bus.publish(adjustment(), true).await;

    assert!(started.elapsed() < Duration::from_millis(150));
    assert!(log.lock().unwrap().is_empty());

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(*log.lock().unwrap(), vec!["slow"]);
}

#[tokio::test]
async fn test_builder_applies_custom_window() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut registry = HandlerRegistry::new();
    registry.register::<StockAdjusted, _>(Recorder {
        label: "only",
        priority: 0,
        behaviour: Behaviour::Continue,
        log: log.clone(),
    });
    let bus = EventBusBuilder::new(Arc::new(registry))
        .dedup_window(Duration::from_millis(20))
        .build();
    let event = Arc::new(adjustment());

    bus.publish_shared(event.clone(), false).await;
    tokio::time::sleep(Duration::from_millis(40)).await;
    bus.publish_shared(event, false).await;

    assert_eq!(log.lock().unwrap().len(), 2);
}

#[test]
fn test_publish_from_synchronous_code() {
    let (bus, log) = bus_with(&[("sync", 0, Behaviour::Continue)]);

    tokio_test::block_on(bus.publish(adjustment(), false));

    assert_eq!(*log.lock().unwrap(), vec!["sync"]);
}
