//! Integration tests for courier-events

use async_trait::async_trait;
use courier_events::*;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct InvoiceIssued {
    number: u32,
}

impl Event for InvoiceIssued {}

struct SlowHandler {
    finished: Arc<AtomicU32>,
}

#[async_trait]
impl EventHandler<InvoiceIssued> for SlowHandler {
    async fn handle(&self, _event: &InvoiceIssued, _ctx: &HandlerContext) -> HandlerResult {
        tokio::time::sleep(Duration::from_millis(200)).await;
        self.finished.fetch_add(1, Ordering::SeqCst);
        Ok(Propagation::Continue)
    }
}

struct ScopedHandler {
    scope: ExecutionContext,
    created: Arc<Mutex<Vec<ExecutionContext>>>,
}

#[async_trait]
impl EventHandler<InvoiceIssued> for ScopedHandler {
    async fn handle(&self, _event: &InvoiceIssued, _ctx: &HandlerContext) -> HandlerResult {
        self.created.lock().unwrap().push(self.scope);
        Ok(Propagation::Continue)
    }
}

#[tokio::test]
async fn test_background_publish_returns_before_handlers_finish() {
    let finished = Arc::new(AtomicU32::new(0));
    let mut registry = HandlerRegistry::new();
    registry.register::<InvoiceIssued, _>(SlowHandler {
        finished: finished.clone(),
    });
    let bus = EventBus::new(Arc::new(registry));

    let started = Instant::now();
    bus.publish(InvoiceIssued { number: 1 }, true).await;

    assert!(started.elapsed() < Duration::from_millis(200));
    assert_eq!(finished.load(Ordering::SeqCst), 0);

    tokio::time::sleep(Duration::from_millis(350)).await;
    assert_eq!(finished.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_foreground_publish_waits_for_handlers() {
    let finished = Arc::new(AtomicU32::new(0));
    let mut registry = HandlerRegistry::new();
    registry.register::<InvoiceIssued, _>(SlowHandler {
        finished: finished.clone(),
    });
    let bus = EventBus::new(Arc::new(registry));

    bus.publish(InvoiceIssued { number: 2 }, false).await;

    assert_eq!(finished.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_factory_handlers_are_built_per_scope() {
    let created = Arc::new(Mutex::new(Vec::new()));
    let sink = created.clone();
    let mut registry = HandlerRegistry::new();
    registry.register_with::<InvoiceIssued, _, _>(move |scope| ScopedHandler {
        scope,
        created: sink.clone(),
    });
    let bus = EventBus::new(Arc::new(registry));

    bus.publish(InvoiceIssued { number: 3 }, false).await;
    bus.publish(InvoiceIssued { number: 4 }, true).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(
        *created.lock().unwrap(),
        vec![ExecutionContext::Foreground, ExecutionContext::Background]
    );
}

#[test]
fn test_publish_from_blocking_caller() {
    let finished = Arc::new(AtomicU32::new(0));
    let mut registry = HandlerRegistry::new();
    registry.register::<InvoiceIssued, _>(SlowHandler {
        finished: finished.clone(),
    });
    let bus = EventBus::new(Arc::new(registry));

    tokio_test::block_on(bus.publish(InvoiceIssued { number: 5 }, false));

    assert_eq!(finished.load(Ordering::SeqCst), 1);
}
