//! Integration tests for workflows that cross the broker.
//!
//! Two applications share one loopback transport, so every message takes the
//! same envelope and consumer path it would take through a real broker.

use courier::courier_messaging::ConsumerMode;
use courier::prelude::*;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

// =============================================================================
// Fixtures
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ParcelDispatched {
    parcel_id: String,
}

impl Event for ParcelDispatched {
    const KIND: EventKind = EventKind::Distributed;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct QuoteRequested {
    sku: String,
}

impl Event for QuoteRequested {
    const KIND: EventKind = EventKind::Request;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct QuoteIssued {
    sku: String,
    cents: u64,
}

impl Event for QuoteIssued {
    const KIND: EventKind = EventKind::Response;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct QuoteRefused {
    reason: String,
}

impl Event for QuoteRefused {
    const KIND: EventKind = EventKind::Response;
}

struct PriceBook;

#[async_trait]
impl Responder<QuoteRequested> for PriceBook {
    async fn respond(
        &self,
        request: &QuoteRequested,
        ctx: &RequestContext,
    ) -> Result<(), EventHandlerError> {
        let outcome = if request.sku.is_empty() {
            ctx.send_response(QuoteRefused {
                reason: "missing sku".to_string(),
            })
            .await
        } else {
            ctx.send_response(QuoteIssued {
                sku: request.sku.clone(),
                cents: 1299,
            })
            .await
        };
        outcome.map_err(|e| EventHandlerError::failed(e.to_string()))
    }
}

struct ClearanceDesk;

#[async_trait]
impl Responder<QuoteRequested> for ClearanceDesk {
    async fn respond(
        &self,
        _request: &QuoteRequested,
        _ctx: &RequestContext,
    ) -> Result<(), EventHandlerError> {
        Err(EventHandlerError::not_implemented("clearance pricing"))
    }
}

type Seen = Arc<Mutex<Vec<(&'static str, String)>>>;

struct Tracker {
    label: &'static str,
    fail: bool,
    seen: Seen,
}

#[async_trait]
impl EventHandler<ParcelDispatched> for Tracker {
    async fn handle(&self, event: &ParcelDispatched, ctx: &HandlerContext) -> HandlerResult {
        let origin = ctx.origin().map(|o| o.origin_app.clone()).unwrap_or_default();
        self.seen.lock().unwrap().push((self.label, origin));
        if self.fail {
            return Err(EventHandlerError::failed(format!(
                "tracking feed rejected {}",
                event.parcel_id
            )));
        }
        Ok(Propagation::Continue)
    }
}

fn config(app: &str) -> MessagingConfig {
    MessagingConfig::new(app)
        .with_machine_name("node-1")
        .with_request_timeout(Duration::from_secs(2))
}

// =============================================================================
// Startup Validation
// =============================================================================

#[tokio::test]
async fn test_two_responders_fail_startup() {
    let err = DistributedBus::builder(config("pricing"))
        .responder::<QuoteRequested, _>(PriceBook)
        .responder::<QuoteRequested, _>(ClearanceDesk)
        .build()
        .err()
        .expect("ambiguous responders must be rejected");

    assert!(matches!(
        err,
        ConfigurationError::AmbiguousResponder { count: 2, .. }
    ));
    assert!(err.to_string().contains("QuoteRequested"));
}

#[tokio::test]
async fn test_zero_responders_is_tolerated() {
    let bus = DistributedBus::builder(config("storefront"))
        .start()
        .await
        .unwrap();

    assert!(bus.consumers().is_empty());
}

#[tokio::test]
async fn test_consumers_are_generated_per_kind() {
    let seen = Seen::default();
    let bus = DistributedBus::builder(config("warehouse"))
        .handler::<ParcelDispatched, _>(Tracker {
            label: "scanner",
            fail: false,
            seen,
        })
        .responder::<QuoteRequested, _>(PriceBook)
        .build()
        .unwrap();

    let modes: Vec<_> = bus
        .consumers()
        .registrations()
        .map(|r| r.mode)
        .collect();
    assert_eq!(modes.len(), 2);
    assert!(modes.contains(&ConsumerMode::FanOut));
    assert!(modes.contains(&ConsumerMode::Request));
}

// =============================================================================
// Request / Response
// =============================================================================

async fn pricing_and_storefront() -> (DistributedBus, DistributedBus) {
    let broker: Arc<dyn Transport> = Arc::new(InMemoryTransport::new());
    let pricing = DistributedBus::builder(config("pricing"))
        .transport(broker.clone())
        .responder::<QuoteRequested, _>(PriceBook)
        .start()
        .await
        .unwrap();
    let storefront = DistributedBus::builder(config("storefront"))
        .transport(broker)
        .start()
        .await
        .unwrap();
    (pricing, storefront)
}

#[tokio::test]
async fn test_response_round_trip_keeps_correlation() {
    let (_pricing, storefront) = pricing_and_storefront().await;
    let correlation_id = Uuid::new_v4();

    let request = Envelope::new(
        "QuoteRequested",
        QuoteRequested {
            sku: "A-1".to_string(),
        },
    )
    .with_correlation_id(correlation_id);
    let response: Envelope<QuoteIssued> = storefront.get_response_for(request).await.unwrap();

    assert_eq!(response.correlation_id, correlation_id);
    assert_eq!(response.from_app.as_deref(), Some("pricing"));
    assert_eq!(response.current_app, "storefront");
    assert_eq!(response.origin_app(), "storefront");
    assert_eq!(response.message.sku, "A-1");
    assert_eq!(response.message.cents, 1299);
}

#[tokio::test]
async fn test_either_response_selects_variant() {
    let (_pricing, storefront) = pricing_and_storefront().await;

    let quoted = storefront
        .get_response_either::<QuoteRequested, QuoteIssued, QuoteRefused>(QuoteRequested {
            sku: "B-2".to_string(),
        })
        .await
        .unwrap();
    assert!(quoted.is_success());

    let refused = storefront
        .get_response_either::<QuoteRequested, QuoteIssued, QuoteRefused>(QuoteRequested {
            sku: String::new(),
        })
        .await
        .unwrap();
    assert_eq!(refused.error().map(|r| r.reason.as_str()), Some("missing sku"));
}

#[tokio::test]
async fn test_unmatched_response_type_is_fatal() {
    let (_pricing, storefront) = pricing_and_storefront().await;

    let err = storefront
        .get_response_either::<QuoteRequested, QuoteRefused, ParcelDispatched>(QuoteRequested {
            sku: "C-3".to_string(),
        })
        .await
        .unwrap_err();

    assert!(matches!(err, MessagingError::UnknownResponseType(_)));
}

// =============================================================================
// Distributed Fan-out
// =============================================================================

#[tokio::test]
async fn test_fan_out_runs_every_handler_despite_failure() {
    let broker: Arc<dyn Transport> = Arc::new(InMemoryTransport::new());
    let seen = Seen::default();
    let tracker = |label, fail| Tracker {
        label,
        fail,
        seen: seen.clone(),
    };

    let _warehouse = DistributedBus::builder(config("warehouse"))
        .transport(broker.clone())
        .handler::<ParcelDispatched, _>(tracker("scanner", false))
        .handler::<ParcelDispatched, _>(tracker("feed", true))
        .handler::<ParcelDispatched, _>(tracker("mailer", false))
        .start()
        .await
        .unwrap();
    let storefront = DistributedBus::builder(config("storefront"))
        .transport(broker)
        .start()
        .await
        .unwrap();

    storefront
        .publish(
            ParcelDispatched {
                parcel_id: "P-9".to_string(),
            },
            false,
        )
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let mut seen = seen.lock().unwrap().clone();
    seen.sort();
    assert_eq!(
        seen,
        vec![
            ("feed", "storefront".to_string()),
            ("mailer", "storefront".to_string()),
            ("scanner", "storefront".to_string()),
        ]
    );
}
