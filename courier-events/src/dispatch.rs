//! Handler chain execution

use crate::context::HandlerContext;
use crate::handler::{DynEventHandler, Propagation};
use futures::FutureExt;
use futures::future::join_all;
use std::any::Any;
use std::cmp::Reverse;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Order handlers by descending priority, keeping registration order for ties
pub fn sort_by_priority(handlers: &mut [Arc<dyn DynEventHandler>]) {
    handlers.sort_by_key(|handler| Reverse(handler.priority()));
}

/// How a sequential chain ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainOutcome {
    NoHandlers,
    Completed { invoked: usize },
    Stopped { invoked: usize, by: &'static str },
    Failed { invoked: usize, by: &'static str },
}

impl ChainOutcome {
    pub fn invoked(&self) -> usize {
        match *self {
            ChainOutcome::NoHandlers => 0,
            ChainOutcome::Completed { invoked }
            | ChainOutcome::Stopped { invoked, .. }
            | ChainOutcome::Failed { invoked, .. } => invoked,
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&'static str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

/// Run handlers one after another in priority order.
///
/// A `Stop` ends the chain quietly, `NotImplemented` is logged and skipped,
/// any other error or a panic is logged and ends the chain. Nothing is returned as an
/// error; the outcome is informational.
pub async fn run_chain(
    mut handlers: Vec<Arc<dyn DynEventHandler>>,
    event: &(dyn Any + Send + Sync),
    event_name: &str,
    ctx: &HandlerContext,
) -> ChainOutcome {
    if handlers.is_empty() {
        return ChainOutcome::NoHandlers;
    }
    sort_by_priority(&mut handlers);

    let mut invoked = 0;
    for handler in &handlers {
        invoked += 1;
        let result = match AssertUnwindSafe(handler.handle_dyn(event, ctx))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(panic) => {
                error!(
                    event = event_name,
                    handler = handler.handler_name(),
                    panic = panic_message(panic.as_ref()),
                    "Handler panicked, remaining handlers skipped"
                );
                return ChainOutcome::Failed {
                    invoked,
                    by: handler.handler_name(),
                };
            }
        };

        match result {
            Ok(Propagation::Continue) => {}
            Ok(Propagation::Stop) => {
                debug!(
                    event = event_name,
                    handler = handler.handler_name(),
                    "Handler stopped the chain"
                );
                return ChainOutcome::Stopped {
                    invoked,
                    by: handler.handler_name(),
                };
            }
            Err(e) if e.is_not_implemented() => {
                warn!(
                    event = event_name,
                    handler = handler.handler_name(),
                    error = %e,
                    "Handler not implemented, continuing"
                );
            }
            Err(e) => {
                error!(
                    event = event_name,
                    handler = handler.handler_name(),
                    error = %e,
                    "Handler failed, remaining handlers skipped"
                );
                return ChainOutcome::Failed {
                    invoked,
                    by: handler.handler_name(),
                };
            }
        }
    }

    ChainOutcome::Completed { invoked }
}

/// Result of a concurrent fan-out
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanOutReport {
    pub invoked: usize,
    pub failed: usize,
}

/// Run every handler concurrently, each on its own task with its own context.
///
/// Handlers are spawned in priority order but no completion order is implied.
/// A failing or panicking handler does not affect the others.
pub async fn fan_out(
    mut handlers: Vec<Arc<dyn DynEventHandler>>,
    event: Arc<dyn Any + Send + Sync>,
    event_name: &'static str,
    ctx: HandlerContext,
) -> FanOutReport {
    sort_by_priority(&mut handlers);

    let (names, tasks): (Vec<_>, Vec<_>) = handlers
        .into_iter()
        .map(|handler| {
            let event = event.clone();
            let ctx = ctx.clone();
            let name = handler.handler_name();
            let task = tokio::spawn(async move { handler.handle_dyn(&*event, &ctx).await });
            (name, task)
        })
        .unzip();

    let mut report = FanOutReport {
        invoked: names.len(),
        failed: 0,
    };

    for (name, result) in names.into_iter().zip(join_all(tasks).await) {
        match result {
            Ok(Ok(_)) => {}
            Ok(Err(e)) if e.is_not_implemented() => {
                warn!(event = event_name, handler = name, error = %e, "Handler not implemented");
            }
            Ok(Err(e)) => {
                error!(event = event_name, handler = name, error = %e, "Handler failed");
                report.failed += 1;
            }
            Err(e) => {
                error!(event = event_name, handler = name, error = %e, "Handler task panicked");
                report.failed += 1;
            }
        }
    }

    report
}
