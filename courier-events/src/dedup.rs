//! Time-windowed suppression of repeated publishes of the same instance
//!
//! Instances are identified by the address of their `Arc` allocation. Each
//! entry keeps a `Weak` to the allocation, which pins the address for as long
//! as the entry exists without keeping the event itself alive.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::any::Any;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::trace;

/// Default suppression window
pub const DEFAULT_DEDUP_WINDOW: Duration = Duration::from_millis(150);

/// Admissions between inline sweeps
const SWEEP_EVERY: usize = 256;

struct DedupEntry {
    expires_at: Instant,
    _pin: Weak<dyn Any + Send + Sync>,
}

/// Process-wide map of in-flight event instances
pub struct DedupGate {
    entries: DashMap<usize, DedupEntry>,
    window: Duration,
    admitted: AtomicUsize,
    sweeper_started: AtomicBool,
}

fn identity<T: ?Sized>(instance: &Arc<T>) -> usize {
    Arc::as_ptr(instance) as *const () as usize
}

impl DedupGate {
    pub fn new(window: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            window,
            admitted: AtomicUsize::new(0),
            sweeper_started: AtomicBool::new(false),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Returns `true` if this publish should proceed.
    ///
    /// A repeat inside the window is rejected and does not extend it. Every
    /// few hundred admissions the gate also sweeps expired entries itself, so
    /// the map stays bounded when no sweeper task is running.
    pub fn try_admit<T: Any + Send + Sync>(&self, instance: &Arc<T>) -> bool {
        let now = Instant::now();
        let weak: Weak<T> = Arc::downgrade(instance);
        let pin: Weak<dyn Any + Send + Sync> = weak;
        let entry = DedupEntry {
            expires_at: now + self.window,
            _pin: pin,
        };

        match self.entries.entry(identity(instance)) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().expires_at > now {
                    return false;
                }
                occupied.insert(entry);
            }
            Entry::Vacant(vacant) => {
                vacant.insert(entry);
            }
        }

        // entry guard is released here; sweeping under it would deadlock
        if (self.admitted.fetch_add(1, Ordering::Relaxed) + 1) % SWEEP_EVERY == 0 {
            let removed = self.sweep();
            if removed > 0 {
                trace!(removed, remaining = self.len(), "Swept expired dedup entries inline");
            }
        }
        true
    }

    /// Drop the entry for `instance`. Removing twice is a no-op.
    pub fn expire<T: Any + Send + Sync>(&self, instance: &Arc<T>) {
        self.entries.remove(&identity(instance));
    }

    /// Remove every expired entry, returning how many were dropped
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Start the periodic sweeper on the current tokio runtime.
    ///
    /// Returns `None` outside a runtime; entries then only expire lazily. The
    /// task ends on its own once the gate is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> Option<JoinHandle<()>> {
        let runtime = tokio::runtime::Handle::try_current().ok()?;
        self.sweeper_started.store(true, Ordering::SeqCst);
        let gate = Arc::downgrade(self);

        Some(runtime.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(gate) = gate.upgrade() else {
                    break;
                };
                let removed = gate.sweep();
                if removed > 0 {
                    trace!(removed, remaining = gate.len(), "Swept expired dedup entries");
                }
            }
        }))
    }
}

impl DedupGate {
    /// Start the sweeper unless one is already running.
    ///
    /// Cheap to call on every publish; a gate created outside a runtime gets
    /// its sweeper on the first call made from inside one.
    pub fn ensure_sweeper(self: &Arc<Self>, interval: Duration) {
        if self.sweeper_started.load(Ordering::Acquire) {
            return;
        }
        if self
            .sweeper_started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        if self.spawn_sweeper(interval).is_none() {
            self.sweeper_started.store(false, Ordering::Release);
        }
    }

    pub fn has_sweeper(&self) -> bool {
        self.sweeper_started.load(Ordering::Acquire)
    }
}

impl Default for DedupGate {
    fn default() -> Self {
        Self::new(DEFAULT_DEDUP_WINDOW)
    }
}
