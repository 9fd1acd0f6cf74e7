//! Couples a [`Query`] to application state.
//!
//! Two access modes:
//! - [`ObservationBridge::load`]: one-shot fetch, falling back to a default
//! - [`ObservationBridge::subscribe`]: a standing watch that re-runs the
//!   query after every committed write and delivers only actual changes
//!
//! Read failures on both paths are swallowed: `load` returns its fallback and
//! a failed re-fetch keeps the subscriber on its last delivered value. A
//! transient storage failure degrades bound state instead of tearing it down.
//! Every swallowed error is logged and kept as [`ObservationBridge::last_error`].

use crate::observation::query::Query;
use crate::storage::{AccessCoordinator, ChangeEpoch, ChangeObserver};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use tracing::{debug, trace, warn};

type Callback<V> = Box<dyn Fn(V) + Send + Sync>;

/// One standing watch: last delivered value plus callback.
struct Watch<V> {
    id: u64,
    active: Arc<AtomicBool>,
    last: Mutex<V>,
    on_change: Callback<V>,
}

impl<V: Clone + PartialEq> Watch<V> {
    /// Deliver `value` if it differs from what this watch last delivered.
    fn offer(&self, value: &V) {
        {
            let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
            if *last == *value {
                return;
            }
            *last = value.clone();
        }

        // Cancelled between the fetch and now
        if !self.active.load(Ordering::SeqCst) {
            return;
        }
        trace!(watch = self.id, "Delivering change");
        (self.on_change)(value.clone());
    }
}

struct BridgeInner<Q: Query> {
    query: Q,
    coordinator: AccessCoordinator,
    watches: Mutex<Vec<Arc<Watch<Q::Value>>>>,
    next_id: AtomicU64,
    last_error: Mutex<Option<String>>,
    error_count: AtomicU64,
}

impl<Q: Query> BridgeInner<Q> {
    fn fetch(&self) -> crate::Result<Q::Value> {
        self.coordinator.read(|conn| self.query.fetch(conn))
    }

    fn record_error(&self, context: &str, error: &crate::Error) {
        warn!(query = ?self.query, error = %error, "{context}");
        self.error_count.fetch_add(1, Ordering::Relaxed);
        *self.last_error.lock().unwrap_or_else(PoisonError::into_inner) = Some(error.to_string());
    }

    fn remove(&self, id: u64) {
        let mut watches = self.watches.lock().unwrap_or_else(PoisonError::into_inner);
        watches.retain(|w| w.id != id);
    }
}

impl<Q: Query> ChangeObserver for BridgeInner<Q> {
    fn on_change(&self, epoch: &ChangeEpoch) {
        let watches: Vec<_> = {
            let watches = self.watches.lock().unwrap_or_else(PoisonError::into_inner);
            watches
                .iter()
                .filter(|w| w.active.load(Ordering::SeqCst))
                .cloned()
                .collect()
        };
        if watches.is_empty() {
            return;
        }
        if !epoch.touches(self.query.tables()) {
            trace!(seq = epoch.seq, op = %epoch.op, "Epoch outside query tables");
            return;
        }

        // One fetch per epoch, shared by every watch on this query
        match self.fetch() {
            Ok(value) => {
                trace!(seq = epoch.seq, watches = watches.len(), "Re-evaluated query");
                for watch in watches {
                    watch.offer(&value);
                }
            }
            Err(e) => self.record_error("Re-fetch failed; subscribers keep last value", &e),
        }
    }
}

/// A query bound to a coordinator.
///
/// Cheap to clone; clones share subscriptions.
pub struct ObservationBridge<Q: Query> {
    inner: Arc<BridgeInner<Q>>,
}

impl<Q: Query> Clone for ObservationBridge<Q> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<Q: Query> std::fmt::Debug for ObservationBridge<Q> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObservationBridge")
            .field("query", &self.inner.query)
            .field("subscribers", &self.subscriber_count())
            .finish_non_exhaustive()
    }
}

impl<Q: Query> ObservationBridge<Q> {
    /// Bind `query` to `coordinator` and start listening for change epochs.
    #[must_use]
    pub fn new(coordinator: AccessCoordinator, query: Q) -> Self {
        let inner = Arc::new(BridgeInner {
            query,
            coordinator,
            watches: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            last_error: Mutex::new(None),
            error_count: AtomicU64::new(0),
        });

        let observer: Weak<dyn ChangeObserver> = Arc::downgrade(&inner) as Weak<dyn ChangeObserver>;
        inner.coordinator.observe(observer);

        Self { inner }
    }

    #[must_use]
    pub fn query(&self) -> &Q {
        &self.inner.query
    }

    #[must_use]
    pub fn coordinator(&self) -> &AccessCoordinator {
        &self.inner.coordinator
    }

    /// Fetch the current value, or `fallback` if the read fails.
    ///
    /// Never fails; see [`last_error`](Self::last_error) for what went wrong.
    pub fn load(&self, fallback: Q::Value) -> Q::Value {
        match self.inner.fetch() {
            Ok(value) => value,
            Err(e) => {
                self.inner.record_error("Load failed; using fallback", &e);
                fallback
            }
        }
    }

    /// Arm a standing watch.
    ///
    /// `initial` is treated as already delivered: `on_change` runs on the
    /// dispatcher thread only when a post-commit re-fetch differs from the
    /// last value it was given. Deliveries follow commit order.
    ///
    /// The store is re-checked once right after registration, so a write that
    /// landed between computing `initial` and subscribing is not missed.
    pub fn subscribe<F>(&self, initial: Q::Value, on_change: F) -> Subscription
    where
        F: Fn(Q::Value) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let active = Arc::new(AtomicBool::new(true));

        let watch = Arc::new(Watch {
            id,
            active: Arc::clone(&active),
            last: Mutex::new(initial),
            on_change: Box::new(on_change),
        });
        self.inner
            .watches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(watch);
        debug!(watch = id, query = ?self.inner.query, "Subscribed");

        self.inner.coordinator.request_refresh("subscribe");

        let bridge = Arc::downgrade(&self.inner);
        Subscription {
            id,
            active,
            release: Mutex::new(Some(Box::new(move || {
                if let Some(bridge) = bridge.upgrade() {
                    bridge.remove(id);
                }
            }))),
        }
    }

    /// Number of active subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner
            .watches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|w| w.active.load(Ordering::SeqCst))
            .count()
    }

    /// Most recent swallowed read error, if any.
    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        self.inner
            .last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Total swallowed read errors.
    #[must_use]
    pub fn error_count(&self) -> u64 {
        self.inner.error_count.load(Ordering::Relaxed)
    }
}

/// Capability to cancel one standing watch.
///
/// The bridge owns the watch; this handle only ends it. Dropping the handle
/// cancels. A delivery already running when `cancel` is called may still
/// complete, but none starts after `cancel` returns.
pub struct Subscription {
    id: u64,
    active: Arc<AtomicBool>,
    release: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl Subscription {
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Stop deliveries and release the watch. Idempotent.
    pub fn cancel(&self) {
        self.active.store(false, Ordering::SeqCst);
        let release = self
            .release
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(release) = release {
            release();
            debug!(watch = self.id, "Subscription cancelled");
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}
