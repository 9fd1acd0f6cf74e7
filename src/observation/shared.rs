//! Bound application state backed by a live query.

use crate::observation::bridge::{ObservationBridge, Subscription};
use crate::observation::query::Query;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

/// Read-only state that tracks a query's result.
///
/// Built by [`ObservationBridge::bind`]: the value starts as whatever `load`
/// returns and is replaced every time the subscription reports a change.
/// Async consumers can await changes through [`SharedReader::watch`].
pub struct SharedReader<Q: Query> {
    bridge: ObservationBridge<Q>,
    value: Arc<watch::Sender<Q::Value>>,
    version: Arc<AtomicU64>,
    subscription: Subscription,
}

impl<Q: Query> ObservationBridge<Q> {
    /// Load the current value (or `default`) and keep it up to date.
    #[must_use]
    pub fn bind(&self, default: Q::Value) -> SharedReader<Q> {
        let initial = self.load(default);
        let (tx, _rx) = watch::channel(initial.clone());
        let value = Arc::new(tx);
        let version = Arc::new(AtomicU64::new(0));

        let subscription = {
            let value = Arc::clone(&value);
            let version = Arc::clone(&version);
            self.subscribe(initial, move |next| {
                value.send_replace(next);
                version.fetch_add(1, Ordering::SeqCst);
            })
        };

        SharedReader {
            bridge: self.clone(),
            value,
            version,
            subscription,
        }
    }
}

impl<Q: Query> SharedReader<Q> {
    /// Current value.
    #[must_use]
    pub fn get(&self) -> Q::Value {
        self.value.borrow().clone()
    }

    /// Borrow the current value without cloning it.
    pub fn with<R>(&self, f: impl FnOnce(&Q::Value) -> R) -> R {
        f(&self.value.borrow())
    }

    /// Number of changes applied since binding.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }

    /// Receiver that is notified on every change.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<Q::Value> {
        self.value.subscribe()
    }

    #[must_use]
    pub fn bridge(&self) -> &ObservationBridge<Q> {
        &self.bridge
    }

    #[must_use]
    pub fn is_live(&self) -> bool {
        self.subscription.is_active()
    }

    /// Stop tracking; the value freezes at its last state.
    pub fn detach(&self) {
        self.subscription.cancel();
    }
}
