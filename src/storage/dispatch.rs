//! Post-commit change notification.
//!
//! The coordinator publishes a [`ChangeEpoch`] after every committed write.
//! Epochs travel over a channel to a single dispatcher thread, which invokes
//! every live [`ChangeObserver`] outside of any write critical section.
//!
//! Because there is exactly one dispatcher thread, observers see epochs in
//! commit order. When epochs queue up behind a slow observer they are
//! coalesced into the newest one, carrying the union of their changes:
//! observers re-read current state anyway, so an intermediate epoch carries
//! nothing they could still observe.

use crate::error::{Error, Result};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use tracing::{debug, trace, warn};

/// A single committed change, as seen by observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEpoch {
    /// Monotonic commit sequence number for the coordinator.
    pub seq: u64,
    /// Operation name passed to `write`.
    pub op: String,
    /// `(table, id)` pairs the writer declared as changed. Empty when the
    /// write declared nothing; observers then treat every table as changed.
    pub changes: Vec<(&'static str, i64)>,
}

impl ChangeEpoch {
    /// Returns true if this epoch may have changed any of `tables`.
    ///
    /// An empty `tables` means the caller reads unknown tables.
    #[must_use]
    pub fn touches(&self, tables: &[&str]) -> bool {
        self.changes.is_empty()
            || tables.is_empty()
            || self.changes.iter().any(|(table, _)| tables.contains(table))
    }

    /// Fold a later epoch into this one, keeping the union of their changes.
    fn absorb(mut self, newer: Self) -> Self {
        if self.changes.is_empty() || newer.changes.is_empty() {
            self.changes.clear();
        } else {
            for change in newer.changes {
                if !self.changes.contains(&change) {
                    self.changes.push(change);
                }
            }
        }
        Self {
            seq: newer.seq,
            op: newer.op,
            changes: self.changes,
        }
    }
}

/// Receives change epochs on the dispatcher thread.
pub trait ChangeObserver: Send + Sync {
    fn on_change(&self, epoch: &ChangeEpoch);
}

enum Message {
    Epoch(ChangeEpoch),
    Flush(Sender<()>),
}

type ObserverList = Arc<Mutex<Vec<Weak<dyn ChangeObserver>>>>;

/// Sending half of the dispatcher plus the observer registry.
///
/// The thread exits once the dispatcher is dropped and the channel closes.
pub(crate) struct Dispatcher {
    tx: Mutex<Sender<Message>>,
    observers: ObserverList,
}

impl Dispatcher {
    pub(crate) fn spawn() -> Result<Self> {
        let (tx, rx) = mpsc::channel();
        let observers: ObserverList = Arc::new(Mutex::new(Vec::new()));

        let thread_observers = Arc::clone(&observers);
        std::thread::Builder::new()
            .name("roster-dispatch".to_string())
            .spawn(move || run(&rx, &thread_observers))
            .map_err(Error::Io)?;

        Ok(Self {
            tx: Mutex::new(tx),
            observers,
        })
    }

    /// Register an observer. Held weakly; dropped observers are pruned.
    pub(crate) fn register(&self, observer: Weak<dyn ChangeObserver>) {
        let mut observers = self.observers.lock().unwrap_or_else(PoisonError::into_inner);
        observers.retain(|o| o.strong_count() > 0);
        observers.push(observer);
    }

    pub(crate) fn observer_count(&self) -> usize {
        let observers = self.observers.lock().unwrap_or_else(PoisonError::into_inner);
        observers.iter().filter(|o| o.strong_count() > 0).count()
    }

    /// Queue an epoch for delivery. Never blocks on observers.
    pub(crate) fn publish(&self, epoch: ChangeEpoch) {
        trace!(seq = epoch.seq, op = %epoch.op, "Publishing change epoch");
        let tx = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        if tx.send(Message::Epoch(epoch)).is_err() {
            warn!("Change dispatcher is gone; epoch dropped");
        }
    }

    /// Block until every epoch published before this call has been delivered.
    pub(crate) fn flush(&self) {
        let (ack_tx, ack_rx) = mpsc::channel();
        {
            let tx = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
            if tx.send(Message::Flush(ack_tx)).is_err() {
                return;
            }
        }
        // Err means the dispatcher thread is gone; nothing left to wait for
        let _ = ack_rx.recv();
    }
}

fn run(rx: &Receiver<Message>, observers: &ObserverList) {
    while let Ok(first) = rx.recv() {
        let mut latest: Option<ChangeEpoch> = None;
        let mut acks = Vec::new();
        let mut coalesced = 0usize;

        let mut take = |msg: Message| match msg {
            Message::Epoch(epoch) => {
                latest = Some(match latest.take() {
                    Some(earlier) => {
                        coalesced += 1;
                        earlier.absorb(epoch)
                    }
                    None => epoch,
                });
            }
            Message::Flush(ack) => acks.push(ack),
        };

        take(first);
        while let Ok(more) = rx.try_recv() {
            take(more);
        }

        if let Some(epoch) = latest {
            if coalesced > 0 {
                debug!(seq = epoch.seq, coalesced, "Coalesced queued epochs");
            }
            deliver(observers, &epoch);
        }

        for ack in acks {
            let _ = ack.send(());
        }
    }
    debug!("Change dispatcher stopped");
}

fn deliver(observers: &ObserverList, epoch: &ChangeEpoch) {
    let live: Vec<Arc<dyn ChangeObserver>> = {
        let mut list = observers.lock().unwrap_or_else(PoisonError::into_inner);
        list.retain(|o| o.strong_count() > 0);
        list.iter().filter_map(Weak::upgrade).collect()
    };

    for observer in live {
        if catch_unwind(AssertUnwindSafe(|| observer.on_change(epoch))).is_err() {
            warn!(seq = epoch.seq, "Change observer panicked; continuing");
        }
    }
}
