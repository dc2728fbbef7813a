//! Collection-scoped subscriptions.
//!
//! A [`Subscription`] drains a backlog (the keys known when it opened) and
//! then a broadcast receiver of live changes, keeping only events for its own
//! collection. In [`SubscriptionMode::Once`] each key is delivered at most
//! once; in [`SubscriptionMode::Continuous`] every change is delivered,
//! duplicates included.
//!
//! A receiver that falls behind the broadcast has lost events. When the
//! subscription knows its source it re-snapshots: the backlog is refilled
//! with the current state of every key and a fresh receiver is taken, so the
//! latest value of each key is still delivered.

use std::collections::{HashSet, VecDeque};
use std::sync::Weak;

use tokio::sync::broadcast;

use crate::graph::{Collection, StoreEvent};

/// Delivery semantics of a subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubscriptionMode {
    /// Every change, at least once.
    Continuous,
    /// Every key, at most once.
    Once,
}

/// Source of a consistent snapshot, used to recover from lag.
pub trait Resync: Send + Sync {
    /// Current state of every key in `collection`, and a receiver for every
    /// change after it, taken atomically.
    fn snapshot(&self, collection: &Collection)
    -> (Vec<StoreEvent>, broadcast::Receiver<StoreEvent>);
}

/// A live view of one collection's events.
pub struct Subscription {
    collection: Collection,
    backlog: VecDeque<StoreEvent>,
    rx: broadcast::Receiver<StoreEvent>,
    /// Keys already delivered, tracked only in `Once` mode.
    seen: Option<HashSet<String>>,
    source: Option<Weak<dyn Resync>>,
}

impl Subscription {
    /// Build a subscription from a snapshot taken atomically with `rx`.
    ///
    /// Every change must land either in `backlog` or in `rx`, never neither.
    pub fn new(
        collection: Collection,
        backlog: Vec<StoreEvent>,
        rx: broadcast::Receiver<StoreEvent>,
        mode: SubscriptionMode,
    ) -> Self {
        let seen = match mode {
            SubscriptionMode::Continuous => None,
            SubscriptionMode::Once => Some(HashSet::new()),
        };
        Self {
            collection,
            backlog: backlog.into(),
            rx,
            seen,
            source: None,
        }
    }

    /// Re-snapshot from `source` whenever the receiver lags.
    pub fn with_resync(mut self, source: Weak<dyn Resync>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn collection(&self) -> &Collection {
        &self.collection
    }

    pub fn mode(&self) -> SubscriptionMode {
        if self.seen.is_some() {
            SubscriptionMode::Once
        } else {
            SubscriptionMode::Continuous
        }
    }

    fn admit(&mut self, event: &StoreEvent) -> bool {
        if event.collection != self.collection {
            return false;
        }
        match &mut self.seen {
            Some(seen) => seen.insert(event.key.clone()),
            None => true,
        }
    }

    fn next_buffered(&mut self) -> Option<StoreEvent> {
        while let Some(event) = self.backlog.pop_front() {
            if self.admit(&event) {
                return Some(event);
            }
        }
        None
    }

    /// Refill the backlog after `missed` events were dropped.
    ///
    /// Returns false when the source is gone and the stream should end.
    fn recover(&mut self, missed: u64) -> bool {
        let Some(source) = self.source.as_ref() else {
            tracing::warn!(
                collection = %self.collection,
                lagged = missed,
                "Store subscription lagged behind, events lost"
            );
            return true;
        };
        let Some(source) = source.upgrade() else {
            return false;
        };
        let (backlog, rx) = source.snapshot(&self.collection);
        tracing::warn!(
            collection = %self.collection,
            lagged = missed,
            replayed = backlog.len(),
            "Store subscription lagged behind, resyncing"
        );
        self.backlog = backlog.into();
        self.rx = rx;
        true
    }

    /// Receive the next event, waiting if necessary.
    ///
    /// Returns None once the store side is gone.
    pub async fn recv(&mut self) -> Option<StoreEvent> {
        loop {
            if let Some(event) = self.next_buffered() {
                return Some(event);
            }
            match self.rx.recv().await {
                Ok(event) => {
                    if self.admit(&event) {
                        return Some(event);
                    }
                }
                Err(broadcast::error::RecvError::Closed) => return None,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    if !self.recover(n) {
                        return None;
                    }
                }
            }
        }
    }

    /// Receive the next event without blocking.
    pub fn try_recv(&mut self) -> Option<StoreEvent> {
        loop {
            if let Some(event) = self.next_buffered() {
                return Some(event);
            }
            match self.rx.try_recv() {
                Ok(event) => {
                    if self.admit(&event) {
                        return Some(event);
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Closed) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    if !self.recover(n) {
                        return None;
                    }
                }
            }
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("collection", &self.collection)
            .field("mode", &self.mode())
            .field("backlog", &self.backlog.len())
            .field("resync", &self.source.is_some())
            .finish_non_exhaustive()
    }
}
