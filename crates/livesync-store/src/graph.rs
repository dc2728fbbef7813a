//! The graph store contract.
//!
//! Everything is keyed by ([`Collection`], key). A [`Node`] is either a JSON
//! object or `None`, the tombstone. There is no atomicity across keys, no
//! compare-and-swap, and no completion signal for enumeration.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::oneshot;

use crate::error::StoreResult;
use crate::subscription::Subscription;

/// A stored node. `None` is a tombstone.
pub type Node = Option<Map<String, Value>>;

/// Path of segments naming a keyed collection, e.g. `livesync-v1/r1/files`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Collection(Vec<String>);

impl Collection {
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("/"))
    }
}

/// A write against one key.
#[derive(Clone, Debug, PartialEq)]
pub enum Put {
    /// Replace the whole node.
    Replace(Map<String, Value>),
    /// Merge these fields into the node the writer currently sees.
    Merge(Map<String, Value>),
    /// Write the null node.
    Tombstone,
}

/// One delivered `(key, node)` pair.
#[derive(Clone, Debug)]
pub struct StoreEvent {
    pub collection: Collection,
    pub key: String,
    pub node: Node,
}

impl StoreEvent {
    pub fn is_tombstone(&self) -> bool {
        self.node.is_none()
    }
}

/// Outcome of waiting for a write acknowledgment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::Display)]
pub enum AckStatus {
    /// At least one remote replica confirmed the write.
    Acked,
    /// No confirmation arrived in time. The write may still propagate.
    Unacknowledged,
}

/// Handle for a pending write acknowledgment.
///
/// Stores without an ack API hand out [`PutAck::unsupported`]; waiting on it
/// simply lets the deadline elapse, matching fire-and-forget delivery.
#[derive(Debug)]
pub struct PutAck {
    rx: Option<oneshot::Receiver<()>>,
}

impl PutAck {
    /// Ack resolved when the sender fires.
    pub fn pending(rx: oneshot::Receiver<()>) -> Self {
        Self { rx: Some(rx) }
    }

    /// The store cannot acknowledge writes.
    pub fn unsupported() -> Self {
        Self { rx: None }
    }

    /// Wait up to `timeout` for the acknowledgment.
    ///
    /// Returns early with `Unacknowledged` when the store dropped the sender,
    /// i.e. no replica is left that could confirm.
    pub async fn wait(self, timeout: Duration) -> AckStatus {
        match self.rx {
            None => {
                tokio::time::sleep(timeout).await;
                AckStatus::Unacknowledged
            }
            Some(rx) => match tokio::time::timeout(timeout, rx).await {
                Ok(Ok(())) => AckStatus::Acked,
                Ok(Err(_)) | Err(_) => AckStatus::Unacknowledged,
            },
        }
    }
}

/// Replicated key/value graph store, scoped by collection.
///
/// Implementations must be callable from within a Tokio runtime.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Read a key from the local replica.
    ///
    /// `None` means never seen; `Some(None)` means tombstoned.
    async fn get(&self, collection: &Collection, key: &str) -> StoreResult<Option<Node>>;

    /// Write or tombstone a key. Returns immediately; propagation is async.
    fn put(&self, collection: &Collection, key: &str, put: Put) -> StoreResult<PutAck>;

    /// Replay every known key, then deliver live changes until dropped.
    fn subscribe_all(&self, collection: &Collection) -> StoreResult<Subscription>;

    /// Deliver each key at most once: what is known now, then keys first
    /// learned while the subscription stays open.
    fn once_all(&self, collection: &Collection) -> StoreResult<Subscription>;
}

/// Opens fresh store connections.
///
/// Stateless request handlers connect per request, the way a serverless
/// function boots a new peer on every invocation.
pub trait Connector: Send + Sync {
    fn connect(&self) -> Arc<dyn GraphStore>;
}
