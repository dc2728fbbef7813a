//! In-process gossip mesh.
//!
//! Simulates the external replicated store closely enough to exercise every
//! timing hazard the client has to survive:
//!
//! ```text
//!   MeshPeer A ──put──▶ replica A (applied now, event emitted)
//!                          │
//!                          └── after `latency` ──▶ replica B, C, ... (join)
//!                                                   └── first apply fires the ack
//!
//!   Mesh::join() ──▶ fresh empty replica
//!                          └── after `latency` ──▶ bulk sync from every peer
//! ```
//!
//! # Merge Semantics
//!
//! Every key is tracked per field. A whole-node write (replace or tombstone)
//! moves the key's base stamp and drops older fields; a merge only adds the
//! fields it carries, each stamped with its own write. Replicas join these
//! states, so delivery order never matters and a merge from a peer that has
//! not synced yet cannot erase fields it never saw.
//!
//! # Concurrency Model
//!
//! - DashMap of peers, one `parking_lot::RwLock`ed replica per peer
//! - Events are broadcast while the replica write lock is held, and
//!   subscriptions snapshot under the read lock, so a change is always either
//!   in a subscription's backlog or in its receiver
//! - A mesh-wide tick orders writes; ties cannot happen

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::runtime::Handle;
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, trace, warn};

use crate::error::{StoreError, StoreResult};
use crate::graph::{Collection, Connector, GraphStore, Node, Put, PutAck, StoreEvent};
use crate::subscription::{Resync, Subscription, SubscriptionMode};

/// Identifier of a peer within one mesh.
pub type PeerId = u64;

/// Mesh simulation settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshConfig {
    /// One-way propagation delay between any two peers, in milliseconds.
    pub latency_ms: u64,
    /// Per-peer event channel capacity.
    pub event_capacity: usize,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            latency_ms: 100,
            event_capacity: 1024,
        }
    }
}

impl MeshConfig {
    pub fn latency(&self) -> Duration {
        Duration::from_millis(self.latency_ms)
    }
}

/// Write order: mesh tick first, writer id as a formality.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct Stamp {
    tick: u64,
    writer: PeerId,
}

impl Stamp {
    /// Older than every real write.
    const ZERO: Stamp = Stamp { tick: 0, writer: 0 };
}

/// Replicated state of one key.
#[derive(Clone, Debug)]
struct Entry {
    /// Stamp of the last whole-node write.
    base: Stamp,
    /// Whether that write was a tombstone.
    deleted: bool,
    /// Live fields, none older than `base`.
    fields: HashMap<String, (Value, Stamp)>,
}

impl Entry {
    fn from_put(put: Put, stamp: Stamp) -> Self {
        let stamped = |fields: Map<String, Value>| -> HashMap<String, (Value, Stamp)> {
            fields
                .into_iter()
                .map(|(name, value)| (name, (value, stamp)))
                .collect()
        };
        match put {
            Put::Replace(fields) => Self {
                base: stamp,
                deleted: false,
                fields: stamped(fields),
            },
            Put::Tombstone => Self {
                base: stamp,
                deleted: true,
                fields: HashMap::new(),
            },
            Put::Merge(fields) => Self {
                base: Stamp::ZERO,
                deleted: false,
                fields: stamped(fields),
            },
        }
    }

    /// Fold `other` in. Returns true when anything changed.
    fn join(&mut self, other: &Entry) -> bool {
        let mut changed = false;
        if other.base > self.base {
            self.base = other.base;
            self.deleted = other.deleted;
            let base = self.base;
            self.fields.retain(|_, (_, stamp)| *stamp >= base);
            changed = true;
        }
        for (name, (value, stamp)) in &other.fields {
            if *stamp < self.base {
                continue;
            }
            if self.fields.get(name).is_none_or(|(_, current)| current < stamp) {
                self.fields.insert(name.clone(), (value.clone(), *stamp));
                changed = true;
            }
        }
        changed
    }

    /// A tombstone with nothing merged on top reads as the null node.
    fn node(&self) -> Node {
        if self.deleted && self.fields.is_empty() {
            return None;
        }
        Some(
            self.fields
                .iter()
                .map(|(name, (value, _))| (name.clone(), value.clone()))
                .collect(),
        )
    }

    fn latest(&self) -> Stamp {
        self.fields
            .values()
            .map(|(_, stamp)| *stamp)
            .fold(self.base, Stamp::max)
    }
}

type Key = (Collection, String);

/// One peer's copy of the graph.
struct Replica {
    peer: PeerId,
    entries: RwLock<HashMap<Key, Entry>>,
    events: broadcast::Sender<StoreEvent>,
}

impl Replica {
    fn new(peer: PeerId, capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity);
        Self {
            peer,
            entries: RwLock::new(HashMap::new()),
            events,
        }
    }

    /// Join `incoming` into the key's state. Returns true when it changed.
    fn apply(&self, key: &Key, incoming: &Entry) -> bool {
        let mut entries = self.entries.write();
        let node = match entries.get_mut(key) {
            Some(current) => {
                if !current.join(incoming) {
                    trace!(peer = self.peer, key = %key.1, "Ignoring stale write");
                    return false;
                }
                current.node()
            }
            None => {
                let node = incoming.node();
                entries.insert(key.clone(), incoming.clone());
                node
            }
        };
        let _ = self.events.send(StoreEvent {
            collection: key.0.clone(),
            key: key.1.clone(),
            node,
        });
        true
    }

    fn current(&self, key: &Key) -> Option<Node> {
        self.entries.read().get(key).map(Entry::node)
    }

    fn export(&self) -> Vec<(Key, Entry)> {
        self.entries
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    fn subscribe(self: &Arc<Self>, collection: &Collection, mode: SubscriptionMode) -> Subscription {
        let (backlog, rx) = self.snapshot(collection);
        let source: Weak<dyn Resync> = Arc::downgrade(self) as Weak<Replica>;
        Subscription::new(collection.clone(), backlog, rx, mode).with_resync(source)
    }
}

impl Resync for Replica {
    fn snapshot(&self, collection: &Collection) -> (Vec<StoreEvent>, broadcast::Receiver<StoreEvent>) {
        let entries = self.entries.read();
        let mut known: Vec<(&Key, &Entry)> =
            entries.iter().filter(|((c, _), _)| c == collection).collect();
        // Oldest first, approximating arrival order.
        known.sort_by_key(|(_, entry)| entry.latest());
        let backlog = known
            .into_iter()
            .map(|((c, k), entry)| StoreEvent {
                collection: c.clone(),
                key: k.clone(),
                node: entry.node(),
            })
            .collect();
        let rx = self.events.subscribe();
        drop(entries);
        (backlog, rx)
    }
}

struct MeshInner {
    peers: DashMap<PeerId, Arc<Replica>>,
    next_peer: AtomicU64,
    clock: AtomicU64,
    latency: RwLock<Duration>,
    capacity: usize,
}

impl MeshInner {
    fn others(&self, me: PeerId) -> Vec<Arc<Replica>> {
        self.peers
            .iter()
            .filter(|entry| *entry.key() != me)
            .map(|entry| entry.value().clone())
            .collect()
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn latency(&self) -> Duration {
        *self.latency.read()
    }
}

/// A set of peers gossiping one shared graph.
#[derive(Clone)]
pub struct Mesh {
    inner: Arc<MeshInner>,
}

impl Mesh {
    pub fn new(config: MeshConfig) -> Self {
        Self {
            inner: Arc::new(MeshInner {
                peers: DashMap::new(),
                next_peer: AtomicU64::new(0),
                clock: AtomicU64::new(0),
                latency: RwLock::new(config.latency()),
                capacity: config.event_capacity.max(1),
            }),
        }
    }

    /// Join with an empty replica.
    ///
    /// Existing state arrives one propagation delay later. Outside a Tokio
    /// runtime the peer joins without that initial sync.
    pub fn join(&self) -> MeshPeer {
        let id = self.inner.next_peer.fetch_add(1, Ordering::SeqCst) + 1;
        let replica = Arc::new(Replica::new(id, self.inner.capacity));
        let sources = self.inner.others(id);
        self.inner.peers.insert(id, replica.clone());
        debug!(peer = id, sources = sources.len(), "Peer joined mesh");

        if !sources.is_empty() {
            match Handle::try_current() {
                Ok(handle) => {
                    let latency = self.inner.latency();
                    let target = replica.clone();
                    handle.spawn(async move {
                        tokio::time::sleep(latency).await;
                        let mut applied = 0usize;
                        for source in sources {
                            for (key, entry) in source.export() {
                                if target.apply(&key, &entry) {
                                    applied += 1;
                                }
                            }
                        }
                        trace!(peer = target.peer, applied, "Initial sync delivered");
                    });
                }
                Err(_) => warn!(peer = id, "No runtime, peer joins without initial sync"),
            }
        }

        MeshPeer {
            id,
            mesh: self.inner.clone(),
            replica,
        }
    }

    pub fn latency(&self) -> Duration {
        self.inner.latency()
    }

    /// Change the propagation delay for writes and joins issued from now on.
    pub fn set_latency(&self, latency: Duration) {
        *self.inner.latency.write() = latency;
    }

    pub fn peer_count(&self) -> usize {
        self.inner.peers.len()
    }
}

impl Default for Mesh {
    fn default() -> Self {
        Self::new(MeshConfig::default())
    }
}

impl std::fmt::Debug for Mesh {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mesh")
            .field("peers", &self.peer_count())
            .field("latency", &self.latency())
            .finish()
    }
}

impl Connector for Mesh {
    fn connect(&self) -> Arc<dyn GraphStore> {
        Arc::new(self.join())
    }
}

/// A peer's connection to the mesh. Dropping it leaves the mesh.
pub struct MeshPeer {
    id: PeerId,
    mesh: Arc<MeshInner>,
    replica: Arc<Replica>,
}

impl MeshPeer {
    pub fn id(&self) -> PeerId {
        self.id
    }

    fn write(&self, collection: &Collection, key: &str, put: Put) -> StoreResult<PutAck> {
        if key.is_empty() {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        let handle = Handle::try_current().map_err(|e| StoreError::NoRuntime(e.to_string()))?;
        let key = (collection.clone(), key.to_string());

        let stamp = Stamp {
            tick: self.mesh.tick(),
            writer: self.id,
        };
        let entry = Entry::from_put(put, stamp);
        self.replica.apply(&key, &entry);

        let (ack_tx, ack_rx) = oneshot::channel();
        let targets = self.mesh.others(self.id);
        if targets.is_empty() {
            trace!(peer = self.id, key = %key.1, "No other peers, write stays local");
            return Ok(PutAck::pending(ack_rx));
        }

        let latency = self.mesh.latency();
        handle.spawn(async move {
            tokio::time::sleep(latency).await;
            let mut ack = Some(ack_tx);
            for replica in targets {
                replica.apply(&key, &entry);
                if let Some(tx) = ack.take() {
                    let _ = tx.send(());
                }
            }
        });
        Ok(PutAck::pending(ack_rx))
    }
}

impl Drop for MeshPeer {
    fn drop(&mut self) {
        self.mesh.peers.remove(&self.id);
        debug!(peer = self.id, "Peer left mesh");
    }
}

impl std::fmt::Debug for MeshPeer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MeshPeer").field("id", &self.id).finish_non_exhaustive()
    }
}

#[async_trait]
impl GraphStore for MeshPeer {
    async fn get(&self, collection: &Collection, key: &str) -> StoreResult<Option<Node>> {
        Ok(self.replica.current(&(collection.clone(), key.to_string())))
    }

    fn put(&self, collection: &Collection, key: &str, put: Put) -> StoreResult<PutAck> {
        self.write(collection, key, put)
    }

    fn subscribe_all(&self, collection: &Collection) -> StoreResult<Subscription> {
        Ok(self.replica.subscribe(collection, SubscriptionMode::Continuous))
    }

    fn once_all(&self, collection: &Collection) -> StoreResult<Subscription> {
        Ok(self.replica.subscribe(collection, SubscriptionMode::Once))
    }
}
