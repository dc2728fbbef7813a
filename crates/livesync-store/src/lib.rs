//! # livesync-store
//!
//! The seam between livesync and the replicated key/value graph store.
//!
//! The real store is an externally hosted, eventually consistent graph
//! replicated over gossiping relays. It offers four things per collection:
//!
//! - `get(key)`: single-shot read of the local replica
//! - `put(key, node | null)`: write or tombstone, with an optional ack
//! - `subscribe_all`: continuous, at-least-once, unordered delivery
//! - `once_all`: single-shot enumeration that never says "done"
//!
//! [`GraphStore`] is that contract. Nodes are shape-free JSON objects; typed
//! validation belongs to the caller.
//!
//! [`Mesh`] is an in-process stand-in: every [`MeshPeer`] owns a replica,
//! writes apply locally at once and reach other peers after the configured
//! propagation latency, and conflicts resolve last-writer-wins. Tests drive it
//! under a paused Tokio clock to reproduce gossip timing exactly.

mod error;
mod graph;
mod mesh;
mod subscription;

pub use error::{StoreError, StoreResult};
pub use graph::{AckStatus, Collection, Connector, GraphStore, Node, Put, PutAck, StoreEvent};
pub use mesh::{Mesh, MeshConfig, MeshPeer, PeerId};
pub use subscription::{Resync, Subscription, SubscriptionMode};
