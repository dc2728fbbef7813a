//! Typed boundary between the shape-free store and the rest of the client.
//!
//! Every node delivered by the store is validated into a [`Record`] here.
//! Nothing downstream ever sees raw JSON. A payload that fails validation is
//! indistinguishable from a tombstone: the record is treated as absent.

use std::sync::Arc;

use livesync_store::{
    Collection, GraphStore, Put, PutAck, StoreEvent, StoreResult, Subscription,
};
use livesync_types::{ContentPatch, FILES_SEGMENT, FileId, FileRecord, NAMESPACE, Record, RoomId};
use tracing::{debug, warn};

/// Collection holding a room's file records: `livesync-v1/<room>/files`.
pub fn room_collection(room: &RoomId) -> Collection {
    Collection::new([NAMESPACE, room.as_str(), FILES_SEGMENT])
}

/// A graph store bound to one room.
#[derive(Clone)]
pub struct RoomStore {
    store: Arc<dyn GraphStore>,
    room: RoomId,
    collection: Collection,
}

impl RoomStore {
    pub fn new(store: Arc<dyn GraphStore>, room: RoomId) -> Self {
        let collection = room_collection(&room);
        Self { store, room, collection }
    }

    pub fn room(&self) -> &RoomId {
        &self.room
    }

    pub fn collection(&self) -> &Collection {
        &self.collection
    }

    /// Continuous events: every known record, then every change.
    pub fn events(&self) -> StoreResult<RecordEvents> {
        Ok(RecordEvents::new(self.store.subscribe_all(&self.collection)?))
    }

    /// One-shot events: each record at most once, never a completion signal.
    pub fn snapshot_events(&self) -> StoreResult<RecordEvents> {
        Ok(RecordEvents::new(self.store.once_all(&self.collection)?))
    }

    /// Read one record from the local replica. `None` means never seen.
    pub async fn get(&self, id: &FileId) -> StoreResult<Option<Record>> {
        let node = self.store.get(&self.collection, id.as_str()).await?;
        Ok(node.map(|node| decode(id, node.as_ref())))
    }

    /// Write a whole record under its id.
    pub fn write(&self, record: &FileRecord) -> StoreResult<PutAck> {
        self.store
            .put(&self.collection, record.id.as_str(), Put::Replace(record.to_node()))
    }

    /// Merge a content patch into whatever the store holds for `id`.
    pub fn patch(&self, id: &FileId, patch: &ContentPatch) -> StoreResult<PutAck> {
        self.store.put(&self.collection, id.as_str(), Put::Merge(patch.to_node()))
    }

    pub fn tombstone(&self, id: &FileId) -> StoreResult<PutAck> {
        self.store.put(&self.collection, id.as_str(), Put::Tombstone)
    }
}

impl std::fmt::Debug for RoomStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomStore")
            .field("room", &self.room)
            .field("collection", &self.collection)
            .finish_non_exhaustive()
    }
}

/// A validated `(id, record)` pair.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordEvent {
    pub id: FileId,
    pub record: Record,
}

/// Typed stream over a store subscription.
#[derive(Debug)]
pub struct RecordEvents {
    inner: Subscription,
}

impl RecordEvents {
    fn new(inner: Subscription) -> Self {
        Self { inner }
    }

    /// Next validated event. `None` once the store is gone.
    pub async fn recv(&mut self) -> Option<RecordEvent> {
        loop {
            let event = self.inner.recv().await?;
            if let Some(event) = convert(event) {
                return Some(event);
            }
        }
    }

    pub fn try_recv(&mut self) -> Option<RecordEvent> {
        loop {
            let event = self.inner.try_recv()?;
            if let Some(event) = convert(event) {
                return Some(event);
            }
        }
    }
}

fn convert(event: StoreEvent) -> Option<RecordEvent> {
    let id = match FileId::new(&event.key) {
        Ok(id) => id,
        Err(e) => {
            warn!(key = %event.key, error = %e, "Dropping event with unusable key");
            return None;
        }
    };
    let record = decode(&id, event.node.as_ref());
    Some(RecordEvent { id, record })
}

fn decode(id: &FileId, node: Option<&serde_json::Map<String, serde_json::Value>>) -> Record {
    match Record::from_node(id, node) {
        Ok(record) => record,
        Err(e) => {
            debug!(%id, error = %e, "Malformed payload treated as tombstone");
            Record::Tombstone
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use livesync_store::{Mesh, MeshConfig};
    use serde_json::{Map, json};

    fn room_store(mesh: &Mesh) -> RoomStore {
        RoomStore::new(Arc::new(mesh.join()), RoomId::new("r1").unwrap())
    }

    #[test]
    fn test_collection_path() {
        let room = RoomId::new("r1").unwrap();
        assert_eq!(room_collection(&room).to_string(), "livesync-v1/r1/files");
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_then_read_back() {
        let mesh = Mesh::new(MeshConfig::default());
        let store = room_store(&mesh);
        let record = FileRecord::new(FileId::generate(), "a.txt", "hi");

        store.write(&record).unwrap();

        let read = store.get(&record.id).await.unwrap().unwrap();
        assert_eq!(read, Record::Present(record));
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_seen_vs_tombstoned() {
        let mesh = Mesh::new(MeshConfig::default());
        let store = room_store(&mesh);
        let id = FileId::generate();

        assert_eq!(store.get(&id).await.unwrap(), None);
        store.tombstone(&id).unwrap();
        assert_eq!(store.get(&id).await.unwrap(), Some(Record::Tombstone));
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_payload_is_a_tombstone() {
        let mesh = Mesh::new(MeshConfig::default());
        let peer = Arc::new(mesh.join());
        let store = RoomStore::new(peer.clone(), RoomId::new("r1").unwrap());

        let mut bad = Map::new();
        bad.insert("content".into(), json!("no name here"));
        peer.put(store.collection(), "broken", Put::Replace(bad)).unwrap();

        let mut events = store.snapshot_events().unwrap();
        let event = events.try_recv().unwrap();
        assert_eq!(event.id.as_str(), "broken");
        assert!(event.record.is_tombstone());
    }

    #[tokio::test(start_paused = true)]
    async fn test_patch_merges_content_only() {
        let mesh = Mesh::new(MeshConfig::default());
        let store = room_store(&mesh);
        let record = FileRecord::with_timestamp(FileId::generate(), "notes.md", "old", 1);
        store.write(&record).unwrap();

        let patch = ContentPatch {
            content: "newer".into(),
            last_modified: 2,
            size: 5,
        };
        store.patch(&record.id, &patch).unwrap();

        let read = store.get(&record.id).await.unwrap().unwrap().into_present().unwrap();
        assert_eq!(read.name, "notes.md");
        assert_eq!(read.file_type, "MD");
        assert_eq!(read.content, "newer");
        assert_eq!(read.last_modified, 2);
    }
}
