//! Long-lived room subscriber.
//!
//! One task owns the [`FileView`] and drains the room's continuous
//! subscription, so every mutation of the view is serialized. Callers only
//! ever see snapshots.
//!
//! ```text
//!   RoomStore::events()    RecordEvent     reconciler task
//!   (gossip, unordered) ──────────────▶  FileView::apply()
//!                                              │
//!          ┌───────────────────────────────────┤
//!          ▼                 ▼                 ▼
//!   watch<files>     broadcast<ViewChange>  watch<SyncStatus>
//!          └─────────── ReconcilerHandle ──────┘
//! ```
//!
//! Teardown is synchronous: [`ReconcilerHandle::unsubscribe`] flips a
//! liveness flag under the same lock the task holds while applying, so once
//! it returns no event can reach the view or its published snapshot.

use std::sync::Arc;

use livesync_store::StoreResult;
use livesync_types::{FileId, FileRecord, Record, RoomId};
use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::constants::CHANGE_CHANNEL_CAPACITY;
use crate::room_store::{RecordEvent, RecordEvents, RoomStore};
use crate::view::{ApplyResult, FileView};

/// Subscription lifecycle as seen by the caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncStatus {
    /// Subscribed, no present record processed yet. Tombstones alone do not
    /// end it, so it may last forever in an empty room.
    Syncing,
    /// At least one present record processed.
    Live,
    /// Unsubscribed, or the store went away.
    Closed,
}

/// One visible change to the view.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ViewChange {
    pub id: FileId,
    pub result: ApplyResult,
    /// View version after the change.
    pub version: u64,
}

/// State shared between the handle and the task.
struct Shared {
    /// Cleared by teardown; checked under this lock before every mutation.
    alive: Mutex<bool>,
    shutdown: CancellationToken,
}

impl Shared {
    fn teardown(&self) {
        *self.alive.lock() = false;
        self.shutdown.cancel();
    }
}

/// Handle to a running reconciler. Dropping it unsubscribes.
pub struct ReconcilerHandle {
    room: RoomId,
    files: watch::Receiver<Arc<Vec<FileRecord>>>,
    status: watch::Receiver<SyncStatus>,
    changes: broadcast::Sender<ViewChange>,
    shared: Arc<Shared>,
}

impl ReconcilerHandle {
    pub fn room(&self) -> &RoomId {
        &self.room
    }

    /// Current files in display order.
    pub fn files(&self) -> Vec<FileRecord> {
        self.files.borrow().to_vec()
    }

    /// Cached record for `id`, if visible.
    pub fn get(&self, id: &FileId) -> Option<FileRecord> {
        self.files.borrow().iter().find(|f| &f.id == id).cloned()
    }

    /// Watch snapshots; a new value is published after every visible change.
    pub fn subscribe_files(&self) -> watch::Receiver<Arc<Vec<FileRecord>>> {
        self.files.clone()
    }

    /// Per-event change notifications. Skipped events are not sent.
    pub fn subscribe_changes(&self) -> broadcast::Receiver<ViewChange> {
        self.changes.subscribe()
    }

    pub fn status(&self) -> SyncStatus {
        *self.status.borrow()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<SyncStatus> {
        self.status.clone()
    }

    /// True until unsubscribed.
    pub fn is_alive(&self) -> bool {
        *self.shared.alive.lock()
    }

    /// Stop observing the room.
    ///
    /// After this returns the view is frozen, even if the task is mid-event.
    pub fn unsubscribe(self) {
        info!(room = %self.room, "Unsubscribing from room");
        self.shared.teardown();
    }
}

impl Drop for ReconcilerHandle {
    fn drop(&mut self) {
        self.shared.teardown();
    }
}

impl std::fmt::Debug for ReconcilerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconcilerHandle")
            .field("room", &self.room)
            .field("status", &self.status())
            .field("files", &self.files.borrow().len())
            .finish()
    }
}

/// Subscribe to a room and spawn the task that reconciles it.
///
/// Must be called within a Tokio runtime.
pub fn spawn_reconciler(store: RoomStore) -> StoreResult<ReconcilerHandle> {
    let events = store.events()?;
    let room = store.room().clone();

    let (files_tx, files_rx) = watch::channel(Arc::new(Vec::new()));
    let (status_tx, status_rx) = watch::channel(SyncStatus::Syncing);
    let (changes_tx, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
    let shared = Arc::new(Shared {
        alive: Mutex::new(true),
        shutdown: CancellationToken::new(),
    });

    let task = ReconcilerTask {
        _store: store,
        room: room.clone(),
        view: FileView::new(),
        files: files_tx,
        status: status_tx,
        changes: changes_tx.clone(),
        shared: shared.clone(),
    };
    info!(%room, "Subscribed to room");
    tokio::spawn(task.run(events));

    Ok(ReconcilerHandle {
        room,
        files: files_rx,
        status: status_rx,
        changes: changes_tx,
        shared,
    })
}

struct ReconcilerTask {
    /// Keeps the store connection open for the task's lifetime.
    _store: RoomStore,
    room: RoomId,
    view: FileView,
    files: watch::Sender<Arc<Vec<FileRecord>>>,
    status: watch::Sender<SyncStatus>,
    changes: broadcast::Sender<ViewChange>,
    shared: Arc<Shared>,
}

impl ReconcilerTask {
    async fn run(mut self, mut events: RecordEvents) {
        loop {
            let event = tokio::select! {
                biased;
                _ = self.shared.shutdown.cancelled() => break,
                event = events.recv() => event,
            };
            let Some(event) = event else {
                debug!(room = %self.room, "Store subscription ended");
                break;
            };

            if !self.apply(event) {
                break;
            }
        }
        self.status.send_replace(SyncStatus::Closed);
        debug!(room = %self.room, files = self.view.len(), "Reconciler stopped");
    }

    /// Apply one event and publish. Returns false once torn down.
    fn apply(&mut self, event: RecordEvent) -> bool {
        let alive = self.shared.alive.lock();
        if !*alive {
            return false;
        }
        let present = matches!(event.record, Record::Present(_));
        let result = self.view.apply(event.id.clone(), event.record);
        if present && *self.status.borrow() == SyncStatus::Syncing {
            self.status.send_replace(SyncStatus::Live);
        }
        if result.is_visible() {
            self.files.send_replace(Arc::new(self.view.files()));
            let _ = self.changes.send(ViewChange {
                id: event.id,
                result,
                version: self.view.version(),
            });
        }
        true
    }
}
