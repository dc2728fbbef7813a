//! File operations for one room.
//!
//! [`FileService`] is the explicit, injectable replacement for a process-wide
//! client object: it is built from a [`RoomStore`] and a [`Timeouts`] policy
//! and carries no other state.
//!
//! # Upsert
//!
//! ```text
//!   discover name ──found──▶ reuse id ──┐
//!        │                              ├──▶ write record ──▶ wait ack (bounded)
//!        └──not found──▶ fresh id ──────┘
//! ```
//!
//! Check-then-write is not atomic. Two upserts of the same name whose
//! discoveries both finish before either write lands create two ids with that
//! name. Readers pick the newest (then greatest id); `delete_by_name` removes
//! all of them.

use std::time::Duration;

use futures::future::join_all;
use livesync_store::{AckStatus, PutAck, StoreError};
use livesync_types::{ContentPatch, FileId, FileRecord, ValidationError};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::constants::Timeouts;
use crate::discovery::{DiscoveryOptions, discover_all, discover_by_name};
use crate::reconciler::{ReconcilerHandle, spawn_reconciler};
use crate::room_store::RoomStore;

/// Errors from file operations.
///
/// Not-found and unacknowledged writes are outcomes, not errors.
#[derive(Debug, Error)]
pub enum FilesError {
    #[error("invalid input: {0}")]
    Validation(#[from] ValidationError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Result of a bounded lookup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Lookup<T> {
    Found(T),
    /// Nothing matched within `waited`. The record may still exist.
    NotFound { waited: Duration },
}

impl<T> Lookup<T> {
    pub fn is_found(&self) -> bool {
        matches!(self, Lookup::Found(_))
    }

    pub fn found(self) -> Option<T> {
        match self {
            Lookup::Found(value) => Some(value),
            Lookup::NotFound { .. } => None,
        }
    }
}

/// Whether a write was confirmed by another replica.
#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::Display)]
pub enum Delivery {
    Acknowledged,
    /// Broadcast, unconfirmed. Gossip may still deliver it.
    Uncertain,
}

impl From<AckStatus> for Delivery {
    fn from(status: AckStatus) -> Self {
        match status {
            AckStatus::Acked => Delivery::Acknowledged,
            AckStatus::Unacknowledged => Delivery::Uncertain,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpsertOutcome {
    pub id: FileId,
    /// False when an existing record with the name was overwritten.
    pub created: bool,
    pub delivery: Delivery,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeleteOutcome {
    /// Every id tombstoned, sorted.
    pub ids: Vec<FileId>,
    /// `Acknowledged` only if every tombstone was.
    pub delivery: Delivery,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SaveOutcome {
    /// Cached content already matched; nothing written.
    Unchanged,
    /// The view does not hold this file (not synced yet, or deleted); nothing
    /// written.
    NotInView,
    Saved(Delivery),
}

/// File operations bound to one room.
#[derive(Clone, Debug)]
pub struct FileService {
    store: RoomStore,
    timeouts: Timeouts,
}

impl FileService {
    pub fn new(store: RoomStore, timeouts: Timeouts) -> Self {
        Self { store, timeouts }
    }

    pub fn store(&self) -> &RoomStore {
        &self.store
    }

    pub fn timeouts(&self) -> &Timeouts {
        &self.timeouts
    }

    /// Start a long-lived reconciled view of this room.
    pub fn subscribe(&self) -> Result<ReconcilerHandle, FilesError> {
        Ok(spawn_reconciler(self.store.clone())?)
    }

    /// Files visible within the list deadline, sorted by name then id.
    pub async fn list(&self) -> Result<Vec<FileRecord>, FilesError> {
        let found = discover_all(&self.store, self.timeouts.list()).await?;
        Ok(found.into_sorted())
    }

    /// Look a file up by name within the download deadline.
    ///
    /// Collects for the whole window so duplicates resolve the same way on
    /// every peer.
    pub async fn find_by_name(&self, name: &str) -> Result<Lookup<FileRecord>, FilesError> {
        require_name(name)?;
        let deadline = self.timeouts.download();
        let found = discover_by_name(&self.store, name, DiscoveryOptions::until(deadline)).await?;
        match found.newest() {
            Some(file) => Ok(Lookup::Found(file.clone())),
            None => {
                warn!(room = %self.store.room(), name, "File not found within deadline");
                Ok(Lookup::NotFound { waited: deadline })
            }
        }
    }

    /// Create `name`, or overwrite the record already carrying it.
    pub async fn upsert(&self, name: &str, content: &str) -> Result<UpsertOutcome, FilesError> {
        require_name(name)?;
        let found =
            discover_by_name(&self.store, name, DiscoveryOptions::until(self.timeouts.upload()))
                .await?;

        let (id, created) = match found.newest() {
            Some(existing) => (existing.id.clone(), false),
            None => (FileId::generate(), true),
        };
        let record = FileRecord::new(id.clone(), name, content);
        let delivery = self.settle(self.store.write(&record)?).await;

        info!(room = %self.store.room(), %id, name, created, %delivery, "Upserted file");
        Ok(UpsertOutcome { id, created, delivery })
    }

    /// Always create a new record, without looking for an existing name.
    pub async fn upload_raw(&self, name: &str, content: &str) -> Result<UpsertOutcome, FilesError> {
        require_name(name)?;
        let id = FileId::generate();
        let record = FileRecord::new(id.clone(), name, content);
        let delivery = self.settle(self.store.write(&record)?).await;

        info!(room = %self.store.room(), %id, name, %delivery, "Uploaded file");
        Ok(UpsertOutcome { id, created: true, delivery })
    }

    /// Tombstone one id.
    pub async fn delete(&self, id: &FileId) -> Result<Delivery, FilesError> {
        let delivery = self.settle(self.store.tombstone(id)?).await;
        info!(room = %self.store.room(), %id, %delivery, "Deleted file");
        Ok(delivery)
    }

    /// Tombstone every record named `name` seen within the delete deadline.
    pub async fn delete_by_name(&self, name: &str) -> Result<Lookup<DeleteOutcome>, FilesError> {
        require_name(name)?;
        let deadline = self.timeouts.delete();
        let found =
            discover_by_name(&self.store, name, DiscoveryOptions::until(deadline)).await?;
        if found.is_empty() {
            warn!(room = %self.store.room(), name, "Nothing to delete within deadline");
            return Ok(Lookup::NotFound { waited: deadline });
        }

        let mut ids: Vec<FileId> = found.matches.into_keys().collect();
        ids.sort();
        let acks = ids
            .iter()
            .map(|id| self.store.tombstone(id))
            .collect::<Result<Vec<_>, _>>()?;

        let ack_timeout = self.timeouts.ack();
        let statuses = join_all(acks.into_iter().map(|ack| ack.wait(ack_timeout))).await;
        let delivery = if statuses.iter().all(|s| *s == AckStatus::Acked) {
            Delivery::Acknowledged
        } else {
            Delivery::Uncertain
        };

        info!(room = %self.store.room(), name, count = ids.len(), %delivery, "Deleted files by name");
        Ok(Lookup::Found(DeleteOutcome { ids, delivery }))
    }

    /// Save new content for an open file.
    ///
    /// Writes only content, lastModified and size, and only for a file the
    /// view currently shows. Skipped when the cached copy already holds
    /// `content`.
    pub async fn save_content(
        &self,
        view: &ReconcilerHandle,
        id: &FileId,
        content: &str,
    ) -> Result<SaveOutcome, FilesError> {
        let Some(cached) = view.get(id) else {
            warn!(room = %self.store.room(), %id, "Not in view, refusing partial save");
            return Ok(SaveOutcome::NotInView);
        };
        if cached.content == content {
            debug!(%id, "Content unchanged, skipping save");
            return Ok(SaveOutcome::Unchanged);
        }
        let patch = ContentPatch::new(content);
        let delivery = self.settle(self.store.patch(id, &patch)?).await;
        debug!(%id, size = patch.size, %delivery, "Saved content");
        Ok(SaveOutcome::Saved(delivery))
    }

    async fn settle(&self, ack: PutAck) -> Delivery {
        let delivery = Delivery::from(ack.wait(self.timeouts.ack()).await);
        if delivery == Delivery::Uncertain {
            debug!(room = %self.store.room(), "Write not acknowledged in time, assuming broadcast");
        }
        delivery
    }
}

fn require_name(name: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        return Err(ValidationError::EmptyName);
    }
    Ok(())
}
