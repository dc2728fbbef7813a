//! Insertion-ordered projection of a room's files.
//!
//! [`FileView`] is the pure half of the local reconciler: no I/O, no tasks,
//! just the apply rules, so every ordering of gossip events can be tested
//! directly.
//!
//! # Apply Rules
//!
//! - tombstone, id known    -> remove (other entries keep their order)
//! - tombstone, id unknown  -> skip; "never seen, then deleted" stays absent
//! - present, id unknown    -> append
//! - present, id known, same content and lastModified -> skip (echo)
//! - present, id known, otherwise -> replace in place

use indexmap::IndexMap;
use livesync_types::{FileId, FileRecord, Record};
use tracing::trace;

/// Result of applying one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyResult {
    /// New id appended at `index`.
    Inserted { index: usize },
    /// Existing id replaced at `index`; position preserved.
    Updated { index: usize },
    /// Id removed from `index`.
    Removed { index: usize },
    /// Nothing changed.
    Skipped { reason: SkipReason },
}

impl ApplyResult {
    /// True when the view changed.
    pub fn is_visible(&self) -> bool {
        !matches!(self, ApplyResult::Skipped { .. })
    }
}

/// Why an event left the view untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Same content and lastModified as the cached record.
    Unchanged,
    /// Tombstone for an id this view never held.
    UnknownTombstone,
}

/// Ordered registry of the files currently visible in a room.
#[derive(Debug, Clone, Default)]
pub struct FileView {
    files: IndexMap<FileId, FileRecord>,
    /// Bumped on every visible change.
    version: u64,
}

impl FileView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one event for `id`.
    pub fn apply(&mut self, id: FileId, record: Record) -> ApplyResult {
        let result = match record {
            Record::Tombstone => match self.files.shift_remove_full(&id) {
                Some((index, _, _)) => ApplyResult::Removed { index },
                None => ApplyResult::Skipped { reason: SkipReason::UnknownTombstone },
            },
            Record::Present(mut incoming) => {
                incoming.id = id.clone();
                match self.files.get_full_mut(&id) {
                    Some((index, _, cached)) => {
                        if cached.same_revision(&incoming) {
                            ApplyResult::Skipped { reason: SkipReason::Unchanged }
                        } else {
                            *cached = incoming;
                            ApplyResult::Updated { index }
                        }
                    }
                    None => {
                        let (index, _) = self.files.insert_full(id.clone(), incoming);
                        ApplyResult::Inserted { index }
                    }
                }
            }
        };

        if result.is_visible() {
            self.version += 1;
        }
        trace!(%id, ?result, version = self.version, "Applied event");
        result
    }

    /// Snapshot of the files in display order.
    pub fn files(&self) -> Vec<FileRecord> {
        self.files.values().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FileRecord> {
        self.files.values()
    }

    pub fn get(&self, id: &FileId) -> Option<&FileRecord> {
        self.files.get(id)
    }

    /// The record named `name`. Duplicates resolve to the newest.
    pub fn find_by_name(&self, name: &str) -> Option<&FileRecord> {
        pick_newest(self.files.values().filter(|f| f.name == name))
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn version(&self) -> u64 {
        self.version
    }
}

/// Deterministic pick among records sharing a name: newest lastModified,
/// then the greater id.
pub fn pick_newest<'a, I>(records: I) -> Option<&'a FileRecord>
where
    I: IntoIterator<Item = &'a FileRecord>,
{
    records.into_iter().max_by(|a, b| {
        a.last_modified
            .cmp(&b.last_modified)
            .then_with(|| a.id.as_str().cmp(b.id.as_str()))
    })
}

// ============================================================================
// Tests
// ============================================================================
