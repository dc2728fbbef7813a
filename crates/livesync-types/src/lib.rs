//! Shared record and identity types for livesync.
//!
//! This crate is the leaf of the workspace: typed ids, the replicated file
//! record, and the validation that turns a shape-free store payload into a
//! [`Record`]. It has **no internal livesync dependencies**.
//!
//! # Entity Overview
//!
//! ```text
//! Room (RoomId) ← namespace partitioning the shared record set
//!     └── collection `livesync-v1/<room>/files`
//!         └── FileId → Record
//!                        ├── Present(FileRecord)
//!                        └── Tombstone
//! ```
//!
//! # Key Types
//!
//! |------------------|------------------------------------------------|
//! | Type             | Purpose                                        |
//! |------------------|------------------------------------------------|
//! | [`RoomId`]       | Which room (collaboration session)             |
//! | [`FileId`]       | Opaque record key, unique within a room        |
//! | [`FileRecord`]   | One replicated text file                       |
//! | [`Record`]       | Present record or tombstone                    |
//! | [`ContentPatch`] | Partial content update (content + derived)     |
//! |------------------|------------------------------------------------|

pub mod ids;
pub mod record;

pub use ids::{FileId, RoomId};
pub use record::{
    ContentPatch, Field, FileRecord, MAX_TIMESTAMP_MS, Record, ValidationError, byte_size,
    file_type_for,
};

/// Root namespace segment for every collection written by livesync.
pub const NAMESPACE: &str = "livesync-v1";

/// Collection segment holding file records inside a room.
pub const FILES_SEGMENT: &str = "files";

/// Current time as Unix milliseconds.
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
