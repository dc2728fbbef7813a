//! Livesync client core.
//!
//! Turns the unordered, duplicated, delayed event stream of a gossiped graph
//! store into something an application can use:
//!
//! - [`spawn_reconciler`]: long-lived, insertion-ordered view of a room
//! - [`discover`]: bounded one-shot snapshot for stateless callers
//! - [`FileService`]: list, download, upsert and delete on top of both
//! - [`resolve_room`]: which room this session works in
//!
//! Two execution models share the store and nothing else. A reconciler owns
//! its view for as long as it is subscribed. A discovery session owns its
//! accumulator for one call and may run concurrently with any number of
//! others, which is why every check-then-write here is advisory.

pub mod constants;
pub mod discovery;
pub mod files;
pub mod reconciler;
pub mod room;
pub mod room_store;
pub mod view;

pub use constants::Timeouts;
pub use discovery::{
    Discovery, DiscoveryOptions, Ended, StopWhen, discover, discover_all, discover_by_name,
};
pub use files::{
    DeleteOutcome, Delivery, FileService, FilesError, Lookup, SaveOutcome, UpsertOutcome,
};
pub use reconciler::{ReconcilerHandle, SyncStatus, ViewChange, spawn_reconciler};
pub use room::{
    FileRoomPersistence, MemoryRoomPersistence, RoomError, RoomPersistence, resolve_room,
    room_share_url,
};
pub use room_store::{RecordEvent, RecordEvents, RoomStore, room_collection};
pub use view::{ApplyResult, FileView, SkipReason, pick_newest};
