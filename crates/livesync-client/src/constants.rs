//! Client timing constants.
//!
//! Discovery deadlines trade latency for completeness: a lookup that misses
//! its deadline means "not seen yet", never "does not exist".

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How long a listing collects records.
pub const LIST_DEADLINE: Duration = Duration::from_millis(2000);

/// How long a download looks for its file.
pub const DOWNLOAD_DEADLINE: Duration = Duration::from_millis(2500);

/// How long a delete-by-name collects matching records.
pub const DELETE_DEADLINE: Duration = Duration::from_millis(1500);

/// How long an upsert looks for an existing record with the same name.
pub const UPLOAD_DEADLINE: Duration = Duration::from_millis(2000);

/// How long a write waits for a remote replica to confirm it.
pub const ACK_TIMEOUT: Duration = Duration::from_millis(1500);

/// Capacity of a reconciler's change broadcast.
pub const CHANGE_CHANNEL_CAPACITY: usize = 256;

/// Key under which the resolved room id is persisted.
pub const ROOM_STORAGE_KEY: &str = "livesync_room_id";

/// Query parameter carrying the room id in share links.
pub const ROOM_QUERY_PARAM: &str = "room";

/// Deadline policy for every bounded store interaction.
///
/// Serialized as milliseconds so it can sit in a config file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    pub list_ms: u64,
    pub download_ms: u64,
    pub delete_ms: u64,
    pub upload_ms: u64,
    pub ack_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            list_ms: LIST_DEADLINE.as_millis() as u64,
            download_ms: DOWNLOAD_DEADLINE.as_millis() as u64,
            delete_ms: DELETE_DEADLINE.as_millis() as u64,
            upload_ms: UPLOAD_DEADLINE.as_millis() as u64,
            ack_ms: ACK_TIMEOUT.as_millis() as u64,
        }
    }
}

impl Timeouts {
    /// Every deadline set to `deadline`.
    pub fn uniform(deadline: Duration) -> Self {
        let ms = deadline.as_millis() as u64;
        Self {
            list_ms: ms,
            download_ms: ms,
            delete_ms: ms,
            upload_ms: ms,
            ack_ms: ms,
        }
    }

    pub fn list(&self) -> Duration {
        Duration::from_millis(self.list_ms)
    }

    pub fn download(&self) -> Duration {
        Duration::from_millis(self.download_ms)
    }

    pub fn delete(&self) -> Duration {
        Duration::from_millis(self.delete_ms)
    }

    pub fn upload(&self) -> Duration {
        Duration::from_millis(self.upload_ms)
    }

    pub fn ack(&self) -> Duration {
        Duration::from_millis(self.ack_ms)
    }
}
