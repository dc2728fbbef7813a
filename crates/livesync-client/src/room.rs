//! Room resolution and share links.
//!
//! Precedence: explicit room (e.g. a `?room=` link) > persisted preference >
//! freshly generated `sync-xxxxx`. Whatever wins is persisted for next time.

use std::io;
use std::path::{Path, PathBuf};

use livesync_types::RoomId;
use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::constants::{ROOM_QUERY_PARAM, ROOM_STORAGE_KEY};

#[derive(Debug, Error)]
pub enum RoomError {
    #[error("no config directory available")]
    NoConfigDir,
    #[error("failed to read room from {path}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("failed to persist room to {path}: {source}")]
    Write { path: PathBuf, source: io::Error },
    #[error("invalid share base url: {0}")]
    ShareUrl(#[from] url::ParseError),
}

/// Where the last-used room is remembered.
pub trait RoomPersistence: Send + Sync {
    /// The stored room, if any.
    fn load(&self) -> Result<Option<String>, RoomError>;
    fn store(&self, room: &RoomId) -> Result<(), RoomError>;
}

/// Room remembered in a plain file, by default
/// `<config dir>/livesync/livesync_room_id`.
#[derive(Clone, Debug)]
pub struct FileRoomPersistence {
    path: PathBuf,
}

impl FileRoomPersistence {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn in_config_dir() -> Result<Self, RoomError> {
        let dir = dirs::config_dir().ok_or(RoomError::NoConfigDir)?;
        Ok(Self::new(dir.join("livesync").join(ROOM_STORAGE_KEY)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RoomPersistence for FileRoomPersistence {
    fn load(&self) -> Result<Option<String>, RoomError> {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) => Ok(Some(raw.trim().to_string())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(RoomError::Read {
                path: self.path.clone(),
                source,
            }),
        }
    }

    fn store(&self, room: &RoomId) -> Result<(), RoomError> {
        let write_err = |source| RoomError::Write {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        std::fs::write(&self.path, room.as_str()).map_err(write_err)
    }
}

/// Room remembered for the life of the process.
#[derive(Debug, Default)]
pub struct MemoryRoomPersistence {
    room: Mutex<Option<String>>,
}

impl MemoryRoomPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_room(room: impl Into<String>) -> Self {
        Self {
            room: Mutex::new(Some(room.into())),
        }
    }
}

impl RoomPersistence for MemoryRoomPersistence {
    fn load(&self) -> Result<Option<String>, RoomError> {
        Ok(self.room.lock().clone())
    }

    fn store(&self, room: &RoomId) -> Result<(), RoomError> {
        *self.room.lock() = Some(room.as_str().to_string());
        Ok(())
    }
}

/// Pick the room for this session and remember it.
pub fn resolve_room(
    explicit: Option<&str>,
    persistence: &dyn RoomPersistence,
) -> Result<RoomId, RoomError> {
    let room = match explicit.and_then(|raw| RoomId::new(raw).ok()) {
        Some(room) => {
            debug!(%room, "Using explicit room");
            room
        }
        None => match persistence.load()?.and_then(|raw| RoomId::new(raw).ok()) {
            Some(room) => {
                debug!(%room, "Using persisted room");
                room
            }
            None => {
                let room = RoomId::generate();
                info!(%room, "Generated new room");
                room
            }
        },
    };
    persistence.store(&room)?;
    Ok(room)
}

/// `base` with its `room` query parameter set to `room`.
pub fn room_share_url(base: &str, room: &RoomId) -> Result<Url, RoomError> {
    let mut url = Url::parse(base)?;
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| key != ROOM_QUERY_PARAM)
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    url.query_pairs_mut()
        .clear()
        .extend_pairs(kept)
        .append_pair(ROOM_QUERY_PARAM, room.as_str());
    Ok(url)
}
