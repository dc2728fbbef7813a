//! Shared handler state.

use std::sync::Arc;

use livesync_client::{FileService, RoomStore, Timeouts};
use livesync_store::{Connector, GraphStore, Mesh, MeshConfig, MeshPeer};
use livesync_types::RoomId;

/// The shared app state.
///
/// Holds no room data. Every request connects a fresh store peer, the way a
/// serverless function boots a new one per invocation.
#[derive(Clone)]
pub struct AppState {
    connector: Arc<dyn Connector>,
    timeouts: Timeouts,
}

impl AppState {
    pub fn new(connector: Arc<dyn Connector>, timeouts: Timeouts) -> Self {
        Self { connector, timeouts }
    }

    pub fn timeouts(&self) -> &Timeouts {
        &self.timeouts
    }

    /// File operations for `room` over a newly connected peer.
    pub fn files(&self, room: RoomId) -> FileService {
        FileService::new(RoomStore::new(self.connector.connect(), room), self.timeouts)
    }
}

/// In-process stand-in for the public relays.
///
/// A mesh plus one anchor peer that never leaves, so records outlive the
/// short-lived request peers that wrote them.
pub struct LocalRelay {
    mesh: Mesh,
    _anchor: MeshPeer,
}

impl LocalRelay {
    pub fn new(config: MeshConfig) -> Self {
        let mesh = Mesh::new(config);
        let anchor = mesh.join();
        Self {
            mesh,
            _anchor: anchor,
        }
    }

    pub fn mesh(&self) -> &Mesh {
        &self.mesh
    }
}

impl Connector for LocalRelay {
    fn connect(&self) -> Arc<dyn GraphStore> {
        self.mesh.connect()
    }
}
