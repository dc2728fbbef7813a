//! Server configuration.
//!
//! Loaded from a RON file. Every field has a default, so an empty `()` is a
//! valid config:
//!
//! ```ron
//! (
//!     bind_addr: "0.0.0.0",
//!     port: 3000,
//!     timeouts: (list_ms: 2000, download_ms: 2500),
//!     mesh: (latency_ms: 50),
//! )
//! ```

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};

use livesync_client::Timeouts;
use livesync_store::MeshConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::{DEFAULT_BIND_ADDR, DEFAULT_PORT};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("RON parse error: {0}")]
    Ron(#[from] ron::error::SpannedError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: IpAddr,
    pub port: u16,
    /// Discovery and ack deadlines for every handler.
    pub timeouts: Timeouts,
    /// Local relay simulation settings.
    pub mesh: MeshConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR,
            port: DEFAULT_PORT,
            timeouts: Timeouts::default(),
            mesh: MeshConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load the config from a file.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_ron(&text)
    }

    pub fn from_ron(text: &str) -> Result<Self, ConfigError> {
        Ok(ron::from_str(text)?)
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_addr, self.port)
    }
}
