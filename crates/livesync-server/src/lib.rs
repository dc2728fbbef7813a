//! Livesync HTTP server.
//!
//! Stateless request handlers over a room's gossiped file records: every
//! request runs one bounded discovery session and answers from whatever
//! arrived before its deadline.

pub mod config;
pub mod constants;
pub mod http;
pub mod server;
pub mod state;

pub use config::{ConfigError, ServerConfig};
pub use http::{AppError, AppResult, HttpServer, create_app};
pub use server::{Server, run_with_config_until_ctrl_c};
pub use state::{AppState, LocalRelay};
