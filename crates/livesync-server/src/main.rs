//! Livesync server binary.
//!
//! ```bash
//! livesync-server                      # defaults, port 3000
//! livesync-server --config livesync.ron --port 8080
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use livesync_server::constants::DEFAULT_LOG_FILTER;
use livesync_server::{ServerConfig, run_with_config_until_ctrl_c};
use tracing::debug;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "livesync-server", about = "HTTP handlers for livesync rooms")]
struct Cli {
    /// Path to a RON config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on (overrides the config file)
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Cli::parse();

    let mut config = match &args.config {
        Some(path) => {
            debug!("loading config from {:?}", path);
            ServerConfig::load(path)
                .await
                .with_context(|| format!("failed to load config {}", path.display()))?
        }
        None => {
            debug!("using default config");
            ServerConfig::default()
        }
    };
    if let Some(port) = args.port {
        config.port = port;
    }

    run_with_config_until_ctrl_c(config).await
}
