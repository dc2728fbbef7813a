//! Server defaults.

use std::net::{IpAddr, Ipv4Addr};

/// Default HTTP port.
pub const DEFAULT_PORT: u16 = 3000;

/// Default bind address; loopback unless configured otherwise.
pub const DEFAULT_BIND_ADDR: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

/// Default log filter when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "info";
