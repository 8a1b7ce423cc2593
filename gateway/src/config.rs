//! API gateway configuration.
//!
//! The gateway listen address comes from `AAV_GATEWAY_ADDR`; everything
//! the protocol needs comes from the library configuration
//! (`aav::AavConfig`, loaded from the file named by `AAV_CONFIG`).

use std::net::SocketAddr;

use aav::AavConfig;

/// Environment variable overriding the gateway listen address.
pub const LISTEN_ADDR_ENV: &str = "AAV_GATEWAY_ADDR";

/// Configuration for the API gateway HTTP server.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    /// Address to bind the HTTP server to.
    pub listen_addr: SocketAddr,
    /// Orchestrator configuration.
    pub aav: AavConfig,
}

impl ApiConfig {
    pub fn from_env() -> Result<Self, String> {
        let aav = AavConfig::from_env().map_err(|e| format!("failed to load configuration: {e}"))?;

        let listen_addr = match std::env::var(LISTEN_ADDR_ENV) {
            Ok(raw) => raw
                .parse()
                .map_err(|e| format!("invalid {LISTEN_ADDR_ENV} {raw:?}: {e}"))?,
            Err(_) => default_listen_addr(),
        };

        Ok(Self { listen_addr, aav })
    }
}

/// All interfaces, so a container port mapping (8081→8081) is reachable
/// from the host.
fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8081))
}
