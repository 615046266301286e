//! Configuration schema definitions.
//!
//! Two roots: [`ShipConfig`] for the ship-side proxy and [`OffshoreConfig`]
//! for the offshore egress. All types derive Serde traits for
//! deserialization from TOML; every field has a default.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::protocol::DEFAULT_MAX_FRAME_BYTES;

/// Root configuration for the ship-side proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ShipConfig {
    /// Local proxy listener facing ship clients.
    pub local: LocalConfig,

    /// The single link to the offshore host.
    pub link: LinkConfig,

    /// CONNECT tunnel settings.
    pub tunnel: TunnelConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Lifecycle settings.
    pub shutdown: ShutdownConfig,
}

/// Root configuration for the offshore egress proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct OffshoreConfig {
    /// Listener accepting ship links.
    pub server: ServerConfig,

    /// Outbound requests to origin servers.
    pub forward: ForwardConfig,

    /// CONNECT tunnel settings.
    pub tunnel: TunnelConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Lifecycle settings.
    pub shutdown: ShutdownConfig,
}

/// Ship-side local proxy listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LocalConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Maximum concurrent local client connections.
    pub max_connections: usize,

    /// How long a client waits for its queued request, in seconds.
    pub request_timeout_secs: u64,

    /// Largest accepted request head in bytes.
    pub max_header_bytes: usize,

    /// Largest accepted request body in bytes.
    pub max_body_bytes: usize,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_connections: 1024,
            request_timeout_secs: 60,
            max_header_bytes: 64 * 1024,
            max_body_bytes: 32 * 1024 * 1024,
        }
    }
}

impl LocalConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Ship-side link to the offshore proxy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Offshore address (e.g., "offshore.example.net:9999").
    pub offshore_address: String,

    /// Timeout for a single connect attempt in seconds.
    pub connect_timeout_secs: u64,

    /// Connect attempts per reconnect round.
    pub connect_attempts: u32,

    /// First backoff delay in milliseconds; doubles per attempt.
    pub base_delay_ms: u64,

    /// Backoff ceiling in milliseconds.
    pub max_delay_ms: u64,

    /// Pause after a round of attempts fails, in seconds.
    pub reconnect_pause_secs: u64,

    /// How long to wait for one framed response, in seconds.
    pub response_timeout_secs: u64,

    /// Largest frame payload accepted from the offshore side.
    pub max_frame_bytes: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            offshore_address: "127.0.0.1:9999".to_string(),
            connect_timeout_secs: 10,
            connect_attempts: 5,
            base_delay_ms: 2000,
            max_delay_ms: 60_000,
            reconnect_pause_secs: 5,
            response_timeout_secs: 60,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        }
    }
}

impl LinkConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn reconnect_pause(&self) -> Duration {
        Duration::from_secs(self.reconnect_pause_secs)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_secs(self.response_timeout_secs)
    }
}

/// Offshore listener for ship links.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:9999").
    pub bind_address: String,

    /// Maximum concurrent ship links.
    pub max_connections: usize,

    /// Largest frame payload accepted from, or sent to, a ship.
    pub max_frame_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:9999".to_string(),
            max_connections: 64,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        }
    }
}

/// Offshore outbound request settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ForwardConfig {
    /// Total time for one origin request/response in seconds.
    pub request_timeout_secs: u64,

    /// TCP connect timeout to origins and CONNECT targets in seconds.
    pub connect_timeout_secs: u64,
}

impl Default for ForwardConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 30,
            connect_timeout_secs: 30,
        }
    }
}

impl ForwardConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// CONNECT tunnel settings, shared by both sides.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TunnelConfig {
    /// Idle time the surviving direction may sit after the other one closes, in ms.
    pub linger_ms: u64,
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self { linger_ms: 5000 }
    }
}

impl TunnelConfig {
    pub fn linger(&self) -> Duration {
        Duration::from_millis(self.linger_ms)
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Prometheus endpoint bind address; disabled when unset.
    pub metrics_address: Option<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_address: None,
        }
    }
}

/// Graceful shutdown settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// How long live connections may drain after a signal, in seconds.
    pub drain_timeout_secs: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self { drain_timeout_secs: 10 }
    }
}

impl ShutdownConfig {
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }
}
