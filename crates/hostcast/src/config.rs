//! Relay configuration.

use serde::{Deserialize, Serialize};
use shared_types::RendezvousAddress;
use std::time::Duration;
use tracing::{info, warn};

/// Pause between losing the hub and racing for the port again.
pub const DEFAULT_RETRY_DELAY_MS: u64 = 50;

/// Upper bound on TCP connect plus WebSocket handshake.
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 2_000;

/// Default maximum frame size (1MB)
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 1024 * 1024;

/// Default per-handle event buffer.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1000;

/// Tunables shared by every coordinator a manager creates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Address used by `create_channel` when none is given.
    pub default_address: RendezvousAddress,
    /// Delay after a failed client connection before retrying (in milliseconds)
    pub retry_delay_ms: u64,
    /// Connect and handshake timeout (in milliseconds)
    pub connect_timeout_ms: u64,
    /// Frames longer than this are dropped as decode errors
    pub max_message_bytes: usize,
    /// Events buffered per handle subscription before the oldest are lost
    pub channel_capacity: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            default_address: RendezvousAddress::default(),
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl RelayConfig {
    /// Defaults overridden from `HOSTCAST_*` environment variables.
    ///
    /// Unparseable values are logged and ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("HOSTCAST_URL") {
            match RendezvousAddress::parse(&url) {
                Ok(address) => {
                    info!(address = %address, "Loaded rendezvous address from environment");
                    config.default_address = address;
                }
                Err(e) => warn!(error = %e, "Ignoring HOSTCAST_URL"),
            }
        }
        if let Some(ms) = env_number("HOSTCAST_RETRY_DELAY_MS") {
            config.retry_delay_ms = ms;
        }
        if let Some(ms) = env_number("HOSTCAST_CONNECT_TIMEOUT_MS") {
            config.connect_timeout_ms = ms;
        }
        if let Some(bytes) = env_number("HOSTCAST_MAX_MESSAGE_BYTES") {
            config.max_message_bytes = bytes;
        }

        config
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.connect_timeout_ms == 0 {
            return Err(ConfigError::InvalidTimeout(
                "connect_timeout_ms must be > 0".into(),
            ));
        }
        if self.max_message_bytes == 0 {
            return Err(ConfigError::InvalidLimit(
                "max_message_bytes must be > 0".into(),
            ));
        }
        if self.channel_capacity == 0 {
            return Err(ConfigError::InvalidLimit(
                "channel_capacity must be > 0".into(),
            ));
        }
        Ok(())
    }
}

fn env_number<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(variable = name, value = %raw, "Ignoring non-numeric value");
            None
        }
    }
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Invalid size or count limit
    #[error("invalid limit: {0}")]
    InvalidLimit(String),
    /// Invalid timeout value
    #[error("invalid timeout: {0}")]
    InvalidTimeout(String),
}
