//! Server Configuration
//!
//! Read from `WORLD_*` environment variables; anything unset falls back to
//! the defaults.

use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

/// Default WebSocket port.
pub const DEFAULT_PORT: u16 = 7350;

/// Server configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// JSON file for persisted records. In-memory storage when unset.
    pub storage_path: Option<PathBuf>,
    /// Per-connection outbound message buffer.
    pub outbound_buffer: usize,
    /// Grace period handed to matches on shutdown.
    pub terminate_grace_secs: u32,
    /// Server version string.
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            max_connections: 1000,
            storage_path: None,
            outbound_buffer: 64,
            terminate_grace_secs: 5,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A variable is set but does not parse.
    #[error("invalid value {value:?} for {var}: {reason}")]
    Invalid {
        /// Variable name.
        var: &'static str,
        /// Raw value.
        value: String,
        /// Parser message.
        reason: String,
    },
}

impl ServerConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load configuration from any variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        Ok(Self {
            bind_addr: parse_var(&lookup, "WORLD_BIND_ADDR")?.unwrap_or(defaults.bind_addr),
            max_connections: parse_var(&lookup, "WORLD_MAX_CONNECTIONS")?
                .unwrap_or(defaults.max_connections),
            storage_path: lookup("WORLD_STORAGE_PATH")
                .filter(|p| !p.is_empty())
                .map(PathBuf::from),
            outbound_buffer: parse_var::<usize>(&lookup, "WORLD_OUTBOUND_BUFFER")?
                .map(|n| n.max(1))
                .unwrap_or(defaults.outbound_buffer),
            terminate_grace_secs: parse_var(&lookup, "WORLD_TERMINATE_GRACE_SECS")?
                .unwrap_or(defaults.terminate_grace_secs),
            version: defaults.version,
        })
    }
}

fn parse_var<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let Some(value) = lookup(var) else {
        return Ok(None);
    };

    match value.trim().parse::<T>() {
        Ok(parsed) => Ok(Some(parsed)),
        Err(e) => Err(ConfigError::Invalid {
            var,
            reason: e.to_string(),
            value,
        }),
    }
}
