//! TOML configuration for the portpool server.
//!
//! The file is optional.  A missing file yields [`ServerConfig::default()`],
//! and every field carries a `#[serde(default = "...")]`, so a file only needs
//! the keys it wants to change:
//!
//! ```toml
//! [pool]
//! bind_address = "0.0.0.0"
//! start_port   = 10000
//! end_port     = 20000
//! mode         = "protocol"   # or "tagging" or "echo"
//!
//! [session]
//! idle_timeout_secs = 0        # 0 = no timeout
//!
//! [logging]
//! log_level = "info"
//! ```
//!
//! Command-line flags and `PORTPOOL_*` environment variables are layered on
//! top of the file in `main`; this module only knows about the file.  The
//! loaded value is passed down explicitly; there is no global config.

use std::net::{AddrParseError, IpAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default config file name, resolved against the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "portpool.toml";

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A file system I/O error other than "not found".
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// `pool.bind_address` is not an IP address.
    #[error("invalid bind address '{value}': {source}")]
    InvalidBindAddress {
        value: String,
        #[source]
        source: AddrParseError,
    },
}

// ── Config schema types ───────────────────────────────────────────────────────

/// What each accepted connection speaks.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum ListenerMode {
    /// Length-prefixed JSON request/response.
    #[default]
    Protocol,
    /// Raw bytes, each read stamped with `(port, session_id)`.
    Tagging,
    /// Newline-delimited text echoed back with a `[port N] ` prefix.
    Echo,
}

impl std::fmt::Display for ListenerMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListenerMode::Protocol => f.write_str("protocol"),
            ListenerMode::Tagging => f.write_str("tagging"),
            ListenerMode::Echo => f.write_str("echo"),
        }
    }
}

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    #[serde(default)]
    pub pool: PoolConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Which ports to listen on and how.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PoolConfig {
    /// IP address every listener binds on.  `"0.0.0.0"` binds all interfaces.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// First port of the range, inclusive.
    #[serde(default = "default_start_port")]
    pub start_port: u16,
    /// Last port of the range, inclusive.
    #[serde(default = "default_end_port")]
    pub end_port: u16,
    #[serde(default)]
    pub mode: ListenerMode,
}

/// Per-connection settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SessionConfig {
    /// Seconds to wait for the next frame or chunk.  `0` waits forever.
    #[serde(default)]
    pub idle_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// `tracing` level used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}
fn default_start_port() -> u16 {
    10_000
}
fn default_end_port() -> u16 {
    20_000
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            start_port: default_start_port(),
            end_port: default_end_port(),
            mode: ListenerMode::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl PoolConfig {
    /// Parses [`PoolConfig::bind_address`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidBindAddress`] if it is not an IP address.
    pub fn bind_ip(&self) -> Result<IpAddr, ConfigError> {
        self.bind_address
            .parse()
            .map_err(|source| ConfigError::InvalidBindAddress {
                value: self.bind_address.clone(),
                source,
            })
    }
}

impl SessionConfig {
    /// The idle timeout, or `None` when disabled.
    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_secs > 0).then(|| Duration::from_secs(self.idle_timeout_secs))
    }
}

// ── Loading ───────────────────────────────────────────────────────────────────

/// Loads `ServerConfig` from `path`, returning the defaults if the file does
/// not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config(path: &Path) -> Result<ServerConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ServerConfig::default()),
        Err(e) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
