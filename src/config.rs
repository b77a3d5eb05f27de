//! Configuration management for lanshare
//!
//! Settings are layered: built-in defaults, then an optional `config.toml`,
//! then `LANSHARE_`-prefixed environment variables
//! (`LANSHARE_SERVER__PORT=9000`, `LANSHARE_CLIENT__DOWNLOAD_DIR=/tmp/dl`).

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::transfer::TransferOptions;

pub const DEFAULT_PORT: u16 = 8888;
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;
pub const DEFAULT_PROGRESS_INTERVAL_MS: u64 = 100;
pub const DEFAULT_MAX_UNIT_BYTES: usize = 16 * 1024 * 1024;

/// Complete configuration for both binaries
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub server: ServerConfig,
    pub client: ClientConfig,
}

/// Server process configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// IP address the listener binds to
    pub bind_address: String,

    /// TCP port for client connections
    pub port: u16,

    /// Flat directory exposed to clients
    pub shared_dir: String,

    /// Read/write buffer size for file streaming (power of two)
    pub chunk_size: usize,

    /// Minimum time between two progress samples
    pub progress_interval_ms: u64,

    /// Connections beyond this many are refused
    pub max_connections: usize,

    /// Largest text line or structured object the framer will buffer
    pub max_unit_bytes: usize,
}

/// Client configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ClientConfig {
    /// Local directory downloads are written into (created if absent)
    pub download_dir: String,
    pub chunk_size: usize,
    pub progress_interval_ms: u64,
    pub max_unit_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            shared_dir: "./shared".to_string(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            progress_interval_ms: DEFAULT_PROGRESS_INTERVAL_MS,
            max_connections: 32,
            max_unit_bytes: DEFAULT_MAX_UNIT_BYTES,
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            download_dir: "downloads".to_string(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            progress_interval_ms: DEFAULT_PROGRESS_INTERVAL_MS,
            max_unit_bytes: DEFAULT_MAX_UNIT_BYTES,
        }
    }
}

impl Settings {
    /// Load settings from `path` (or `./config.toml` when `None`) with
    /// environment overrides. A missing file is not an error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let server = ServerConfig::default();
        let client = ClientConfig::default();

        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name("config").required(false),
        };

        let settings = Config::builder()
            .set_default("server.bind_address", server.bind_address)?
            .set_default("server.port", server.port as u64)?
            .set_default("server.shared_dir", server.shared_dir)?
            .set_default("server.chunk_size", server.chunk_size as u64)?
            .set_default("server.progress_interval_ms", server.progress_interval_ms)?
            .set_default("server.max_connections", server.max_connections as u64)?
            .set_default("server.max_unit_bytes", server.max_unit_bytes as u64)?
            .set_default("client.download_dir", client.download_dir)?
            .set_default("client.chunk_size", client.chunk_size as u64)?
            .set_default("client.progress_interval_ms", client.progress_interval_ms)?
            .set_default("client.max_unit_bytes", client.max_unit_bytes as u64)?
            .add_source(file)
            .add_source(
                Environment::with_prefix("LANSHARE")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let settings: Settings = settings.try_deserialize()?;
        settings.server.validate()?;
        settings.client.validate()?;
        Ok(settings)
    }
}

impl ServerConfig {
    /// Validation for all server values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::Message("port cannot be 0".into()));
        }

        if self.shared_dir.trim().is_empty() {
            return Err(ConfigError::Message("shared_dir cannot be empty".into()));
        }

        if self.max_connections == 0 {
            return Err(ConfigError::Message(
                "max_connections must be greater than 0".into(),
            ));
        }

        validate_transfer(self.chunk_size, self.max_unit_bytes)
    }

    /// Bind address and port as a socket address string
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }

    pub fn shared_dir_path(&self) -> PathBuf {
        PathBuf::from(&self.shared_dir)
    }

    pub fn transfer_options(&self) -> TransferOptions {
        TransferOptions {
            chunk_size: self.chunk_size,
            progress_interval: Duration::from_millis(self.progress_interval_ms),
        }
    }
}

impl ClientConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.download_dir.trim().is_empty() {
            return Err(ConfigError::Message("download_dir cannot be empty".into()));
        }
        validate_transfer(self.chunk_size, self.max_unit_bytes)
    }

    pub fn download_dir_path(&self) -> PathBuf {
        PathBuf::from(&self.download_dir)
    }

    pub fn transfer_options(&self) -> TransferOptions {
        TransferOptions {
            chunk_size: self.chunk_size,
            progress_interval: Duration::from_millis(self.progress_interval_ms),
        }
    }
}

fn validate_transfer(chunk_size: usize, max_unit_bytes: usize) -> Result<(), ConfigError> {
    if !chunk_size.is_power_of_two() {
        return Err(ConfigError::Message(format!(
            "chunk_size must be a power of two, got {chunk_size}"
        )));
    }

    if max_unit_bytes < 1024 {
        return Err(ConfigError::Message(
            "max_unit_bytes must be at least 1024".into(),
        ));
    }

    Ok(())
}
