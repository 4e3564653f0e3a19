//! Configuration loading and types for casgate.
//!
//! Configuration is read from a YAML file and deserialized into the
//! [`Config`] struct.  Every field has a default, so an empty file, or no
//! file at all, yields a working in-memory gateway.

use serde::Deserialize;
use std::path::Path;

use crate::layer::memory::DEFAULT_READ_CHUNK_SIZE;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Gateway identity settings.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Container network backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Observability settings.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind host address.
    #[serde(default = "default_host")]
    pub host: String,

    /// Bind port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// AWS region to present (e.g. `us-east-1`).
    #[serde(default = "default_region")]
    pub region: String,

    /// Graceful shutdown timeout in seconds.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout: u64,

    /// Maximum object size in bytes (default 5 GiB).
    #[serde(default = "default_max_object_size")]
    pub max_object_size: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            region: default_region(),
            shutdown_timeout: default_shutdown_timeout(),
            max_object_size: default_max_object_size(),
        }
    }
}

/// Gateway identity.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    /// Owner recorded on containers created through the gateway.
    #[serde(default = "default_owner")]
    pub owner: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            owner: default_owner(),
        }
    }
}

/// Container network backend configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Backend type.  Only `memory` is available.
    #[serde(default = "default_storage_backend")]
    pub backend: String,

    /// Memory backend configuration.
    #[serde(default)]
    pub memory: MemoryStorageConfig,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
            memory: MemoryStorageConfig::default(),
        }
    }
}

/// Memory backend configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MemoryStorageConfig {
    /// Maximum total payload size in bytes (0 = unlimited).
    #[serde(default)]
    pub max_size_bytes: u64,

    /// Size of the chunks payloads are streamed in.
    #[serde(default = "default_read_chunk_size")]
    pub read_chunk_size: usize,
}

impl Default for MemoryStorageConfig {
    fn default() -> Self {
        Self {
            max_size_bytes: 0,
            read_chunk_size: default_read_chunk_size(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error.  `RUST_LOG` overrides it.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: text or json.
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Observability settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    /// Enable Prometheus metrics collection and the `/metrics` endpoint.
    #[serde(default = "default_true")]
    pub metrics: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self { metrics: true }
    }
}

// -- Defaults ----------------------------------------------------------------

fn default_true() -> bool {
    true
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8084
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_owner() -> String {
    "casgate".to_string()
}

fn default_storage_backend() -> String {
    "memory".to_string()
}

fn default_read_chunk_size() -> usize {
    DEFAULT_READ_CHUNK_SIZE
}

fn default_shutdown_timeout() -> u64 {
    30
}

fn default_max_object_size() -> u64 {
    5_368_709_120 // 5 GiB
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

// -- Loader ------------------------------------------------------------------

/// Load and parse configuration from a YAML file at `path`.
///
/// A missing file yields the defaults; an unreadable or malformed one is an
/// error.
pub fn load_config<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(Config::default());
    }
    let contents = std::fs::read_to_string(path)?;
    let config: Config = serde_yaml::from_str(&contents)?;
    if config.storage.backend != "memory" {
        anyhow::bail!(
            "unsupported storage backend '{}' (expected 'memory')",
            config.storage.backend
        );
    }
    Ok(config)
}

// -- Tests -------------------------------------------------------------------
