//! Configuration schema for Depot
//!
//! Configuration is stored at `~/.config/depot/config.toml`

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Transfer engine settings
    pub transfer: TransferConfig,

    /// Content cache settings
    pub cache: CacheConfig,

    /// Extraction backend settings
    pub extract: ExtractConfig,

    /// Process launch settings
    pub launch: LaunchConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Enable verbose logging
    pub verbose: bool,

    /// Log format: "text" or "json"
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            log_format: "text".to_string(),
        }
    }
}

/// Transfer engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// HTTP connect timeout in seconds
    pub connect_timeout_secs: u64,

    /// User-Agent header sent with every request
    pub user_agent: String,

    /// Minimum interval between progress reports in milliseconds
    pub progress_interval_ms: u64,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 30,
            user_agent: format!("depot/{}", env!("CARGO_PKG_VERSION")),
            progress_interval_ms: 250,
        }
    }
}

/// Content cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Cache base directory (defaults to the platform state dir)
    pub base_dir: Option<PathBuf>,

    /// Maximum number of cached entries kept after eviction
    pub max_entries: usize,

    /// Remove abandoned partial downloads older than N hours
    pub stale_partial_hours: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            base_dir: None,
            max_entries: 4,
            stale_partial_hours: 72,
        }
    }
}

/// Extraction backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractConfig {
    /// Decompression backend executable
    pub backend: String,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            backend: "7z".to_string(),
        }
    }
}

/// Process launch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LaunchConfig {
    /// Host to bind-probe and poll for readiness
    pub host: String,

    /// First port tried during port selection
    pub port_range_start: u16,

    /// Last port tried during port selection (inclusive)
    pub port_range_end: u16,

    /// Readiness polling interval in milliseconds
    pub poll_interval_ms: u64,

    /// Readiness timeout in seconds
    pub ready_timeout_secs: u64,
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port_range_start: 41_100,
            port_range_end: 41_199,
            poll_interval_ms: 500,
            ready_timeout_secs: 60,
        }
    }
}
