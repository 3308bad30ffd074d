//! # Sync Configuration
//!
//! Configuration for the offline queue and sync engine.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     FIELDOPS_MAX_RETRIES=8                                             │
//! │     FIELDOPS_DATABASE_PATH=/data/queue.db                              │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/offline/sync.toml (Linux)                                │
//! │     ~/Library/Application Support/com.fieldops.offline/sync.toml      │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # sync.toml
//! [queue]
//! max_retries = 5
//! max_pending = 5000
//!
//! [sync]
//! poll_interval_secs = 60
//! request_timeout_ms = 15000
//! initial_backoff_ms = 30000
//! max_backoff_secs = 300
//! sync_on_reconnect = true
//!
//! [storage]
//! database_path = "/var/lib/fieldops/offline-queue.db"
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use fieldops_core::DEFAULT_MAX_RETRIES;

use crate::error::{SyncError, SyncResult};

const DATABASE_FILE: &str = "offline-queue.db";

// =============================================================================
// Queue Settings
// =============================================================================

/// Retry policy and backpressure for the pending-operation queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueSettings {
    /// Failed attempts allowed before an operation is dead-lettered.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Maximum pending operations. `None` means unbounded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_pending: Option<usize>,
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

impl Default for QueueSettings {
    fn default() -> Self {
        QueueSettings {
            max_retries: default_max_retries(),
            max_pending: None,
        }
    }
}

// =============================================================================
// Sync Settings
// =============================================================================

/// Sync behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Interval between periodic sync runs (seconds).
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Bound on one remote call (milliseconds).
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,

    /// First delay after a run that left failures (milliseconds).
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    /// Cap on the delay between automatic runs (seconds).
    #[serde(default = "default_max_backoff")]
    pub max_backoff_secs: u64,

    /// Start a run as soon as connectivity returns.
    #[serde(default = "default_true")]
    pub sync_on_reconnect: bool,
}

fn default_poll_interval() -> u64 {
    60
}
fn default_request_timeout() -> u64 {
    15_000
}
fn default_initial_backoff() -> u64 {
    30_000
}
fn default_max_backoff() -> u64 {
    300
}
fn default_true() -> bool {
    true
}

impl Default for SyncSettings {
    fn default() -> Self {
        SyncSettings {
            poll_interval_secs: default_poll_interval(),
            request_timeout_ms: default_request_timeout(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_secs: default_max_backoff(),
            sync_on_reconnect: default_true(),
        }
    }
}

// =============================================================================
// Storage Settings
// =============================================================================

/// Where the durable queue lives.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageSettings {
    /// SQLite database file. Defaults to the platform data directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_path: Option<PathBuf>,
}

// =============================================================================
// Main Sync Configuration
// =============================================================================

/// Complete sync configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Retry policy and queue limits.
    #[serde(default)]
    pub queue: QueueSettings,

    /// Sync behavior settings.
    #[serde(default)]
    pub sync: SyncSettings,

    /// Durable storage location.
    #[serde(default)]
    pub storage: StorageSettings,
}

impl SyncConfig {
    /// Creates a new config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (sync.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> SyncResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading sync config from file");
                let contents = std::fs::read_to_string(&path).map_err(|e| {
                    SyncError::ConfigLoadFailed(format!("{}: {e}", path.display()))
                })?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load sync config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> SyncResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| SyncError::ConfigSaveFailed("No config path available".into()))?;

        let save_failed = |e: std::io::Error| {
            SyncError::ConfigSaveFailed(format!("{}: {e}", path.display()))
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(save_failed)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents).map_err(save_failed)?;

        info!(?path, "Sync config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> SyncResult<()> {
        if self.queue.max_retries == 0 {
            return Err(SyncError::InvalidConfig(
                "queue.max_retries must be at least 1".into(),
            ));
        }

        if self.queue.max_pending == Some(0) {
            return Err(SyncError::InvalidConfig(
                "queue.max_pending must be greater than 0 when set".into(),
            ));
        }

        if self.sync.poll_interval_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "sync.poll_interval_secs must be greater than 0".into(),
            ));
        }

        if self.sync.request_timeout_ms == 0 {
            return Err(SyncError::InvalidConfig(
                "sync.request_timeout_ms must be greater than 0".into(),
            ));
        }

        if self.sync.initial_backoff_ms == 0 {
            return Err(SyncError::InvalidConfig(
                "sync.initial_backoff_ms must be greater than 0".into(),
            ));
        }

        if self.max_backoff() < self.initial_backoff() {
            return Err(SyncError::InvalidConfig(format!(
                "sync.max_backoff_secs ({}s) is shorter than sync.initial_backoff_ms ({}ms)",
                self.sync.max_backoff_secs, self.sync.initial_backoff_ms
            )));
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(value) = lookup("FIELDOPS_MAX_RETRIES") {
            match value.parse::<u32>() {
                Ok(n) => self.queue.max_retries = n,
                Err(_) => warn!(value = %value, "Ignoring invalid FIELDOPS_MAX_RETRIES"),
            }
        }

        if let Some(value) = lookup("FIELDOPS_MAX_PENDING") {
            match value.parse::<usize>() {
                Ok(n) => self.queue.max_pending = Some(n),
                Err(_) => warn!(value = %value, "Ignoring invalid FIELDOPS_MAX_PENDING"),
            }
        }

        if let Some(value) = lookup("FIELDOPS_POLL_INTERVAL_SECS") {
            match value.parse::<u64>() {
                Ok(secs) => self.sync.poll_interval_secs = secs,
                Err(_) => warn!(value = %value, "Ignoring invalid FIELDOPS_POLL_INTERVAL_SECS"),
            }
        }

        if let Some(value) = lookup("FIELDOPS_REQUEST_TIMEOUT_MS") {
            match value.parse::<u64>() {
                Ok(ms) => self.sync.request_timeout_ms = ms,
                Err(_) => warn!(value = %value, "Ignoring invalid FIELDOPS_REQUEST_TIMEOUT_MS"),
            }
        }

        if let Some(value) = lookup("FIELDOPS_SYNC_ON_RECONNECT") {
            match value.to_lowercase().as_str() {
                "1" | "true" | "yes" => self.sync.sync_on_reconnect = true,
                "0" | "false" | "no" => self.sync.sync_on_reconnect = false,
                _ => warn!(value = %value, "Unknown FIELDOPS_SYNC_ON_RECONNECT value"),
            }
        }

        if let Some(path) = lookup("FIELDOPS_DATABASE_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.storage.database_path = Some(PathBuf::from(path));
        }
    }

    fn project_dirs() -> Option<directories::ProjectDirs> {
        directories::ProjectDirs::from("com", "fieldops", "offline")
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        Self::project_dirs().map(|dirs| dirs.config_dir().join("sync.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// Resolves the queue database file, falling back to the platform data
    /// directory, then the working directory.
    pub fn database_path(&self) -> PathBuf {
        self.storage
            .database_path
            .clone()
            .or_else(|| Self::project_dirs().map(|dirs| dirs.data_dir().join(DATABASE_FILE)))
            .unwrap_or_else(|| PathBuf::from(DATABASE_FILE))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.sync.poll_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.sync.request_timeout_ms)
    }

    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.sync.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_secs(self.sync.max_backoff_secs)
    }
}
