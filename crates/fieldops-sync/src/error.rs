//! # Sync Error Types
//!
//! Error types for queue and sync operations.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Enqueue-time   │  │   Store-level   │  │     Configuration       │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  DuplicateId    │  │  NotFound       │  │  InvalidConfig          │ │
//! │  │  QueueFull      │  │  Storage        │  │  ConfigLoadFailed       │ │
//! │  │  Validation     │  │  Serialization  │  │  ConfigSaveFailed       │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐                                                   │
//! │  │    Internal     │                                                   │
//! │  │                 │                                                   │
//! │  │  ShuttingDown   │                                                   │
//! │  │  Internal       │                                                   │
//! │  └─────────────────┘                                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Enqueue-time errors surface to the caller. Remote failures never become a
//! `SyncError`; the engine classifies each `RemoteOutcome` and folds it into
//! the session tallies and the operation's `last_error`.

use thiserror::Error;

use fieldops_core::CoreError;
use fieldops_db::DbError;

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Sync error type covering all queue and sync failures.
#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Enqueue Errors
    // =========================================================================
    /// An operation with this id is already queued or dead-lettered.
    #[error("Operation id already in use: {0}")]
    DuplicateId(String),

    /// The configured pending limit has been reached.
    #[error("Queue is full ({limit} pending operations)")]
    QueueFull { limit: usize },

    /// The draft failed a structural check.
    #[error("Invalid operation: {0}")]
    Validation(#[from] CoreError),

    // =========================================================================
    // Store Errors
    // =========================================================================
    /// The referenced operation is not in the store.
    #[error("Operation not found: {0}")]
    NotFound(String),

    /// The durable store failed. Nothing was changed.
    #[error("Storage error: {0}")]
    Storage(#[from] DbError),

    /// A persisted value could not be encoded or decoded.
    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid sync configuration.
    #[error("Invalid sync configuration: {0}")]
    InvalidConfig(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// Internal sync error.
    #[error("Internal error: {0}")]
    Internal(String),

    /// Scheduler is shutting down.
    #[error("Sync scheduler is shutting down")]
    ShuttingDown,
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::SerializationFailed(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for SyncError {
    fn from(err: toml::ser::Error) -> Self {
        SyncError::ConfigSaveFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization
// =============================================================================

impl SyncError {
    /// Returns true if repeating the same call later may succeed.
    ///
    /// `QueueFull` clears once the queue drains; storage errors are retryable
    /// when the underlying database error is.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::QueueFull { .. } => true,
            SyncError::Storage(db) => db.is_transient(),
            _ => false,
        }
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidConfig(_)
                | SyncError::ConfigLoadFailed(_)
                | SyncError::ConfigSaveFailed(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(SyncError::QueueFull { limit: 10 }.is_retryable());
        assert!(SyncError::Storage(DbError::PoolExhausted).is_retryable());

        assert!(!SyncError::NotFound("op-1".into()).is_retryable());
        assert!(!SyncError::DuplicateId("op-1".into()).is_retryable());
        assert!(!SyncError::Storage(DbError::Serialization("bad".into())).is_retryable());
    }

    #[test]
    fn test_config_errors() {
        assert!(SyncError::InvalidConfig("x".into()).is_config_error());
        assert!(SyncError::ConfigSaveFailed("read-only".into()).is_config_error());
        assert!(!SyncError::NotFound("op-1".into()).is_config_error());
    }

    #[test]
    fn test_core_error_converts() {
        let err: SyncError = CoreError::UnknownAction("upsert".into()).into();
        assert!(matches!(err, SyncError::Validation(_)));
        assert!(err.to_string().contains("upsert"));
    }
}
