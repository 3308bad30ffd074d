//! # Error Types
//!
//! Domain-specific error types for fieldops-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  fieldops-core errors (this file)                                      │
//! │  ├── CoreError        - Queue model errors                             │
//! │  └── ValidationError  - Enqueue draft failures                         │
//! │                                                                         │
//! │  fieldops-db errors (separate crate)                                   │
//! │  └── DbError          - Durable store failures                         │
//! │                                                                         │
//! │  fieldops-sync errors                                                  │
//! │  └── SyncError        - What the portal sees                           │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → SyncError → Portal                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Queue model errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// An action name that is not create, update or delete.
    #[error("Unknown action: {0}")]
    UnknownAction(String),

    /// A retry policy that would never attempt the operation.
    ///
    /// ## When This Occurs
    /// - `max_retries = 0` in configuration or on a draft
    #[error("max_retries must be at least 1, got {0}")]
    InvalidMaxRetries(u32),

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Enqueue draft validation errors.
///
/// Only structural checks live here. Record contents are sanitized by the
/// portal's forms before they are ever enqueued.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// A field must be absent for this action.
    #[error("{field} must be empty for {action} operations")]
    MustBeEmpty { field: String, action: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Invalid format.
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;
