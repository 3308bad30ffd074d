//! # Validation Module
//!
//! Structural checks on enqueue drafts.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Portal forms                                                 │
//! │  ├── Field sanitization, escaping                                      │
//! │  └── Immediate user feedback                                           │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: QueueFacade::enqueue                                         │
//! │  └── THIS MODULE: action / target key / id shape                       │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Remote store                                                 │
//! │  └── Authoritative validation (rejections surface as lastError)        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Record contents are never inspected here.

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::types::OperationDraft;
use crate::MAX_TARGET_KEY_LEN;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validates a remote target key.
///
/// ## Rules
/// - Must not be empty or whitespace
/// - At most [`MAX_TARGET_KEY_LEN`] characters
/// - No control characters
pub fn validate_target_key(key: &str) -> ValidationResult<()> {
    if key.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "target_key".to_string(),
        });
    }

    if key.chars().count() > MAX_TARGET_KEY_LEN {
        return Err(ValidationError::TooLong {
            field: "target_key".to_string(),
            max: MAX_TARGET_KEY_LEN,
        });
    }

    if key.chars().any(char::is_control) {
        return Err(ValidationError::InvalidFormat {
            field: "target_key".to_string(),
            reason: "must not contain control characters".to_string(),
        });
    }

    Ok(())
}

/// Validates a caller-supplied operation id.
pub fn validate_operation_id(id: &str) -> ValidationResult<()> {
    if id.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "id".to_string(),
        });
    }

    // Ids become part of a storage key
    if id.contains('/') || id.chars().any(char::is_control) {
        return Err(ValidationError::InvalidFormat {
            field: "id".to_string(),
            reason: "must not contain '/' or control characters".to_string(),
        });
    }

    Ok(())
}

/// Validates a draft before it is persisted.
///
/// ## Rules
/// - `update` / `delete` need a valid target key
/// - `create` must not carry a non-empty target key
/// - A caller-supplied id must be a valid storage key segment
/// - A per-operation `max_retries` must be at least 1
///
/// ## Example
/// ```rust
/// use fieldops_core::{Action, OperationDraft};
/// use fieldops_core::validation::validate_draft;
/// use serde_json::json;
///
/// let ok = OperationDraft::new(Action::Create, None, json!({"kind": "work_order"}));
/// assert!(validate_draft(&ok).is_ok());
///
/// let missing = OperationDraft::new(Action::Delete, None, json!({}));
/// assert!(validate_draft(&missing).is_err());
/// ```
pub fn validate_draft(draft: &OperationDraft) -> CoreResult<()> {
    if let Some(id) = &draft.id {
        validate_operation_id(id)?;
    }

    match (&draft.target_key, draft.action.requires_target()) {
        (Some(key), true) => validate_target_key(key)?,
        (None, true) => {
            return Err(ValidationError::Required {
                field: "target_key".to_string(),
            }
            .into())
        }
        (Some(key), false) if !key.is_empty() => {
            return Err(ValidationError::MustBeEmpty {
                field: "target_key".to_string(),
                action: draft.action.to_string(),
            }
            .into())
        }
        _ => {}
    }

    if draft.max_retries == Some(0) {
        return Err(CoreError::InvalidMaxRetries(0));
    }

    Ok(())
}
