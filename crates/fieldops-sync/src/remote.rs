//! # Remote Store Contract
//!
//! The sync engine talks to the authoritative remote store only through
//! [`RemoteStore`]. Transport (REST, gRPC, a vendor SDK) lives behind it.
//!
//! ## Outcome Classification
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Success            → operation removed from the queue                 │
//! │  TransientFailure   → retry_count += 1, retried on a later run         │
//! │                       (network, timeout, validation, server busy)      │
//! │  ConflictFailure    → dead-lettered immediately                        │
//! │                       (target gone, or remote has a newer version)     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use fieldops_core::{Action, FailureKind, OperationError};

/// Why a retryable remote call failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFailure {
    pub kind: FailureKind,
    pub detail: String,
}

impl RemoteFailure {
    pub fn new(kind: FailureKind, detail: impl Into<String>) -> Self {
        RemoteFailure {
            kind,
            detail: detail.into(),
        }
    }

    pub fn network(detail: impl Into<String>) -> Self {
        Self::new(FailureKind::Network, detail)
    }

    pub fn timeout(after: Duration) -> Self {
        Self::new(
            FailureKind::Timeout,
            format!("no response within {}ms", after.as_millis()),
        )
    }

    pub fn server_busy(detail: impl Into<String>) -> Self {
        Self::new(FailureKind::ServerBusy, detail)
    }

    /// The form stored in `PendingOperation::last_error`.
    pub fn to_operation_error(&self) -> OperationError {
        OperationError::now(self.kind, self.detail.clone())
    }
}

/// Result of applying one mutation remotely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteOutcome {
    Success,
    TransientFailure(RemoteFailure),
    ConflictFailure(String),
}

impl RemoteOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RemoteOutcome::Success)
    }
}

/// Client for the authoritative remote store.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Applies one create/update/delete.
    ///
    /// `target_key` is `None` for creates. `timeout` is the budget the engine
    /// will enforce; implementations may pass it on to their transport.
    async fn apply(
        &self,
        action: Action,
        target_key: Option<&str>,
        record: &Value,
        timeout: Duration,
    ) -> RemoteOutcome;
}
