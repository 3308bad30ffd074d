//! # Queue Types
//!
//! Types describing queued mutations and their outcomes.
//!
//! ## Type Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Queue Types                                    │
//! │                                                                         │
//! │  ┌──────────────────┐   ┌──────────────────┐   ┌──────────────────┐    │
//! │  │ OperationDraft   │──►│ PendingOperation │──►│   DeadLetter     │    │
//! │  │ ──────────────── │   │ ──────────────── │   │ ──────────────── │    │
//! │  │ action           │   │ id, sequence     │   │ operation        │    │
//! │  │ target_key?      │   │ enqueued_at      │   │ reason           │    │
//! │  │ record (JSON)    │   │ retry_count      │   │ error            │    │
//! │  │ id? (idempotent) │   │ last_error       │   │ dead_lettered_at │    │
//! │  └──────────────────┘   └──────────────────┘   └──────────────────┘    │
//! │        enqueue              sync engine          exhausted/conflict    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Replay Order
//! Operations are totally ordered by `(enqueued_at, sequence)`. The sequence
//! is assigned by the store at append time, so two operations enqueued within
//! the same clock tick replay in insertion order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use ts_rs::TS;

use crate::error::CoreError;

// =============================================================================
// Action
// =============================================================================

/// The kind of mutation a queued operation applies to the remote store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Create a new remote entity. Carries no target key.
    Create,
    /// Update an existing remote entity.
    Update,
    /// Delete an existing remote entity.
    Delete,
}

impl Action {
    /// All actions, in reporting order.
    pub const ALL: [Action; 3] = [Action::Create, Action::Update, Action::Delete];

    /// Returns true if this action addresses an existing remote entity.
    pub fn requires_target(&self) -> bool {
        matches!(self, Action::Update | Action::Delete)
    }

    /// Lowercase wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Update => "update",
            Action::Delete => "delete",
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Action {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "create" | "insert" => Ok(Action::Create),
            "update" => Ok(Action::Update),
            "delete" | "remove" => Ok(Action::Delete),
            other => Err(CoreError::UnknownAction(other.to_string())),
        }
    }
}

// =============================================================================
// Operation Draft
// =============================================================================

/// A mutation handed to the queue by business logic, before it is persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationDraft {
    /// Caller-supplied id, used to make enqueue idempotent across retries.
    /// A UUID v4 is generated when absent.
    #[serde(default)]
    pub id: Option<String>,

    pub action: Action,

    /// Remote entity id. Absent for `create`.
    #[serde(default)]
    pub target_key: Option<String>,

    /// The domain payload. Opaque to the queue.
    pub record: Value,

    /// Per-operation override of the configured retry policy.
    #[serde(default)]
    pub max_retries: Option<u32>,
}

impl OperationDraft {
    /// Creates a draft with a generated id and the default retry policy.
    pub fn new(action: Action, target_key: Option<String>, record: Value) -> Self {
        OperationDraft {
            id: None,
            action,
            target_key,
            record,
            max_retries: None,
        }
    }

    /// Sets a caller-supplied id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Overrides the retry policy for this operation.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }
}

// =============================================================================
// Operation Error
// =============================================================================

/// Classification of a failed sync attempt.
///
/// The retry policy treats every transient kind alike. The kind is kept so
/// diagnostics can tell a flaky network from a rejected payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Transport-level failure (DNS, TLS, connection reset).
    Network,
    /// The remote call exceeded its timeout.
    Timeout,
    /// The remote store rejected the payload.
    Validation,
    /// The remote store asked the client to back off.
    ServerBusy,
    /// Remote state diverged from the local snapshot. Never retried.
    Conflict,
    /// Anything the remote client could not classify.
    Other,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FailureKind::Network => "network",
            FailureKind::Timeout => "timeout",
            FailureKind::Validation => "validation",
            FailureKind::ServerBusy => "server_busy",
            FailureKind::Conflict => "conflict",
            FailureKind::Other => "other",
        };
        f.write_str(name)
    }
}

/// The last failure recorded against an operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct OperationError {
    pub kind: FailureKind,
    pub message: String,
    #[ts(as = "String")]
    pub occurred_at: DateTime<Utc>,
}

impl OperationError {
    /// Creates an error stamped with the current time.
    pub fn now(kind: FailureKind, message: impl Into<String>) -> Self {
        OperationError {
            kind,
            message: message.into(),
            occurred_at: Utc::now(),
        }
    }
}

impl std::fmt::Display for OperationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

// =============================================================================
// Pending Operation
// =============================================================================

/// One queued mutation that has not yet been confirmed by the remote store.
///
/// `action`, `record`, `target_key`, `enqueued_at` and `sequence` are fixed at
/// creation. Only the sync engine changes `retry_count` and `last_error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PendingOperation {
    pub id: String,
    pub action: Action,
    #[ts(type = "unknown")]
    pub record: Value,
    pub target_key: Option<String>,
    #[ts(as = "String")]
    pub enqueued_at: DateTime<Utc>,
    /// Store-assigned insertion counter, the tie-breaker for equal timestamps.
    #[ts(type = "number")]
    pub sequence: u64,
    pub retry_count: u32,
    pub max_retries: u32,
    pub last_error: Option<OperationError>,
}

impl PendingOperation {
    /// Builds the persisted form of a draft.
    pub fn from_draft(
        draft: OperationDraft,
        id: String,
        max_retries: u32,
        enqueued_at: DateTime<Utc>,
        sequence: u64,
    ) -> Self {
        PendingOperation {
            id,
            action: draft.action,
            record: draft.record,
            target_key: draft.target_key.filter(|k| !k.is_empty()),
            enqueued_at,
            sequence,
            retry_count: 0,
            max_retries: max_retries.max(1),
            last_error: None,
        }
    }

    /// The replay-order key.
    pub fn order_key(&self) -> (DateTime<Utc>, u64) {
        (self.enqueued_at, self.sequence)
    }

    /// Records one failed attempt.
    ///
    /// `retry_count` never exceeds `max_retries`.
    pub fn record_failure(&mut self, error: OperationError) {
        self.retry_count = (self.retry_count + 1).min(self.max_retries);
        self.last_error = Some(error);
    }

    /// True once the operation has used up its attempts.
    pub fn retries_exhausted(&self) -> bool {
        self.retry_count >= self.max_retries
    }
}

// =============================================================================
// Dead Letter
// =============================================================================

/// Why an operation left the active queue without succeeding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum DeadLetterReason {
    /// Failed `max_retries` times.
    RetriesExhausted,
    /// The remote store reported a conflict. Retrying cannot help.
    Conflict,
}

impl std::fmt::Display for DeadLetterReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeadLetterReason::RetriesExhausted => write!(f, "retries_exhausted"),
            DeadLetterReason::Conflict => write!(f, "conflict"),
        }
    }
}

/// An operation removed from the active queue after a permanent failure.
///
/// Dead letters are kept until the user acknowledges them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct DeadLetter {
    pub operation: PendingOperation,
    pub reason: DeadLetterReason,
    pub error: OperationError,
    #[ts(as = "String")]
    pub dead_lettered_at: DateTime<Utc>,
}

impl DeadLetter {
    pub fn new(operation: PendingOperation, reason: DeadLetterReason, error: OperationError) -> Self {
        DeadLetter {
            operation,
            reason,
            error,
            dead_lettered_at: Utc::now(),
        }
    }

    pub fn id(&self) -> &str {
        &self.operation.id
    }
}

// =============================================================================
// Counts & Status
// =============================================================================

/// Per-action tallies of pending operations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ActionCounts {
    pub create: usize,
    pub update: usize,
    pub delete: usize,
}

impl ActionCounts {
    /// Counts a sequence of operations.
    pub fn tally<'a>(ops: impl IntoIterator<Item = &'a PendingOperation>) -> Self {
        let mut counts = ActionCounts::default();
        for op in ops {
            counts.add(op.action);
        }
        counts
    }

    pub fn add(&mut self, action: Action) {
        match action {
            Action::Create => self.create += 1,
            Action::Update => self.update += 1,
            Action::Delete => self.delete += 1,
        }
    }

    pub fn get(&self, action: Action) -> usize {
        match action {
            Action::Create => self.create,
            Action::Update => self.update,
            Action::Delete => self.delete,
        }
    }

    pub fn total(&self) -> usize {
        self.create + self.update + self.delete
    }
}

/// Point-in-time status read for the portal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct QueueStatus {
    pub is_online: bool,
    pub is_syncing: bool,
    /// 0..=100
    pub sync_progress: u8,
    pub pending_total: usize,
    pub pending_by_action: ActionCounts,
    pub dead_letter_total: usize,
    #[ts(as = "Option<String>")]
    pub last_sync_attempt: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn op(action: Action, max_retries: u32) -> PendingOperation {
        PendingOperation::from_draft(
            OperationDraft::new(action, Some("asset-9".into()), json!({"status": "inspected"})),
            "op-1".into(),
            max_retries,
            Utc::now(),
            0,
        )
    }

    #[test]
    fn test_action_parsing() {
        assert_eq!("create".parse::<Action>().unwrap(), Action::Create);
        assert_eq!("UPDATE".parse::<Action>().unwrap(), Action::Update);
        assert_eq!("remove".parse::<Action>().unwrap(), Action::Delete);
        assert!("upsert".parse::<Action>().is_err());
    }

    #[test]
    fn test_action_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&Action::Delete).unwrap(), "\"delete\"");
    }

    #[test]
    fn test_retry_count_never_exceeds_max() {
        let mut op = op(Action::Update, 2);
        for _ in 0..5 {
            op.record_failure(OperationError::now(FailureKind::Network, "reset"));
        }
        assert_eq!(op.retry_count, 2);
        assert!(op.retries_exhausted());
        assert_eq!(op.last_error.as_ref().map(|e| e.kind), Some(FailureKind::Network));
    }

    #[test]
    fn test_zero_max_retries_is_raised_to_one() {
        let op = op(Action::Delete, 0);
        assert_eq!(op.max_retries, 1);
    }

    #[test]
    fn test_empty_target_key_is_dropped() {
        let op = PendingOperation::from_draft(
            OperationDraft::new(Action::Create, Some(String::new()), json!({})),
            "op-2".into(),
            3,
            Utc::now(),
            1,
        );
        assert_eq!(op.target_key, None);
    }

    #[test]
    fn test_action_counts() {
        let ops = vec![op(Action::Create, 1), op(Action::Update, 1), op(Action::Update, 1)];
        let counts = ActionCounts::tally(&ops);
        assert_eq!(counts.create, 1);
        assert_eq!(counts.update, 2);
        assert_eq!(counts.delete, 0);
        assert_eq!(counts.total(), 3);
        assert_eq!(counts.get(Action::Update), 2);
    }

    #[test]
    fn test_status_serializes_camel_case() {
        let status = QueueStatus {
            is_online: true,
            is_syncing: false,
            sync_progress: 0,
            pending_total: 0,
            pending_by_action: ActionCounts::default(),
            dead_letter_total: 0,
            last_sync_attempt: None,
        };
        let json = serde_json::to_string(&status).unwrap();
        assert!(json.contains("\"isOnline\":true"));
        assert!(json.contains("\"pendingByAction\""));
    }
}
