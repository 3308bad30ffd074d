//! # Sync Session
//!
//! Ephemeral state of one sync run. Built fresh for every run, never persisted.
//!
//! ## Run State Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   ┌──────┐  trigger   ┌─────────┐   snapshot drained   ┌───────────┐   │
//! │   │ Idle │ ─────────► │ Running │ ───────────────────► │ Completed │   │
//! │   └──────┘            └────┬────┘                      └───────────┘   │
//! │       │                    │ cancelled / store failure                  │
//! │       │ offline            ▼                                            │
//! │       │               ┌─────────┐                                       │
//! │       └─────────────► │ Aborted │                                       │
//! │                       └─────────┘                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::types::DeadLetter;

/// Why a run stopped before draining its snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case", tag = "kind", content = "detail")]
pub enum AbortReason {
    /// The device was offline when the run was triggered.
    Offline,
    /// The caller asked the run to stop between operations.
    Cancelled,
    /// The pending-operation store could not be read.
    StoreUnavailable(String),
}

impl std::fmt::Display for AbortReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AbortReason::Offline => write!(f, "offline"),
            AbortReason::Cancelled => write!(f, "cancelled"),
            AbortReason::StoreUnavailable(detail) => write!(f, "store unavailable: {}", detail),
        }
    }
}

/// Lifecycle state of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case", tag = "state", content = "reason")]
pub enum RunState {
    Idle,
    Running,
    Completed,
    Aborted(AbortReason),
}

impl RunState {
    /// True for `Completed` and `Aborted`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Completed | RunState::Aborted(_))
    }
}

/// Tallies and progress of one sync run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct SyncSession {
    #[ts(type = "number")]
    pub run_id: u64,
    pub state: RunState,
    /// Size of the snapshot taken at the start of the run.
    pub total: usize,
    pub attempted: usize,
    pub succeeded: usize,
    /// Attempts that failed, including the ones that were dead-lettered.
    pub failed: usize,
    pub dead_lettered: Vec<DeadLetter>,
    /// Operations still in the active queue after this run.
    pub remaining: usize,
    /// 0..=100, `floor(attempted * 100 / total)`.
    pub progress: u8,
    #[ts(as = "String")]
    pub started_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl SyncSession {
    /// A session that has not started yet.
    pub fn idle(run_id: u64) -> Self {
        SyncSession {
            run_id,
            state: RunState::Idle,
            total: 0,
            attempted: 0,
            succeeded: 0,
            failed: 0,
            dead_lettered: Vec::new(),
            remaining: 0,
            progress: 0,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Moves to `Running` over a snapshot of `total` operations.
    pub fn begin(&mut self, total: usize) {
        self.state = RunState::Running;
        self.total = total;
        self.remaining = total;
        self.progress = if total == 0 { 100 } else { 0 };
    }

    /// Records a confirmed success.
    pub fn record_success(&mut self) {
        self.succeeded += 1;
        self.remaining = self.remaining.saturating_sub(1);
        self.advance();
    }

    /// Records a failure that left the operation in the queue.
    pub fn record_retry(&mut self) {
        self.failed += 1;
        self.advance();
    }

    /// Records a failure that moved the operation to the dead-letter ledger.
    pub fn record_dead_letter(&mut self, dead: DeadLetter) {
        self.failed += 1;
        self.remaining = self.remaining.saturating_sub(1);
        self.dead_lettered.push(dead);
        self.advance();
    }

    /// Records a snapshot entry that vanished before it was attempted
    /// (cleared by the user mid-run).
    pub fn record_skipped(&mut self) {
        self.remaining = self.remaining.saturating_sub(1);
        self.advance();
    }

    fn advance(&mut self) {
        self.attempted += 1;
        self.progress = progress_percent(self.attempted, self.total);
    }

    /// Finishes the run normally.
    pub fn complete(&mut self) {
        self.state = RunState::Completed;
        self.finished_at = Some(Utc::now());
    }

    /// Finishes the run early.
    pub fn abort(&mut self, reason: AbortReason) {
        self.state = RunState::Aborted(reason);
        self.finished_at = Some(Utc::now());
    }

    pub fn is_running(&self) -> bool {
        self.state == RunState::Running
    }

    pub fn is_finished(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn dead_letter_count(&self) -> usize {
        self.dead_lettered.len()
    }
}

/// `floor(done * 100 / total)`, clamped to 100. An empty snapshot is done.
pub fn progress_percent(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    ((done.min(total) * 100) / total) as u8
}
