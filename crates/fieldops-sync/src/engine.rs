//! # Sync Engine
//!
//! Drains a snapshot of the pending queue against the remote store.
//!
//! ## Run State Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   start() ──► Idle ──► Running ──┬──► Completed                        │
//! │     │                            │                                      │
//! │     │                            └──► Aborted(offline | cancelled |    │
//! │     │                                         store_unavailable)       │
//! │     │                                                                   │
//! │     └── a run is already live? ──► AlreadyRunning(same handle)         │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Per-Operation Outcome
//! ```text
//! remote.apply(...)  (bounded by request_timeout)
//!     │
//!     ├── Success            → remove                      succeeded += 1
//!     ├── TransientFailure   → retry_count += 1
//!     │       ├── retry_count <  max_retries → persist       failed += 1
//!     │       └── retry_count >= max_retries → dead-letter   failed += 1
//!     ├── Timeout            → same as TransientFailure
//!     └── ConflictFailure    → dead-letter now             failed += 1
//! ```
//!
//! Operations are replayed one at a time in `(enqueued_at, sequence)` order,
//! so an update can never overtake the create it depends on. Operations
//! enqueued after the snapshot wait for the next run.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use fieldops_core::{
    AbortReason, DeadLetterReason, FailureKind, OperationError, PendingOperation, SyncSession,
};

use crate::connectivity::ConnectivityMonitor;
use crate::error::SyncError;
use crate::remote::{RemoteFailure, RemoteOutcome, RemoteStore};
use crate::store::PendingOperationStore;

// =============================================================================
// Handles
// =============================================================================

/// Observer and control for one sync run. Clones observe the same run.
#[derive(Debug, Clone)]
pub struct SyncHandle {
    run_id: u64,
    session: watch::Receiver<SyncSession>,
    cancel: Arc<AtomicBool>,
}

impl SyncHandle {
    pub fn run_id(&self) -> u64 {
        self.run_id
    }

    /// Latest published state of the run.
    pub fn session(&self) -> SyncSession {
        self.session.borrow().clone()
    }

    /// True once the run reached a terminal state (or its task is gone).
    pub fn is_finished(&self) -> bool {
        self.session.borrow().is_finished() || self.session.has_changed().is_err()
    }

    /// Asks the run to stop before its next operation. The in-flight call,
    /// if any, is allowed to finish.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    /// Waits for the run to finish and returns its final session.
    pub async fn wait(&self) -> SyncSession {
        let mut rx = self.session.clone();
        if let Ok(session) = rx.wait_for(SyncSession::is_finished).await {
            return (*session).clone();
        }
        let last = rx.borrow().clone();
        last
    }

    /// A receiver that is notified after every operation.
    pub fn subscribe(&self) -> watch::Receiver<SyncSession> {
        self.session.clone()
    }
}

/// Result of asking for a sync run.
#[derive(Debug, Clone)]
pub enum SyncTrigger {
    /// A new run was started.
    Started(SyncHandle),
    /// A run was already live; this is its handle.
    AlreadyRunning(SyncHandle),
}

impl SyncTrigger {
    pub fn handle(&self) -> &SyncHandle {
        match self {
            SyncTrigger::Started(h) | SyncTrigger::AlreadyRunning(h) => h,
        }
    }

    pub fn into_handle(self) -> SyncHandle {
        match self {
            SyncTrigger::Started(h) | SyncTrigger::AlreadyRunning(h) => h,
        }
    }

    pub fn was_coalesced(&self) -> bool {
        matches!(self, SyncTrigger::AlreadyRunning(_))
    }
}

// =============================================================================
// Engine
// =============================================================================

/// Replays pending operations. At most one run is live at a time.
pub struct SyncEngine {
    store: Arc<PendingOperationStore>,
    remote: Arc<dyn RemoteStore>,
    connectivity: ConnectivityMonitor,
    request_timeout: Duration,
    current: Mutex<Option<SyncHandle>>,
    next_run_id: AtomicU64,
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("request_timeout", &self.request_timeout)
            .field("is_running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl SyncEngine {
    pub fn new(
        store: Arc<PendingOperationStore>,
        remote: Arc<dyn RemoteStore>,
        connectivity: ConnectivityMonitor,
        request_timeout: Duration,
    ) -> Self {
        SyncEngine {
            store,
            remote,
            connectivity,
            request_timeout,
            current: Mutex::new(None),
            next_run_id: AtomicU64::new(1),
        }
    }

    fn current_slot(&self) -> MutexGuard<'_, Option<SyncHandle>> {
        match self.current.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Starts a run, or returns the live one.
    ///
    /// Every trigger route (manual, reconnect, timer) lands here. The run
    /// itself executes on a spawned task.
    pub fn start(self: &Arc<Self>) -> SyncTrigger {
        let mut slot = self.current_slot();

        if let Some(handle) = slot.as_ref() {
            if !handle.is_finished() {
                debug!(run_id = handle.run_id, "Sync already running, coalescing trigger");
                return SyncTrigger::AlreadyRunning(handle.clone());
            }
        }

        let run_id = self.next_run_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = watch::channel(SyncSession::idle(run_id));
        let cancel = Arc::new(AtomicBool::new(false));
        let handle = SyncHandle {
            run_id,
            session: rx,
            cancel: cancel.clone(),
        };
        *slot = Some(handle.clone());
        drop(slot);

        let engine = Arc::clone(self);
        tokio::spawn(async move {
            engine.run(run_id, tx, cancel).await;
        });

        SyncTrigger::Started(handle)
    }

    /// Handle of the live run, or of the last finished one.
    pub fn current(&self) -> Option<SyncHandle> {
        self.current_slot().clone()
    }

    pub fn is_running(&self) -> bool {
        self.current_slot()
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    async fn run(
        self: Arc<Self>,
        run_id: u64,
        tx: watch::Sender<SyncSession>,
        cancel: Arc<AtomicBool>,
    ) {
        let mut session = SyncSession::idle(run_id);

        if let Err(e) = self.store.record_sync_attempt(session.started_at).await {
            warn!(run_id, error = %e, "Failed to record sync attempt");
        }

        if !self.connectivity.is_online() {
            info!(run_id, "Sync aborted: offline");
            session.abort(AbortReason::Offline);
            tx.send_replace(session);
            return;
        }

        let snapshot = match self.store.snapshot().await {
            Ok(ops) => ops,
            Err(e) => {
                error!(run_id, error = %e, "Sync aborted: pending store unreadable");
                session.abort(AbortReason::StoreUnavailable(e.to_string()));
                tx.send_replace(session);
                return;
            }
        };

        session.begin(snapshot.len());
        tx.send_replace(session.clone());
        info!(run_id, total = snapshot.len(), "Sync run started");

        for op in snapshot {
            if cancel.load(Ordering::SeqCst) {
                info!(
                    run_id,
                    attempted = session.attempted,
                    remaining = session.remaining,
                    "Sync run cancelled"
                );
                session.abort(AbortReason::Cancelled);
                tx.send_replace(session);
                return;
            }

            self.replay(&op, &mut session).await;
            tx.send_replace(session.clone());
        }

        session.complete();
        info!(
            run_id,
            succeeded = session.succeeded,
            failed = session.failed,
            dead_lettered = session.dead_letter_count(),
            remaining = session.remaining,
            "Sync run completed"
        );
        tx.send_replace(session);
    }

    /// Attempts one operation and records the outcome.
    ///
    /// Outcomes are applied only to the exact operation that was sent. If the
    /// caller cleared it and enqueued a correction under the same id while the
    /// call was in flight, the correction is left for the next run.
    async fn replay(&self, snapshot: &PendingOperation, session: &mut SyncSession) {
        let id = snapshot.id.as_str();

        // Re-read: the snapshot entry may have been cleared or replaced since.
        let op = match self.store.get(id).await {
            Some(op) if op.sequence == snapshot.sequence => op,
            Some(_) => {
                debug!(id = %id, "Operation replaced since snapshot, skipping");
                session.record_skipped();
                return;
            }
            None => {
                debug!(id = %id, "Operation cleared since snapshot, skipping");
                session.record_skipped();
                return;
            }
        };

        match self.call_remote(&op).await {
            RemoteOutcome::Success => match self.store.remove_synced(&op).await {
                Ok(_) => {
                    debug!(id = %id, action = %op.action, "Operation synced");
                    session.record_success();
                }
                Err(SyncError::NotFound(_)) => {
                    warn!(id = %id, "Operation cleared or replaced while in flight");
                    session.record_success();
                }
                Err(e) => {
                    error!(id = %id, error = %e, "Synced but could not remove operation");
                    session.record_retry();
                }
            },

            RemoteOutcome::TransientFailure(failure) => {
                self.record_transient(&op, failure, session).await;
            }

            RemoteOutcome::ConflictFailure(detail) => {
                let error = OperationError::now(FailureKind::Conflict, detail);
                self.move_to_dead_letters(&op, DeadLetterReason::Conflict, error, session)
                    .await;
            }
        }
    }

    async fn call_remote(&self, op: &PendingOperation) -> RemoteOutcome {
        let call = self.remote.apply(
            op.action,
            op.target_key.as_deref(),
            &op.record,
            self.request_timeout,
        );

        match tokio::time::timeout(self.request_timeout, call).await {
            Ok(outcome) => outcome,
            Err(_) => {
                debug!(id = %op.id, timeout = ?self.request_timeout, "Remote call timed out");
                RemoteOutcome::TransientFailure(RemoteFailure::timeout(self.request_timeout))
            }
        }
    }

    async fn record_transient(
        &self,
        op: &PendingOperation,
        failure: RemoteFailure,
        session: &mut SyncSession,
    ) {
        let error = failure.to_operation_error();

        let mut next = op.clone();
        next.record_failure(error.clone());

        if next.retries_exhausted() {
            self.move_to_dead_letters(op, DeadLetterReason::RetriesExhausted, error, session)
                .await;
            return;
        }

        match self.store.update(op, |o| o.record_failure(error)).await {
            Ok(updated) => {
                debug!(
                    id = %op.id,
                    kind = %failure.kind,
                    retry_count = updated.retry_count,
                    max_retries = updated.max_retries,
                    "Operation will be retried"
                );
                session.record_retry();
            }
            Err(SyncError::NotFound(_)) => {
                debug!(id = %op.id, "Operation cleared or replaced while in flight");
                session.record_skipped();
            }
            Err(e) => {
                error!(id = %op.id, error = %e, "Failed to persist retry state");
                session.record_retry();
            }
        }
    }

    async fn move_to_dead_letters(
        &self,
        op: &PendingOperation,
        reason: DeadLetterReason,
        error: OperationError,
        session: &mut SyncSession,
    ) {
        let id = op.id.as_str();
        match self.store.dead_letter(op, reason, error).await {
            Ok(dead) => session.record_dead_letter(dead),
            Err(SyncError::NotFound(_)) => {
                debug!(id = %id, "Operation cleared or replaced while in flight");
                session.record_skipped();
            }
            Err(e) => {
                error!(id = %id, error = %e, "Failed to dead-letter operation");
                session.record_retry();
            }
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use fieldops_core::{Action, OperationDraft, RunState};

    use crate::connectivity::ConnectivityState;
    use crate::testing::{memory_store, record, wait_for_calls, Behavior, ScriptedRemote};

    fn engine(
        store: Arc<PendingOperationStore>,
        remote: Arc<ScriptedRemote>,
        timeout: Duration,
    ) -> Arc<SyncEngine> {
        Arc::new(SyncEngine::new(
            store,
            remote,
            ConnectivityMonitor::new(ConnectivityState::Online),
            timeout,
        ))
    }

    async fn push(store: &PendingOperationStore, label: &str, action: Action, key: Option<&str>) {
        let draft = OperationDraft::new(action, key.map(str::to_string), record(label));
        let op = PendingOperation::from_draft(draft, label.to_string(), 3, Utc::now(), 0);
        store.append(op).await.unwrap();
    }

    #[tokio::test]
    async fn test_empty_queue_completes_with_full_progress() {
        let (_, store) = memory_store().await;
        let remote = Arc::new(ScriptedRemote::new());
        let engine = engine(store.clone(), remote.clone(), Duration::from_secs(1));

        let session = engine.start().into_handle().wait().await;

        assert_eq!(session.state, RunState::Completed);
        assert_eq!(session.total, 0);
        assert_eq!(session.progress, 100);
        assert_eq!(remote.call_count(), 0);
        assert!(store.last_sync_attempt().await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_counts_as_transient_failure() {
        let (_, store) = memory_store().await;
        let remote = Arc::new(ScriptedRemote::new());
        remote.set("slow", Behavior::Hang(Duration::from_secs(60)));
        push(&store, "slow", Action::Update, Some("feeder-3")).await;

        let engine = engine(store.clone(), remote, Duration::from_secs(2));
        let session = engine.start().into_handle().wait().await;

        assert_eq!(session.state, RunState::Completed);
        assert_eq!(session.failed, 1);
        assert_eq!(session.remaining, 1);

        let op = store.get("slow").await.unwrap();
        assert_eq!(op.retry_count, 1);
        let err = op.last_error.unwrap();
        assert_eq!(err.kind, FailureKind::Timeout);
        assert_eq!(err.message, "no response within 2000ms");
    }

    #[tokio::test]
    async fn test_failure_kind_preserved_in_last_error() {
        let (_, store) = memory_store().await;
        let remote = Arc::new(ScriptedRemote::new());
        remote.set("busy", Behavior::Fail(FailureKind::ServerBusy));
        push(&store, "busy", Action::Create, None).await;

        let engine = engine(store.clone(), remote, Duration::from_secs(1));
        engine.start().into_handle().wait().await;

        let op = store.get("busy").await.unwrap();
        assert_eq!(op.last_error.unwrap().kind, FailureKind::ServerBusy);
    }

    #[tokio::test]
    async fn test_cancel_stops_after_in_flight_operation() {
        let (_, store) = memory_store().await;
        let (remote, gate) = ScriptedRemote::gated();
        let remote = Arc::new(remote);
        for label in ["a", "b", "c"] {
            push(&store, label, Action::Create, None).await;
        }

        let engine = engine(store.clone(), remote.clone(), Duration::from_secs(30));
        let handle = engine.start().into_handle();

        wait_for_calls(&remote, 1).await;
        handle.cancel();
        gate.add_permits(10);

        let session = handle.wait().await;
        assert_eq!(session.state, RunState::Aborted(AbortReason::Cancelled));
        assert_eq!(session.succeeded, 1);
        assert_eq!(remote.call_count(), 1);

        let left: Vec<String> = store.list_ordered().await.into_iter().map(|o| o.id).collect();
        assert_eq!(left, vec!["b".to_string(), "c".to_string()]);
    }

    #[tokio::test]
    async fn test_clear_all_mid_run_skips_remaining() {
        let (_, store) = memory_store().await;
        let (remote, gate) = ScriptedRemote::gated();
        let remote = Arc::new(remote);
        push(&store, "a", Action::Create, None).await;
        push(&store, "b", Action::Create, None).await;

        let engine = engine(store.clone(), remote.clone(), Duration::from_secs(30));
        let handle = engine.start().into_handle();

        wait_for_calls(&remote, 1).await;
        assert_eq!(store.clear_all().await.unwrap(), 2);
        gate.add_permits(10);

        let session = handle.wait().await;
        assert_eq!(session.state, RunState::Completed);
        assert_eq!(session.attempted, 2);
        assert_eq!(session.succeeded, 1);
        assert_eq!(session.remaining, 0);
        assert_eq!(remote.call_count(), 1);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_store_unavailable_aborts_without_changes() {
        let (kv, store) = memory_store().await;
        let remote = Arc::new(ScriptedRemote::new());
        push(&store, "a", Action::Create, None).await;

        kv.set_fail_reads(true);
        let engine = engine(store.clone(), remote.clone(), Duration::from_secs(1));
        let session = engine.start().into_handle().wait().await;
        kv.set_fail_reads(false);

        assert!(matches!(
            session.state,
            RunState::Aborted(AbortReason::StoreUnavailable(_))
        ));
        assert_eq!(remote.call_count(), 0);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_progress_is_monotonic() {
        let (_, store) = memory_store().await;
        let remote = Arc::new(ScriptedRemote::new());
        remote.set("b", Behavior::Fail(FailureKind::Network));
        for label in ["a", "b", "c"] {
            push(&store, label, Action::Create, None).await;
        }

        let engine = engine(store.clone(), remote, Duration::from_secs(1));
        let handle = engine.start().into_handle();
        let mut rx = handle.subscribe();

        let mut seen = vec![rx.borrow_and_update().progress];
        while rx.changed().await.is_ok() {
            seen.push(rx.borrow_and_update().progress);
        }

        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(*seen.last().unwrap(), 100);
        assert_eq!(handle.session().succeeded, 2);
    }

    #[tokio::test]
    async fn test_finished_run_allows_new_run() {
        let (_, store) = memory_store().await;
        let remote = Arc::new(ScriptedRemote::new());
        let engine = engine(store, remote, Duration::from_secs(1));

        let first = engine.start();
        let first_id = first.handle().run_id();
        first.handle().wait().await;
        assert!(!engine.is_running());

        let second = engine.start();
        assert!(!second.was_coalesced());
        assert_ne!(second.handle().run_id(), first_id);
    }
}
