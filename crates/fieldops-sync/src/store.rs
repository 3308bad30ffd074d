//! # Pending-Operation Store
//!
//! Durable, ordered log of mutations not yet confirmed by the remote store,
//! plus the dead-letter ledger and the last-sync-attempt marker.
//!
//! ## Write Path
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  append / update / remove / dead_letter / clear_all                    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  lock state (one tokio Mutex for everything)                           │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  write to DurableStore ──── Err ──► return Err, memory untouched       │
//! │       │ Ok                                                              │
//! │       ▼                                                                 │
//! │  apply the same change to the in-memory index                          │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  unlock, return Ok                                                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Key Layout
//! ```text
//! pending/<id>              PendingOperation (JSON)
//! dead/<id>                 DeadLetter (JSON)
//! meta/last_sync_attempt    DateTime<Utc> (JSON)
//! ```
//!
//! Replay order is `(enqueued_at, sequence)`. The store assigns `sequence`
//! from a counter rebuilt on open, and clamps `enqueued_at` so it never goes
//! backwards when the wall clock does.

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use fieldops_core::{ActionCounts, DeadLetter, DeadLetterReason, OperationError, PendingOperation};
use fieldops_db::{DurableStore, KvWrite};

use crate::error::{SyncError, SyncResult};

const PENDING_PREFIX: &str = "pending/";
const DEAD_PREFIX: &str = "dead/";
const LAST_SYNC_KEY: &str = "meta/last_sync_attempt";

type OrderKey = (DateTime<Utc>, u64);

fn pending_key(id: &str) -> String {
    format!("{PENDING_PREFIX}{id}")
}

fn dead_key(id: &str) -> String {
    format!("{DEAD_PREFIX}{id}")
}

#[derive(Debug, Default)]
struct StoreState {
    pending: BTreeMap<OrderKey, PendingOperation>,
    index: HashMap<String, OrderKey>,
    dead: HashMap<String, DeadLetter>,
    next_sequence: u64,
    last_enqueued_at: Option<DateTime<Utc>>,
    last_sync_attempt: Option<DateTime<Utc>>,
}

impl StoreState {
    fn lookup(&self, id: &str) -> SyncResult<(OrderKey, &PendingOperation)> {
        let key = *self
            .index
            .get(id)
            .ok_or_else(|| SyncError::NotFound(id.to_string()))?;
        let op = self
            .pending
            .get(&key)
            .ok_or_else(|| SyncError::Internal(format!("index out of sync for {id}")))?;
        Ok((key, op))
    }

    /// Like `lookup`, but only matches the exact operation that was read
    /// earlier. An entry re-enqueued under the same id since then is a
    /// different operation and reads as `NotFound`.
    fn lookup_attempted(
        &self,
        attempted: &PendingOperation,
    ) -> SyncResult<(OrderKey, &PendingOperation)> {
        let (key, op) = self.lookup(&attempted.id)?;
        if op.sequence != attempted.sequence {
            debug!(
                id = %attempted.id,
                attempted = attempted.sequence,
                stored = op.sequence,
                "Operation was replaced since it was read"
            );
            return Err(SyncError::NotFound(attempted.id.clone()));
        }
        Ok((key, op))
    }

    fn insert(&mut self, op: PendingOperation) {
        let key = op.order_key();
        self.index.insert(op.id.clone(), key);
        self.pending.insert(key, op);
    }
}

/// The queue's single source of truth.
pub struct PendingOperationStore {
    kv: Arc<dyn DurableStore>,
    max_pending: Option<usize>,
    state: Mutex<StoreState>,
}

impl std::fmt::Debug for PendingOperationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingOperationStore")
            .field("max_pending", &self.max_pending)
            .finish_non_exhaustive()
    }
}

impl PendingOperationStore {
    /// Loads every persisted entry and rebuilds the ordered index.
    ///
    /// A pending entry whose id is also in the dead-letter ledger is dropped:
    /// the dead letter is the later state. Entries that fail to decode are
    /// logged and skipped.
    pub async fn open(kv: Arc<dyn DurableStore>, max_pending: Option<usize>) -> SyncResult<Self> {
        let mut state = StoreState::default();

        for (key, value) in kv.list_prefix(DEAD_PREFIX).await? {
            match serde_json::from_str::<DeadLetter>(&value) {
                Ok(dead) => {
                    state.next_sequence = state.next_sequence.max(dead.operation.sequence + 1);
                    state.dead.insert(dead.id().to_string(), dead);
                }
                Err(e) => error!(key = %key, error = %e, "Skipping unreadable dead letter"),
            }
        }

        let mut superseded = Vec::new();
        for (key, value) in kv.list_prefix(PENDING_PREFIX).await? {
            let op = match serde_json::from_str::<PendingOperation>(&value) {
                Ok(op) => op,
                Err(e) => {
                    error!(key = %key, error = %e, "Skipping unreadable pending operation");
                    continue;
                }
            };

            if state.dead.contains_key(&op.id) {
                superseded.push(KvWrite::delete(key));
                continue;
            }

            state.next_sequence = state.next_sequence.max(op.sequence + 1);
            state.last_enqueued_at = state.last_enqueued_at.max(Some(op.enqueued_at));
            state.insert(op);
        }

        if !superseded.is_empty() {
            warn!(
                count = superseded.len(),
                "Dropping pending entries already in the dead-letter ledger"
            );
            kv.write_batch(superseded).await?;
        }

        state.last_sync_attempt = match kv.get(LAST_SYNC_KEY).await? {
            Some(raw) => match serde_json::from_str(&raw) {
                Ok(ts) => Some(ts),
                Err(e) => {
                    warn!(error = %e, "Ignoring unreadable last sync attempt");
                    None
                }
            },
            None => None,
        };

        info!(
            pending = state.pending.len(),
            dead_letters = state.dead.len(),
            next_sequence = state.next_sequence,
            "Pending operation store opened"
        );

        Ok(PendingOperationStore {
            kv,
            max_pending,
            state: Mutex::new(state),
        })
    }

    // =========================================================================
    // Pending Operations
    // =========================================================================

    /// Persists a new operation and returns it as stored.
    ///
    /// `sequence` is assigned here and `enqueued_at` is clamped to be no
    /// earlier than the previous append.
    pub async fn append(&self, mut op: PendingOperation) -> SyncResult<PendingOperation> {
        let mut state = self.state.lock().await;

        if state.index.contains_key(&op.id) || state.dead.contains_key(&op.id) {
            return Err(SyncError::DuplicateId(op.id));
        }

        if let Some(limit) = self.max_pending {
            if state.index.len() >= limit {
                return Err(SyncError::QueueFull { limit });
            }
        }

        op.sequence = state.next_sequence;
        if let Some(last) = state.last_enqueued_at {
            if op.enqueued_at < last {
                debug!(id = %op.id, "Clock went backwards, clamping enqueued_at");
                op.enqueued_at = last;
            }
        }
        op.retry_count = op.retry_count.min(op.max_retries);

        let json = serde_json::to_string(&op)?;
        self.kv.put(&pending_key(&op.id), &json).await?;

        state.next_sequence += 1;
        state.last_enqueued_at = Some(op.enqueued_at);
        state.insert(op.clone());

        debug!(
            id = %op.id,
            action = %op.action,
            sequence = op.sequence,
            "Operation appended"
        );

        Ok(op)
    }

    /// Every pending operation in replay order.
    pub async fn list_ordered(&self) -> Vec<PendingOperation> {
        self.state.lock().await.pending.values().cloned().collect()
    }

    /// Replay-order snapshot read back from durable storage.
    ///
    /// Fails if the durable store cannot be read, which lets a sync run
    /// abort before touching anything.
    pub async fn snapshot(&self) -> SyncResult<Vec<PendingOperation>> {
        let state = self.state.lock().await;
        let rows = self.kv.list_prefix(PENDING_PREFIX).await?;

        let mut ops = Vec::with_capacity(rows.len());
        for (key, value) in rows {
            match serde_json::from_str::<PendingOperation>(&value) {
                Ok(op) if state.index.contains_key(&op.id) => ops.push(op),
                Ok(op) => debug!(id = %op.id, "Ignoring entry not in index"),
                Err(e) => warn!(key = %key, error = %e, "Skipping unreadable pending operation"),
            }
        }
        ops.sort_by_key(PendingOperation::order_key);

        Ok(ops)
    }

    pub async fn get(&self, id: &str) -> Option<PendingOperation> {
        let state = self.state.lock().await;
        state.lookup(id).ok().map(|(_, op)| op.clone())
    }

    /// Applies `mutator` to the stored copy of `attempted` and persists the
    /// result.
    ///
    /// Only `retry_count` and `last_error` are taken from the mutated copy;
    /// every other field is fixed at creation. `retry_count` is clamped to
    /// `max_retries`. Fails with `NotFound` if `attempted` is gone or was
    /// replaced by a new operation with the same id.
    pub async fn update<F>(
        &self,
        attempted: &PendingOperation,
        mutator: F,
    ) -> SyncResult<PendingOperation>
    where
        F: FnOnce(&mut PendingOperation),
    {
        let id = attempted.id.as_str();
        let mut state = self.state.lock().await;
        let (key, current) = state.lookup_attempted(attempted)?;

        let mut edited = current.clone();
        mutator(&mut edited);

        let mut updated = current.clone();
        updated.retry_count = edited.retry_count.min(updated.max_retries);
        updated.last_error = edited.last_error;

        let json = serde_json::to_string(&updated)?;
        self.kv.put(&pending_key(id), &json).await?;

        state.pending.insert(key, updated.clone());

        debug!(id = %id, retry_count = updated.retry_count, "Operation updated");
        Ok(updated)
    }

    /// Removes one operation, whatever its current state.
    pub async fn remove(&self, id: &str) -> SyncResult<PendingOperation> {
        let mut state = self.state.lock().await;
        let (key, _) = state.lookup(id)?;
        self.remove_entry(&mut state, id, key).await
    }

    /// Removes `attempted` once the remote store has confirmed it. A newer
    /// operation enqueued under the same id is left alone.
    pub async fn remove_synced(&self, attempted: &PendingOperation) -> SyncResult<PendingOperation> {
        let mut state = self.state.lock().await;
        let (key, _) = state.lookup_attempted(attempted)?;
        self.remove_entry(&mut state, &attempted.id, key).await
    }

    async fn remove_entry(
        &self,
        state: &mut StoreState,
        id: &str,
        key: OrderKey,
    ) -> SyncResult<PendingOperation> {
        self.kv.delete(&pending_key(id)).await?;

        state.index.remove(id);
        let removed = state
            .pending
            .remove(&key)
            .ok_or_else(|| SyncError::NotFound(id.to_string()))?;

        debug!(id = %id, "Operation removed");
        Ok(removed)
    }

    /// Removes every pending operation. Dead letters are kept.
    pub async fn clear_all(&self) -> SyncResult<usize> {
        let mut state = self.state.lock().await;

        self.kv.delete_prefix(PENDING_PREFIX).await?;

        let count = state.pending.len();
        state.pending.clear();
        state.index.clear();

        info!(count, "Pending operations cleared");
        Ok(count)
    }

    pub async fn count_by_action(&self) -> ActionCounts {
        ActionCounts::tally(self.state.lock().await.pending.values())
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.pending.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    // =========================================================================
    // Dead Letters
    // =========================================================================

    /// Records `error` as the final failure and moves `attempted` to the
    /// dead-letter ledger in one atomic batch. Fails with `NotFound` if it is
    /// gone or was replaced under the same id.
    pub async fn dead_letter(
        &self,
        attempted: &PendingOperation,
        reason: DeadLetterReason,
        error: OperationError,
    ) -> SyncResult<DeadLetter> {
        let id = attempted.id.as_str();
        let mut state = self.state.lock().await;
        let (key, current) = state.lookup_attempted(attempted)?;

        let mut op = current.clone();
        op.record_failure(error.clone());
        let dead = DeadLetter::new(op, reason, error);

        let json = serde_json::to_string(&dead)?;
        self.kv
            .write_batch(vec![KvWrite::delete(pending_key(id)), KvWrite::put(dead_key(id), json)])
            .await?;

        state.pending.remove(&key);
        state.index.remove(id);
        state.dead.insert(id.to_string(), dead.clone());

        warn!(
            id = %id,
            action = %dead.operation.action,
            reason = %reason,
            retry_count = dead.operation.retry_count,
            error = %dead.error,
            "Operation dead-lettered"
        );

        Ok(dead)
    }

    /// Dead letters, oldest first.
    pub async fn dead_letters(&self) -> Vec<DeadLetter> {
        let state = self.state.lock().await;
        let mut dead: Vec<DeadLetter> = state.dead.values().cloned().collect();
        dead.sort_by(|a, b| {
            a.dead_lettered_at
                .cmp(&b.dead_lettered_at)
                .then_with(|| a.operation.sequence.cmp(&b.operation.sequence))
        });
        dead
    }

    pub async fn dead_letter_count(&self) -> usize {
        self.state.lock().await.dead.len()
    }

    /// Removes one dead letter after the user has seen it.
    pub async fn acknowledge_dead_letter(&self, id: &str) -> SyncResult<DeadLetter> {
        let mut state = self.state.lock().await;
        if !state.dead.contains_key(id) {
            return Err(SyncError::NotFound(id.to_string()));
        }

        self.kv.delete(&dead_key(id)).await?;

        let dead = state
            .dead
            .remove(id)
            .ok_or_else(|| SyncError::NotFound(id.to_string()))?;

        info!(id = %id, "Dead letter acknowledged");
        Ok(dead)
    }

    pub async fn clear_dead_letters(&self) -> SyncResult<usize> {
        let mut state = self.state.lock().await;

        self.kv.delete_prefix(DEAD_PREFIX).await?;

        let count = state.dead.len();
        state.dead.clear();

        info!(count, "Dead letters cleared");
        Ok(count)
    }

    // =========================================================================
    // Sync Metadata
    // =========================================================================

    pub async fn last_sync_attempt(&self) -> Option<DateTime<Utc>> {
        self.state.lock().await.last_sync_attempt
    }

    pub async fn record_sync_attempt(&self, at: DateTime<Utc>) -> SyncResult<()> {
        let mut state = self.state.lock().await;

        let json = serde_json::to_string(&at)?;
        self.kv.put(LAST_SYNC_KEY, &json).await?;

        state.last_sync_attempt = Some(at);
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use fieldops_core::{Action, FailureKind, OperationDraft};
    use fieldops_db::{Database, DbConfig, MemoryStore};
    use serde_json::json;

    fn draft_op(id: &str, action: Action, key: Option<&str>, at: DateTime<Utc>) -> PendingOperation {
        let draft = OperationDraft::new(action, key.map(str::to_string), json!({ "id": id }));
        PendingOperation::from_draft(draft, id.to_string(), 3, at, 0)
    }

    async fn memory_store() -> (MemoryStore, PendingOperationStore) {
        let kv = MemoryStore::new();
        let store = PendingOperationStore::open(Arc::new(kv.clone()), None)
            .await
            .unwrap();
        (kv, store)
    }

    fn ids(ops: &[PendingOperation]) -> Vec<&str> {
        ops.iter().map(|op| op.id.as_str()).collect()
    }

    #[tokio::test]
    async fn test_ties_break_by_insertion_order() {
        let (_, store) = memory_store().await;
        let now = Utc::now();

        for id in ["c", "a", "b"] {
            store.append(draft_op(id, Action::Create, None, now)).await.unwrap();
        }

        let ops = store.list_ordered().await;
        assert_eq!(ids(&ops), vec!["c", "a", "b"]);
        assert!(ops.windows(2).all(|w| w[0].sequence < w[1].sequence));
    }

    #[tokio::test]
    async fn test_enqueued_at_never_goes_backwards() {
        let (_, store) = memory_store().await;
        let now = Utc::now();

        store.append(draft_op("first", Action::Create, None, now)).await.unwrap();
        let late = store
            .append(draft_op("second", Action::Create, None, now - ChronoDuration::minutes(5)))
            .await
            .unwrap();

        assert_eq!(late.enqueued_at, now);
        let ops = store.list_ordered().await;
        assert_eq!(ids(&ops), vec!["first", "second"]);
        assert!(ops.windows(2).all(|w| w[0].enqueued_at <= w[1].enqueued_at));
    }

    #[tokio::test]
    async fn test_duplicate_id_rejected() {
        let (_, store) = memory_store().await;
        let now = Utc::now();

        store.append(draft_op("op-1", Action::Create, None, now)).await.unwrap();
        let err = store
            .append(draft_op("op-1", Action::Update, Some("pole-9"), now))
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::DuplicateId(id) if id == "op-1"));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_dead_lettered_id_cannot_be_reused() {
        let (_, store) = memory_store().await;
        let op = store
            .append(draft_op("op-1", Action::Delete, Some("pole-9"), Utc::now()))
            .await
            .unwrap();
        store
            .dead_letter(&op, DeadLetterReason::Conflict, OperationError::now(FailureKind::Conflict, "gone"))
            .await
            .unwrap();

        let err = store
            .append(draft_op("op-1", Action::Create, None, Utc::now()))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::DuplicateId(_)));
    }

    #[tokio::test]
    async fn test_queue_full() {
        let kv = MemoryStore::new();
        let store = PendingOperationStore::open(Arc::new(kv), Some(2)).await.unwrap();
        let now = Utc::now();

        store.append(draft_op("a", Action::Create, None, now)).await.unwrap();
        store.append(draft_op("b", Action::Create, None, now)).await.unwrap();
        let err = store.append(draft_op("c", Action::Create, None, now)).await.unwrap_err();

        assert!(matches!(err, SyncError::QueueFull { limit: 2 }));

        store.remove("a").await.unwrap();
        store.append(draft_op("c", Action::Create, None, now)).await.unwrap();
    }

    #[tokio::test]
    async fn test_update_only_touches_retry_fields() {
        let (_, store) = memory_store().await;
        let original = store
            .append(draft_op("op-1", Action::Update, Some("meter-4"), Utc::now()))
            .await
            .unwrap();

        let updated = store
            .update(&original, |op| {
                op.retry_count = 99;
                op.last_error = Some(OperationError::now(FailureKind::Network, "reset"));
                op.target_key = Some("meter-5".to_string());
                op.record = json!({ "tampered": true });
            })
            .await
            .unwrap();

        assert_eq!(updated.retry_count, original.max_retries);
        assert_eq!(updated.target_key.as_deref(), Some("meter-4"));
        assert_eq!(updated.record, original.record);
        assert_eq!(updated.last_error.unwrap().kind, FailureKind::Network);
    }

    #[tokio::test]
    async fn test_missing_ids_are_not_found() {
        let (_, store) = memory_store().await;

        let ghost = draft_op("nope", Action::Create, None, Utc::now());

        assert!(matches!(store.remove("nope").await, Err(SyncError::NotFound(_))));
        assert!(matches!(store.update(&ghost, |_| {}).await, Err(SyncError::NotFound(_))));
        assert!(matches!(
            store.remove_synced(&ghost).await,
            Err(SyncError::NotFound(_))
        ));
        assert!(matches!(
            store.acknowledge_dead_letter("nope").await,
            Err(SyncError::NotFound(_))
        ));
        assert!(store.get("nope").await.is_none());
    }

    #[tokio::test]
    async fn test_replaced_operation_is_not_touched_by_stale_outcome() {
        let (_, store) = memory_store().await;
        let original = store
            .append(draft_op("wo-1", Action::Update, Some("pole-4"), Utc::now()))
            .await
            .unwrap();

        store.remove("wo-1").await.unwrap();
        let correction = store
            .append(draft_op("wo-1", Action::Update, Some("pole-4"), Utc::now()))
            .await
            .unwrap();
        assert_ne!(original.sequence, correction.sequence);

        let error = OperationError::now(FailureKind::Network, "stale");
        assert!(matches!(
            store.update(&original, |op| op.record_failure(error.clone())).await,
            Err(SyncError::NotFound(_))
        ));
        assert!(matches!(
            store.dead_letter(&original, DeadLetterReason::Conflict, error.clone()).await,
            Err(SyncError::NotFound(_))
        ));
        assert!(matches!(
            store.remove_synced(&original).await,
            Err(SyncError::NotFound(_))
        ));

        let stored = store.get("wo-1").await.unwrap();
        assert_eq!(stored, correction);
        assert_eq!(store.dead_letter_count().await, 0);

        store.remove_synced(&correction).await.unwrap();
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_failed_write_leaves_no_change() {
        let (kv, store) = memory_store().await;
        let kept = store
            .append(draft_op("kept", Action::Update, Some("valve-2"), Utc::now()))
            .await
            .unwrap();

        kv.set_fail_writes(true);

        assert!(matches!(
            store.append(draft_op("lost", Action::Create, None, Utc::now())).await,
            Err(SyncError::Storage(_))
        ));
        assert!(store.update(&kept, |op| op.retry_count = 1).await.is_err());
        assert!(store.remove_synced(&kept).await.is_err());
        assert!(store
            .dead_letter(&kept, DeadLetterReason::Conflict, OperationError::now(FailureKind::Conflict, "x"))
            .await
            .is_err());
        assert!(store.clear_all().await.is_err());

        kv.set_fail_writes(false);

        let ops = store.list_ordered().await;
        assert_eq!(ids(&ops), vec!["kept"]);
        assert_eq!(ops[0].retry_count, 0);
        assert_eq!(store.dead_letter_count().await, 0);
    }

    #[tokio::test]
    async fn test_dead_letter_moves_atomically() {
        let (kv, store) = memory_store().await;
        let op = store
            .append(draft_op("op-1", Action::Delete, Some("hydrant-3"), Utc::now()))
            .await
            .unwrap();

        let dead = store
            .dead_letter(
                &op,
                DeadLetterReason::Conflict,
                OperationError::now(FailureKind::Conflict, "hydrant-3 no longer exists"),
            )
            .await
            .unwrap();

        assert_eq!(dead.operation.retry_count, 1);
        assert_eq!(dead.reason, DeadLetterReason::Conflict);
        assert!(store.is_empty().await);
        assert_eq!(kv.keys(), vec!["dead/op-1".to_string()]);

        let acked = store.acknowledge_dead_letter("op-1").await.unwrap();
        assert_eq!(acked.id(), "op-1");
        assert!(kv.keys().is_empty());
    }

    #[tokio::test]
    async fn test_reopen_restores_state() {
        let kv = MemoryStore::new();
        let now = Utc::now();
        {
            let store = PendingOperationStore::open(Arc::new(kv.clone()), None).await.unwrap();
            store.append(draft_op("a", Action::Create, None, now)).await.unwrap();
            store.append(draft_op("b", Action::Update, Some("line-1"), now)).await.unwrap();
            let c = store.append(draft_op("c", Action::Delete, Some("line-2"), now)).await.unwrap();
            store
                .dead_letter(&c, DeadLetterReason::RetriesExhausted, OperationError::now(FailureKind::Timeout, "slow"))
                .await
                .unwrap();
            store.record_sync_attempt(now).await.unwrap();
        }

        let store = PendingOperationStore::open(Arc::new(kv.clone()), None).await.unwrap();
        assert_eq!(ids(&store.list_ordered().await), vec!["a", "b"]);
        assert_eq!(store.dead_letter_count().await, 1);
        assert_eq!(store.last_sync_attempt().await, Some(now));

        let d = store.append(draft_op("d", Action::Create, None, now)).await.unwrap();
        assert_eq!(d.sequence, 3);
        assert_eq!(ids(&store.list_ordered().await), vec!["a", "b", "d"]);
    }

    #[tokio::test]
    async fn test_open_drops_pending_superseded_by_dead_letter() {
        let kv = MemoryStore::new();
        let op = draft_op("x", Action::Update, Some("pole-1"), Utc::now());
        let dead = DeadLetter::new(
            op.clone(),
            DeadLetterReason::Conflict,
            OperationError::now(FailureKind::Conflict, "stale"),
        );
        kv.put("pending/x", &serde_json::to_string(&op).unwrap()).await.unwrap();
        kv.put("dead/x", &serde_json::to_string(&dead).unwrap()).await.unwrap();

        let store = PendingOperationStore::open(Arc::new(kv.clone()), None).await.unwrap();

        assert!(store.is_empty().await);
        assert_eq!(store.dead_letter_count().await, 1);
        assert_eq!(kv.keys(), vec!["dead/x".to_string()]);
    }

    #[tokio::test]
    async fn test_clear_all_keeps_dead_letters_and_meta() {
        let (kv, store) = memory_store().await;
        let now = Utc::now();
        store.append(draft_op("a", Action::Create, None, now)).await.unwrap();
        store.append(draft_op("b", Action::Create, None, now)).await.unwrap();
        let c = store.append(draft_op("c", Action::Delete, Some("k"), now)).await.unwrap();
        store
            .dead_letter(&c, DeadLetterReason::Conflict, OperationError::now(FailureKind::Conflict, "x"))
            .await
            .unwrap();
        store.record_sync_attempt(now).await.unwrap();

        assert_eq!(store.clear_all().await.unwrap(), 2);
        assert!(store.is_empty().await);
        assert_eq!(
            kv.keys(),
            vec!["dead/c".to_string(), "meta/last_sync_attempt".to_string()]
        );
        assert_eq!(store.clear_dead_letters().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_count_by_action() {
        let (_, store) = memory_store().await;
        let now = Utc::now();
        store.append(draft_op("a", Action::Create, None, now)).await.unwrap();
        store.append(draft_op("b", Action::Create, None, now)).await.unwrap();
        store.append(draft_op("c", Action::Delete, Some("k"), now)).await.unwrap();

        let counts = store.count_by_action().await;
        assert_eq!(counts.create, 2);
        assert_eq!(counts.update, 0);
        assert_eq!(counts.delete, 1);
        assert_eq!(counts.total(), 3);
    }

    #[tokio::test]
    async fn test_snapshot_fails_when_store_unreadable() {
        let (kv, store) = memory_store().await;
        store.append(draft_op("a", Action::Create, None, Utc::now())).await.unwrap();

        assert_eq!(ids(&store.snapshot().await.unwrap()), vec!["a"]);

        kv.set_fail_reads(true);
        assert!(matches!(store.snapshot().await, Err(SyncError::Storage(_))));
    }

    #[tokio::test]
    async fn test_sqlite_backed_store() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let kv: Arc<dyn DurableStore> = Arc::new(db.kv());
        let now = Utc::now();

        let store = PendingOperationStore::open(kv.clone(), None).await.unwrap();
        store.append(draft_op("a", Action::Create, None, now)).await.unwrap();
        let b = store.append(draft_op("b", Action::Update, Some("sub-12"), now)).await.unwrap();
        store
            .dead_letter(&b, DeadLetterReason::Conflict, OperationError::now(FailureKind::Conflict, "newer"))
            .await
            .unwrap();
        drop(store);

        let reopened = PendingOperationStore::open(kv, None).await.unwrap();
        assert_eq!(ids(&reopened.list_ordered().await), vec!["a"]);
        assert_eq!(reopened.dead_letters().await[0].id(), "b");
    }
}
