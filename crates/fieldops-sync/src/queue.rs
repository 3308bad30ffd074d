//! # Queue Facade
//!
//! The public surface of the offline queue. Business logic enqueues through
//! it; the presentation layer reads status and triggers syncs through it.
//!
//! ## Wiring
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  QueueFacadeBuilder::new(config)                                       │
//! │      .with_store(kv)              ← optional, defaults to SQLite file  │
//! │      .with_remote(remote)         ← required                           │
//! │      .with_connectivity(monitor)  ← optional, defaults to online       │
//! │      .build().await                                                    │
//! │                │                                                        │
//! │                ▼                                                        │
//! │  QueueFacade (Clone, Arc inside)                                       │
//! │      ├── PendingOperationStore                                         │
//! │      ├── SyncEngine                                                    │
//! │      └── ConnectivityMonitor                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! There is no global instance. Construct one per process and pass clones to
//! whoever needs it.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use fieldops_core::validation::validate_draft;
use fieldops_core::{
    Action, ActionCounts, DeadLetter, OperationDraft, PendingOperation, QueueStatus,
    SyncSession,
};
use fieldops_db::{Database, DbConfig, DbError, DurableStore};

use crate::config::SyncConfig;
use crate::connectivity::{ConnectivityMonitor, ConnectivityState};
use crate::engine::{SyncEngine, SyncHandle, SyncTrigger};
use crate::error::{SyncError, SyncResult};
use crate::remote::RemoteStore;
use crate::store::PendingOperationStore;

struct QueueInner {
    store: Arc<PendingOperationStore>,
    engine: Arc<SyncEngine>,
    connectivity: ConnectivityMonitor,
    max_retries: u32,
}

/// Handle to one offline queue. Cheap to clone.
#[derive(Clone)]
pub struct QueueFacade {
    inner: Arc<QueueInner>,
}

impl std::fmt::Debug for QueueFacade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueFacade")
            .field("store", &self.inner.store)
            .field("engine", &self.inner.engine)
            .field("connectivity", &self.inner.connectivity)
            .finish()
    }
}

impl QueueFacade {
    /// Opens the store over `kv` and wires the engine.
    pub async fn open(
        kv: Arc<dyn DurableStore>,
        remote: Arc<dyn RemoteStore>,
        connectivity: ConnectivityMonitor,
        config: &SyncConfig,
    ) -> SyncResult<Self> {
        config.validate()?;
        let store = PendingOperationStore::open(kv, config.queue.max_pending).await?;
        Ok(Self::from_parts(Arc::new(store), remote, connectivity, config))
    }

    /// Wires an already opened store.
    pub fn from_parts(
        store: Arc<PendingOperationStore>,
        remote: Arc<dyn RemoteStore>,
        connectivity: ConnectivityMonitor,
        config: &SyncConfig,
    ) -> Self {
        let engine = Arc::new(SyncEngine::new(
            store.clone(),
            remote,
            connectivity.clone(),
            config.request_timeout(),
        ));

        QueueFacade {
            inner: Arc::new(QueueInner {
                store,
                engine,
                connectivity,
                max_retries: config.queue.max_retries.max(1),
            }),
        }
    }

    // =========================================================================
    // Enqueue
    // =========================================================================

    /// Queues a mutation and returns its id.
    ///
    /// The call returns only after the operation is durable.
    pub async fn enqueue(
        &self,
        action: Action,
        target_key: Option<String>,
        record: Value,
    ) -> SyncResult<String> {
        let op = self
            .enqueue_draft(OperationDraft::new(action, target_key, record))
            .await?;
        Ok(op.id)
    }

    /// Queues a draft. A caller-supplied id makes retried enqueues
    /// idempotent: the second attempt fails with `DuplicateId`.
    pub async fn enqueue_draft(&self, draft: OperationDraft) -> SyncResult<PendingOperation> {
        validate_draft(&draft)?;

        let id = draft
            .id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let max_retries = draft.max_retries.unwrap_or(self.inner.max_retries);

        let op = PendingOperation::from_draft(draft, id, max_retries, Utc::now(), 0);
        let op = self.inner.store.append(op).await?;

        info!(
            id = %op.id,
            action = %op.action,
            target_key = op.target_key.as_deref().unwrap_or("-"),
            "Operation enqueued"
        );

        Ok(op)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Pending operations in replay order.
    pub async fn list_pending(&self) -> Vec<PendingOperation> {
        self.inner.store.list_ordered().await
    }

    pub async fn get(&self, id: &str) -> Option<PendingOperation> {
        self.inner.store.get(id).await
    }

    /// Pending totals per action.
    pub async fn counts(&self) -> ActionCounts {
        self.inner.store.count_by_action().await
    }

    /// Start of the most recent run, whatever its outcome.
    pub async fn last_sync_attempt(&self) -> Option<DateTime<Utc>> {
        self.inner.store.last_sync_attempt().await
    }

    /// Point-in-time snapshot for the presentation layer.
    pub async fn status(&self) -> QueueStatus {
        let counts = self.inner.store.count_by_action().await;
        let current = self.inner.engine.current();

        QueueStatus {
            is_online: self.inner.connectivity.is_online(),
            is_syncing: current.as_ref().map(|h| !h.is_finished()).unwrap_or(false),
            sync_progress: current.map(|h| h.session().progress).unwrap_or(0),
            pending_total: counts.total(),
            pending_by_action: counts,
            dead_letter_total: self.inner.store.dead_letter_count().await,
            last_sync_attempt: self.inner.store.last_sync_attempt().await,
        }
    }

    pub fn connectivity(&self) -> &ConnectivityMonitor {
        &self.inner.connectivity
    }

    // =========================================================================
    // Sync
    // =========================================================================

    /// Starts a run, or hands back the one already in progress.
    pub fn start_sync(&self) -> SyncTrigger {
        self.inner.engine.start()
    }

    /// Starts (or joins) a run and waits for it to finish.
    pub async fn sync_now(&self) -> SyncSession {
        self.start_sync().into_handle().wait().await
    }

    /// Handle of the live run, or of the last finished one.
    pub fn current_sync(&self) -> Option<SyncHandle> {
        self.inner.engine.current()
    }

    // =========================================================================
    // Clearing
    // =========================================================================

    /// Drops one pending operation without syncing it.
    pub async fn clear_one(&self, id: &str) -> SyncResult<PendingOperation> {
        let op = self.inner.store.remove(id).await?;
        info!(id = %id, "Pending operation cleared");
        Ok(op)
    }

    /// Drops every pending operation without syncing. Irreversible.
    pub async fn clear_all(&self) -> SyncResult<usize> {
        self.inner.store.clear_all().await
    }

    // =========================================================================
    // Dead Letters
    // =========================================================================

    pub async fn dead_letters(&self) -> Vec<DeadLetter> {
        self.inner.store.dead_letters().await
    }

    pub async fn acknowledge_dead_letter(&self, id: &str) -> SyncResult<DeadLetter> {
        self.inner.store.acknowledge_dead_letter(id).await
    }

    pub async fn clear_dead_letters(&self) -> SyncResult<usize> {
        self.inner.store.clear_dead_letters().await
    }
}

// =============================================================================
// Builder Pattern
// =============================================================================

/// Builder for creating a QueueFacade with options.
pub struct QueueFacadeBuilder {
    config: SyncConfig,
    store: Option<Arc<dyn DurableStore>>,
    remote: Option<Arc<dyn RemoteStore>>,
    connectivity: Option<ConnectivityMonitor>,
}

impl QueueFacadeBuilder {
    /// Creates a new builder with the given config.
    pub fn new(config: SyncConfig) -> Self {
        QueueFacadeBuilder {
            config,
            store: None,
            remote: None,
            connectivity: None,
        }
    }

    /// Sets the durable store. Without one, `build` opens the SQLite file
    /// named by the config.
    pub fn with_store(mut self, store: Arc<dyn DurableStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Sets the remote store client.
    pub fn with_remote(mut self, remote: Arc<dyn RemoteStore>) -> Self {
        self.remote = Some(remote);
        self
    }

    /// Sets the connectivity monitor.
    pub fn with_connectivity(mut self, connectivity: ConnectivityMonitor) -> Self {
        self.connectivity = Some(connectivity);
        self
    }

    /// Builds the QueueFacade.
    pub async fn build(self) -> SyncResult<QueueFacade> {
        let remote = self
            .remote
            .ok_or_else(|| SyncError::InvalidConfig("Remote store required".into()))?;

        let store: Arc<dyn DurableStore> = match self.store {
            Some(store) => store,
            None => {
                let path = self.config.database_path();
                if let Some(parent) = path.parent() {
                    if !parent.as_os_str().is_empty() {
                        std::fs::create_dir_all(parent).map_err(|e| {
                            DbError::ConnectionFailed(format!("{}: {e}", parent.display()))
                        })?;
                    }
                }
                let db = Database::new(DbConfig::new(path)).await?;
                Arc::new(db.kv())
            }
        };

        let connectivity = self
            .connectivity
            .unwrap_or_else(|| ConnectivityMonitor::new(ConnectivityState::Online));

        QueueFacade::open(store, remote, connectivity, &self.config).await
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
