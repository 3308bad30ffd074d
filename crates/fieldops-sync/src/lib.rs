//! # fieldops-sync: Offline Queue and Sync Engine
//!
//! This crate lets a field client keep working while disconnected. Every
//! create/update/delete is recorded durably and replayed against the remote
//! store, in enqueue order, once connectivity returns.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   Portal (forms, status widgets)                                        │
//! │        │ enqueue / status / start_sync                                  │
//! │        ▼                                                                │
//! │   ┌─────────────┐     ┌──────────────┐     ┌─────────────────────┐     │
//! │   │ QueueFacade │────►│  SyncEngine  │────►│ RemoteStore (trait) │     │
//! │   └──────┬──────┘     └──────┬───────┘     └─────────────────────┘     │
//! │          │                   │      ▲                                   │
//! │          ▼                   ▼      │ reconnect / timer / manual        │
//! │   ┌──────────────────────────────┐  │                                   │
//! │   │ PendingOperationStore        │  └── SyncScheduler                   │
//! │   │  pending/<id>   dead/<id>    │          ▲                           │
//! │   └──────────────┬───────────────┘          │                           │
//! │                  ▼                   ConnectivityMonitor                │
//! │          DurableStore (fieldops-db)                                     │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`queue`] - `QueueFacade`, the public entry point
//! - [`store`] - Ordered, durable pending-operation store with dead letters
//! - [`engine`] - Sequential replay with retry and dead-letter classification
//! - [`scheduler`] - Background trigger loop with exponential backoff
//! - [`connectivity`] - Online/offline state and transition subscribers
//! - [`remote`] - The remote store contract
//! - [`config`] - TOML + environment configuration
//! - [`error`] - Sync error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use fieldops_sync::{QueueFacadeBuilder, SyncConfig, SyncScheduler};
//! use fieldops_core::Action;
//!
//! let config = SyncConfig::load_or_default(None);
//! let queue = QueueFacadeBuilder::new(config.clone())
//!     .with_remote(remote)
//!     .build()
//!     .await?;
//!
//! queue.enqueue(Action::Update, Some("meter-4471".into()), record).await?;
//! let scheduler = SyncScheduler::spawn(queue.clone(), &config)?;
//!
//! let status = queue.status().await;
//! println!("{} pending, {}% synced", status.pending_total, status.sync_progress);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod connectivity;
pub mod engine;
pub mod error;
pub mod queue;
pub mod remote;
pub mod scheduler;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::{QueueSettings, StorageSettings, SyncConfig, SyncSettings};
pub use connectivity::{
    ConnectivityMonitor, ConnectivitySource, ConnectivityState, SubscriptionToken,
};
pub use engine::{SyncEngine, SyncHandle, SyncTrigger};
pub use error::{SyncError, SyncResult};
pub use queue::{QueueFacade, QueueFacadeBuilder};
pub use remote::{RemoteFailure, RemoteOutcome, RemoteStore};
pub use scheduler::{SchedulerHandle, SyncScheduler};
pub use store::PendingOperationStore;

// =============================================================================
// Tracing
// =============================================================================

/// Default filter when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "info,fieldops=debug,sqlx=warn";

/// Installs a `tracing-subscriber` formatter honouring `RUST_LOG`.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
