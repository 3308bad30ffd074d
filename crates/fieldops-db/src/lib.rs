//! # fieldops-db: Durable Store for the FieldOps Offline Queue
//!
//! This crate provides the local durable key-value store that the offline
//! queue writes through. The queue treats it as a black box: get, put, delete
//! and list by key prefix, plus an atomic batch write.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        FieldOps Data Flow                               │
//! │                                                                         │
//! │  QueueFacade::enqueue(...)                                             │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  PendingOperationStore (fieldops-sync)                                 │
//! │       │  put("pending/<id>", json)                                     │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   fieldops-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │ KvRepository  │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │◄───│ (SQLite KV)   │    │  (embedded)  │  │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘  │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐                                            │   │
//! │  │   │  MemoryStore  │  same contract, no persistence (tests)     │   │
//! │  │   └───────────────┘                                            │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite file (WAL mode)                                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`store`] - The `DurableStore` contract
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`repository`] - SQLite implementation of the contract
//! - [`memory`] - In-memory implementation of the contract
//! - [`error`] - Storage error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use fieldops_db::{Database, DbConfig, DurableStore};
//!
//! let db = Database::new(DbConfig::new("./fieldops.db")).await?;
//! let kv = db.kv();
//! kv.put("meta/hello", "\"world\"").await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod memory;
pub mod migrations;
pub mod pool;
pub mod repository;
pub mod store;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use memory::MemoryStore;
pub use pool::{Database, DbConfig};
pub use repository::kv::KvRepository;
pub use store::{DurableStore, KvWrite};
