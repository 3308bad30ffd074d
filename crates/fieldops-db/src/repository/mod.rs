//! # Repository Module
//!
//! SQLite-backed repositories.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  PendingOperationStore (fieldops-sync)                                 │
//! │       │                                                                 │
//! │       │  store.write_batch([Delete pending/x, Put dead/x])             │
//! │       ▼                                                                 │
//! │  KvRepository  (impl DurableStore)                                     │
//! │  ├── get / put / delete                                                │
//! │  ├── list_prefix / delete_prefix                                       │
//! │  └── write_batch  (one SQLite transaction)                             │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  kv_store table                                                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`kv::KvRepository`] - Durable key-value store

pub mod kv;
