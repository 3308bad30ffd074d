//! # fieldops-core: Pure Queue Types for the FieldOps Portal
//!
//! This crate holds the data model of the offline mutation queue: the
//! operations waiting to reach the remote store, the dead-letter records that
//! could not, and the per-run sync session. It has zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     FieldOps Offline Architecture                       │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │              Portal (forms, work orders, asset views)           │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ enqueue / status / start_sync         │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               fieldops-sync (QueueFacade, SyncEngine)           │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ fieldops-core (THIS CRATE) ★                    │   │
//! │  │                                                                 │   │
//! │  │   ┌──────────────┐  ┌──────────────┐  ┌──────────────────┐     │   │
//! │  │   │    types     │  │   session    │  │    validation    │     │   │
//! │  │   │ Pending Op   │  │ SyncSession  │  │ enqueue drafts   │     │   │
//! │  │   │ DeadLetter   │  │ RunState     │  │ target keys      │     │   │
//! │  │   └──────────────┘  └──────────────┘  └──────────────────┘     │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Queue entry types (PendingOperation, DeadLetter, counts)
//! - [`session`] - Sync run state machine and tallies
//! - [`error`] - Domain error types
//! - [`validation`] - Structural checks on enqueue drafts
//!
//! ## Example Usage
//!
//! ```rust
//! use fieldops_core::{Action, OperationDraft};
//! use serde_json::json;
//!
//! let draft = OperationDraft::new(Action::Update, Some("meter-4471".into()), json!({"reading": 1032}));
//! assert!(fieldops_core::validation::validate_draft(&draft).is_ok());
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod session;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use session::{AbortReason, RunState, SyncSession};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Default number of failed attempts before an operation is dead-lettered.
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Longest accepted remote target key.
pub const MAX_TARGET_KEY_LEN: usize = 256;
