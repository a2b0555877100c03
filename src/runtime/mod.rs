//! Run execution infrastructure: configuration, retries, checkpointing, and
//! the run controller.
//!
//! # Architecture
//!
//! - [`RunController`] — drives one pipeline execution end-to-end
//! - [`RetryPolicy`]/[`RetryLedger`] — bounded per-stage retry bookkeeping
//! - [`Checkpointer`] — pluggable persistence for per-stage state snapshots
//! - Persistence models — explicit, versioned serde schema for state and
//!   checkpoints, readable without language-native serialization
//!
//! # Persistence backends
//!
//! - [`InMemoryCheckpointer`] — volatile, always available, the default
//! - `SqliteCheckpointer` — durable, behind the `sqlite` feature

pub mod checkpointer;
#[cfg(feature = "sqlite")]
pub mod checkpointer_sqlite;
pub mod config;
pub mod controller;
pub mod persistence;
pub mod retry;

pub use checkpointer::{
    Checkpoint, Checkpointer, CheckpointerError, InMemoryCheckpointer,
};
#[cfg(feature = "sqlite")]
pub use checkpointer_sqlite::SqliteCheckpointer;
pub use config::{ConfigurationError, EngineConfig};
pub use controller::{ControllerError, RunController, RunOutcome};
pub use persistence::{
    PersistedChannel, PersistedCheckpoint, PersistedState, PersistenceError, SCHEMA_VERSION,
};
pub use retry::{RetryLedger, RetryPolicy};
