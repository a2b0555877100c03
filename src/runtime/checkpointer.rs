//! Checkpoint model and pluggable checkpoint stores.
//!
//! A checkpoint is a full state snapshot tagged with `(run, stage, seq)`,
//! written immediately after a stage commits. Multiple checkpoints are
//! retained per run so a run can be rolled back to any prior stage boundary,
//! not just the most recent. Saves have atomic semantics: a checkpoint is
//! either fully written or absent.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use miette::Diagnostic;
use rustc_hash::FxHashMap;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::runtime::persistence::PersistenceError;
use crate::runtime::retry::RetryLedger;
use crate::state::ReviewState;
use crate::types::StageKind;

/// Snapshot of run state at a stage boundary.
#[derive(Clone, Debug)]
pub struct Checkpoint {
    pub run_id: String,
    /// The stage whose commit produced this checkpoint (`Start` for the
    /// initial snapshot, `End` for the post-commit one).
    pub stage: StageKind,
    /// Monotonic sequence number within the run.
    pub seq: u64,
    pub state: ReviewState,
    /// Encoded retry counters at snapshot time.
    pub retries: FxHashMap<String, u32>,
    pub created_at: DateTime<Utc>,
}

impl Checkpoint {
    /// Assemble a checkpoint from the controller's working set.
    #[must_use]
    pub fn capture(
        run_id: &str,
        stage: StageKind,
        seq: u64,
        state: &ReviewState,
        ledger: &RetryLedger,
    ) -> Self {
        Self {
            run_id: run_id.to_string(),
            stage,
            seq,
            state: state.clone(),
            retries: ledger.encoded(),
            created_at: Utc::now(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CheckpointerError>;

/// Pluggable persistence for checkpoints and retry counters.
#[async_trait]
pub trait Checkpointer: Send + Sync {
    /// Persist one checkpoint. Must be atomic: partial writes are not
    /// observable.
    async fn save(&self, checkpoint: Checkpoint) -> Result<()>;

    /// Highest-seq checkpoint of a run, if any.
    async fn load_latest(&self, run_id: &str) -> Result<Option<Checkpoint>>;

    /// Checkpoint `seq` of a run, if present.
    async fn load_at(&self, run_id: &str, seq: u64) -> Result<Option<Checkpoint>>;

    /// Identifiers of all runs with at least one checkpoint, sorted.
    async fn list_runs(&self) -> Result<Vec<String>>;
}

/// Errors from checkpoint stores.
#[derive(Debug, Error, Diagnostic)]
pub enum CheckpointerError {
    #[error("checkpoint backend failure: {0}")]
    #[diagnostic(
        code(reviewops::checkpointer::backend),
        help("The run is marked failed; prior incident history remains readable.")
    )]
    Backend(String),

    #[error(transparent)]
    #[diagnostic(code(reviewops::checkpointer::persistence))]
    Persistence(#[from] PersistenceError),
}

/// Volatile checkpoint store for tests and development.
///
/// Checkpoints per run are kept in seq order; saving an existing `(run, seq)`
/// replaces it wholesale, preserving the atomic-save contract.
#[derive(Debug, Default)]
pub struct InMemoryCheckpointer {
    runs: RwLock<FxHashMap<String, Vec<Checkpoint>>>,
}

impl InMemoryCheckpointer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Checkpointer for InMemoryCheckpointer {
    async fn save(&self, checkpoint: Checkpoint) -> Result<()> {
        let mut runs = self.runs.write().await;
        let entries = runs.entry(checkpoint.run_id.clone()).or_default();
        match entries.binary_search_by_key(&checkpoint.seq, |c| c.seq) {
            Ok(slot) => entries[slot] = checkpoint,
            Err(slot) => entries.insert(slot, checkpoint),
        }
        Ok(())
    }

    async fn load_latest(&self, run_id: &str) -> Result<Option<Checkpoint>> {
        let runs = self.runs.read().await;
        Ok(runs.get(run_id).and_then(|entries| entries.last().cloned()))
    }

    async fn load_at(&self, run_id: &str, seq: u64) -> Result<Option<Checkpoint>> {
        let runs = self.runs.read().await;
        Ok(runs.get(run_id).and_then(|entries| {
            entries
                .binary_search_by_key(&seq, |c| c.seq)
                .ok()
                .map(|slot| entries[slot].clone())
        }))
    }

    async fn list_runs(&self) -> Result<Vec<String>> {
        let runs = self.runs.read().await;
        let mut ids: Vec<String> = runs.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}
