/*!
Persistence primitives for serializing runtime state and checkpoints.

Design goals:
- Explicit serde-friendly structs decoupled from the in-memory types, so any
  implementation language can read and write the records without relying on
  language-native object serialization.
- A `schema_version` discriminator on every top-level record for forward
  compatibility.
- Conversion logic localized in From / TryFrom impls so checkpointer code
  stays lean and declarative.

This module performs no I/O; it is pure data transformation.
*/

use chrono::Utc;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::{
    channels::{Channel, VersionedChannel},
    feedback::{ActionItem, Alert, AttributionResult, FeedbackItem, LogEntry, RunRecord},
    runtime::checkpointer::Checkpoint,
    state::ReviewState,
    types::StageKind,
    utils::json_ext::JsonSerializable,
};

use miette::Diagnostic;
use thiserror::Error;

/// Current on-disk schema version.
pub const SCHEMA_VERSION: u32 = 1;

/// Blanket JSON-string serialization for all persisted models.
impl<T> JsonSerializable<PersistenceError> for T
where
    T: serde::Serialize + for<'de> serde::de::DeserializeOwned,
{
    fn to_json_string(&self) -> std::result::Result<String, PersistenceError> {
        serde_json::to_string(self).map_err(|e| PersistenceError::Serde { source: e })
    }

    fn from_json_str(s: &str) -> std::result::Result<Self, PersistenceError> {
        serde_json::from_str(s).map_err(|e| PersistenceError::Serde { source: e })
    }
}

/// One channel's payload with its version counter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct PersistedChannel<T> {
    pub version: u32,
    #[serde(default)]
    pub items: Vec<T>,
}

impl<T> Default for PersistedChannel<T> {
    fn default() -> Self {
        Self {
            version: 1,
            items: Vec::new(),
        }
    }
}

impl<T: Clone + Serialize + for<'de> Deserialize<'de>> PersistedChannel<T> {
    fn of(channel: &VersionedChannel<Vec<T>>) -> Self {
        Self {
            version: channel.version(),
            items: channel.snapshot(),
        }
    }

    fn restore(self) -> VersionedChannel<Vec<T>> {
        VersionedChannel::new(self.items, self.version)
    }
}

/// Complete persisted shape of the in-memory [`ReviewState`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct PersistedState {
    #[serde(default)]
    pub schema_version: u32,
    pub feedback: PersistedChannel<FeedbackItem>,
    pub batch: PersistedChannel<FeedbackItem>,
    pub high_risk: PersistedChannel<FeedbackItem>,
    pub attributions: PersistedChannel<AttributionResult>,
    pub actions: PersistedChannel<ActionItem>,
    pub processed: PersistedChannel<String>,
    pub history: PersistedChannel<RunRecord>,
    pub logs: PersistedChannel<LogEntry>,
    pub alerts: PersistedChannel<Alert>,
}

/// Full persisted checkpoint representation; checkpoint stores keep one of
/// these per `(run, seq)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PersistedCheckpoint {
    #[serde(default)]
    pub schema_version: u32,
    pub run_id: String,
    /// Stage encoded via [`StageKind::encode`].
    pub stage: String,
    pub seq: u64,
    pub state: PersistedState,
    /// Retry counters, keyed by encoded stage name.
    #[serde(default)]
    pub retries: FxHashMap<String, u32>,
    /// RFC3339 creation time (keeps chrono types out of the wire shape).
    pub created_at: String,
}

/// Conversion and serialization errors for persistence models.
#[derive(Debug, Error, Diagnostic)]
pub enum PersistenceError {
    #[error("unsupported schema version: {0}")]
    #[diagnostic(
        code(reviewops::persistence::schema_version),
        help("This build reads schema version 1 records only.")
    )]
    UnsupportedSchema(u32),

    #[error("unknown stage in persisted record: {0}")]
    #[diagnostic(code(reviewops::persistence::unknown_stage))]
    UnknownStage(String),

    #[error("JSON serialization/deserialization failed: {source}")]
    #[diagnostic(
        code(reviewops::persistence::serde),
        help("Ensure the JSON structure matches the Persisted* types.")
    )]
    Serde {
        #[source]
        source: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, PersistenceError>;

/* ---------- ReviewState <-> PersistedState ---------- */

impl From<&ReviewState> for PersistedState {
    fn from(state: &ReviewState) -> Self {
        PersistedState {
            schema_version: SCHEMA_VERSION,
            feedback: PersistedChannel::of(&state.feedback),
            batch: PersistedChannel::of(&state.batch),
            high_risk: PersistedChannel::of(&state.high_risk),
            attributions: PersistedChannel::of(&state.attributions),
            actions: PersistedChannel::of(&state.actions),
            processed: PersistedChannel::of(&state.processed),
            history: PersistedChannel::of(&state.history),
            logs: PersistedChannel::of(&state.logs),
            alerts: PersistedChannel::of(&state.alerts),
        }
    }
}

impl TryFrom<PersistedState> for ReviewState {
    type Error = PersistenceError;

    fn try_from(persisted: PersistedState) -> Result<Self> {
        // schema_version 0 means the field was absent; accept it as v1.
        if persisted.schema_version > SCHEMA_VERSION {
            return Err(PersistenceError::UnsupportedSchema(persisted.schema_version));
        }
        Ok(ReviewState {
            feedback: persisted.feedback.restore(),
            batch: persisted.batch.restore(),
            high_risk: persisted.high_risk.restore(),
            attributions: persisted.attributions.restore(),
            actions: persisted.actions.restore(),
            processed: persisted.processed.restore(),
            history: persisted.history.restore(),
            logs: persisted.logs.restore(),
            alerts: persisted.alerts.restore(),
        })
    }
}

/* ---------- Checkpoint <-> PersistedCheckpoint ---------- */

impl From<&Checkpoint> for PersistedCheckpoint {
    fn from(cp: &Checkpoint) -> Self {
        PersistedCheckpoint {
            schema_version: SCHEMA_VERSION,
            run_id: cp.run_id.clone(),
            stage: cp.stage.encode().to_string(),
            seq: cp.seq,
            state: PersistedState::from(&cp.state),
            retries: cp.retries.clone(),
            created_at: cp.created_at.to_rfc3339(),
        }
    }
}

impl TryFrom<PersistedCheckpoint> for Checkpoint {
    type Error = PersistenceError;

    fn try_from(persisted: PersistedCheckpoint) -> Result<Self> {
        if persisted.schema_version > SCHEMA_VERSION {
            return Err(PersistenceError::UnsupportedSchema(persisted.schema_version));
        }
        let stage = StageKind::decode(&persisted.stage)
            .ok_or_else(|| PersistenceError::UnknownStage(persisted.stage.clone()))?;
        let created_at = chrono::DateTime::parse_from_rfc3339(&persisted.created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());
        Ok(Checkpoint {
            run_id: persisted.run_id,
            stage,
            seq: persisted.seq,
            state: ReviewState::try_from(persisted.state)?,
            retries: persisted.retries,
            created_at,
        })
    }
}
