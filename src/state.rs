//! State management for the ReviewOps engine.
//!
//! This module provides the versioned state store accumulated across runs and
//! the immutable snapshots handed to pipeline stages.
//!
//! # Core Types
//!
//! - [`ReviewState`]: the state store, organized into versioned channels
//! - [`StateSnapshot`]: a cloned, read-only view taken at a stage boundary
//!
//! # Channels
//!
//! | channel        | contents                                | merge semantics |
//! |----------------|-----------------------------------------|-----------------|
//! | `feedback`     | every item ever ingested                | id-dedup union  |
//! | `batch`        | the current run's new items             | replace         |
//! | `high_risk`    | the current run's high-risk subset      | replace         |
//! | `attributions` | the current run's attribution results   | replace         |
//! | `actions`      | the current run's action items          | replace         |
//! | `processed`    | ids that completed a full run           | set union       |
//! | `history`      | one [`RunRecord`] per completed run     | append          |
//! | `logs`         | durable run log lines                   | append          |
//! | `alerts`       | degradation markers                     | append          |
//!
//! `processed` and `history` are written only by the run controller at commit;
//! stages never touch them. There is no ambient/global state: a `ReviewState`
//! handle is created at process start (or restored from a checkpoint) and
//! passed explicitly to the controller for the run's duration.
//!
//! # Examples
//!
//! ```rust
//! use reviewops::feedback::FeedbackItem;
//! use reviewops::state::ReviewState;
//! use reviewops::channels::Channel;
//!
//! let mut state = ReviewState::default();
//! state
//!     .feedback
//!     .get_mut()
//!     .push(FeedbackItem::new("101-a", "gimbal shakes on startup", 1));
//!
//! let snapshot = state.snapshot();
//! assert_eq!(snapshot.feedback.len(), 1);
//!
//! // Snapshots are independent of later mutation.
//! state.feedback.get_mut().clear();
//! assert_eq!(snapshot.feedback.len(), 1);
//! ```

use rustc_hash::FxHashSet;

use crate::{
    channels::{Channel, VersionedChannel},
    feedback::{ActionItem, Alert, AttributionResult, FeedbackItem, LogEntry, RunRecord},
    types::ChannelType,
};

/// The state store: every channel the pipeline reads or writes, each with its
/// own version counter.
#[derive(Clone, Debug, Default)]
pub struct ReviewState {
    /// Accumulated feedback items across all runs, first-seen order.
    pub feedback: VersionedChannel<Vec<FeedbackItem>>,
    /// The current run's new batch.
    pub batch: VersionedChannel<Vec<FeedbackItem>>,
    /// The current run's high-risk subset, input order preserved.
    pub high_risk: VersionedChannel<Vec<FeedbackItem>>,
    /// The current run's attribution results, one per high-risk item.
    pub attributions: VersionedChannel<Vec<AttributionResult>>,
    /// The current run's action items.
    pub actions: VersionedChannel<Vec<ActionItem>>,
    /// Identifiers that have completed the full pipeline at least once.
    pub processed: VersionedChannel<Vec<String>>,
    /// Append-only incident history; insertion order is run order.
    pub history: VersionedChannel<Vec<RunRecord>>,
    /// Append-only run log.
    pub logs: VersionedChannel<Vec<LogEntry>>,
    /// Append-only degradation markers.
    pub alerts: VersionedChannel<Vec<Alert>>,
}

/// Immutable snapshot of the state store at a stage boundary.
///
/// Stages receive snapshots, never the live state; all mutation flows back
/// through [`StagePartial`](crate::stage::StagePartial) updates applied by the
/// controller's reducer barrier.
#[derive(Clone, Debug, Default)]
pub struct StateSnapshot {
    pub feedback: Vec<FeedbackItem>,
    pub batch: Vec<FeedbackItem>,
    pub high_risk: Vec<FeedbackItem>,
    pub attributions: Vec<AttributionResult>,
    pub actions: Vec<ActionItem>,
    pub processed: Vec<String>,
    pub history: Vec<RunRecord>,
    pub logs: Vec<LogEntry>,
    pub alerts: Vec<Alert>,
}

impl StateSnapshot {
    /// The processed-id set as a hash set, for O(1) idempotency checks.
    #[must_use]
    pub fn processed_set(&self) -> FxHashSet<String> {
        self.processed.iter().cloned().collect()
    }
}

impl ReviewState {
    /// Creates a builder for seeding state in tests or restore paths.
    pub fn builder() -> ReviewStateBuilder {
        ReviewStateBuilder::default()
    }

    /// Takes a cloned, point-in-time view of every channel.
    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            feedback: self.feedback.snapshot(),
            batch: self.batch.snapshot(),
            high_risk: self.high_risk.snapshot(),
            attributions: self.attributions.snapshot(),
            actions: self.actions.snapshot(),
            processed: self.processed.snapshot(),
            history: self.history.snapshot(),
            logs: self.logs.snapshot(),
            alerts: self.alerts.snapshot(),
        }
    }

    /// Bumps the version of one channel. Called by the barrier for each
    /// channel a partial update touched.
    pub fn bump(&mut self, channel: ChannelType) {
        match channel {
            ChannelType::Feedback => self.feedback.bump(),
            ChannelType::Batch => self.batch.bump(),
            ChannelType::HighRisk => self.high_risk.bump(),
            ChannelType::Attributions => self.attributions.bump(),
            ChannelType::Actions => self.actions.bump(),
            ChannelType::Processed => self.processed.bump(),
            ChannelType::History => self.history.bump(),
            ChannelType::Logs => self.logs.bump(),
            ChannelType::Alerts => self.alerts.bump(),
        }
    }

    /// Version of one channel, for checkpoint metadata.
    #[must_use]
    pub fn version(&self, channel: ChannelType) -> u32 {
        match channel {
            ChannelType::Feedback => self.feedback.version(),
            ChannelType::Batch => self.batch.version(),
            ChannelType::HighRisk => self.high_risk.version(),
            ChannelType::Attributions => self.attributions.version(),
            ChannelType::Actions => self.actions.version(),
            ChannelType::Processed => self.processed.version(),
            ChannelType::History => self.history.version(),
            ChannelType::Logs => self.logs.version(),
            ChannelType::Alerts => self.alerts.version(),
        }
    }
}

/// Fluent builder for [`ReviewState`], mainly used by tests and persistence
/// restore.
///
/// # Examples
///
/// ```rust
/// use reviewops::feedback::FeedbackItem;
/// use reviewops::state::ReviewState;
///
/// let state = ReviewState::builder()
///     .with_feedback(vec![FeedbackItem::new("101-a", "ok", 4)])
///     .with_processed(vec!["101-a".into()])
///     .build();
/// assert_eq!(state.snapshot().processed, vec!["101-a".to_string()]);
/// ```
#[derive(Debug, Default)]
pub struct ReviewStateBuilder {
    feedback: Vec<FeedbackItem>,
    batch: Vec<FeedbackItem>,
    high_risk: Vec<FeedbackItem>,
    processed: Vec<String>,
    history: Vec<RunRecord>,
}

impl ReviewStateBuilder {
    #[must_use]
    pub fn with_feedback(mut self, items: Vec<FeedbackItem>) -> Self {
        self.feedback = items;
        self
    }

    #[must_use]
    pub fn with_batch(mut self, items: Vec<FeedbackItem>) -> Self {
        self.batch = items;
        self
    }

    #[must_use]
    pub fn with_high_risk(mut self, items: Vec<FeedbackItem>) -> Self {
        self.high_risk = items;
        self
    }

    #[must_use]
    pub fn with_processed(mut self, ids: Vec<String>) -> Self {
        self.processed = ids;
        self
    }

    #[must_use]
    pub fn with_history(mut self, records: Vec<RunRecord>) -> Self {
        self.history = records;
        self
    }

    pub fn build(self) -> ReviewState {
        ReviewState {
            feedback: VersionedChannel::new(self.feedback, 1),
            batch: VersionedChannel::new(self.batch, 1),
            high_risk: VersionedChannel::new(self.high_risk, 1),
            processed: VersionedChannel::new(self.processed, 1),
            history: VersionedChannel::new(self.history, 1),
            ..ReviewState::default()
        }
    }
}
