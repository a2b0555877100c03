//! Stage execution framework.
//!
//! A [`Stage`] is one unit of the triage pipeline: a pure transform from a
//! [`StateSnapshot`] to a [`StagePartial`] describing the state change it
//! wants. Stages never mutate the state store directly; the run controller
//! applies partials through the reducer registry.
//!
//! # Error handling
//!
//! Stages report failure through [`StageError`]:
//!
//! - [`StageError::Transient`] — a capability timed out or failed on the
//!   wire; the controller retries up to the configured ceiling.
//! - [`StageError::MalformedOutput`] — a generation reply did not parse;
//!   never retried (re-asking a non-deterministic generator with identical
//!   input rarely helps), the controller degrades immediately.
//! - [`StageError::MissingInput`] — a prior stage did not produce required
//!   data; indicates a wiring bug, treated like exhaustion.
//!
//! On exhaustion the controller consults [`Stage::fallback`]: a stage that can
//! produce a degraded result (placeholder attributions, default actions)
//! returns `Some`, keeping the run alive as `Degraded`; a critical stage
//! returns `None` and the run is marked `Failed`.

use async_trait::async_trait;
use miette::Diagnostic;
use thiserror::Error;

use crate::event_bus::Event;
use crate::feedback::{ActionItem, Alert, AttributionResult, FeedbackItem, LogEntry, RunRecord};
use crate::state::StateSnapshot;
use crate::types::StageKind;

/// A single pipeline stage.
///
/// Implementations must be stateless with respect to the run: re-invoking
/// `run` with the same snapshot must be safe, because the controller does
/// exactly that on transient failure.
#[async_trait]
pub trait Stage: Send + Sync {
    /// Execute against a point-in-time snapshot, returning the partial update
    /// to merge.
    async fn run(
        &self,
        snapshot: StateSnapshot,
        ctx: StageContext,
    ) -> Result<StagePartial, StageError>;

    /// Degraded result to substitute when the retry ceiling is exhausted.
    ///
    /// `None` (the default) means the stage has no usable fallback and its
    /// failure is fatal to the run.
    fn fallback(&self, _snapshot: &StateSnapshot) -> Option<StagePartial> {
        None
    }
}

/// Execution context handed to a stage for the duration of one invocation.
#[derive(Clone, Debug)]
pub struct StageContext {
    /// Identifier of the run this invocation belongs to.
    pub run_id: String,
    /// The stage being executed.
    pub stage: StageKind,
    /// Sender half of the engine's event bus.
    pub event_sender: flume::Sender<Event>,
}

impl StageContext {
    pub fn new(run_id: &str, stage: StageKind, event_sender: flume::Sender<Event>) -> Self {
        Self {
            run_id: run_id.to_string(),
            stage,
            event_sender,
        }
    }

    /// Context wired to a channel nobody reads; events are dropped. Useful in
    /// unit tests that exercise a stage in isolation.
    pub fn detached(stage: StageKind) -> Self {
        let (sender, _receiver) = flume::unbounded();
        Self {
            run_id: "detached".to_string(),
            stage,
            event_sender: sender,
        }
    }

    /// Emit a stage-scoped event enriched with this context's metadata.
    ///
    /// Emission failure means the bus is gone; that is not worth failing a
    /// stage over, so the error is surfaced for callers that care and
    /// ignorable for those that don't.
    pub fn emit(
        &self,
        scope: impl Into<String>,
        message: impl Into<String>,
    ) -> Result<(), StageContextError> {
        self.event_sender
            .send(Event::stage_message(
                self.run_id.clone(),
                self.stage.encode(),
                scope,
                message,
            ))
            .map_err(|_| StageContextError::EventBusUnavailable)
    }
}

/// Partial state update returned by a stage.
///
/// Every field is optional; `None` means "no opinion about this channel".
/// `Some(vec![])` on a replace channel is a deliberate clear — the distinction
/// matters for `batch`/`high_risk`, which must be recomputed each run.
///
/// `processed` and `history` exist here because the controller's commit step
/// reuses the same partial/reducer machinery; stages leave them `None`.
#[derive(Clone, Debug, Default)]
pub struct StagePartial {
    pub feedback: Option<Vec<FeedbackItem>>,
    pub batch: Option<Vec<FeedbackItem>>,
    pub high_risk: Option<Vec<FeedbackItem>>,
    pub attributions: Option<Vec<AttributionResult>>,
    pub actions: Option<Vec<ActionItem>>,
    pub processed: Option<Vec<String>>,
    pub history: Option<Vec<RunRecord>>,
    pub logs: Option<Vec<LogEntry>>,
    pub alerts: Option<Vec<Alert>>,
}

impl StagePartial {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_feedback(mut self, items: Vec<FeedbackItem>) -> Self {
        self.feedback = Some(items);
        self
    }

    #[must_use]
    pub fn with_batch(mut self, items: Vec<FeedbackItem>) -> Self {
        self.batch = Some(items);
        self
    }

    #[must_use]
    pub fn with_high_risk(mut self, items: Vec<FeedbackItem>) -> Self {
        self.high_risk = Some(items);
        self
    }

    #[must_use]
    pub fn with_attributions(mut self, results: Vec<AttributionResult>) -> Self {
        self.attributions = Some(results);
        self
    }

    #[must_use]
    pub fn with_actions(mut self, items: Vec<ActionItem>) -> Self {
        self.actions = Some(items);
        self
    }

    #[must_use]
    pub fn with_logs(mut self, entries: Vec<LogEntry>) -> Self {
        self.logs = Some(entries);
        self
    }

    #[must_use]
    pub fn with_alerts(mut self, alerts: Vec<Alert>) -> Self {
        self.alerts = Some(alerts);
        self
    }

    /// Push one log line, allocating the vector on first use.
    pub fn log(&mut self, stage: StageKind, message: impl Into<String>) {
        self.logs
            .get_or_insert_with(Vec::new)
            .push(LogEntry::new(stage.encode(), message));
    }

    /// Push one alert, allocating the vector on first use.
    pub fn alert(&mut self, stage: StageKind, message: impl Into<String>) {
        self.alerts
            .get_or_insert_with(Vec::new)
            .push(Alert::new(stage.encode(), message));
    }

    /// Whether any alert is attached; the controller uses this to downgrade
    /// the run status.
    #[must_use]
    pub fn has_alerts(&self) -> bool {
        self.alerts.as_ref().is_some_and(|a| !a.is_empty())
    }
}

/// Errors that can occur when using [`StageContext`] methods.
#[derive(Debug, Error, Diagnostic)]
pub enum StageContextError {
    #[error("failed to emit event: event bus unavailable")]
    #[diagnostic(
        code(reviewops::stage::event_bus_unavailable),
        help("The event bus listener may have shut down; check engine lifecycle.")
    )]
    EventBusUnavailable,
}

/// Errors a stage can fail with.
#[derive(Debug, Error, Diagnostic)]
pub enum StageError {
    /// Timeout or transport failure from an external capability. Retryable.
    #[error("transient {capability} failure: {message}")]
    #[diagnostic(
        code(reviewops::stage::transient),
        help("Retried automatically up to the configured ceiling.")
    )]
    Transient {
        capability: &'static str,
        message: String,
    },

    /// A generation reply failed to parse into the expected structure.
    /// Not retried; the controller degrades immediately.
    #[error("malformed capability output: {what}")]
    #[diagnostic(code(reviewops::stage::malformed_output))]
    MalformedOutput { what: String },

    /// Expected input data is missing from the snapshot.
    #[error("missing expected input: {what}")]
    #[diagnostic(
        code(reviewops::stage::missing_input),
        help("Check that the previous stage produced the required data.")
    )]
    MissingInput { what: &'static str },
}

impl StageError {
    /// Whether the controller should re-invoke the stage.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, StageError::Transient { .. })
    }
}
