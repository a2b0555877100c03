//! The engine facade: what the presentation layer talks to.
//!
//! [`ReviewOpsEngine`] owns the compiled pipeline, the authoritative state
//! store, the checkpointer, and the event bus, and exposes the read-only
//! views plus the "trigger new run" entry point.
//!
//! # Concurrency contract
//!
//! At most one run executes at a time: [`trigger_run`](ReviewOpsEngine::trigger_run)
//! takes the run gate with `try_lock` and reports [`EngineError::RunInProgress`]
//! when a run is already in flight. The controller works on an owned copy of
//! the state, which is swapped into the authoritative store only after
//! commit — readers never observe a partial, uncommitted stage result, and
//! cancelling an in-flight run leaves the store at its last committed view.

use std::sync::{Arc, RwLock};

use miette::Diagnostic;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::event_bus::{Event, EventBus, EventSink};
use crate::feedback::RunRecord;
use crate::pipeline::{Pipeline, PipelineError};
use crate::runtime::{
    Checkpointer, ControllerError, EngineConfig, InMemoryCheckpointer, RunController,
};
use crate::state::{ReviewState, StateSnapshot};
use crate::utils::ids;

/// Errors surfaced by the engine facade.
#[derive(Debug, Error, Diagnostic)]
pub enum EngineError {
    #[error("a run is already in progress")]
    #[diagnostic(
        code(reviewops::engine::run_in_progress),
        help("Runs are serialized; wait for the active run to commit.")
    )]
    RunInProgress,

    #[error(transparent)]
    #[diagnostic(transparent)]
    Controller(#[from] ControllerError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Pipeline(#[from] PipelineError),
}

/// Presentation-layer handle over one state store and pipeline.
pub struct ReviewOpsEngine {
    controller: RunController,
    state: RwLock<ReviewState>,
    run_gate: Mutex<()>,
    checkpointer: Arc<dyn Checkpointer>,
    event_bus: EventBus,
}

impl ReviewOpsEngine {
    /// Start configuring an engine around a compiled pipeline.
    pub fn builder(pipeline: Pipeline, config: Arc<EngineConfig>) -> EngineBuilder {
        EngineBuilder {
            pipeline,
            config,
            checkpointer: None,
            event_bus: None,
            initial_state: None,
        }
    }

    /// Trigger one full pipeline execution and return its committed record.
    ///
    /// Execution is synchronous relative to the caller; progress streams on
    /// the event bus in the meantime.
    pub async fn trigger_run(&self) -> Result<RunRecord, EngineError> {
        let _gate = self.run_gate.try_lock().map_err(|_| EngineError::RunInProgress)?;

        let run_id = ids::new_run_id();
        let working = self.state.read().expect("state lock poisoned").clone();
        let outcome = self.controller.run(&run_id, working).await?;

        *self.state.write().expect("state lock poisoned") = outcome.state;
        Ok(outcome.record)
    }

    /// Resume a checkpointed run from its last stage boundary.
    pub async fn resume_run(&self, run_id: &str) -> Result<RunRecord, EngineError> {
        let _gate = self.run_gate.try_lock().map_err(|_| EngineError::RunInProgress)?;

        let outcome = self.controller.resume(run_id).await?;
        *self.state.write().expect("state lock poisoned") = outcome.state;
        Ok(outcome.record)
    }

    /// Resume a checkpointed run from a specific retained boundary.
    pub async fn resume_run_at(&self, run_id: &str, seq: u64) -> Result<RunRecord, EngineError> {
        let _gate = self.run_gate.try_lock().map_err(|_| EngineError::RunInProgress)?;

        let outcome = self.controller.resume_at(run_id, seq).await?;
        *self.state.write().expect("state lock poisoned") = outcome.state;
        Ok(outcome.record)
    }

    /// Read-only snapshot of the current committed state.
    pub fn snapshot(&self) -> StateSnapshot {
        self.state.read().expect("state lock poisoned").snapshot()
    }

    /// The incident history, oldest run first.
    pub fn history(&self) -> Vec<RunRecord> {
        self.snapshot().history
    }

    /// Replace the authoritative state with the most recent committed
    /// checkpoint across all runs, if any. Returns the run id restored from.
    pub async fn load_latest_committed(&self) -> Result<Option<String>, EngineError> {
        let _gate = self.run_gate.try_lock().map_err(|_| EngineError::RunInProgress)?;

        let mut newest: Option<(String, crate::runtime::Checkpoint)> = None;
        for run_id in self
            .checkpointer
            .list_runs()
            .await
            .map_err(ControllerError::Checkpointer)?
        {
            // Only End-tagged checkpoints are committed views; a mid-run
            // snapshot must never become the authoritative state.
            if let Some(cp) = self
                .checkpointer
                .load_latest(&run_id)
                .await
                .map_err(ControllerError::Checkpointer)?
                && cp.stage.is_end()
                && newest
                    .as_ref()
                    .is_none_or(|(_, best)| cp.created_at > best.created_at)
            {
                newest = Some((run_id, cp));
            }
        }

        Ok(newest.map(|(run_id, cp)| {
            *self.state.write().expect("state lock poisoned") = cp.state;
            run_id
        }))
    }

    /// Attach an additional event sink (e.g. a per-client stream).
    pub fn add_sink<T: EventSink + 'static>(&self, sink: T) {
        self.event_bus.add_sink(sink);
    }

    /// Sender half of the event bus, for components that emit diagnostics.
    pub fn event_sender(&self) -> flume::Sender<Event> {
        self.event_bus.sender()
    }
}

/// Builder wiring an engine's collaborators.
pub struct EngineBuilder {
    pipeline: Pipeline,
    config: Arc<EngineConfig>,
    checkpointer: Option<Arc<dyn Checkpointer>>,
    event_bus: Option<EventBus>,
    initial_state: Option<ReviewState>,
}

impl EngineBuilder {
    /// Use a specific checkpoint store; defaults to [`InMemoryCheckpointer`].
    #[must_use]
    pub fn with_checkpointer(mut self, checkpointer: Arc<dyn Checkpointer>) -> Self {
        self.checkpointer = Some(checkpointer);
        self
    }

    /// Use a preconfigured event bus; defaults to a stdout-only bus.
    #[must_use]
    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// Seed the authoritative state (e.g. restored from persistence).
    #[must_use]
    pub fn with_initial_state(mut self, state: ReviewState) -> Self {
        self.initial_state = Some(state);
        self
    }

    pub fn build(self) -> ReviewOpsEngine {
        let checkpointer = self
            .checkpointer
            .unwrap_or_else(|| Arc::new(InMemoryCheckpointer::new()));
        let event_bus = self.event_bus.unwrap_or_default();
        event_bus.listen_for_events();

        let controller = RunController::new(
            Arc::new(self.pipeline),
            self.config,
            checkpointer.clone(),
            event_bus.sender(),
        );

        ReviewOpsEngine {
            controller,
            state: RwLock::new(self.initial_state.unwrap_or_default()),
            run_gate: Mutex::new(()),
            checkpointer,
            event_bus,
        }
    }
}
