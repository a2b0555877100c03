//! The run controller: drives one pipeline execution end-to-end.
//!
//! # State machine
//!
//! ```text
//! Start → Generate → Filter → { Attribute → Act → Commit | Stop → Commit }
//! ```
//!
//! For each stage the controller snapshots state, invokes the stage, merges
//! the returned partial through the reducer registry (bumping the versions of
//! updated channels), writes a checkpoint tagged `(run, stage, seq)`, and
//! follows the graph's edges — the router's conditional edge after Filter is
//! the only branch.
//!
//! # Failure policy
//!
//! - Transient stage errors increment the run's retry ledger and re-invoke
//!   the stage with the same input state, up to the configured ceiling with a
//!   fixed short delay.
//! - At the ceiling (or immediately for malformed-output errors) the stage's
//!   fallback is applied when one exists, marking the run degraded; a
//!   critical stage without a usable fallback marks the run failed and
//!   control jumps to commit.
//! - Stage-local errors never propagate past the controller. Only
//!   configuration errors (checked before any stage runs) and checkpoint
//!   persistence failures reach the caller.
//!
//! # Commit — the idempotency boundary
//!
//! Commit appends the [`RunRecord`] to the incident history and unions the
//! batch's identifiers into the processed set, both through a synthetic
//! partial applied by the same reducer machinery stages use. A run that dies
//! before commit leaves the processed set untouched, so a re-run reprocesses
//! the same batch (accepted duplication) instead of silently skipping it.
//! A failed run's record is committed for audit, but its items are *not*
//! marked processed — claiming them would silently skip their attribution
//! forever.

use std::sync::Arc;

use chrono::Utc;
use miette::Diagnostic;
use thiserror::Error;
use tracing::instrument;

use crate::channels::Channel;
use crate::event_bus::Event;
use crate::feedback::{Alert, LogEntry, RunRecord, RunStatus};
use crate::pipeline::Pipeline;
use crate::reducers::ReducerRegistry;
use crate::runtime::checkpointer::{Checkpoint, Checkpointer, CheckpointerError};
use crate::runtime::config::{ConfigurationError, EngineConfig};
use crate::runtime::retry::{RetryLedger, RetryPolicy};
use crate::stage::{StageContext, StagePartial};
use crate::state::ReviewState;
use crate::types::StageKind;

/// Result of a completed run: the committed record plus the state to swap
/// into the authoritative store.
#[derive(Clone, Debug)]
pub struct RunOutcome {
    pub record: RunRecord,
    pub state: ReviewState,
}

/// Errors that can escape the controller.
#[derive(Debug, Error, Diagnostic)]
pub enum ControllerError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    #[diagnostic(code(reviewops::controller::checkpointer))]
    Checkpointer(#[from] CheckpointerError),

    #[error("pipeline has no implementation for stage {stage}")]
    #[diagnostic(
        code(reviewops::controller::unknown_stage),
        help("The compiled pipeline and the controller disagree; rebuild the pipeline.")
    )]
    UnknownStage { stage: StageKind },

    #[error("no checkpoint found for run {run_id}")]
    #[diagnostic(code(reviewops::controller::unknown_run))]
    UnknownRun { run_id: String },

    #[error("no checkpoint {seq} for run {run_id}")]
    #[diagnostic(code(reviewops::controller::missing_checkpoint))]
    MissingCheckpoint { run_id: String, seq: u64 },
}

/// Drives pipeline executions against a checkpointer and event bus.
///
/// The controller owns no state between runs; each call works on an owned
/// copy of the state store and returns the committed result. Cancelling the
/// returned future mid-run therefore leaves the caller's authoritative state
/// at its last committed view.
pub struct RunController {
    pipeline: Arc<Pipeline>,
    config: Arc<EngineConfig>,
    registry: ReducerRegistry,
    checkpointer: Arc<dyn Checkpointer>,
    event_sender: flume::Sender<Event>,
}

impl RunController {
    pub fn new(
        pipeline: Arc<Pipeline>,
        config: Arc<EngineConfig>,
        checkpointer: Arc<dyn Checkpointer>,
        event_sender: flume::Sender<Event>,
    ) -> Self {
        Self {
            pipeline,
            config,
            registry: ReducerRegistry::default(),
            checkpointer,
            event_sender,
        }
    }

    fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.config.max_attempts, self.config.retry_delay)
    }

    /// Execute a fresh run over `state`.
    #[instrument(skip(self, state), err)]
    pub async fn run(
        &self,
        run_id: &str,
        state: ReviewState,
    ) -> Result<RunOutcome, ControllerError> {
        self.config.validate()?;
        let ledger = RetryLedger::new();
        let mut working = state;

        let mut seq = 0u64;
        self.checkpointer
            .save(Checkpoint::capture(
                run_id,
                StageKind::Start,
                seq,
                &working,
                &ledger,
            ))
            .await?;

        let frontier = self.pipeline.successors(StageKind::Start).to_vec();
        self.drive(run_id, &mut working, frontier, &mut seq, ledger)
            .await
    }

    /// Resume a run from its most recent checkpoint.
    #[instrument(skip(self), err)]
    pub async fn resume(&self, run_id: &str) -> Result<RunOutcome, ControllerError> {
        let checkpoint = self
            .checkpointer
            .load_latest(run_id)
            .await?
            .ok_or_else(|| ControllerError::UnknownRun {
                run_id: run_id.to_string(),
            })?;
        self.resume_from(checkpoint).await
    }

    /// Resume a run from checkpoint `seq` — replay from any retained stage
    /// boundary, not just the most recent.
    #[instrument(skip(self), err)]
    pub async fn resume_at(
        &self,
        run_id: &str,
        seq: u64,
    ) -> Result<RunOutcome, ControllerError> {
        let checkpoint = self
            .checkpointer
            .load_at(run_id, seq)
            .await?
            .ok_or_else(|| ControllerError::MissingCheckpoint {
                run_id: run_id.to_string(),
                seq,
            })?;
        self.resume_from(checkpoint).await
    }

    async fn resume_from(&self, checkpoint: Checkpoint) -> Result<RunOutcome, ControllerError> {
        self.config.validate()?;

        // A checkpoint tagged End belongs to a run that already committed;
        // replaying it would append a duplicate record, so hand back the
        // committed outcome instead.
        if checkpoint.stage.is_end()
            && let Some(record) = checkpoint.state.history.snapshot().last().cloned()
        {
            return Ok(RunOutcome {
                record,
                state: checkpoint.state,
            });
        }

        let run_id = checkpoint.run_id.clone();
        let ledger = RetryLedger::from_encoded(&checkpoint.retries);
        let mut working = checkpoint.state;
        let mut seq = checkpoint.seq;

        // Earlier stages are not re-invoked: the frontier picks up directly
        // after the checkpointed boundary.
        let frontier = self.next_frontier(checkpoint.stage, &working);
        self.drive(&run_id, &mut working, frontier, &mut seq, ledger)
            .await
    }

    /// Frontier after `stage` commits, resolving the conditional edge if one
    /// is registered.
    fn next_frontier(&self, stage: StageKind, state: &ReviewState) -> Vec<StageKind> {
        if let Some(edge) = self.pipeline.conditional_edge(stage) {
            (edge.predicate())(&state.snapshot())
        } else {
            self.pipeline.successors(stage).to_vec()
        }
    }

    /// Walk the pipeline from `frontier` to End, then commit.
    async fn drive(
        &self,
        run_id: &str,
        working: &mut ReviewState,
        mut frontier: Vec<StageKind>,
        seq: &mut u64,
        mut ledger: RetryLedger,
    ) -> Result<RunOutcome, ControllerError> {
        let started_at = Utc::now();
        let policy = self.policy();
        let mut degraded = false;
        let mut failed_stage: Option<StageKind> = None;

        // Stages execute strictly sequentially; the frontier always holds a
        // single stage (or End) in this topology.
        while let Some(&current) = frontier.first() {
            if current.is_end() {
                break;
            }
            let stage = self
                .pipeline
                .stage(current)
                .ok_or(ControllerError::UnknownStage { stage: current })?;

            let mut stage_done = false;
            while !stage_done {
                let snapshot = working.snapshot();
                let ctx = StageContext::new(run_id, current, self.event_sender.clone());

                match stage.run(snapshot, ctx).await {
                    Ok(partial) => {
                        if partial.has_alerts() {
                            degraded = true;
                        }
                        self.apply(working, &partial);
                        stage_done = true;
                    }
                    Err(err) => {
                        let retries = ledger.record_failure(current);
                        tracing::warn!(
                            stage = %current,
                            retries,
                            error = %err,
                            "stage attempt failed"
                        );
                        let _ = self.event_sender.send(Event::stage_message(
                            run_id,
                            current.encode(),
                            "retry",
                            format!("attempt failed ({err}); {retries} retr(ies) recorded"),
                        ));

                        if err.is_retryable() && ledger.may_retry(current, &policy) {
                            tokio::time::sleep(policy.delay).await;
                            continue;
                        }

                        // Exhausted, or not worth retrying: degrade through
                        // the stage's fallback or fail the run.
                        match stage.fallback(&working.snapshot()) {
                            Some(fallback) => {
                                degraded = true;
                                self.apply(working, &fallback);
                            }
                            None => {
                                failed_stage = Some(current);
                                let mut note = StagePartial::new();
                                note.alerts = Some(vec![Alert::new(
                                    current.encode(),
                                    format!("stage failed with no usable fallback: {err}"),
                                )]);
                                self.apply(working, &note);
                            }
                        }
                        stage_done = true;
                    }
                }
            }

            *seq += 1;
            self.checkpointer
                .save(Checkpoint::capture(run_id, current, *seq, working, &ledger))
                .await?;

            if failed_stage.is_some() {
                break;
            }

            let next = self.next_frontier(current, working);
            let stopped_early = self.pipeline.conditional_edge(current).is_some()
                && next.first().is_some_and(|kind| kind.is_end());
            if stopped_early {
                // The router short-circuited: clear the per-run result
                // channels so the current view reflects this run, not the
                // previous one.
                let mut clear = StagePartial::new();
                clear.attributions = Some(Vec::new());
                clear.actions = Some(Vec::new());
                clear.log(
                    current,
                    "no high-risk feedback; stopping before attribution",
                );
                self.apply(working, &clear);
            }
            frontier = next;
        }

        self.commit(run_id, working, seq, &ledger, started_at, degraded, failed_stage)
            .await
    }

    /// Apply a partial through the registry and bump updated channels.
    fn apply(&self, state: &mut ReviewState, partial: &StagePartial) {
        let updated = self
            .registry
            .apply_partial(state, partial)
            .expect("default registry covers every channel");
        for channel in updated {
            state.bump(channel);
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn commit(
        &self,
        run_id: &str,
        working: &mut ReviewState,
        seq: &mut u64,
        ledger: &RetryLedger,
        started_at: chrono::DateTime<Utc>,
        degraded: bool,
        failed_stage: Option<StageKind>,
    ) -> Result<RunOutcome, ControllerError> {
        let snapshot = working.snapshot();
        let status = match failed_stage {
            Some(stage) if stage.is_critical() => RunStatus::Failed,
            Some(_) => RunStatus::Degraded,
            None if degraded => RunStatus::Degraded,
            None => RunStatus::Success,
        };

        let mut actions = snapshot.actions.clone();
        actions.sort_by(|a, b| b.priority.cmp(&a.priority));

        let record = RunRecord {
            run_id: run_id.to_string(),
            batch: snapshot.batch.clone(),
            high_risk: snapshot.high_risk.clone(),
            attributions: snapshot.attributions.clone(),
            actions,
            started_at,
            finished_at: Utc::now(),
            status,
        };

        let mut commit_partial = StagePartial::new();
        commit_partial.history = Some(vec![record.clone()]);
        if status != RunStatus::Failed {
            commit_partial.processed =
                Some(snapshot.batch.iter().map(|item| item.id.clone()).collect());
        }
        commit_partial.logs = Some(vec![LogEntry::new(
            "controller",
            format!(
                "run {run_id} committed with status {:?} ({} item(s) in batch)",
                status,
                snapshot.batch.len()
            ),
        )]);
        self.apply(working, &commit_partial);

        *seq += 1;
        self.checkpointer
            .save(Checkpoint::capture(
                run_id,
                StageKind::End,
                *seq,
                working,
                ledger,
            ))
            .await?;

        let _ = self.event_sender.send(Event::diagnostic(
            "commit",
            format!("run {run_id} finished: {status:?}"),
        ));

        Ok(RunOutcome {
            record,
            state: working.clone(),
        })
    }
}
