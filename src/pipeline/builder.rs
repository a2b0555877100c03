//! Fluent construction of pipeline graphs.

use rustc_hash::FxHashMap;
use std::sync::Arc;

use super::edges::{ConditionalEdge, EdgePredicate};
use super::{Pipeline, PipelineError};
use crate::stage::Stage;
use crate::types::StageKind;

/// Builder for pipeline graphs.
///
/// Stages and edges are assembled with the fluent API and validated once by
/// [`compile`](Self::compile); the result is an immutable [`Pipeline`] shared
/// by every run. `StageKind::Start` and `StageKind::End` are virtual
/// endpoints: they anchor edges but are never registered as stages.
///
/// # Examples
///
/// ```
/// use reviewops::pipeline::PipelineBuilder;
/// use reviewops::stage::{Stage, StageContext, StageError, StagePartial};
/// use reviewops::state::StateSnapshot;
/// use reviewops::types::StageKind;
/// use async_trait::async_trait;
///
/// struct NoopStage;
///
/// #[async_trait]
/// impl Stage for NoopStage {
///     async fn run(&self, _: StateSnapshot, _: StageContext) -> Result<StagePartial, StageError> {
///         Ok(StagePartial::default())
///     }
/// }
///
/// let pipeline = PipelineBuilder::new()
///     .add_stage(StageKind::Generate, NoopStage)
///     .add_edge(StageKind::Start, StageKind::Generate)
///     .add_edge(StageKind::Generate, StageKind::End)
///     .compile()
///     .expect("valid topology");
/// assert_eq!(pipeline.successors(StageKind::Start), &[StageKind::Generate]);
/// ```
pub struct PipelineBuilder {
    stages: FxHashMap<StageKind, Arc<dyn Stage>>,
    edges: FxHashMap<StageKind, Vec<StageKind>>,
    conditional_edges: Vec<ConditionalEdge>,
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            stages: FxHashMap::default(),
            edges: FxHashMap::default(),
            conditional_edges: Vec::new(),
        }
    }

    /// Registers a stage implementation.
    ///
    /// Registration of the virtual `Start`/`End` endpoints is ignored with a
    /// warning; they exist only for topology.
    #[must_use]
    pub fn add_stage(mut self, id: StageKind, stage: impl Stage + 'static) -> Self {
        match id {
            StageKind::Start | StageKind::End => {
                tracing::warn!(?id, "ignoring registration of virtual stage kind");
            }
            _ => {
                self.stages.insert(id, Arc::new(stage));
            }
        }
        self
    }

    /// Adds an unconditional edge.
    #[must_use]
    pub fn add_edge(mut self, from: StageKind, to: StageKind) -> Self {
        self.edges.entry(from).or_default().push(to);
        self
    }

    /// Adds a conditional edge; the predicate is evaluated against the state
    /// snapshot committed by `from` and returns the next stages.
    #[must_use]
    pub fn add_conditional_edge(mut self, from: StageKind, predicate: EdgePredicate) -> Self {
        self.conditional_edges
            .push(ConditionalEdge::new(from, predicate));
        self
    }

    /// Validates the assembled graph and freezes it into a [`Pipeline`].
    ///
    /// Validation rules:
    /// - `Start` must have at least one outgoing edge;
    /// - every edge endpoint that is not virtual must name a registered stage;
    /// - every registered stage must be reachable from `Start` (conditional
    ///   edges count as reaching all registered stages, since their targets
    ///   are data-dependent);
    /// - at most one conditional edge per source stage.
    pub fn compile(self) -> Result<Pipeline, PipelineError> {
        if self
            .edges
            .get(&StageKind::Start)
            .is_none_or(|targets| targets.is_empty())
        {
            return Err(PipelineError::NoEntryEdge);
        }

        for (from, targets) in &self.edges {
            if !from.is_start() && !self.stages.contains_key(from) {
                return Err(PipelineError::UnknownStage { stage: *from });
            }
            for to in targets {
                if !to.is_end() && !self.stages.contains_key(to) {
                    return Err(PipelineError::UnknownStage { stage: *to });
                }
            }
        }

        let mut conditional_sources: Vec<StageKind> = Vec::new();
        for edge in &self.conditional_edges {
            if !edge.from().is_start() && !self.stages.contains_key(&edge.from()) {
                return Err(PipelineError::UnknownStage { stage: edge.from() });
            }
            if conditional_sources.contains(&edge.from()) {
                return Err(PipelineError::DuplicateConditionalEdge { stage: edge.from() });
            }
            conditional_sources.push(edge.from());
        }

        // Reachability: walk unconditional edges from Start; a conditional
        // edge may route to any registered stage, so treat its source as
        // reaching them all once the source itself is reachable.
        let mut reachable: Vec<StageKind> = vec![StageKind::Start];
        let mut frontier = vec![StageKind::Start];
        while let Some(current) = frontier.pop() {
            let mut targets: Vec<StageKind> = self
                .edges
                .get(&current)
                .map(|t| t.to_vec())
                .unwrap_or_default();
            if conditional_sources.contains(&current) {
                targets.extend(self.stages.keys().copied());
            }
            for target in targets {
                if !reachable.contains(&target) {
                    reachable.push(target);
                    frontier.push(target);
                }
            }
        }
        for stage in self.stages.keys() {
            if !reachable.contains(stage) {
                return Err(PipelineError::UnreachableStage { stage: *stage });
            }
        }

        Ok(Pipeline {
            stages: self.stages,
            edges: self.edges,
            conditional_edges: self.conditional_edges,
        })
    }
}
