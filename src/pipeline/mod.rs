//! Pipeline graph definition and compilation.
//!
//! A pipeline is an explicit directed graph of [`StageKind`] identifiers with
//! typed edges: unconditional, or conditional through a router predicate. It
//! is assembled once at startup by [`PipelineBuilder`], validated by
//! [`PipelineBuilder::compile`], and shared immutably by every run — there is
//! no runtime-mutable graph state.
//!
//! [`reviewops_pipeline`] wires the standard triage topology:
//!
//! ```text
//! Start → Generate → Filter ──(router)──→ Attribute → Act → End
//!                           └────────────────────────────→ End
//! ```

mod builder;
mod edges;

pub use builder::PipelineBuilder;
pub use edges::{ConditionalEdge, EdgePredicate, continue_when_high_risk};

use miette::Diagnostic;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use thiserror::Error;

use crate::capabilities::{
    FeedbackFeed, GenerationCapability, RetrievalCapability, TicketSink,
};
use crate::runtime::EngineConfig;
use crate::stage::Stage;
use crate::stages::{AttributeViaRetrieval, FilterHighRisk, GenerateActions, GenerateBatch};
use crate::types::StageKind;

/// An immutable, validated pipeline graph.
pub struct Pipeline {
    pub(crate) stages: FxHashMap<StageKind, Arc<dyn Stage>>,
    pub(crate) edges: FxHashMap<StageKind, Vec<StageKind>>,
    pub(crate) conditional_edges: Vec<ConditionalEdge>,
}

impl Pipeline {
    /// The stage implementation registered under `kind`, if any.
    pub fn stage(&self, kind: StageKind) -> Option<&Arc<dyn Stage>> {
        self.stages.get(&kind)
    }

    /// Unconditional successors of `kind` (empty slice when none).
    pub fn successors(&self, kind: StageKind) -> &[StageKind] {
        self.edges.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The conditional edge out of `kind`, if one was registered.
    pub fn conditional_edge(&self, kind: StageKind) -> Option<&ConditionalEdge> {
        self.conditional_edges
            .iter()
            .find(|edge| edge.from() == kind)
    }
}

/// Pipeline construction errors.
#[derive(Debug, Error, Diagnostic)]
pub enum PipelineError {
    #[error("no edges out of Start: the pipeline has no entry point")]
    #[diagnostic(
        code(reviewops::pipeline::no_entry),
        help("Add an edge from StageKind::Start to the first stage.")
    )]
    NoEntryEdge,

    #[error("edge references unregistered stage: {stage}")]
    #[diagnostic(code(reviewops::pipeline::unknown_stage))]
    UnknownStage { stage: StageKind },

    #[error("stage is unreachable from Start: {stage}")]
    #[diagnostic(code(reviewops::pipeline::unreachable_stage))]
    UnreachableStage { stage: StageKind },

    #[error("more than one conditional edge out of {stage}")]
    #[diagnostic(code(reviewops::pipeline::duplicate_conditional))]
    DuplicateConditionalEdge { stage: StageKind },
}

/// Assembles the standard ReviewOps triage pipeline from its capabilities.
///
/// `classifier` optionally enriches the filter stage with semantic flagging;
/// rating-threshold filtering always applies.
pub fn reviewops_pipeline(
    config: Arc<EngineConfig>,
    feed: Arc<dyn FeedbackFeed>,
    generation: Arc<dyn GenerationCapability>,
    retrieval: Arc<dyn RetrievalCapability>,
    sink: Arc<dyn TicketSink>,
    classifier: Option<Arc<dyn GenerationCapability>>,
) -> Result<Pipeline, PipelineError> {
    PipelineBuilder::new()
        .add_stage(StageKind::Generate, GenerateBatch::new(feed, config.clone()))
        .add_stage(
            StageKind::Filter,
            FilterHighRisk::new(classifier, config.clone()),
        )
        .add_stage(
            StageKind::Attribute,
            AttributeViaRetrieval::new(retrieval, generation.clone(), config.clone()),
        )
        .add_stage(StageKind::Act, GenerateActions::new(generation, sink, config))
        .add_edge(StageKind::Start, StageKind::Generate)
        .add_edge(StageKind::Generate, StageKind::Filter)
        .add_conditional_edge(StageKind::Filter, continue_when_high_risk())
        .add_edge(StageKind::Attribute, StageKind::Act)
        .add_edge(StageKind::Act, StageKind::End)
        .compile()
}
