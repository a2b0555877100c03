//! Core identifier types for the ReviewOps pipeline.
//!
//! This module defines the fundamental types used throughout the engine for
//! identifying pipeline stages and state channels. These are the core domain
//! concepts that define what a triage run *is*.
//!
//! # Key Types
//!
//! - [`StageKind`]: Identifies a stage in the triage pipeline graph
//! - [`ChannelType`]: Identifies a state channel for reducer dispatch
//!
//! # Examples
//!
//! ```rust
//! use reviewops::types::{ChannelType, StageKind};
//!
//! let stage = StageKind::Filter;
//! assert_eq!(stage.encode(), "Filter");
//! assert_eq!(StageKind::decode("Filter"), Some(StageKind::Filter));
//!
//! let channel = ChannelType::HighRisk;
//! println!("updated channel: {channel}");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies a stage within the triage pipeline graph.
///
/// `Start` and `End` are virtual endpoints: they are never executed and exist
/// only to anchor the graph topology. The four concrete stages form the fixed
/// processing order of a run.
///
/// # Persistence
///
/// `StageKind` supports serialization for checkpointing through both serde and
/// the [`encode`](Self::encode)/[`decode`](Self::decode) string forms.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StageKind {
    /// Virtual entry point; has no implementation and no incoming edges.
    Start,
    /// Virtual terminal; has no implementation and no outgoing edges.
    End,
    /// Pulls a fresh batch of feedback items not yet processed.
    Generate,
    /// Selects the high-risk subset of the current batch.
    Filter,
    /// Attributes each high-risk item to a root cause using retrieved evidence.
    Attribute,
    /// Maps each attribution to a prioritized action item.
    Act,
}

impl StageKind {
    /// Encode a `StageKind` into its persisted string form.
    #[must_use]
    pub fn encode(&self) -> &'static str {
        match self {
            StageKind::Start => "Start",
            StageKind::End => "End",
            StageKind::Generate => "Generate",
            StageKind::Filter => "Filter",
            StageKind::Attribute => "Attribute",
            StageKind::Act => "Act",
        }
    }

    /// Decode a persisted string form back into a `StageKind`.
    ///
    /// Returns `None` for unrecognized input; persistence layers surface that
    /// as a schema error rather than guessing.
    pub fn decode(s: &str) -> Option<Self> {
        match s {
            "Start" => Some(StageKind::Start),
            "End" => Some(StageKind::End),
            "Generate" => Some(StageKind::Generate),
            "Filter" => Some(StageKind::Filter),
            "Attribute" => Some(StageKind::Attribute),
            "Act" => Some(StageKind::Act),
            _ => None,
        }
    }

    /// Returns `true` if this is the virtual [`Start`](Self::Start) endpoint.
    #[must_use]
    pub fn is_start(&self) -> bool {
        matches!(self, Self::Start)
    }

    /// Returns `true` if this is the virtual [`End`](Self::End) endpoint.
    #[must_use]
    pub fn is_end(&self) -> bool {
        matches!(self, Self::End)
    }

    /// Whether a run can produce a usable result without this stage.
    ///
    /// A critical stage that exhausts its retry ceiling with no fallback marks
    /// the run `Failed`; a non-critical stage degrades instead.
    #[must_use]
    pub fn is_critical(&self) -> bool {
        matches!(self, Self::Generate | Self::Filter)
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.encode())
    }
}

/// Identifies a state channel for reducer dispatch.
///
/// Each channel of [`ReviewState`](crate::state::ReviewState) has its own
/// merge semantics, implemented by the reducers registered for its
/// `ChannelType` in the [`ReducerRegistry`](crate::reducers::ReducerRegistry).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelType {
    /// Accumulated feedback items across all runs (id-deduplicating union).
    Feedback,
    /// The current run's new batch (replace).
    Batch,
    /// The current run's high-risk subset (replace).
    HighRisk,
    /// The current run's attribution results (replace).
    Attributions,
    /// The current run's action items (replace).
    Actions,
    /// Identifiers that completed a full run (set union; controller-only).
    Processed,
    /// Append-only run records (controller-only).
    History,
    /// Append-only run log lines.
    Logs,
    /// Append-only degradation markers.
    Alerts,
}

impl ChannelType {
    /// All channels, in the deterministic order used by the barrier when
    /// reporting updates and bumping versions.
    pub const ALL: [ChannelType; 9] = [
        ChannelType::Feedback,
        ChannelType::Batch,
        ChannelType::HighRisk,
        ChannelType::Attributions,
        ChannelType::Actions,
        ChannelType::Processed,
        ChannelType::History,
        ChannelType::Logs,
        ChannelType::Alerts,
    ];
}

impl fmt::Display for ChannelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Feedback => "feedback",
            Self::Batch => "batch",
            Self::HighRisk => "high_risk",
            Self::Attributions => "attributions",
            Self::Actions => "actions",
            Self::Processed => "processed",
            Self::History => "history",
            Self::Logs => "logs",
            Self::Alerts => "alerts",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_kind_encode_decode_roundtrip() {
        for kind in [
            StageKind::Start,
            StageKind::End,
            StageKind::Generate,
            StageKind::Filter,
            StageKind::Attribute,
            StageKind::Act,
        ] {
            assert_eq!(StageKind::decode(kind.encode()), Some(kind));
        }
        assert_eq!(StageKind::decode("Unknown"), None);
    }

    #[test]
    fn criticality_split() {
        assert!(StageKind::Generate.is_critical());
        assert!(StageKind::Filter.is_critical());
        assert!(!StageKind::Attribute.is_critical());
        assert!(!StageKind::Act.is_critical());
    }
}
