//! Edge types and routing predicates for conditional pipeline flow.

use crate::state::StateSnapshot;
use crate::types::StageKind;
use std::sync::Arc;

/// Predicate for conditional edge routing.
///
/// Takes the committed [`StateSnapshot`] after the source stage and returns
/// the stages to execute next. This is the pipeline's only branching point.
///
/// # Examples
///
/// ```
/// use reviewops::pipeline::EdgePredicate;
/// use reviewops::types::StageKind;
/// use std::sync::Arc;
///
/// let route: EdgePredicate = Arc::new(|snapshot| {
///     if snapshot.high_risk.is_empty() {
///         vec![StageKind::End]
///     } else {
///         vec![StageKind::Attribute]
///     }
/// });
/// ```
pub type EdgePredicate = Arc<dyn Fn(&StateSnapshot) -> Vec<StageKind> + Send + Sync + 'static>;

/// A conditional edge that routes based on a predicate function.
#[derive(Clone)]
pub struct ConditionalEdge {
    from: StageKind,
    predicate: EdgePredicate,
}

impl ConditionalEdge {
    pub fn new(from: StageKind, predicate: EdgePredicate) -> Self {
        Self { from, predicate }
    }

    /// Source stage of this edge.
    pub fn from(&self) -> StageKind {
        self.from
    }

    /// Routing predicate.
    pub fn predicate(&self) -> &EdgePredicate {
        &self.predicate
    }
}

/// The ReviewOps router: continue to attribution only when the filter stage
/// left a non-empty high-risk subset; otherwise stop the run early.
///
/// Evaluated exactly once per run, after the filter stage commits.
pub fn continue_when_high_risk() -> EdgePredicate {
    Arc::new(|snapshot: &StateSnapshot| {
        if snapshot.high_risk.is_empty() {
            vec![StageKind::End]
        } else {
            vec![StageKind::Attribute]
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feedback::FeedbackItem;
    use crate::state::ReviewState;

    #[test]
    fn router_stops_on_empty_subset() {
        let state = ReviewState::default();
        let route = continue_when_high_risk();
        assert_eq!(route(&state.snapshot()), vec![StageKind::End]);
    }

    #[test]
    fn router_continues_on_nonempty_subset() {
        let state = ReviewState::builder()
            .with_high_risk(vec![FeedbackItem::new("1", "bad", 1)])
            .build();
        let route = continue_when_high_risk();
        assert_eq!(route(&state.snapshot()), vec![StageKind::Attribute]);
    }
}
