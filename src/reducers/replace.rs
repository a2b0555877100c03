use super::Reducer;
use crate::{channels::Channel, stage::StagePartial, state::ReviewState};

/// Incoming batch fully replaces the existing one.
///
/// A present-but-empty vector is a deliberate clear: the batch channel holds
/// the *current* run's items and must not leak a previous run's batch into
/// the router decision.
#[derive(Debug, PartialEq, Clone, Hash, Eq)]
pub struct ReplaceBatch;

impl Reducer for ReplaceBatch {
    fn apply(&self, state: &mut ReviewState, update: &StagePartial) {
        if let Some(items) = &update.batch {
            *state.batch.get_mut() = items.clone();
        }
    }
}

/// Incoming high-risk subset fully replaces the existing one.
#[derive(Debug, PartialEq, Clone, Hash, Eq)]
pub struct ReplaceHighRisk;

impl Reducer for ReplaceHighRisk {
    fn apply(&self, state: &mut ReviewState, update: &StagePartial) {
        if let Some(items) = &update.high_risk {
            *state.high_risk.get_mut() = items.clone();
        }
    }
}

/// Incoming attribution results fully replace the existing ones.
#[derive(Debug, PartialEq, Clone, Hash, Eq)]
pub struct ReplaceAttributions;

impl Reducer for ReplaceAttributions {
    fn apply(&self, state: &mut ReviewState, update: &StagePartial) {
        if let Some(results) = &update.attributions {
            *state.attributions.get_mut() = results.clone();
        }
    }
}

/// Incoming action items fully replace the existing ones.
#[derive(Debug, PartialEq, Clone, Hash, Eq)]
pub struct ReplaceActions;

impl Reducer for ReplaceActions {
    fn apply(&self, state: &mut ReviewState, update: &StagePartial) {
        if let Some(items) = &update.actions {
            *state.actions.get_mut() = items.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feedback::FeedbackItem;

    #[test]
    fn replace_overwrites_existing_value() {
        let mut state = ReviewState::default();
        state
            .high_risk
            .get_mut()
            .push(FeedbackItem::new("old", "stale", 1));

        let update =
            StagePartial::new().with_high_risk(vec![FeedbackItem::new("new", "fresh", 2)]);
        ReplaceHighRisk.apply(&mut state, &update);

        let ids: Vec<_> = state
            .high_risk
            .snapshot()
            .into_iter()
            .map(|i| i.id)
            .collect();
        assert_eq!(ids, vec!["new"]);
    }

    #[test]
    fn present_empty_value_clears() {
        let mut state = ReviewState::default();
        state
            .high_risk
            .get_mut()
            .push(FeedbackItem::new("old", "stale", 1));

        ReplaceHighRisk.apply(&mut state, &StagePartial::new().with_high_risk(vec![]));
        assert!(state.high_risk.snapshot().is_empty());
    }

    #[test]
    fn absent_value_is_noop() {
        let mut state = ReviewState::default();
        state
            .high_risk
            .get_mut()
            .push(FeedbackItem::new("old", "kept", 1));

        ReplaceHighRisk.apply(&mut state, &StagePartial::new());
        assert_eq!(state.high_risk.snapshot().len(), 1);
    }
}
