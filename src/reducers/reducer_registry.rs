use rustc_hash::FxHashMap;
use std::sync::Arc;

use crate::{
    reducers::{
        AppendAlerts, AppendHistory, AppendLogs, MergeFeedback, Reducer, ReducerError,
        ReplaceActions, ReplaceAttributions, ReplaceBatch, ReplaceHighRisk, UnionProcessed,
    },
    stage::StagePartial,
    state::ReviewState,
    types::ChannelType,
};
use tracing::instrument;

/// Dispatches partial updates to the reducers registered per channel.
///
/// The default registry wires every channel of the state store. Multiple
/// reducers may be registered for one channel and are applied in registration
/// order.
#[derive(Clone)]
pub struct ReducerRegistry {
    reducer_map: FxHashMap<ChannelType, Vec<Arc<dyn Reducer>>>,
}

/// Whether a partial carries meaningful data for a channel.
///
/// `None` never applies. For replace channels `Some` always applies — an
/// empty vector is a deliberate clear. For append/merge channels an empty
/// vector is indistinguishable from no data and is skipped, so no-op updates
/// do not bump versions.
fn channel_guard(channel: &ChannelType, partial: &StagePartial) -> bool {
    fn present_nonempty<T>(field: &Option<Vec<T>>) -> bool {
        field.as_ref().is_some_and(|v| !v.is_empty())
    }
    match channel {
        ChannelType::Feedback => present_nonempty(&partial.feedback),
        ChannelType::Batch => partial.batch.is_some(),
        ChannelType::HighRisk => partial.high_risk.is_some(),
        ChannelType::Attributions => partial.attributions.is_some(),
        ChannelType::Actions => partial.actions.is_some(),
        ChannelType::Processed => present_nonempty(&partial.processed),
        ChannelType::History => present_nonempty(&partial.history),
        ChannelType::Logs => present_nonempty(&partial.logs),
        ChannelType::Alerts => present_nonempty(&partial.alerts),
    }
}

impl Default for ReducerRegistry {
    fn default() -> Self {
        let mut registry = Self::new();
        registry
            .register(ChannelType::Feedback, Arc::new(MergeFeedback))
            .register(ChannelType::Batch, Arc::new(ReplaceBatch))
            .register(ChannelType::HighRisk, Arc::new(ReplaceHighRisk))
            .register(ChannelType::Attributions, Arc::new(ReplaceAttributions))
            .register(ChannelType::Actions, Arc::new(ReplaceActions))
            .register(ChannelType::Processed, Arc::new(UnionProcessed))
            .register(ChannelType::History, Arc::new(AppendHistory))
            .register(ChannelType::Logs, Arc::new(AppendLogs))
            .register(ChannelType::Alerts, Arc::new(AppendAlerts));
        registry
    }
}

impl ReducerRegistry {
    /// Creates a new empty registry.
    pub fn new() -> Self {
        Self {
            reducer_map: FxHashMap::default(),
        }
    }

    /// Registers a reducer for a channel; chainable.
    pub fn register(&mut self, channel: ChannelType, reducer: Arc<dyn Reducer>) -> &mut Self {
        self.reducer_map.entry(channel).or_default().push(reducer);
        self
    }

    /// Builder-style registration.
    #[must_use]
    pub fn with_reducer(mut self, channel: ChannelType, reducer: Arc<dyn Reducer>) -> Self {
        self.register(channel, reducer);
        self
    }

    /// Apply one channel of the partial, skipping when the guard says the
    /// partial has nothing for it. Returns whether the channel was updated.
    #[instrument(skip(self, state, update), err)]
    pub fn try_update(
        &self,
        channel: ChannelType,
        state: &mut ReviewState,
        update: &StagePartial,
    ) -> Result<bool, ReducerError> {
        if !channel_guard(&channel, update) {
            return Ok(false);
        }

        let Some(reducers) = self.reducer_map.get(&channel) else {
            return Err(ReducerError::UnknownChannel(channel));
        };
        for reducer in reducers {
            reducer.apply(state, update);
        }
        Ok(true)
    }

    /// Apply a full partial across every registered channel, in the
    /// deterministic order of [`ChannelType::ALL`].
    ///
    /// Returns the channels that were updated so the barrier can bump their
    /// versions.
    #[instrument(skip(self, state, update), err)]
    pub fn apply_partial(
        &self,
        state: &mut ReviewState,
        update: &StagePartial,
    ) -> Result<Vec<ChannelType>, ReducerError> {
        let mut updated = Vec::new();
        for channel in ChannelType::ALL {
            if !self.reducer_map.contains_key(&channel) {
                continue;
            }
            if self.try_update(channel, state, update)? {
                updated.push(channel);
            }
        }
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::Channel;
    use crate::feedback::FeedbackItem;

    #[test]
    fn apply_partial_reports_updated_channels_in_order() {
        let registry = ReducerRegistry::default();
        let mut state = ReviewState::default();

        let mut partial = StagePartial::new()
            .with_feedback(vec![FeedbackItem::new("a", "body", 1)])
            .with_batch(vec![FeedbackItem::new("a", "body", 1)]);
        partial.log(crate::types::StageKind::Generate, "pulled 1 item");

        let updated = registry
            .apply_partial(&mut state, &partial)
            .expect("apply");
        assert_eq!(
            updated,
            vec![ChannelType::Feedback, ChannelType::Batch, ChannelType::Logs]
        );
        assert_eq!(state.feedback.snapshot().len(), 1);
    }

    #[test]
    fn empty_partial_updates_nothing() {
        let registry = ReducerRegistry::default();
        let mut state = ReviewState::default();
        let before = state.snapshot();

        let updated = registry
            .apply_partial(&mut state, &StagePartial::new())
            .expect("apply");
        assert!(updated.is_empty());

        let after = state.snapshot();
        assert_eq!(before.feedback, after.feedback);
        assert_eq!(before.logs, after.logs);
        assert_eq!(before.processed, after.processed);
    }

    #[test]
    fn unregistered_channel_is_an_error_when_data_present() {
        let registry = ReducerRegistry::new();
        let mut state = ReviewState::default();
        let partial = StagePartial::new().with_batch(vec![]);

        // Registry is empty: apply_partial skips channels with no reducers,
        // but a direct try_update on one must report the gap.
        let result = registry.try_update(ChannelType::Batch, &mut state, &partial);
        assert!(matches!(result, Err(ReducerError::UnknownChannel(_))));
    }
}
