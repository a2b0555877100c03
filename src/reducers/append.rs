use super::Reducer;
use crate::{channels::Channel, stage::StagePartial, state::ReviewState};

/// Concatenates incoming log entries onto the existing log, preserving order.
#[derive(Debug, PartialEq, Clone, Hash, Eq)]
pub struct AppendLogs;

impl Reducer for AppendLogs {
    fn apply(&self, state: &mut ReviewState, update: &StagePartial) {
        if let Some(entries) = &update.logs
            && !entries.is_empty()
        {
            state.logs.get_mut().extend(entries.iter().cloned());
        }
    }
}

/// Concatenates incoming alerts onto the existing alert log.
#[derive(Debug, PartialEq, Clone, Hash, Eq)]
pub struct AppendAlerts;

impl Reducer for AppendAlerts {
    fn apply(&self, state: &mut ReviewState, update: &StagePartial) {
        if let Some(alerts) = &update.alerts
            && !alerts.is_empty()
        {
            state.alerts.get_mut().extend(alerts.iter().cloned());
        }
    }
}

/// Appends run records to the incident history; insertion order is run order.
#[derive(Debug, PartialEq, Clone, Hash, Eq)]
pub struct AppendHistory;

impl Reducer for AppendHistory {
    fn apply(&self, state: &mut ReviewState, update: &StagePartial) {
        if let Some(records) = &update.history
            && !records.is_empty()
        {
            state.history.get_mut().extend(records.iter().cloned());
        }
    }
}
