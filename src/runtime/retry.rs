//! Retry bookkeeping for pipeline stages.

use rustc_hash::FxHashMap;
use std::time::Duration;

use crate::types::StageKind;

/// Retry ceiling and pacing for stage re-invocation.
///
/// The conservative default is 3 total attempts with a fixed short delay and
/// no backoff; both knobs come from [`EngineConfig`](super::EngineConfig).
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    /// Total attempts per stage, first try included.
    pub max_attempts: u32,
    /// Fixed delay between attempts.
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }
}

/// Per-run map of `(stage) → attempts beyond the first`.
///
/// Counters are never reset within a run; a new run starts a fresh ledger.
/// The controller persists the ledger into every checkpoint so a resumed run
/// keeps its spent budget.
#[derive(Clone, Debug, Default)]
pub struct RetryLedger {
    counts: FxHashMap<StageKind, u32>,
}

impl RetryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from persisted (encoded stage → count) pairs. Unknown stage
    /// names are dropped; they can only come from a newer schema.
    pub fn from_encoded(encoded: &FxHashMap<String, u32>) -> Self {
        let counts = encoded
            .iter()
            .filter_map(|(name, &count)| StageKind::decode(name).map(|kind| (kind, count)))
            .collect();
        Self { counts }
    }

    /// Attempts beyond the first recorded for `stage`.
    #[must_use]
    pub fn retries(&self, stage: StageKind) -> u32 {
        self.counts.get(&stage).copied().unwrap_or(0)
    }

    /// Record one failed attempt; returns the new retry count.
    pub fn record_failure(&mut self, stage: StageKind) -> u32 {
        let entry = self.counts.entry(stage).or_insert(0);
        *entry += 1;
        *entry
    }

    /// Whether another invocation is within budget, given the failures
    /// recorded so far.
    ///
    /// With `max_attempts = n`, the stage may be invoked while fewer than `n`
    /// failures are on record; the controller consults this immediately after
    /// [`record_failure`](Self::record_failure), so the n-th failure is the
    /// one that exhausts the ceiling.
    #[must_use]
    pub fn may_retry(&self, stage: StageKind, policy: &RetryPolicy) -> bool {
        self.retries(stage) < policy.max_attempts
    }

    /// Encoded snapshot for checkpoint persistence.
    #[must_use]
    pub fn encoded(&self) -> FxHashMap<String, u32> {
        self.counts
            .iter()
            .map(|(kind, &count)| (kind.encode().to_string(), count))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ceiling_counts_total_attempts() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1));
        let mut ledger = RetryLedger::new();

        ledger.record_failure(StageKind::Attribute);
        assert!(ledger.may_retry(StageKind::Attribute, &policy));
        ledger.record_failure(StageKind::Attribute);
        assert!(ledger.may_retry(StageKind::Attribute, &policy));
        // Third failure exhausts the three-attempt budget.
        ledger.record_failure(StageKind::Attribute);
        assert!(!ledger.may_retry(StageKind::Attribute, &policy));
    }

    #[test]
    fn counters_are_per_stage() {
        let mut ledger = RetryLedger::new();
        ledger.record_failure(StageKind::Attribute);
        assert_eq!(ledger.retries(StageKind::Attribute), 1);
        assert_eq!(ledger.retries(StageKind::Generate), 0);
    }

    #[test]
    fn encode_roundtrip() {
        let mut ledger = RetryLedger::new();
        ledger.record_failure(StageKind::Filter);
        ledger.record_failure(StageKind::Filter);

        let restored = RetryLedger::from_encoded(&ledger.encoded());
        assert_eq!(restored.retries(StageKind::Filter), 2);
    }

    #[test]
    fn single_attempt_policy_never_retries() {
        let policy = RetryPolicy::new(1, Duration::ZERO);
        let mut ledger = RetryLedger::new();
        ledger.record_failure(StageKind::Generate);
        assert!(!ledger.may_retry(StageKind::Generate, &policy));
    }
}
