//! High-risk selection over the current batch.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::capabilities::{GenerationCapability, GenerationOptions, with_deadline};
use crate::feedback::FeedbackItem;
use crate::runtime::EngineConfig;
use crate::stage::{Stage, StageContext, StageError, StagePartial};
use crate::state::StateSnapshot;
use crate::types::StageKind;
use crate::utils::json_ext;

/// Keyword fallback list for degraded-mode flagging.
const RISK_KEYWORDS: &[&str] = &[
    "fail",
    "broken",
    "defect",
    "unsafe",
    "danger",
    "crash",
    "quality",
    "obstacle",
    "shake",
    "jitter",
    "unstable",
    "overstated",
    "misled",
    "not working",
];

#[derive(Debug, Deserialize)]
struct ClassifierReply {
    high_risk_ids: Vec<String>,
}

/// Selects the high-risk subset of the current batch.
///
/// Rating-threshold filtering always applies and preserves batch order. When
/// a classifier capability is configured it may additionally flag items; any
/// classifier failure (transport, timeout, unparseable reply) falls back to
/// rating-plus-keyword filtering and records an alert — degraded mode is the
/// required behavior here, never an abort.
pub struct FilterHighRisk {
    classifier: Option<Arc<dyn GenerationCapability>>,
    config: Arc<EngineConfig>,
}

impl FilterHighRisk {
    pub fn new(classifier: Option<Arc<dyn GenerationCapability>>, config: Arc<EngineConfig>) -> Self {
        Self { classifier, config }
    }

    fn classifier_prompt(&self, batch: &[FeedbackItem]) -> String {
        let listing: Vec<String> = batch
            .iter()
            .map(|item| format!("id {}: {} (rating: {})", item.id, item.body, item.rating))
            .collect();
        format!(
            "Review the feedback below and flag entries describing faults, safety issues, \
             or quality problems.\n\n{}\n\nReply with JSON only: \
             {{\"high_risk_ids\": [\"<full id>\", ...]}}. Use the full ids verbatim.",
            listing.join("\n")
        )
    }

    fn keyword_flagged(body: &str) -> bool {
        let lowered = body.to_ascii_lowercase();
        RISK_KEYWORDS.iter().any(|kw| lowered.contains(kw))
    }

    /// Rating-only selection, batch order preserved.
    fn by_rating<'a>(&self, batch: &'a [FeedbackItem]) -> Vec<&'a FeedbackItem> {
        batch
            .iter()
            .filter(|item| item.rating <= self.config.rating_threshold)
            .collect()
    }
}

#[async_trait]
impl Stage for FilterHighRisk {
    async fn run(
        &self,
        snapshot: StateSnapshot,
        ctx: StageContext,
    ) -> Result<StagePartial, StageError> {
        let batch = &snapshot.batch;
        let mut partial = StagePartial::new();

        if batch.is_empty() {
            partial = partial.with_high_risk(Vec::new());
            partial.log(StageKind::Filter, "no new feedback to filter");
            return Ok(partial);
        }

        let mut flagged_ids: Vec<String> = Vec::new();
        if let Some(classifier) = &self.classifier {
            let options = GenerationOptions {
                model: self.config.model.clone(),
                temperature: self.config.temperature,
            };
            let reply = with_deadline(
                self.config.call_timeout,
                "classifier",
                classifier.complete(&self.classifier_prompt(batch), &options),
            )
            .await;

            match reply.map(|raw| json_ext::parse_reply::<ClassifierReply>(&raw)) {
                Ok(Ok(parsed)) => flagged_ids = parsed.high_risk_ids,
                Ok(Err(parse_err)) => {
                    partial.alert(
                        StageKind::Filter,
                        format!("classifier reply unparseable, using rating/keyword fallback: {parse_err}"),
                    );
                    flagged_ids = batch
                        .iter()
                        .filter(|item| Self::keyword_flagged(&item.body))
                        .map(|item| item.id.clone())
                        .collect();
                }
                Err(stage_err) => {
                    partial.alert(
                        StageKind::Filter,
                        format!("classifier unavailable, using rating/keyword fallback: {stage_err}"),
                    );
                    flagged_ids = batch
                        .iter()
                        .filter(|item| Self::keyword_flagged(&item.body))
                        .map(|item| item.id.clone())
                        .collect();
                }
            }
        }

        let high_risk: Vec<FeedbackItem> = batch
            .iter()
            .filter(|item| {
                item.rating <= self.config.rating_threshold || flagged_ids.contains(&item.id)
            })
            .cloned()
            .collect();

        partial.log(
            StageKind::Filter,
            format!(
                "selected {} high-risk item(s) out of {}",
                high_risk.len(),
                batch.len()
            ),
        );
        let _ = ctx.emit("filter", format!("{} high-risk item(s)", high_risk.len()));
        Ok(partial.with_high_risk(high_risk))
    }

    /// Exhaustion fallback: rating-threshold-only selection.
    fn fallback(&self, snapshot: &StateSnapshot) -> Option<StagePartial> {
        let high_risk: Vec<FeedbackItem> = self
            .by_rating(&snapshot.batch)
            .into_iter()
            .cloned()
            .collect();
        let mut partial = StagePartial::new().with_high_risk(high_risk);
        partial.alert(
            StageKind::Filter,
            "filter degraded to rating-threshold-only selection",
        );
        Some(partial)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::GenerationError;
    use crate::state::ReviewState;

    fn batch_with_ratings(ratings: &[u8]) -> Vec<FeedbackItem> {
        ratings
            .iter()
            .enumerate()
            .map(|(i, &rating)| FeedbackItem::new(&format!("item-{i}"), "feedback body", rating))
            .collect()
    }

    #[tokio::test]
    async fn rating_threshold_selection_preserves_order() {
        let stage = FilterHighRisk::new(None, Arc::new(EngineConfig::default()));
        let state = ReviewState::builder()
            .with_batch(batch_with_ratings(&[1, 2, 5, 4, 1]))
            .build();

        let partial = stage
            .run(state.snapshot(), StageContext::detached(StageKind::Filter))
            .await
            .expect("run");
        let selected: Vec<String> = partial
            .high_risk
            .expect("high_risk set")
            .into_iter()
            .map(|i| i.id)
            .collect();
        assert_eq!(selected, vec!["item-0", "item-1", "item-4"]);
    }

    #[tokio::test]
    async fn empty_batch_clears_subset() {
        let stage = FilterHighRisk::new(None, Arc::new(EngineConfig::default()));
        let state = ReviewState::builder()
            .with_high_risk(batch_with_ratings(&[1]))
            .build();

        let partial = stage
            .run(state.snapshot(), StageContext::detached(StageKind::Filter))
            .await
            .expect("run");
        // Present-but-empty: the stale subset must be replaced, not kept.
        assert_eq!(partial.high_risk, Some(vec![]));
    }

    struct FailingClassifier;

    #[async_trait]
    impl GenerationCapability for FailingClassifier {
        async fn complete(
            &self,
            _prompt: &str,
            _options: &GenerationOptions,
        ) -> Result<String, GenerationError> {
            Err(GenerationError::Transport("connection refused".into()))
        }
    }

    #[tokio::test]
    async fn classifier_failure_degrades_to_rating_filter() {
        let stage = FilterHighRisk::new(
            Some(Arc::new(FailingClassifier)),
            Arc::new(EngineConfig::default()),
        );
        let state = ReviewState::builder()
            .with_batch(batch_with_ratings(&[1, 5]))
            .build();

        let partial = stage
            .run(state.snapshot(), StageContext::detached(StageKind::Filter))
            .await
            .expect("degraded, not failed");
        assert_eq!(partial.high_risk.as_ref().map(Vec::len), Some(1));
        assert!(partial.has_alerts());
    }

    struct CannedClassifier(String);

    #[async_trait]
    impl GenerationCapability for CannedClassifier {
        async fn complete(
            &self,
            _prompt: &str,
            _options: &GenerationOptions,
        ) -> Result<String, GenerationError> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn classifier_can_flag_items_above_threshold() {
        let stage = FilterHighRisk::new(
            Some(Arc::new(CannedClassifier(
                "{\"high_risk_ids\": [\"item-1\"]}".into(),
            ))),
            Arc::new(EngineConfig::default()),
        );
        // item-1 is rated 4 (above threshold) but semantically flagged.
        let state = ReviewState::builder()
            .with_batch(batch_with_ratings(&[5, 4]))
            .build();

        let partial = stage
            .run(state.snapshot(), StageContext::detached(StageKind::Filter))
            .await
            .expect("run");
        let selected: Vec<String> = partial
            .high_risk
            .expect("high_risk")
            .into_iter()
            .map(|i| i.id)
            .collect();
        assert_eq!(selected, vec!["item-1"]);
    }
}
