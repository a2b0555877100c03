//! Root-cause attribution over the high-risk subset, grounded in retrieved
//! reference passages.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::capabilities::{
    GenerationCapability, GenerationOptions, RetrievalCapability, ScoredPassage, with_deadline,
};
use crate::feedback::{AttributionResult, Confidence, Evidence, FeedbackItem, RootCause};
use crate::runtime::EngineConfig;
use crate::stage::{Stage, StageContext, StageError, StagePartial};
use crate::state::StateSnapshot;
use crate::types::StageKind;
use crate::utils::json_ext;

#[derive(Debug, Deserialize)]
struct AttributionReply {
    category: String,
    justification: String,
    #[serde(default)]
    confidence: Option<String>,
}

/// Attributes each high-risk item to a root cause.
///
/// Per item: query the retrieval capability for supporting passages, then ask
/// the generation capability for a category and justification grounded in
/// them. The cardinality invariant — exactly one [`AttributionResult`] per
/// high-risk item — holds on every path:
///
/// - empty retrieval → placeholder (`Unclassified`, low confidence) + alert;
/// - malformed generation reply → placeholder carrying the evidence + alert,
///   never retried;
/// - transient capability failure → the whole stage fails retryably; after
///   exhaustion the controller applies [`Stage::fallback`], which emits
///   placeholders for the entire subset.
pub struct AttributeViaRetrieval {
    retrieval: Arc<dyn RetrievalCapability>,
    generation: Arc<dyn GenerationCapability>,
    config: Arc<EngineConfig>,
}

impl AttributeViaRetrieval {
    pub fn new(
        retrieval: Arc<dyn RetrievalCapability>,
        generation: Arc<dyn GenerationCapability>,
        config: Arc<EngineConfig>,
    ) -> Self {
        Self {
            retrieval,
            generation,
            config,
        }
    }

    fn query_for(item: &FeedbackItem) -> String {
        format!(
            "Customer feedback: {}. Determine whether this matches a documented product \
             limitation, a defect needing investigation, or a user misunderstanding.",
            item.body
        )
    }

    fn clip_evidence(&self, hits: Vec<ScoredPassage>) -> Vec<Evidence> {
        hits.into_iter()
            .take(self.config.max_context_items)
            .map(|hit| {
                let mut passage = hit.passage;
                if passage.len() > self.config.max_context_len {
                    // Truncate on a char boundary; passages are prose, not
                    // fixed-width data.
                    let mut cut = self.config.max_context_len;
                    while !passage.is_char_boundary(cut) {
                        cut -= 1;
                    }
                    passage.truncate(cut);
                }
                Evidence {
                    passage,
                    score: hit.score,
                }
            })
            .collect()
    }

    fn prompt_for(&self, item: &FeedbackItem, evidence: &[Evidence]) -> String {
        let context: Vec<String> = evidence
            .iter()
            .map(|e| format!("- {} (score {:.3})", e.passage, e.score))
            .collect();
        format!(
            "You are a product analyst. Using only the reference material, attribute the \
             feedback to a root cause.\n\nReference material:\n{}\n\nFeedback: {}\n\n\
             Reply with JSON only: {{\"category\": \"known_limitation\" | \
             \"needs_investigation\" | \"user_error\" | \"logistics_noise\", \
             \"justification\": \"...\", \"confidence\": \"high\" | \"medium\" | \"low\"}}",
            context.join("\n"),
            item.body
        )
    }

    fn parse_confidence(raw: Option<&str>) -> Confidence {
        match raw.map(str::to_ascii_lowercase).as_deref() {
            Some("high") => Confidence::High,
            Some("medium") => Confidence::Medium,
            _ => Confidence::Low,
        }
    }

    fn placeholders_for(high_risk: &[FeedbackItem], reason: &str) -> Vec<AttributionResult> {
        high_risk
            .iter()
            .map(|item| AttributionResult::placeholder(&item.id, reason))
            .collect()
    }
}

#[async_trait]
impl Stage for AttributeViaRetrieval {
    async fn run(
        &self,
        snapshot: StateSnapshot,
        ctx: StageContext,
    ) -> Result<StagePartial, StageError> {
        let high_risk = &snapshot.high_risk;
        let mut partial = StagePartial::new();
        let mut results: Vec<AttributionResult> = Vec::with_capacity(high_risk.len());
        let mut grounded = 0usize;

        let options = GenerationOptions {
            model: self.config.model.clone(),
            temperature: self.config.temperature,
        };

        for item in high_risk {
            let hits = with_deadline(
                self.config.call_timeout,
                "retrieval",
                self.retrieval
                    .search(&Self::query_for(item), self.config.top_k, self.config.max_distance),
            )
            .await?;

            let evidence = self.clip_evidence(hits);
            if evidence.is_empty() {
                partial.alert(
                    StageKind::Attribute,
                    format!("no reference passages for item {}; left unclassified", item.id),
                );
                results.push(AttributionResult::placeholder(
                    &item.id,
                    "no relevant reference material retrieved",
                ));
                continue;
            }

            let reply = with_deadline(
                self.config.call_timeout,
                "generation",
                self.generation
                    .complete(&self.prompt_for(item, &evidence), &options),
            )
            .await?;

            match json_ext::parse_reply::<AttributionReply>(&reply) {
                Ok(parsed) => match RootCause::parse(&parsed.category) {
                    Some(category) => {
                        grounded += 1;
                        results.push(AttributionResult {
                            item_id: item.id.clone(),
                            category,
                            justification: parsed.justification,
                            evidence,
                            confidence: Self::parse_confidence(parsed.confidence.as_deref()),
                        });
                    }
                    None => {
                        partial.alert(
                            StageKind::Attribute,
                            format!(
                                "unrecognized category {:?} for item {}; left unclassified",
                                parsed.category, item.id
                            ),
                        );
                        results.push(AttributionResult {
                            item_id: item.id.clone(),
                            category: RootCause::Unclassified,
                            justification: parsed.justification,
                            evidence,
                            confidence: Confidence::Low,
                        });
                    }
                },
                Err(parse_err) => {
                    partial.alert(
                        StageKind::Attribute,
                        format!(
                            "attribution reply for item {} unparseable; left unclassified: {parse_err}",
                            item.id
                        ),
                    );
                    results.push(AttributionResult {
                        item_id: item.id.clone(),
                        category: RootCause::Unclassified,
                        justification: "attribution output could not be parsed".to_string(),
                        evidence,
                        confidence: Confidence::Low,
                    });
                }
            }
        }

        partial.log(
            StageKind::Attribute,
            format!(
                "attributed {} item(s) ({grounded} grounded in reference material)",
                results.len()
            ),
        );
        let _ = ctx.emit("attribute", format!("{} attribution(s)", results.len()));
        Ok(partial.with_attributions(results))
    }

    /// Exhaustion fallback: one placeholder per high-risk item, so the
    /// cardinality invariant survives a dead retrieval/generation backend.
    fn fallback(&self, snapshot: &StateSnapshot) -> Option<StagePartial> {
        let mut partial = StagePartial::new().with_attributions(Self::placeholders_for(
            &snapshot.high_risk,
            "attribution capabilities unavailable",
        ));
        partial.alert(
            StageKind::Attribute,
            "attribution degraded: placeholder results substituted for the whole subset",
        );
        Some(partial)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::{GenerationError, RetrievalError};
    use crate::state::ReviewState;

    struct StaticRetrieval(Vec<ScoredPassage>);

    #[async_trait]
    impl RetrievalCapability for StaticRetrieval {
        async fn search(
            &self,
            _query: &str,
            top_k: usize,
            _max_distance: f32,
        ) -> Result<Vec<ScoredPassage>, RetrievalError> {
            Ok(self.0.iter().take(top_k).cloned().collect())
        }
    }

    struct CannedGeneration(String);

    #[async_trait]
    impl GenerationCapability for CannedGeneration {
        async fn complete(
            &self,
            _prompt: &str,
            _options: &GenerationOptions,
        ) -> Result<String, GenerationError> {
            Ok(self.0.clone())
        }
    }

    fn high_risk_state(count: usize) -> ReviewState {
        let items: Vec<FeedbackItem> = (0..count)
            .map(|i| FeedbackItem::new(&format!("hr-{i}"), "gimbal shakes badly", 1))
            .collect();
        ReviewState::builder().with_high_risk(items).build()
    }

    fn stage(
        retrieval: impl RetrievalCapability + 'static,
        generation: impl GenerationCapability + 'static,
    ) -> AttributeViaRetrieval {
        AttributeViaRetrieval::new(
            Arc::new(retrieval),
            Arc::new(generation),
            Arc::new(EngineConfig::default()),
        )
    }

    #[tokio::test]
    async fn one_attribution_per_item_when_grounded() {
        let passages = vec![ScoredPassage {
            passage: "The gimbal performs a self-check on boot; persistent shake indicates a \
                      hardware fault."
                .into(),
            score: 0.4,
        }];
        let reply = "{\"category\": \"needs_investigation\", \"justification\": \"matches \
                     known self-check fault\", \"confidence\": \"high\"}";
        let stage = stage(StaticRetrieval(passages), CannedGeneration(reply.into()));

        let partial = stage
            .run(
                high_risk_state(3).snapshot(),
                StageContext::detached(StageKind::Attribute),
            )
            .await
            .expect("run");
        let results = partial.attributions.expect("attributions");
        assert_eq!(results.len(), 3);
        assert!(
            results
                .iter()
                .all(|r| r.category == RootCause::NeedsInvestigation)
        );
        assert!(results.iter().all(|r| !r.evidence.is_empty()));
    }

    #[tokio::test]
    async fn empty_retrieval_yields_placeholders() {
        let stage = stage(
            StaticRetrieval(vec![]),
            CannedGeneration("unused".into()),
        );
        let partial = stage
            .run(
                high_risk_state(2).snapshot(),
                StageContext::detached(StageKind::Attribute),
            )
            .await
            .expect("run");
        let results = partial.attributions.as_ref().expect("attributions");
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.category == RootCause::Unclassified));
        assert!(partial.has_alerts());
    }

    #[tokio::test]
    async fn malformed_reply_yields_placeholder_not_error() {
        let passages = vec![ScoredPassage {
            passage: "reference".into(),
            score: 0.2,
        }];
        let stage = stage(
            StaticRetrieval(passages),
            CannedGeneration("I am not JSON at all".into()),
        );
        let partial = stage
            .run(
                high_risk_state(1).snapshot(),
                StageContext::detached(StageKind::Attribute),
            )
            .await
            .expect("degraded, not failed");
        let results = partial.attributions.expect("attributions");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].category, RootCause::Unclassified);
        // Evidence that was retrieved is still attached to the placeholder.
        assert!(!results[0].evidence.is_empty());
    }

    struct DeadRetrieval;

    #[async_trait]
    impl RetrievalCapability for DeadRetrieval {
        async fn search(
            &self,
            _query: &str,
            _top_k: usize,
            _max_distance: f32,
        ) -> Result<Vec<ScoredPassage>, RetrievalError> {
            Err(RetrievalError::Backend("index offline".into()))
        }
    }

    #[tokio::test]
    async fn transport_failure_is_retryable_stage_error() {
        let stage = stage(DeadRetrieval, CannedGeneration("unused".into()));
        let err = stage
            .run(
                high_risk_state(1).snapshot(),
                StageContext::detached(StageKind::Attribute),
            )
            .await
            .expect_err("stage fails");
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn fallback_covers_whole_subset() {
        let stage = stage(DeadRetrieval, CannedGeneration("unused".into()));
        let snapshot = high_risk_state(4).snapshot();
        let partial = stage.fallback(&snapshot).expect("has fallback");
        assert_eq!(partial.attributions.expect("attributions").len(), 4);
    }
}
