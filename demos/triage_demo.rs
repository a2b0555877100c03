//! Minimal end-to-end demo: two incremental runs over the mock feed with
//! canned generation/retrieval capabilities.
//!
//! Run with: `cargo run --example triage_demo`

use std::sync::Arc;

use async_trait::async_trait;
use reviewops::capabilities::{
    GenerationCapability, GenerationError, GenerationOptions, LoggingTicketSink,
    RetrievalCapability, RetrievalError, ScoredPassage,
};
use reviewops::engine::ReviewOpsEngine;
use reviewops::pipeline::reviewops_pipeline;
use reviewops::runtime::EngineConfig;
use reviewops::stages::SampledFeed;

/// Stands in for an LLM: echoes a plausible structured attribution.
struct CannedAnalyst;

#[async_trait]
impl GenerationCapability for CannedAnalyst {
    async fn complete(
        &self,
        prompt: &str,
        _options: &GenerationOptions,
    ) -> Result<String, GenerationError> {
        if prompt.contains("Reply with JSON only") {
            Ok(r#"{"category": "needs_investigation",
                   "justification": "symptoms match the gimbal self-check fault pattern",
                   "confidence": "medium"}"#
                .to_string())
        } else {
            Ok("File a ticket summarizing the reported symptom and link the manual section."
                .to_string())
        }
    }
}

/// Stands in for a vector index over the product manual.
struct CannedManual;

#[async_trait]
impl RetrievalCapability for CannedManual {
    async fn search(
        &self,
        _query: &str,
        top_k: usize,
        _max_distance: f32,
    ) -> Result<Vec<ScoredPassage>, RetrievalError> {
        let passages = vec![
            ScoredPassage {
                passage: "Obstacle avoidance is disabled in sport mode and degraded below \
                          300 lux; plan flights accordingly."
                    .into(),
                score: 0.41,
            },
            ScoredPassage {
                passage: "Rated endurance assumes calm wind, sea level, and a battery under \
                          50 charge cycles."
                    .into(),
                score: 0.58,
            },
        ];
        Ok(passages.into_iter().take(top_k).collect())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    reviewops::telemetry::init();

    let config = Arc::new(EngineConfig::default());
    let pipeline = reviewops_pipeline(
        config.clone(),
        Arc::new(SampledFeed::from_config(&config)),
        Arc::new(CannedAnalyst),
        Arc::new(CannedManual),
        Arc::new(LoggingTicketSink),
        None,
    )?;
    let engine = ReviewOpsEngine::builder(pipeline, config).build();

    for round in 1..=2 {
        let record = engine.trigger_run().await?;
        println!(
            "run {round}: {} new item(s), {} high-risk, {} action(s), status {:?}",
            record.batch.len(),
            record.high_risk.len(),
            record.actions.len(),
            record.status,
        );
        for action in &record.actions {
            println!(
                "  [{:?}] {} -> {}: {}",
                action.priority, action.item_id, action.target, action.description
            );
        }
    }

    let snapshot = engine.snapshot();
    println!(
        "state store: {} item(s) accumulated, {} processed, {} run(s) in history",
        snapshot.feedback.len(),
        snapshot.processed.len(),
        snapshot.history.len(),
    );
    Ok(())
}
