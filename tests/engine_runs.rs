//! End-to-end runs through the engine facade.

mod common;

use std::sync::Arc;

use common::*;
use reviewops::capabilities::{
    GenerationCapability, LoggingTicketSink, RetrievalCapability, TicketSink,
};
use reviewops::engine::ReviewOpsEngine;
use reviewops::feedback::{Priority, RootCause, RunStatus};
use reviewops::pipeline::reviewops_pipeline;
use reviewops::runtime::EngineConfig;
use reviewops::stages::SampledFeed;

fn quick_config() -> Arc<EngineConfig> {
    Arc::new(EngineConfig {
        retry_delay: std::time::Duration::from_millis(5),
        ..EngineConfig::default()
    })
}

fn engine_with(
    feed: Arc<dyn reviewops::capabilities::FeedbackFeed>,
    generation: Arc<dyn GenerationCapability>,
    retrieval: Arc<dyn RetrievalCapability>,
) -> ReviewOpsEngine {
    let config = quick_config();
    let sink: Arc<dyn TicketSink> = Arc::new(LoggingTicketSink);
    let pipeline = reviewops_pipeline(config.clone(), feed, generation, retrieval, sink, None)
        .expect("valid topology");
    ReviewOpsEngine::builder(pipeline, config).build()
}

#[tokio::test]
async fn full_run_selects_filters_attributes_and_acts() {
    let generation = ScriptedGeneration::new(vec![
        &attribution_reply("user_error"),
        &attribution_reply("needs_investigation"),
        &attribution_reply("known_limitation"),
        "draft an outreach mail",
        "open a gimbal ticket",
        "clarify the endurance test conditions in the manual",
    ]);
    let engine = engine_with(
        Arc::new(CountingFeed::new(reference_batch())),
        Arc::new(generation),
        Arc::new(StaticRetrieval::with_manual_passages()),
    );

    let record = engine.trigger_run().await.expect("run commits");

    assert_eq!(record.status, RunStatus::Success);
    assert_eq!(record.batch.len(), 5);

    // Ratings [1, 2, 5, 4, 1] with threshold 3: items 1, 2, 5 in input order.
    let high_risk_ids: Vec<&str> = record.high_risk.iter().map(|i| i.id.as_str()).collect();
    assert_eq!(high_risk_ids, vec!["fb-1", "fb-2", "fb-5"]);

    // One attribution per high-risk item.
    assert_eq!(record.attributions.len(), record.high_risk.len());
    assert_eq!(record.attributions[0].category, RootCause::UserError);
    assert_eq!(
        record.attributions[1].category,
        RootCause::NeedsInvestigation
    );

    // One action per attribution, presented by priority descending.
    assert_eq!(record.actions.len(), 3);
    let priorities: Vec<Priority> = record.actions.iter().map(|a| a.priority).collect();
    assert_eq!(
        priorities,
        vec![Priority::High, Priority::Medium, Priority::Low]
    );

    // Commit is the idempotency boundary: all batch ids are now processed.
    let snapshot = engine.snapshot();
    assert_eq!(snapshot.processed.len(), 5);
    assert_eq!(engine.history().len(), 1);
}

#[tokio::test]
async fn empty_retrieval_degrades_with_unclassified_results() {
    let engine = engine_with(
        Arc::new(CountingFeed::new(reference_batch())),
        Arc::new(CannedGeneration("unused".into())),
        Arc::new(EmptyRetrieval),
    );

    let record = engine.trigger_run().await.expect("run commits");

    assert_eq!(record.status, RunStatus::Degraded);
    assert_eq!(record.attributions.len(), record.high_risk.len());
    assert!(
        record
            .attributions
            .iter()
            .all(|a| a.category == RootCause::Unclassified)
    );
}

#[tokio::test]
async fn second_run_with_no_new_items_stops_at_the_router() {
    let generation = ScriptedGeneration::new(vec![
        &attribution_reply("needs_investigation"),
        &attribution_reply("needs_investigation"),
        &attribution_reply("needs_investigation"),
    ]);
    let feed = Arc::new(CountingFeed::new(reference_batch()));
    let engine = engine_with(
        feed.clone(),
        Arc::new(generation),
        Arc::new(StaticRetrieval::with_manual_passages()),
    );

    let first = engine.trigger_run().await.expect("first run");
    assert_eq!(first.batch.len(), 5);

    let second = engine.trigger_run().await.expect("second run");
    assert!(second.batch.is_empty());
    assert!(second.high_risk.is_empty());
    // The router stopped before attribution; the current view carries no
    // stale results from the first run.
    assert!(second.attributions.is_empty());
    assert!(second.actions.is_empty());
    assert_eq!(second.status, RunStatus::Success);

    assert_eq!(engine.history().len(), 2);
}

#[tokio::test]
async fn seeded_feed_is_deterministic_across_engines() {
    let build = || {
        engine_with(
            Arc::new(SampledFeed::seeded(42)),
            Arc::new(CannedGeneration(attribution_reply("needs_investigation"))),
            Arc::new(StaticRetrieval::with_manual_passages()),
        )
    };

    let first = build().trigger_run().await.expect("first engine run");
    let second = build().trigger_run().await.expect("second engine run");

    // A fixed seed reproduces the exact id sequence; without one, batches
    // may vary run to run (accepted non-determinism).
    let first_ids: Vec<String> = first.batch.iter().map(|i| i.id.clone()).collect();
    let second_ids: Vec<String> = second.batch.iter().map(|i| i.id.clone()).collect();
    assert!(!first_ids.is_empty());
    assert_eq!(first_ids, second_ids);
}

#[tokio::test]
async fn transient_failure_below_ceiling_does_not_fail_the_run() {
    let generation = ScriptedGeneration::new(vec![
        &attribution_reply("needs_investigation"),
        &attribution_reply("needs_investigation"),
        &attribution_reply("needs_investigation"),
        "ticket text",
        "ticket text",
        "ticket text",
    ]);
    let engine = engine_with(
        Arc::new(CountingFeed::new(reference_batch())),
        Arc::new(generation),
        Arc::new(FlakyRetrieval::failing_once()),
    );

    let record = engine.trigger_run().await.expect("run commits");

    // One transient retrieval failure, retried within the ceiling: the run
    // must not be failed because of it.
    assert_eq!(record.status, RunStatus::Success);
    assert_eq!(record.attributions.len(), 3);
}

#[tokio::test]
async fn exhausted_attribution_degrades_with_placeholders() {
    let engine = engine_with(
        Arc::new(CountingFeed::new(reference_batch())),
        Arc::new(CannedGeneration("unused".into())),
        Arc::new(DeadRetrieval),
    );

    let record = engine.trigger_run().await.expect("run commits");

    assert_eq!(record.status, RunStatus::Degraded);
    // The fallback preserves the cardinality invariant.
    assert_eq!(record.attributions.len(), record.high_risk.len());
    assert!(
        record
            .attributions
            .iter()
            .all(|a| a.category == RootCause::Unclassified)
    );
    // Degraded runs still mark their items processed.
    assert_eq!(engine.snapshot().processed.len(), 5);
}

#[tokio::test]
async fn dead_feed_fails_the_run_without_marking_items_processed() {
    let engine = engine_with(
        Arc::new(DeadFeed),
        Arc::new(CannedGeneration("unused".into())),
        Arc::new(StaticRetrieval::with_manual_passages()),
    );

    let record = engine.trigger_run().await.expect("failed runs still commit a record");

    assert_eq!(record.status, RunStatus::Failed);
    assert!(record.batch.is_empty());
    assert!(engine.snapshot().processed.is_empty());
    // The failed record is still visible in the history for audit.
    assert_eq!(engine.history().len(), 1);
    assert_eq!(engine.history()[0].status, RunStatus::Failed);
}
