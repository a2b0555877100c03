//! Durable checkpointer tests (require `--features sqlite`).

#![cfg(feature = "sqlite")]

mod common;

use std::sync::Arc;

use common::*;
use reviewops::capabilities::LoggingTicketSink;
use reviewops::feedback::RunStatus;
use reviewops::pipeline::reviewops_pipeline;
use reviewops::runtime::{
    Checkpoint, Checkpointer, EngineConfig, RunController, SqliteCheckpointer,
};
use reviewops::runtime::retry::RetryLedger;
use reviewops::state::ReviewState;
use reviewops::types::StageKind;

async fn temp_store() -> (tempfile::TempDir, SqliteCheckpointer) {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = format!("sqlite://{}", dir.path().join("checkpoints.db").display());
    let store = SqliteCheckpointer::connect(&url).await.expect("connect");
    (dir, store)
}

#[tokio::test]
async fn save_and_load_roundtrip() {
    let (_dir, store) = temp_store().await;

    let state = ReviewState::builder()
        .with_feedback(reference_batch())
        .with_processed(vec!["fb-1".into()])
        .build();
    let mut ledger = RetryLedger::new();
    ledger.record_failure(StageKind::Attribute);

    store
        .save(Checkpoint::capture("run-sql", StageKind::Filter, 2, &state, &ledger))
        .await
        .expect("save");

    let loaded = store
        .load_latest("run-sql")
        .await
        .expect("load")
        .expect("present");
    assert_eq!(loaded.stage, StageKind::Filter);
    assert_eq!(loaded.seq, 2);
    assert_eq!(loaded.retries.get("Attribute"), Some(&1));
    assert_eq!(
        loaded.state.snapshot().feedback.len(),
        state.snapshot().feedback.len()
    );
    assert_eq!(loaded.state.snapshot().processed, vec!["fb-1".to_string()]);
}

#[tokio::test]
async fn list_runs_and_load_at() {
    let (_dir, store) = temp_store().await;
    let state = ReviewState::default();
    let ledger = RetryLedger::new();

    for (run, seq) in [("beta", 0), ("alpha", 0), ("alpha", 1)] {
        store
            .save(Checkpoint::capture(run, StageKind::Start, seq, &state, &ledger))
            .await
            .expect("save");
    }

    assert_eq!(store.list_runs().await.expect("list"), vec!["alpha", "beta"]);
    assert!(store.load_at("alpha", 1).await.expect("load").is_some());
    assert!(store.load_at("alpha", 7).await.expect("load").is_none());
}

#[tokio::test]
async fn full_run_persists_through_sqlite() {
    let (_dir, store) = temp_store().await;
    let checkpointer: Arc<dyn Checkpointer> = Arc::new(store);

    let config = Arc::new(EngineConfig {
        retry_delay: std::time::Duration::from_millis(5),
        ..EngineConfig::default()
    });
    let pipeline = reviewops_pipeline(
        config.clone(),
        Arc::new(CountingFeed::new(reference_batch())),
        Arc::new(CannedGeneration(attribution_reply("known_limitation"))),
        Arc::new(StaticRetrieval::with_manual_passages()),
        Arc::new(LoggingTicketSink),
        None,
    )
    .expect("valid topology");
    let (sender, _receiver) = flume::unbounded();
    let controller = RunController::new(Arc::new(pipeline), config, checkpointer.clone(), sender);

    let outcome = controller
        .run("run-durable", ReviewState::default())
        .await
        .expect("run commits");
    assert_eq!(outcome.record.status, RunStatus::Success);

    let latest = checkpointer
        .load_latest("run-durable")
        .await
        .expect("load")
        .expect("present");
    assert_eq!(latest.stage, StageKind::End);
    assert_eq!(latest.state.snapshot().history.len(), 1);
}
