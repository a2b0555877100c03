//! # ReviewOps: incremental feedback-triage workflow engine
//!
//! ReviewOps ingests unstructured user feedback, attributes negative feedback
//! to root causes using retrieved reference material, and emits prioritized
//! action items. Runs accumulate into a single versioned state store; the
//! processed-id set makes repeated runs idempotent, and per-stage checkpoints
//! make any run inspectable and resumable mid-flight.
//!
//! ## Core concepts
//!
//! - **Stages**: async units of work over state snapshots
//!   (generate → filter → attribute → act)
//! - **State**: versioned, channel-based state with reducer-defined merges
//! - **Pipeline**: immutable stage graph with one router-driven branch
//! - **Controller**: sequential execution, bounded retries, degraded-mode
//!   fallbacks, checkpoint after every stage
//! - **Engine**: the presentation facade — snapshots, history, trigger/resume
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use reviewops::capabilities::LoggingTicketSink;
//! use reviewops::engine::ReviewOpsEngine;
//! use reviewops::pipeline::reviewops_pipeline;
//! use reviewops::runtime::EngineConfig;
//! use reviewops::stages::SampledFeed;
//!
//! # use async_trait::async_trait;
//! # struct MyLlm;
//! # #[async_trait]
//! # impl reviewops::capabilities::GenerationCapability for MyLlm {
//! #     async fn complete(&self, _: &str, _: &reviewops::capabilities::GenerationOptions)
//! #         -> Result<String, reviewops::capabilities::GenerationError> { Ok(String::new()) }
//! # }
//! # struct MyIndex;
//! # #[async_trait]
//! # impl reviewops::capabilities::RetrievalCapability for MyIndex {
//! #     async fn search(&self, _: &str, _: usize, _: f32)
//! #         -> Result<Vec<reviewops::capabilities::ScoredPassage>, reviewops::capabilities::RetrievalError> { Ok(vec![]) }
//! # }
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Arc::new(EngineConfig::from_env()?);
//! let pipeline = reviewops_pipeline(
//!     config.clone(),
//!     Arc::new(SampledFeed::from_config(&config)),
//!     Arc::new(MyLlm),
//!     Arc::new(MyIndex),
//!     Arc::new(LoggingTicketSink),
//!     None,
//! )?;
//!
//! let engine = ReviewOpsEngine::builder(pipeline, config).build();
//! let record = engine.trigger_run().await?;
//! println!("run {} finished: {:?}", record.run_id, record.status);
//! # Ok(())
//! # }
//! ```
//!
//! ## Module guide
//!
//! - [`feedback`] - domain model (items, attributions, actions, run records)
//! - [`state`] - versioned state store and snapshots
//! - [`channels`] - channel primitives backing the state store
//! - [`stage`] - stage trait, partial updates, stage error taxonomy
//! - [`stages`] - the four pipeline stages and the mock feeds
//! - [`capabilities`] - generation/retrieval/feed/delivery interfaces
//! - [`reducers`] - merge strategies and the reducer registry
//! - [`pipeline`] - graph construction, validation, and the router
//! - [`runtime`] - controller, retries, checkpointing, configuration
//! - [`engine`] - the presentation-layer facade
//! - [`event_bus`] - live progress events and sinks

pub mod capabilities;
pub mod channels;
pub mod engine;
pub mod event_bus;
pub mod feedback;
pub mod pipeline;
pub mod reducers;
pub mod runtime;
pub mod stage;
pub mod stages;
pub mod state;
pub mod telemetry;
pub mod types;
pub mod utils;
