//! External capability interfaces.
//!
//! The engine consumes generation, retrieval, ingestion, and delivery as
//! narrow trait objects. Concrete providers (LLM SDKs, vector stores, ticket
//! systems) live outside this crate; the default implementations here are the
//! mock/logging adapters the design calls for.

use async_trait::async_trait;
use miette::Diagnostic;
use rustc_hash::FxHashSet;
use thiserror::Error;

use crate::feedback::{ActionItem, FeedbackItem};
use crate::stage::StageError;

/// Options for one generation call.
#[derive(Clone, Debug)]
pub struct GenerationOptions {
    /// Provider model identifier.
    pub model: String,
    /// Determinism temperature; 0.0 for reproducible replies.
    pub temperature: f32,
}

/// Text completion capability.
#[async_trait]
pub trait GenerationCapability: Send + Sync {
    async fn complete(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<String, GenerationError>;
}

/// Failures a generation provider can report.
#[derive(Debug, Error, Diagnostic)]
pub enum GenerationError {
    #[error("generation call timed out")]
    #[diagnostic(code(reviewops::capability::generation_timeout))]
    Timeout,

    #[error("generation transport failure: {0}")]
    #[diagnostic(code(reviewops::capability::generation_transport))]
    Transport(String),

    #[error("generation provider error ({provider}): {message}")]
    #[diagnostic(code(reviewops::capability::generation_provider))]
    Provider {
        provider: &'static str,
        message: String,
    },
}

impl From<GenerationError> for StageError {
    fn from(err: GenerationError) -> Self {
        StageError::Transient {
            capability: "generation",
            message: err.to_string(),
        }
    }
}

/// A reference passage returned by retrieval, with its relevance score.
#[derive(Clone, Debug, PartialEq)]
pub struct ScoredPassage {
    pub passage: String,
    /// Distance-style score; lower is more relevant.
    pub score: f32,
}

/// Vector/reference retrieval capability.
///
/// `search` returns the top-`top_k` passages under `max_distance`, ordered by
/// relevance; an empty result is a valid answer, not an error.
#[async_trait]
pub trait RetrievalCapability: Send + Sync {
    async fn search(
        &self,
        query: &str,
        top_k: usize,
        max_distance: f32,
    ) -> Result<Vec<ScoredPassage>, RetrievalError>;
}

#[derive(Debug, Error, Diagnostic)]
pub enum RetrievalError {
    #[error("retrieval call timed out")]
    #[diagnostic(code(reviewops::capability::retrieval_timeout))]
    Timeout,

    #[error("retrieval backend failure: {0}")]
    #[diagnostic(code(reviewops::capability::retrieval_backend))]
    Backend(String),
}

impl From<RetrievalError> for StageError {
    fn from(err: RetrievalError) -> Self {
        StageError::Transient {
            capability: "retrieval",
            message: err.to_string(),
        }
    }
}

/// Ingestion source for new feedback.
///
/// `pull` returns candidate items; anything whose id appears in `exclude`
/// has already been processed (or already pulled this run) and will be
/// skipped by the caller, so feeds may return overlapping candidates freely.
#[async_trait]
pub trait FeedbackFeed: Send + Sync {
    async fn pull(&self, exclude: &FxHashSet<String>) -> Result<Vec<FeedbackItem>, FeedError>;
}

#[derive(Debug, Error, Diagnostic)]
pub enum FeedError {
    #[error("feedback feed unavailable: {0}")]
    #[diagnostic(code(reviewops::capability::feed))]
    Unavailable(String),
}

impl From<FeedError> for StageError {
    fn from(err: FeedError) -> Self {
        StageError::Transient {
            capability: "feed",
            message: err.to_string(),
        }
    }
}

/// Downstream delivery target for action items (issue tracker, docs queue,
/// mail). Production adapters are swappable; the default only logs.
#[async_trait]
pub trait TicketSink: Send + Sync {
    async fn deliver(&self, action: &ActionItem) -> Result<(), DeliveryError>;
}

#[derive(Debug, Error, Diagnostic)]
pub enum DeliveryError {
    #[error("delivery rejected: {0}")]
    #[diagnostic(code(reviewops::capability::delivery_rejected))]
    Rejected(String),

    #[error("delivery transport failure: {0}")]
    #[diagnostic(code(reviewops::capability::delivery_transport))]
    Transport(String),
}

/// Default [`TicketSink`]: logs the action and succeeds.
#[derive(Debug, Default)]
pub struct LoggingTicketSink;

#[async_trait]
impl TicketSink for LoggingTicketSink {
    async fn deliver(&self, action: &ActionItem) -> Result<(), DeliveryError> {
        tracing::info!(
            item_id = %action.item_id,
            action_type = %action.action_type,
            priority = ?action.priority,
            target = %action.target,
            "action delivered (mock)"
        );
        Ok(())
    }
}

/// Wrap a capability call with the configured per-call deadline.
///
/// Elapsed deadlines are transient failures: the same retry/fallback policy
/// applies as for any other capability error.
pub async fn with_deadline<T, E>(
    deadline: std::time::Duration,
    capability: &'static str,
    fut: impl std::future::Future<Output = Result<T, E>>,
) -> Result<T, StageError>
where
    E: Into<StageError>,
{
    match tokio::time::timeout(deadline, fut).await {
        Ok(result) => result.map_err(Into::into),
        Err(_elapsed) => Err(StageError::Transient {
            capability,
            message: format!("call exceeded {}ms deadline", deadline.as_millis()),
        }),
    }
}
