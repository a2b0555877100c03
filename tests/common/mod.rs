//! Shared capability doubles for integration tests.
//!
//! Each test binary compiles this module independently and uses a subset.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use rustc_hash::FxHashSet;

use reviewops::capabilities::{
    FeedError, FeedbackFeed, GenerationCapability, GenerationError, GenerationOptions,
    RetrievalCapability, RetrievalError, ScoredPassage,
};
use reviewops::feedback::FeedbackItem;

/// Always returns the same reply.
pub struct CannedGeneration(pub String);

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

/// Pops replies from a queue; returns a plain-text fallback once drained.
pub struct ScriptedGeneration {
    replies: Mutex<VecDeque<String>>,
}

impl ScriptedGeneration {
    pub fn new(replies: Vec<&str>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().map(String::from).collect()),
        }
    }
}

#[async_trait]
impl GenerationCapability for ScriptedGeneration {
    async fn complete(
        &self,
        _prompt: &str,
        _options: &GenerationOptions,
    ) -> Result<String, GenerationError> {
        Ok(self
            .replies
            .lock()
            .expect("script lock")
            .pop_front()
            .unwrap_or_else(|| "follow up with the customer".to_string()))
    }
}

/// Serves a fixed passage list for every query.
pub struct StaticRetrieval(pub Vec<ScoredPassage>);

impl StaticRetrieval {
    pub fn with_manual_passages() -> Self {
        Self(vec![
            ScoredPassage {
                passage: "Obstacle avoidance is disabled in sport mode and degraded in low \
                          light; see the flight-safety chapter."
                    .into(),
                score: 0.35,
            },
            ScoredPassage {
                passage: "Rated flight time of 45 minutes is measured at sea level in calm \
                          wind with a new battery."
                    .into(),
                score: 0.52,
            },
        ])
    }
}

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

/// Returns an empty hit list for every query.
pub struct EmptyRetrieval;

#[async_trait]
impl RetrievalCapability for EmptyRetrieval {
    async fn search(
        &self,
        _query: &str,
        _top_k: usize,
        _max_distance: f32,
    ) -> Result<Vec<ScoredPassage>, RetrievalError> {
        Ok(vec![])
    }
}

/// Fails every query with a backend error.
pub struct DeadRetrieval;

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

/// Fails the first `failures` calls, then delegates to a static passage list.
pub struct FlakyRetrieval {
    pub failures: usize,
    calls: AtomicUsize,
    inner: StaticRetrieval,
}

impl FlakyRetrieval {
    pub fn failing_once() -> Self {
        Self {
            failures: 1,
            calls: AtomicUsize::new(0),
            inner: StaticRetrieval::with_manual_passages(),
        }
    }
}

#[async_trait]
impl RetrievalCapability for FlakyRetrieval {
    async fn search(
        &self,
        query: &str,
        top_k: usize,
        max_distance: f32,
    ) -> Result<Vec<ScoredPassage>, RetrievalError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            return Err(RetrievalError::Timeout);
        }
        self.inner.search(query, top_k, max_distance).await
    }
}

/// Queue feed that counts pulls, to prove a stage was or was not re-invoked.
pub struct CountingFeed {
    items: Vec<FeedbackItem>,
    pulls: AtomicUsize,
}

impl CountingFeed {
    pub fn new(items: Vec<FeedbackItem>) -> Self {
        Self {
            items,
            pulls: AtomicUsize::new(0),
        }
    }

    pub fn pulls(&self) -> usize {
        self.pulls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FeedbackFeed for CountingFeed {
    async fn pull(&self, exclude: &FxHashSet<String>) -> Result<Vec<FeedbackItem>, FeedError> {
        self.pulls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .items
            .iter()
            .filter(|item| !exclude.contains(&item.id))
            .cloned()
            .collect())
    }
}

/// Feed whose backend is permanently down.
pub struct DeadFeed;

#[async_trait]
impl FeedbackFeed for DeadFeed {
    async fn pull(&self, _exclude: &FxHashSet<String>) -> Result<Vec<FeedbackItem>, FeedError> {
        Err(FeedError::Unavailable("ingestion backend down".into()))
    }
}

/// The reference batch from the filtering scenario: ratings [1, 2, 5, 4, 1].
pub fn reference_batch() -> Vec<FeedbackItem> {
    vec![
        FeedbackItem::new("fb-1", "battery endurance is wildly overstated", 1),
        FeedbackItem::new("fb-2", "obstacle avoidance failed at night", 2),
        FeedbackItem::new("fb-3", "love it, footage looks great", 5),
        FeedbackItem::new("fb-4", "solid drone, manual is clear", 4),
        FeedbackItem::new("fb-5", "gimbal shakes constantly after repair", 1),
    ]
}

/// An attribution reply the attribute stage parses successfully.
pub fn attribution_reply(category: &str) -> String {
    format!(
        "{{\"category\": \"{category}\", \"justification\": \"grounded in the manual\", \
         \"confidence\": \"medium\"}}"
    )
}
