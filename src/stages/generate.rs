//! Batch generation: pulls fresh feedback from a feed, skipping anything
//! already processed.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rand::{RngExt, SeedableRng, rngs::StdRng};
use rustc_hash::FxHashSet;

use crate::capabilities::{FeedError, FeedbackFeed, with_deadline};
use crate::feedback::FeedbackItem;
use crate::runtime::EngineConfig;
use crate::stage::{Stage, StageContext, StageError, StagePartial};
use crate::state::StateSnapshot;
use crate::types::StageKind;

/// Pulls a batch of not-yet-processed feedback items.
///
/// Idempotency contract: any id present in the processed set is skipped; the
/// feed may freely return overlapping candidates. The stage keeps pulling
/// until the configured minimum batch size is met or the feed yields nothing
/// fresh twice in a row (a dry feed produces an empty batch, which the router
/// turns into an early stop).
pub struct GenerateBatch {
    feed: Arc<dyn FeedbackFeed>,
    config: Arc<EngineConfig>,
}

impl GenerateBatch {
    pub fn new(feed: Arc<dyn FeedbackFeed>, config: Arc<EngineConfig>) -> Self {
        Self { feed, config }
    }
}

#[async_trait]
impl Stage for GenerateBatch {
    async fn run(
        &self,
        snapshot: StateSnapshot,
        ctx: StageContext,
    ) -> Result<StagePartial, StageError> {
        let processed = snapshot.processed_set();
        let config = &self.config;

        let mut fresh: Vec<FeedbackItem> = Vec::new();
        let mut excluded: FxHashSet<String> = processed.clone();
        let mut dry_pulls = 0u8;

        while fresh.len() < config.min_batch_size && dry_pulls < 2 {
            let pulled = with_deadline(
                config.call_timeout,
                "feed",
                self.feed.pull(&excluded),
            )
            .await?;

            let before = fresh.len();
            for item in pulled {
                if processed.contains(&item.id) || excluded.contains(&item.id) {
                    continue;
                }
                excluded.insert(item.id.clone());
                fresh.push(item);
            }
            if fresh.len() == before {
                dry_pulls += 1;
            } else {
                dry_pulls = 0;
            }
        }

        // Positive-item guarantee: one extra pull when the batch came back
        // all-negative; a dry feed may still leave none, which is logged.
        if config.require_positive
            && !fresh.is_empty()
            && !fresh.iter().any(|r| r.rating >= config.positive_threshold)
        {
            let pulled = with_deadline(
                config.call_timeout,
                "feed",
                self.feed.pull(&excluded),
            )
            .await?;
            if let Some(positive) = pulled
                .into_iter()
                .find(|r| r.rating >= config.positive_threshold && !excluded.contains(&r.id))
            {
                excluded.insert(positive.id.clone());
                fresh.push(positive);
            }
        }

        let positive = fresh
            .iter()
            .filter(|r| r.rating >= config.positive_threshold)
            .count();
        let negative = fresh
            .iter()
            .filter(|r| r.rating <= config.rating_threshold)
            .count();
        let neutral = fresh.len().saturating_sub(positive + negative);

        let mut partial = StagePartial::new()
            .with_feedback(fresh.clone())
            .with_batch(fresh.clone());
        partial.log(
            StageKind::Generate,
            format!(
                "detected {} new feedback item(s) (positive: {positive}, negative: {negative}, neutral: {neutral})",
                fresh.len()
            ),
        );
        let _ = ctx.emit("generate", format!("{} fresh item(s)", fresh.len()));
        Ok(partial)
    }
}

/// Review templates used by [`SampledFeed`].
struct Template {
    base_id: u32,
    user: &'static str,
    body: &'static str,
    rating: u8,
}

const NEGATIVE_POOL: &[Template] = &[
    Template {
        base_id: 101,
        user: "user_001",
        body: "Advertised 45 minutes of flight time but I barely get 20. The endurance claim \
               is wildly overstated; I have tested it repeatedly and feel misled.",
        rating: 1,
    },
    Template {
        base_id: 102,
        user: "user_002",
        body: "The gimbal fails its power-on self-check and the picture shakes constantly. \
               Rebooting does not help and it already came back from repair once with the \
               same fault. Looks like a hardware quality problem.",
        rating: 1,
    },
    Template {
        base_id: 103,
        user: "user_003",
        body: "Obstacle avoidance completely stopped working during a night flight and I \
               nearly hit a wall. The manual never clearly says night flying is unsupported.",
        rating: 2,
    },
    Template {
        base_id: 104,
        user: "user_004",
        body: "Obstacle avoidance does nothing in sport mode and I almost flew into a tree. \
               Nothing in the manual says sport mode disables it. Design flaw or am I \
               misreading this?",
        rating: 2,
    },
    Template {
        base_id: 105,
        user: "user_005",
        body: "Package arrived damaged and the courier took forever. Terrible shipping \
               experience.",
        rating: 2,
    },
];

const POSITIVE_POOL: &[Template] = &[
    Template {
        base_id: 201,
        user: "user_101",
        body: "Really satisfied! Crisp image, rock-solid stability, and the battery matches \
               the advertised endurance. Easy enough for a beginner. Strongly recommended.",
        rating: 5,
    },
    Template {
        base_id: 202,
        user: "user_102",
        body: "Great value for the price. Obstacle avoidance is responsive and footage \
               exceeded my expectations. Support resolved my question quickly too.",
        rating: 5,
    },
    Template {
        base_id: 203,
        user: "user_103",
        body: "Good overall experience: clear picture, stable gimbal, battery roughly as \
               expected. A few small annoyances but I am satisfied.",
        rating: 4,
    },
    Template {
        base_id: 204,
        user: "user_104",
        body: "Well built, flies steadily, and the footage looks great. The manual is clear \
               and it was quick to learn. Worth buying.",
        rating: 4,
    },
];

const NEUTRAL_POOL: &[Template] = &[Template {
    base_id: 301,
    user: "user_201",
    body: "It is okay. Image quality is average and stability is acceptable. Fair price, \
           but nothing stands out.",
    rating: 3,
}];

/// Endless mock feed sampling the template pools.
///
/// Each pull yields one positive review plus one or two negative/neutral
/// ones, with ids suffixed from the feed's RNG. Seeded construction makes the
/// id sequence reproducible, so a re-run against the same state pulls the
/// same ids and the processed-set skip leaves the batch empty; unseeded
/// construction draws from OS entropy and every run sees new items. The
/// latter variability is accepted, not a bug.
pub struct SampledFeed {
    rng: Mutex<StdRng>,
}

impl SampledFeed {
    /// Deterministic feed for tests and replayable demos.
    #[must_use]
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Entropy-seeded feed; every pull mints unseen ids.
    #[must_use]
    pub fn from_entropy() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_rng(&mut rand::rng())),
        }
    }

    /// Build a feed honoring `config.random_seed`.
    #[must_use]
    pub fn from_config(config: &EngineConfig) -> Self {
        match config.random_seed {
            Some(seed) => Self::seeded(seed),
            None => Self::from_entropy(),
        }
    }

    fn mint(&self, template: &Template, suffix: u32) -> FeedbackItem {
        FeedbackItem::new(
            &format!("{}-{suffix:08x}", template.base_id),
            template.body,
            template.rating,
        )
        .with_user(template.user)
        .with_source("mock")
    }
}

#[async_trait]
impl FeedbackFeed for SampledFeed {
    async fn pull(&self, exclude: &FxHashSet<String>) -> Result<Vec<FeedbackItem>, FeedError> {
        let mut rng = self
            .rng
            .lock()
            .map_err(|_| FeedError::Unavailable("feed rng poisoned".into()))?;

        let mut items = Vec::new();

        let positive = &POSITIVE_POOL[rng.random_range(0..POSITIVE_POOL.len())];
        items.push(self.mint(positive, rng.random()));

        let others: Vec<&Template> = NEGATIVE_POOL.iter().chain(NEUTRAL_POOL).collect();
        let extra = rng.random_range(1..=2usize);
        for _ in 0..extra {
            let template = others[rng.random_range(0..others.len())];
            items.push(self.mint(template, rng.random()));
        }

        items.retain(|item| !exclude.contains(&item.id));
        Ok(items)
    }
}

/// Finite feed serving a fixed item list.
///
/// Items already excluded are never re-served, so the feed runs dry once its
/// list has been processed — the scenario that exercises the router's early
/// stop on later runs.
pub struct QueueFeed {
    items: Vec<FeedbackItem>,
}

impl QueueFeed {
    #[must_use]
    pub fn new(items: Vec<FeedbackItem>) -> Self {
        Self { items }
    }
}

#[async_trait]
impl FeedbackFeed for QueueFeed {
    async fn pull(&self, exclude: &FxHashSet<String>) -> Result<Vec<FeedbackItem>, FeedError> {
        Ok(self
            .items
            .iter()
            .filter(|item| !exclude.contains(&item.id))
            .cloned()
            .collect())
    }
}
