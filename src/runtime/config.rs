//! Engine configuration.
//!
//! All tunables recognized by the engine, with conservative hardcoded
//! defaults and environment-variable overrides loaded through dotenvy.
//! Invalid configuration is fatal before any stage runs.

use miette::Diagnostic;
use std::time::Duration;
use thiserror::Error;

use crate::feedback::{ActionType, Priority};

/// Recognized configuration options.
///
/// | field                | env override                  | default   |
/// |----------------------|-------------------------------|-----------|
/// | `rating_threshold`   | `REVIEWOPS_RATING_THRESHOLD`  | 3         |
/// | `min_batch_size`     | `REVIEWOPS_MIN_BATCH`         | 2         |
/// | `require_positive`   | `REVIEWOPS_REQUIRE_POSITIVE`  | true      |
/// | `positive_threshold` | —                             | 4         |
/// | `top_k`              | `REVIEWOPS_TOP_K`             | 5         |
/// | `max_distance`       | `REVIEWOPS_MAX_DISTANCE`      | 1.5       |
/// | `max_context_items`  | —                             | 3         |
/// | `max_context_len`    | —                             | 300       |
/// | `default_action`     | —                             | Ticket    |
/// | `default_priority`   | —                             | Medium    |
/// | `max_attempts`       | `REVIEWOPS_MAX_ATTEMPTS`      | 3         |
/// | `retry_delay`        | —                             | 200 ms    |
/// | `call_timeout`       | `REVIEWOPS_CALL_TIMEOUT_MS`   | 10 s      |
/// | `model`              | `REVIEWOPS_MODEL`             | qwen-plus |
/// | `temperature`        | —                             | 0.0       |
/// | `random_seed`        | `REVIEWOPS_SEED`              | None      |
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Items rated at or below this value are high-risk.
    pub rating_threshold: u8,
    /// Minimum items the generate stage tries to pull per run.
    pub min_batch_size: usize,
    /// Whether each batch should carry at least one positive item.
    pub require_positive: bool,
    /// Rating at or above which an item counts as positive.
    pub positive_threshold: u8,
    /// Passages requested per retrieval query.
    pub top_k: usize,
    /// Distance ceiling above which retrieved passages are discarded.
    pub max_distance: f32,
    /// Passages kept in a generation context.
    pub max_context_items: usize,
    /// Character budget per context passage.
    pub max_context_len: usize,
    /// Action type used when generation cannot be consulted.
    pub default_action: ActionType,
    /// Priority used when generation cannot be consulted.
    pub default_priority: Priority,
    /// Total attempts per stage (first try included).
    pub max_attempts: u32,
    /// Fixed delay between attempts; no backoff.
    pub retry_delay: Duration,
    /// Deadline for each external capability call.
    pub call_timeout: Duration,
    /// Generation model identifier.
    pub model: String,
    /// Generation determinism temperature.
    pub temperature: f32,
    /// Seed for the sampled feed; `None` draws from OS entropy.
    pub random_seed: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            rating_threshold: 3,
            min_batch_size: 2,
            require_positive: true,
            positive_threshold: 4,
            top_k: 5,
            max_distance: 1.5,
            max_context_items: 3,
            max_context_len: 300,
            default_action: ActionType::Ticket,
            default_priority: Priority::Medium,
            max_attempts: 3,
            retry_delay: Duration::from_millis(200),
            call_timeout: Duration::from_secs(10),
            model: "qwen-plus".to_string(),
            temperature: 0.0,
            random_seed: None,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigurationError> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigurationError::InvalidValue {
                key: key.to_string(),
                reason: format!("could not parse {raw:?}"),
            }),
        Err(_) => Ok(None),
    }
}

impl EngineConfig {
    /// Load defaults, then apply `.env` / environment overrides, then
    /// validate. Errors here abort before any stage runs.
    pub fn from_env() -> Result<Self, ConfigurationError> {
        dotenvy::dotenv().ok();
        let mut config = Self::default();

        if let Some(v) = env_parse::<u8>("REVIEWOPS_RATING_THRESHOLD")? {
            config.rating_threshold = v;
        }
        if let Some(v) = env_parse::<usize>("REVIEWOPS_MIN_BATCH")? {
            config.min_batch_size = v;
        }
        if let Some(v) = env_parse::<bool>("REVIEWOPS_REQUIRE_POSITIVE")? {
            config.require_positive = v;
        }
        if let Some(v) = env_parse::<usize>("REVIEWOPS_TOP_K")? {
            config.top_k = v;
        }
        if let Some(v) = env_parse::<f32>("REVIEWOPS_MAX_DISTANCE")? {
            config.max_distance = v;
        }
        if let Some(v) = env_parse::<u32>("REVIEWOPS_MAX_ATTEMPTS")? {
            config.max_attempts = v;
        }
        if let Some(v) = env_parse::<u64>("REVIEWOPS_CALL_TIMEOUT_MS")? {
            config.call_timeout = Duration::from_millis(v);
        }
        if let Ok(model) = std::env::var("REVIEWOPS_MODEL") {
            config.model = model;
        }
        if let Some(v) = env_parse::<u64>("REVIEWOPS_SEED")? {
            config.random_seed = Some(v);
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations no run could execute under.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.rating_threshold == 0 || self.rating_threshold > 5 {
            return Err(ConfigurationError::InvalidValue {
                key: "rating_threshold".into(),
                reason: "must be within 1..=5".into(),
            });
        }
        if self.positive_threshold > 5 {
            return Err(ConfigurationError::InvalidValue {
                key: "positive_threshold".into(),
                reason: "must be within 0..=5".into(),
            });
        }
        if self.max_attempts == 0 {
            return Err(ConfigurationError::InvalidValue {
                key: "max_attempts".into(),
                reason: "at least one attempt is required".into(),
            });
        }
        if self.call_timeout.is_zero() {
            return Err(ConfigurationError::InvalidValue {
                key: "call_timeout".into(),
                reason: "zero timeout would fail every capability call".into(),
            });
        }
        if self.top_k == 0 {
            return Err(ConfigurationError::InvalidValue {
                key: "top_k".into(),
                reason: "retrieval needs at least one passage slot".into(),
            });
        }
        if self.max_distance <= 0.0 || !self.max_distance.is_finite() {
            return Err(ConfigurationError::InvalidValue {
                key: "max_distance".into(),
                reason: "must be a positive finite ceiling".into(),
            });
        }
        Ok(())
    }
}

/// Fatal configuration problems, surfaced to the caller before a run starts.
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigurationError {
    #[error("missing required configuration: {key}")]
    #[diagnostic(
        code(reviewops::config::missing),
        help("Set the value in the environment or a .env file.")
    )]
    MissingValue { key: String },

    #[error("invalid configuration for {key}: {reason}")]
    #[diagnostic(code(reviewops::config::invalid))]
    InvalidValue { key: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        EngineConfig::default().validate().expect("defaults valid");
    }

    #[test]
    fn zero_attempts_rejected() {
        let config = EngineConfig {
            max_attempts: 0,
            ..EngineConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::InvalidValue { key, .. }) if key == "max_attempts"
        ));
    }

    #[test]
    fn out_of_range_threshold_rejected() {
        let config = EngineConfig {
            rating_threshold: 9,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
