//! Domain model for feedback triage.
//!
//! Everything a run reads or produces is defined here: the immutable
//! [`FeedbackItem`], the attribution and action results derived from it, and
//! the [`RunRecord`] appended to the incident history at commit.
//!
//! All types are plain serde-serializable data; none of them carry behavior
//! beyond small constructors and classification helpers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One user-submitted piece of feedback. Immutable once created.
///
/// Items are produced by the generate stage (or an external ingestion path),
/// never mutated, and retained forever in the state store.
///
/// # Examples
///
/// ```
/// use reviewops::feedback::FeedbackItem;
///
/// let item = FeedbackItem::new("101-ab12", "battery drains in 20 minutes", 1);
/// assert!(item.rating <= 2);
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeedbackItem {
    /// Unique identifier; the sole idempotency key.
    pub id: String,
    /// Identifier of the submitting user.
    pub user: String,
    /// Free-text body.
    pub body: String,
    /// Numeric rating, 1 (worst) to 5 (best).
    pub rating: u8,
    /// Submission time.
    pub submitted_at: DateTime<Utc>,
    /// Origin tag, e.g. `"mock"` or a store/channel name.
    pub source: String,
}

impl FeedbackItem {
    /// Creates an item with defaulted user/source and the current time.
    #[must_use]
    pub fn new(id: &str, body: &str, rating: u8) -> Self {
        Self {
            id: id.to_string(),
            user: "anonymous".to_string(),
            body: body.to_string(),
            rating,
            submitted_at: Utc::now(),
            source: "mock".to_string(),
        }
    }

    /// Builder-style user override.
    #[must_use]
    pub fn with_user(mut self, user: &str) -> Self {
        self.user = user.to_string();
        self
    }

    /// Builder-style source override.
    #[must_use]
    pub fn with_source(mut self, source: &str) -> Self {
        self.source = source.to_string();
        self
    }
}

/// Root-cause category assigned by attribution.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RootCause {
    /// Behavior documented as a product limitation.
    KnownLimitation,
    /// Potential defect; needs engineering investigation.
    NeedsInvestigation,
    /// User misunderstanding of documented behavior.
    UserError,
    /// Unrelated to the product itself (shipping, packaging, courier).
    LogisticsNoise,
    /// Placeholder used when attribution could not be grounded.
    Unclassified,
}

impl RootCause {
    /// Best-effort parse of a generated category string.
    ///
    /// Accepts the exact snake_case forms plus loose keyword matches, since
    /// generation capabilities do not always echo enum values verbatim.
    pub fn parse(raw: &str) -> Option<Self> {
        let lowered = raw.trim().to_ascii_lowercase();
        match lowered.as_str() {
            "known_limitation" => return Some(Self::KnownLimitation),
            "needs_investigation" => return Some(Self::NeedsInvestigation),
            "user_error" => return Some(Self::UserError),
            "logistics_noise" => return Some(Self::LogisticsNoise),
            "unclassified" => return Some(Self::Unclassified),
            _ => {}
        }
        if lowered.contains("known") || lowered.contains("limitation") {
            Some(Self::KnownLimitation)
        } else if lowered.contains("investigat") || lowered.contains("defect") {
            Some(Self::NeedsInvestigation)
        } else if lowered.contains("user") || lowered.contains("misunderstand") {
            Some(Self::UserError)
        } else if lowered.contains("logistic") || lowered.contains("shipping") {
            Some(Self::LogisticsNoise)
        } else {
            None
        }
    }
}

impl fmt::Display for RootCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::KnownLimitation => "known_limitation",
            Self::NeedsInvestigation => "needs_investigation",
            Self::UserError => "user_error",
            Self::LogisticsNoise => "logistics_noise",
            Self::Unclassified => "unclassified",
        };
        f.write_str(name)
    }
}

/// Confidence indicator attached to an attribution.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

/// A retrieved reference passage supporting an attribution.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    /// Passage text, truncated to the configured context length.
    pub passage: String,
    /// Relevance/distance score reported by the retrieval capability.
    pub score: f32,
}

/// Attribution of one high-risk item to a root cause. Immutable once created.
///
/// Exactly one of these exists per high-risk item that entered the attribute
/// stage, including under retrieval or generation failure (see
/// [`AttributionResult::placeholder`]).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AttributionResult {
    /// Identifier of the attributed feedback item.
    pub item_id: String,
    pub category: RootCause,
    /// Human-readable justification grounded in the evidence.
    pub justification: String,
    pub evidence: Vec<Evidence>,
    pub confidence: Confidence,
}

impl AttributionResult {
    /// Well-defined degraded result substituted when attribution could not be
    /// grounded: `Unclassified` category, low confidence.
    #[must_use]
    pub fn placeholder(item_id: &str, reason: &str) -> Self {
        Self {
            item_id: item_id.to_string(),
            category: RootCause::Unclassified,
            justification: reason.to_string(),
            evidence: Vec::new(),
            confidence: Confidence::Low,
        }
    }
}

/// The fixed enumeration of downstream action types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    /// Engineering ticket in the issue tracker.
    Ticket,
    /// Documentation/manual update.
    DocUpdate,
    /// Outreach draft to the affected user(s).
    EmailDraft,
    /// Cross-team review meeting.
    Meeting,
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Ticket => "ticket",
            Self::DocUpdate => "doc_update",
            Self::EmailDraft => "email_draft",
            Self::Meeting => "meeting",
        };
        f.write_str(name)
    }
}

/// Action priority. Ordered so that `High` sorts greatest; run records order
/// actions by priority descending for presentation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
}

/// One follow-up action derived from an attribution. Immutable once created.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActionItem {
    /// Identifier of the feedback item this action traces back to.
    pub item_id: String,
    pub action_type: ActionType,
    pub priority: Priority,
    /// Downstream system this action targets (mock by default).
    pub target: String,
    pub description: String,
}

/// Final status of a pipeline run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    /// Completed with fallback/partial results after a non-fatal failure.
    Degraded,
    /// A critical stage exhausted its retries with no usable result.
    Failed,
}

/// The unit of one pipeline execution, appended to the incident history.
///
/// The most recent record is the "current" view; prior records are retained
/// for audit and replay. `actions` is ordered by priority descending.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: String,
    pub batch: Vec<FeedbackItem>,
    pub high_risk: Vec<FeedbackItem>,
    pub attributions: Vec<AttributionResult>,
    pub actions: Vec<ActionItem>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub status: RunStatus,
}

/// Durable log line recorded by a stage or the controller.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub when: DateTime<Utc>,
    /// Encoded stage name, or `"controller"`.
    pub stage: String,
    pub message: String,
}

impl LogEntry {
    #[must_use]
    pub fn new(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            when: Utc::now(),
            stage: stage.into(),
            message: message.into(),
        }
    }
}

/// Degradation marker. Any alert emitted during a run caps its status at
/// [`RunStatus::Degraded`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub when: DateTime<Utc>,
    pub stage: String,
    pub message: String,
}

impl Alert {
    #[must_use]
    pub fn new(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            when: Utc::now(),
            stage: stage.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_orders_high_first_when_sorted_descending() {
        let mut priorities = vec![Priority::Medium, Priority::High, Priority::Low];
        priorities.sort_by(|a, b| b.cmp(a));
        assert_eq!(
            priorities,
            vec![Priority::High, Priority::Medium, Priority::Low]
        );
    }

    #[test]
    fn root_cause_parses_exact_and_loose_forms() {
        assert_eq!(
            RootCause::parse("known_limitation"),
            Some(RootCause::KnownLimitation)
        );
        assert_eq!(
            RootCause::parse("This looks like a defect"),
            Some(RootCause::NeedsInvestigation)
        );
        assert_eq!(RootCause::parse("user misunderstanding"), Some(RootCause::UserError));
        assert_eq!(RootCause::parse("???"), None);
    }

    #[test]
    fn placeholder_is_unclassified_low_confidence() {
        let placeholder = AttributionResult::placeholder("x", "no evidence retrieved");
        assert_eq!(placeholder.category, RootCause::Unclassified);
        assert_eq!(placeholder.confidence, Confidence::Low);
        assert!(placeholder.evidence.is_empty());
    }

    #[test]
    fn serialization_roundtrip() {
        let item = FeedbackItem::new("a-1", "text", 3).with_user("u1");
        let json = serde_json::to_string(&item).expect("serialize");
        let parsed: FeedbackItem = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(item, parsed);
    }
}
