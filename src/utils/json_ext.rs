//! JSON helpers for capability replies and persistence.
//!
//! Generation capabilities wrap JSON in code fences or surround it with
//! prose; [`extract_json`] slices out the first balanced-looking object so
//! the typed parse in [`parse_reply`] gets clean input.

use serde::de::DeserializeOwned;

/// Strip code fences and surrounding prose, returning the JSON object slice.
///
/// Returns `None` when no `{...}` span is present at all.
#[must_use]
pub fn extract_json(raw: &str) -> Option<&str> {
    let mut text = raw.trim();
    if let Some(stripped) = text.strip_prefix("```json") {
        text = stripped;
    } else if let Some(stripped) = text.strip_prefix("```") {
        text = stripped;
    }
    if let Some(stripped) = text.strip_suffix("```") {
        text = stripped;
    }
    let text = text.trim();

    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&text[start..=end])
}

/// Parse a capability reply into a typed structure, tolerating fences/prose.
pub fn parse_reply<T: DeserializeOwned>(raw: &str) -> Result<T, ReplyParseError> {
    let json = extract_json(raw).ok_or(ReplyParseError::NoJsonObject)?;
    serde_json::from_str(json).map_err(ReplyParseError::Serde)
}

/// Why a reply failed to parse.
#[derive(Debug, thiserror::Error)]
pub enum ReplyParseError {
    #[error("reply contains no JSON object")]
    NoJsonObject,
    #[error("reply JSON did not match expected shape: {0}")]
    Serde(#[source] serde_json::Error),
}

/// Uniform to/from JSON-string surface for persisted models.
pub trait JsonSerializable<E>: Sized {
    fn to_json_string(&self) -> Result<String, E>;
    fn from_json_str(s: &str) -> Result<Self, E>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Shape {
        category: String,
    }

    #[test]
    fn extracts_from_fenced_block() {
        let raw = "```json\n{\"category\": \"user_error\"}\n```";
        let parsed: Shape = parse_reply(raw).expect("parse");
        assert_eq!(parsed.category, "user_error");
    }

    #[test]
    fn extracts_from_surrounding_prose() {
        let raw = "Sure! Here is the result: {\"category\": \"known_limitation\"} Hope it helps.";
        let parsed: Shape = parse_reply(raw).expect("parse");
        assert_eq!(parsed.category, "known_limitation");
    }

    #[test]
    fn rejects_reply_without_object() {
        let result: Result<Shape, _> = parse_reply("no json here");
        assert!(matches!(result, Err(ReplyParseError::NoJsonObject)));
    }

    #[test]
    fn rejects_mismatched_shape() {
        let result: Result<Shape, _> = parse_reply("{\"other\": 1}");
        assert!(matches!(result, Err(ReplyParseError::Serde(_))));
    }
}
