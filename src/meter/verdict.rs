//! The rating verdict and its recovery from free-form model output.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{MeterError, Result};

/// Indicator value carried by every fallback verdict.
pub const FALLBACK_INDICATOR: i64 = 42;

/// First ```json fence up to the next ``` fence, across newlines.
static JSON_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```json(.*?)```").expect("valid fence pattern"));

/// Structured rating returned to callers and held in the cache.
///
/// All three fields are required when parsing; unknown fields are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    /// Overall risk score. Its range is set by the prompt template.
    pub indicator: i64,
    pub comment: String,
    pub review: String,
}

impl Verdict {
    pub fn new(indicator: i64, comment: impl Into<String>, review: impl Into<String>) -> Self {
        Self {
            indicator,
            comment: comment.into(),
            review: review.into(),
        }
    }

    /// Sentinel for model output that did not contain a usable verdict.
    pub fn fallback_parse() -> Self {
        Self::new(FALLBACK_INDICATOR, "Failed to parse response", "")
    }

    /// Sentinel for a failed or empty call to the generation service.
    pub fn fallback_upstream() -> Self {
        Self::new(FALLBACK_INDICATOR, "An error occurred", "")
    }
}

/// The JSON candidate inside `text`: the body of the first ```json fence,
/// or the whole text when no complete fence exists.
pub fn extract_payload(text: &str) -> &str {
    JSON_FENCE
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map_or(text, |m| m.as_str())
}

/// Parse model output into a [`Verdict`].
pub fn parse_verdict(text: &str) -> Result<Verdict> {
    let payload = extract_payload(text);
    serde_json::from_str(payload).map_err(|e| MeterError::Parse(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fenced_block() {
        let text = "```json\n{\"indicator\":7,\"comment\":\"ok\",\"review\":\"fine\"}\n```";
        assert_eq!(parse_verdict(text).unwrap(), Verdict::new(7, "ok", "fine"));
    }

    #[test]
    fn test_parse_fenced_block_with_surrounding_prose() {
        let text = "Here is my rating:\n```json\n{\n  \"indicator\": 3,\n  \"comment\": \"quiet day\",\n  \"review\": \"Nothing alarming.\"\n}\n```\nLet me know!";
        let verdict = parse_verdict(text).unwrap();
        assert_eq!(verdict.indicator, 3);
        assert_eq!(verdict.review, "Nothing alarming.");
    }

    #[test]
    fn test_parse_bare_json() {
        let text = r#"{"indicator": 55, "comment": "tense", "review": "markets wobble"}"#;
        assert_eq!(parse_verdict(text).unwrap().indicator, 55);
    }

    #[test]
    fn test_first_fence_wins() {
        let text = "```json\n{\"indicator\":1,\"comment\":\"a\",\"review\":\"b\"}\n```\n```json\n{\"indicator\":2,\"comment\":\"c\",\"review\":\"d\"}\n```";
        assert_eq!(parse_verdict(text).unwrap().indicator, 1);
    }

    #[test]
    fn test_unclosed_fence_uses_whole_text() {
        let text = "```json\n{\"indicator\":1,\"comment\":\"a\",\"review\":\"b\"}";
        assert_eq!(extract_payload(text), text);
        assert!(parse_verdict(text).is_err());
    }

    #[test]
    fn test_plain_fence_is_not_extracted() {
        let text = "```\n{\"indicator\":1}\n```";
        assert_eq!(extract_payload(text), text);
    }

    #[test]
    fn test_prose_is_parse_error() {
        let err = parse_verdict("I cannot comply.").unwrap_err();
        assert!(matches!(err, MeterError::Parse(_)));
    }

    #[test]
    fn test_missing_field_is_parse_error() {
        assert!(parse_verdict(r#"{"indicator": 5, "comment": "x"}"#).is_err());
    }

    #[test]
    fn test_mistyped_field_is_parse_error() {
        assert!(parse_verdict(r#"{"indicator": "high", "comment": "x", "review": "y"}"#).is_err());
    }

    #[test]
    fn test_unknown_fields_ignored() {
        let text = r#"{"indicator": 5, "comment": "x", "review": "y", "confidence": 0.9}"#;
        assert_eq!(parse_verdict(text).unwrap(), Verdict::new(5, "x", "y"));
    }

    #[test]
    fn test_fallbacks() {
        assert_eq!(
            Verdict::fallback_parse(),
            Verdict::new(42, "Failed to parse response", "")
        );
        assert_eq!(
            Verdict::fallback_upstream(),
            Verdict::new(42, "An error occurred", "")
        );
    }

    #[test]
    fn test_serializes_wire_shape() {
        let json = serde_json::to_value(Verdict::new(7, "ok", "fine")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"indicator": 7, "comment": "ok", "review": "fine"})
        );
    }
}
