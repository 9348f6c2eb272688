//! Recover a [`Feedback`] report from the feedback service's raw text.
//!
//! Models are asked for bare JSON but often wrap it in a fenced code block,
//! with or without a `json` tag, and sometimes add prose around it. The
//! first fenced block wins; without one the whole text is used.

use crate::error::ParseError;
use crate::report::Feedback;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{de, Deserialize};
use serde_json::Value;
use tracing::debug;

static RE_FENCED_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"```(?:json)?\s*([\s\S]*?)\s*```").unwrap());

/// Select the JSON candidate from `raw`: the inner content of the first
/// fenced block, else the whole text, trimmed.
///
/// An empty fenced block falls back to the trimmed raw text.
pub fn clean_response(raw: &str) -> &str {
    let inner = RE_FENCED_BLOCK
        .captures(raw)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
        .unwrap_or("");

    if inner.is_empty() {
        raw.trim()
    } else {
        inner
    }
}

/// Parse `raw` into a [`Feedback`].
///
/// Fails only when the candidate is not JSON or not a JSON object. Fields of
/// the wrong shape take their defaults (see [`Feedback`]).
pub fn extract_feedback(raw: &str) -> Result<Feedback, ParseError> {
    let cleaned = clean_response(raw);
    let parse_err = |source: serde_json::Error| {
        debug!(original = raw, cleaned, error = %source, "Feedback text is not a JSON object");
        ParseError {
            original: raw.to_string(),
            cleaned: cleaned.to_string(),
            source,
        }
    };

    let value: Value = serde_json::from_str(cleaned).map_err(parse_err)?;
    if !value.is_object() {
        return Err(parse_err(de::Error::invalid_type(
            unexpected(&value),
            &"a JSON object",
        )));
    }
    Feedback::deserialize(value).map_err(parse_err)
}

fn unexpected(value: &Value) -> de::Unexpected<'_> {
    match value {
        Value::Null => de::Unexpected::Unit,
        Value::Bool(b) => de::Unexpected::Bool(*b),
        Value::Number(_) => de::Unexpected::Other("number"),
        Value::String(s) => de::Unexpected::Str(s),
        Value::Array(_) => de::Unexpected::Seq,
        Value::Object(_) => de::Unexpected::Map,
    }
}
