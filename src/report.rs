//! Persisted data model: the analysis record and the feedback report.
//!
//! Field names serialise in camelCase so stored records stay readable by any
//! front-end that consumes the same `resume:<id>` keys.

use serde::de::{self, DeserializeOwned, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Key prefix for analysis records in the key-value store.
pub const RECORD_KEY_PREFIX: &str = "resume:";

/// Build the key-value key for a run id.
pub fn record_key(id: &str) -> String {
    format!("{RECORD_KEY_PREFIX}{id}")
}

/// Structured score-and-tips report returned by the feedback service.
///
/// Deserialisation never fails on shape: absent, `null` or mistyped fields
/// take their defaults, and numeric scores are rounded into range. Only the
/// extractor decides what counts as unparseable.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Feedback {
    #[serde(deserialize_with = "lenient_score")]
    pub overall_score: u32,
    #[serde(
        rename = "ATS",
        skip_serializing_if = "Option::is_none",
        deserialize_with = "or_default"
    )]
    pub ats: Option<Category>,
    #[serde(deserialize_with = "or_default")]
    pub tone_and_style: Category,
    #[serde(deserialize_with = "or_default")]
    pub content: Category,
    #[serde(deserialize_with = "or_default")]
    pub structure: Category,
    #[serde(deserialize_with = "or_default")]
    pub skills: Category,
}

impl Feedback {
    /// The four scored sections shown in the summary, with display titles.
    pub fn categories(&self) -> [(&'static str, &Category); 4] {
        [
            ("Tone & Style", &self.tone_and_style),
            ("Content", &self.content),
            ("Structure", &self.structure),
            ("Skills", &self.skills),
        ]
    }
}

/// One scored feedback section.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Category {
    #[serde(deserialize_with = "lenient_score")]
    pub score: u32,
    #[serde(deserialize_with = "lenient_tips")]
    pub tips: Vec<Tip>,
}

/// A single piece of advice inside a category.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Tip {
    #[serde(rename = "type", deserialize_with = "or_default")]
    pub kind: TipKind,
    #[serde(deserialize_with = "or_default")]
    pub tip: String,
    /// Longer explanation. The ATS section omits it.
    #[serde(deserialize_with = "or_default")]
    pub explanation: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TipKind {
    Good,
    #[default]
    Improve,
    /// Any label other than `good` or `improve`.
    #[serde(other)]
    Other,
}

/// Take the field's value if it has the expected type, else the default.
fn or_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).unwrap_or_default())
}

/// Any JSON number, or a numeric string, rounded and clamped into `u32`.
fn lenient_score<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    let number = match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    Ok(number
        .filter(|n| n.is_finite())
        .map(|n| n.round().clamp(0.0, f64::from(u32::MAX)) as u32)
        .unwrap_or(0))
}

/// A tips array with malformed entries dropped. Anything but an array is empty.
fn lenient_tips<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Tip>, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Array(items) => Ok(items
            .into_iter()
            .filter(Value::is_object)
            .filter_map(|item| serde_json::from_value(item).ok())
            .collect()),
        _ => Ok(Vec::new()),
    }
}

/// Qualitative band for a 0–100 score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScoreBand {
    Strong,
    GoodStart,
    NeedsWork,
}

impl ScoreBand {
    pub fn from_score(score: u32) -> Self {
        if score > 70 {
            ScoreBand::Strong
        } else if score > 49 {
            ScoreBand::GoodStart
        } else {
            ScoreBand::NeedsWork
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ScoreBand::Strong => "Strong",
            ScoreBand::GoodStart => "Good Start",
            ScoreBand::NeedsWork => "Needs Work",
        }
    }
}

impl fmt::Display for ScoreBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// The record's feedback slot: empty while the run is in flight (or after
/// it failed), or the fully parsed report.
///
/// Serialises `Empty` as `""` so drafts keep the on-disk shape other
/// consumers of the store expect.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum FeedbackState {
    #[default]
    Empty,
    Ready(Feedback),
}

impl FeedbackState {
    pub fn is_empty(&self) -> bool {
        matches!(self, FeedbackState::Empty)
    }

    pub fn as_ready(&self) -> Option<&Feedback> {
        match self {
            FeedbackState::Ready(f) => Some(f),
            FeedbackState::Empty => None,
        }
    }
}

impl Serialize for FeedbackState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FeedbackState::Empty => serializer.serialize_str(""),
            FeedbackState::Ready(feedback) => feedback.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for FeedbackState {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Null(()),
            Report(Feedback),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Text(s) if s.is_empty() => Ok(FeedbackState::Empty),
            Raw::Text(s) => Err(de::Error::invalid_value(
                de::Unexpected::Str(&s),
                &"an empty string or a feedback object",
            )),
            Raw::Null(()) => Ok(FeedbackState::Empty),
            Raw::Report(feedback) => Ok(FeedbackState::Ready(feedback)),
        }
    }
}

/// One analysis run as persisted under `resume:<id>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRecord {
    pub id: String,
    pub resume_path: String,
    pub image_path: String,
    pub company_name: String,
    pub job_title: String,
    pub job_description: String,
    #[serde(default)]
    pub feedback: FeedbackState,
}

impl AnalysisRecord {
    pub fn key(&self) -> String {
        record_key(&self.id)
    }
}
