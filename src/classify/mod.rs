// src/classify/mod.rs
//! Classification of unstructured social posts into risk events.
//!
//! A `Reasoner` returns raw structured text, `parse_classification` turns it
//! into a `Classification`, and `InferenceEngine` gates it and derives the
//! event. Anything malformed is dropped with a warning, never propagated.

pub mod inference;
pub mod reasoner;

use once_cell::sync::OnceCell;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

fn default_fifty() -> f64 {
    50.0
}
fn default_direction() -> String {
    "unclear".to_string()
}

/// Structured verdict returned by a reasoner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    #[serde(default)]
    pub is_relevant_now: bool,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default = "default_fifty")]
    pub urgency: f64,
    #[serde(default = "default_fifty")]
    pub credibility: f64,
    #[serde(default = "default_direction")]
    pub direction_hint: String,
    #[serde(default)]
    pub immediacy_minutes: Option<f64>,
    #[serde(default)]
    pub score_adjustment_points: f64,
    #[serde(default)]
    pub impacted_assets: Vec<String>,
    #[serde(default)]
    pub evidence_urls: Vec<String>,
    #[serde(default)]
    pub explanation: Option<String>,
    /// Overrides the post's source when set.
    #[serde(default)]
    pub source: Option<String>,
}

/// Unstructured input handed to the classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SocialPost {
    pub source: String,
    pub author: String,
    pub text: String,
    #[serde(default)]
    pub urls: Vec<String>,
}

impl SocialPost {
    pub fn new(source: impl Into<String>, author: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            author: author.into(),
            text: text.into(),
            urls: Vec::new(),
        }
    }
}

fn fence_re() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)^\s*```[A-Za-z]*\s*(.*?)\s*```\s*$").expect("valid fence regex")
    })
}

/// Parse reasoner output. Accepts bare JSON or JSON inside a code fence.
/// Returns `None` (and logs) on anything that is not a classification object.
pub fn parse_classification(raw: &str) -> Option<Classification> {
    let body = match fence_re().captures(raw) {
        Some(caps) => caps.get(1).map_or("", |m| m.as_str()),
        None => raw.trim(),
    };
    if body.is_empty() {
        return None;
    }
    match serde_json::from_str::<Classification>(body) {
        Ok(c) => Some(c),
        Err(e) => {
            let preview: String = body.chars().take(120).collect();
            warn!(target: "inference", error = %e, %preview, "malformed classification dropped");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_and_fenced_json() {
        let bare = r#"{"is_relevant_now": true, "category": "EXCHANGE_OUTAGE", "urgency": 80}"#;
        let c = parse_classification(bare).unwrap();
        assert!(c.is_relevant_now);
        assert_eq!(c.urgency, 80.0);
        assert_eq!(c.credibility, 50.0);
        assert_eq!(c.direction_hint, "unclear");

        let fenced = format!("```json\n{bare}\n```");
        assert_eq!(parse_classification(&fenced), Some(c));
    }

    #[test]
    fn malformed_is_none() {
        assert!(parse_classification("not json").is_none());
        assert!(parse_classification("```\n```").is_none());
        assert!(parse_classification("[1, 2]").is_none());
        assert!(parse_classification("").is_none());
    }
}
