// src/classify/inference.rs
//! Gate a classification and turn it into a `RiskEvent`.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use metrics::counter;
use once_cell::sync::OnceCell;
use regex::Regex;
use serde_json::Value;
use tracing::{debug, warn};

use super::reasoner::Reasoner;
use super::{parse_classification, Classification, SocialPost};
use crate::event::{now_ts, DirectionHint, EventMeta, RiskEvent};

pub const DEFAULT_PROMPT_PATH: &str = "config/classifier_prompt.md";
const FALLBACK_PROMPT: &str = "You are a JSON classifier for crypto market risk. Reply with one JSON object only.";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InferenceConfig {
    /// Base severity when the caller gives no hint.
    pub default_severity: i64,
    /// Posts whose impact is further out than this are dropped.
    pub minimum_relevance_minutes: f64,
    pub title_max_chars: usize,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            default_severity: 50,
            minimum_relevance_minutes: 60.0,
            title_max_chars: 160,
        }
    }
}

/// Read the system prompt, falling back to a built-in one.
pub fn load_prompt(path: &Path) -> String {
    match fs::read_to_string(path) {
        Ok(s) if !s.trim().is_empty() => s,
        Ok(_) | Err(_) => {
            warn!(target: "inference", path = %path.display(), "classifier prompt missing, using fallback");
            FALLBACK_PROMPT.to_string()
        }
    }
}

/// Decode entities, strip tags, collapse whitespace, cap length.
pub fn normalize_title(text: &str, max_chars: usize) -> String {
    static RE_TAGS: OnceCell<Regex> = OnceCell::new();
    static RE_WS: OnceCell<Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| Regex::new(r"(?is)</?[^>]+>").expect("tag regex"));
    let re_ws = RE_WS.get_or_init(|| Regex::new(r"\s+").expect("ws regex"));

    let decoded = html_escape::decode_html_entities(text);
    let stripped = re_tags.replace_all(&decoded, "");
    let collapsed = re_ws.replace_all(&stripped, " ");
    collapsed.trim().chars().take(max_chars).collect()
}

/// `clamp(round(base + (u-50)*0.4 + (c-50)*0.3 ± 5), 0, 100)`; bearish adds, bullish subtracts.
pub fn compute_severity(c: &Classification, base: i64) -> i64 {
    let mut adjustment = (c.urgency - 50.0) * 0.4 + (c.credibility - 50.0) * 0.3;
    match DirectionHint::parse(&c.direction_hint) {
        DirectionHint::Bearish => adjustment += 5.0,
        DirectionHint::Bullish => adjustment -= 5.0,
        DirectionHint::Unclear => {}
    }
    ((base as f64 + adjustment).round() as i64).clamp(0, 100)
}

pub struct InferenceEngine {
    reasoner: Arc<dyn Reasoner>,
    config: InferenceConfig,
    prompt: String,
}

impl InferenceEngine {
    pub fn new(reasoner: Arc<dyn Reasoner>, config: InferenceConfig) -> Self {
        Self::with_prompt(reasoner, config, load_prompt(Path::new(DEFAULT_PROMPT_PATH)))
    }

    pub fn with_prompt(reasoner: Arc<dyn Reasoner>, config: InferenceConfig, prompt: String) -> Self {
        Self {
            reasoner,
            config,
            prompt,
        }
    }

    pub fn config(&self) -> &InferenceConfig {
        &self.config
    }

    /// Classify a post. `None` when nothing actionable *now* came back.
    /// `extra` is merged over the derived metadata; an `extra["ts"]` number
    /// becomes the event time.
    pub async fn analyze_social_post(
        &self,
        post: &SocialPost,
        severity_hint: Option<i64>,
        extra: BTreeMap<String, Value>,
    ) -> Option<RiskEvent> {
        let raw = match self.reasoner.classify(&self.prompt, post).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                counter!("inference_errors_total").increment(1);
                warn!(target: "inference", reasoner = self.reasoner.name(), error = %format!("{e:#}"), "classification failed");
                return None;
            }
        };
        let c = parse_classification(&raw)?;
        let event = self.build_event(post, c, severity_hint, extra);
        if event.is_some() {
            counter!("inference_events_total").increment(1);
        } else {
            counter!("inference_dropped_total").increment(1);
        }
        event
    }

    /// Gating and event construction, separated from the reasoner call.
    pub fn build_event(
        &self,
        post: &SocialPost,
        c: Classification,
        severity_hint: Option<i64>,
        extra: BTreeMap<String, Value>,
    ) -> Option<RiskEvent> {
        let category = match c.category.as_deref().map(str::trim) {
            None | Some("") | Some("IRRELEVANT") => {
                debug!(target: "inference", "classified irrelevant");
                return None;
            }
            Some(cat) => cat.to_string(),
        };
        if !c.is_relevant_now {
            debug!(target: "inference", %category, "not relevant now");
            return None;
        }
        if let Some(minutes) = c.immediacy_minutes {
            if minutes > self.config.minimum_relevance_minutes {
                debug!(
                    target: "inference",
                    minutes,
                    limit = self.config.minimum_relevance_minutes,
                    "dropped on immediacy"
                );
                return None;
            }
        }

        let severity = compute_severity(&c, severity_hint.unwrap_or(self.config.default_severity));
        let ts = extra.get("ts").and_then(Value::as_f64).unwrap_or_else(now_ts);

        let mut meta = EventMeta {
            currencies: c.impacted_assets.clone(),
            urgency: Some(c.urgency),
            credibility: Some(c.credibility),
            direction_hint: Some(DirectionHint::parse(&c.direction_hint)),
            score_adjustment_points: Some(c.score_adjustment_points),
            ..Default::default()
        };
        if let Some(explanation) = &c.explanation {
            meta.extra.insert("explanation".into(), Value::from(explanation.clone()));
        }
        meta.extra
            .insert("evidence_urls".into(), Value::from(c.evidence_urls.clone()));
        if let Some(minutes) = c.immediacy_minutes {
            meta.extra.insert("immediacy_minutes".into(), Value::from(minutes));
        }
        let meta = merge_meta(meta, extra);

        let source = c
            .source
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| post.source.clone());
        let title = normalize_title(&post.text, self.config.title_max_chars);
        let event = RiskEvent::new(source, category, title, ts, severity.clamp(0, 100) as u8);
        Some(event.with_meta(meta))
    }
}

/// Overlay caller-provided keys on the derived metadata.
fn merge_meta(meta: EventMeta, extra: BTreeMap<String, Value>) -> EventMeta {
    if extra.is_empty() {
        return meta;
    }
    let mut obj = match serde_json::to_value(&meta) {
        Ok(Value::Object(map)) => map,
        _ => return meta,
    };
    obj.extend(extra);
    match serde_json::from_value(Value::Object(obj)) {
        Ok(merged) => merged,
        Err(e) => {
            warn!(target: "inference", error = %e, "ignoring malformed extra metadata");
            meta
        }
    }
}
