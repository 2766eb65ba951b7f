//! # Risk Events
//! The normalized unit every producer hands to the engine, plus the derived
//! per-tick contribution and the published score snapshot.
//!
//! `EventMeta` is a typed view of the free-form metadata mapping: the knobs
//! the engine understands get their own fields, everything else is kept in
//! `extra` and flattened back out on the wire.

use std::collections::BTreeMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// A normalized risk signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskEvent {
    /// Origin of the event, e.g. "Twitter", "SessionWatcher".
    pub source: String,
    /// Normalized category name (drives category defaults).
    pub category: String,
    /// Human label; also part of the dedup key.
    pub title: String,
    /// Semantic event time in epoch seconds (may be in the future).
    pub ts: f64,
    /// Severity in `0..=100`.
    pub severity: u8,
    #[serde(default)]
    pub meta: EventMeta,
}

impl RiskEvent {
    pub fn new(
        source: impl Into<String>,
        category: impl Into<String>,
        title: impl Into<String>,
        ts: f64,
        severity: u8,
    ) -> Self {
        Self {
            source: source.into(),
            category: category.into(),
            title: title.into(),
            ts,
            severity: severity.min(100),
            meta: EventMeta::default(),
        }
    }

    pub fn with_meta(mut self, meta: EventMeta) -> Self {
        self.meta = meta;
        self
    }

    /// Identity used for deduplication and storage keying.
    pub fn dedup_key(&self) -> String {
        format!("{}|{}", self.source, self.title)
    }
}

/// Direction hint attached by the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DirectionHint {
    Bullish,
    Bearish,
    Unclear,
}

impl DirectionHint {
    /// Lenient parse; anything unknown is `Unclear`.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "bullish" => Self::Bullish,
            "bearish" => Self::Bearish,
            _ => Self::Unclear,
        }
    }
}

/// Per-event knobs. Every field is optional; resolution order against
/// scenario/category/global rules lives in `decay` and `config`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventMeta {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub currencies: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub urgency: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credibility: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction_hint: Option<DirectionHint>,
    /// Signed nudge: positive relieves the penalty, negative adds to it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score_adjustment_points: Option<f64>,
    /// A non-zero value selects the planned decay regime.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_ts: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_window_seconds: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_window_seconds: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tau_seconds: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_boost: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub half_life_seconds: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_seconds: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scenario: Option<String>,
    /// Unrecognized keys, preserved as-is.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Planned-window values set on the event itself (highest precedence).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PlannedOverrides {
    pub pre_seconds: Option<f64>,
    pub post_seconds: Option<f64>,
    pub tau_seconds: Option<f64>,
    pub boost: Option<f64>,
}

/// Decay regime of an event, chosen by the presence of a scheduled instant.
#[derive(Debug, Clone, PartialEq)]
pub enum Timing {
    /// Decays from occurrence by half-life.
    Breaking { half_life: Option<f64> },
    /// Rises before, peaks at and decays after `scheduled_ts`.
    Planned {
        scheduled_ts: f64,
        scenario: Option<String>,
        overrides: PlannedOverrides,
    },
}

impl EventMeta {
    /// A zero value at the event level means "not set" and defers to the rules.
    pub fn timing(&self) -> Timing {
        match nonzero(self.scheduled_ts) {
            Some(scheduled_ts) => Timing::Planned {
                scheduled_ts,
                scenario: self.scenario.clone(),
                overrides: PlannedOverrides {
                    pre_seconds: nonzero(self.pre_window_seconds),
                    post_seconds: nonzero(self.post_window_seconds),
                    tau_seconds: nonzero(self.tau_seconds),
                    boost: nonzero(self.time_boost),
                },
            },
            None => Timing::Breaking {
                half_life: nonzero(self.half_life_seconds),
            },
        }
    }

    /// Event-level TTL; non-positive values count as unset.
    pub fn ttl(&self) -> Option<f64> {
        self.ttl_seconds.filter(|t| *t > 0.0)
    }

    pub fn urgency_or_default(&self) -> f64 {
        self.urgency.unwrap_or(50.0)
    }

    pub fn adjustment_points(&self) -> f64 {
        self.score_adjustment_points.unwrap_or(0.0)
    }
}

/// Current signed effect of one event on the score. Lives for one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveContribution {
    #[serde(flatten)]
    pub event: RiskEvent,
    /// Signed penalty: positive lowers the score.
    pub contribution: f64,
    pub weight: f64,
    pub time_weight: f64,
    pub asset_multiplier: f64,
}

/// Published score snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreState {
    pub score: f64,
    pub updated_at: f64,
    pub active: Vec<ActiveContribution>,
}

/// Drops explicit zeros so they fall through to the next precedence level.
pub(crate) fn nonzero(value: Option<f64>) -> Option<f64> {
    value.filter(|v| *v != 0.0)
}

/// Current UNIX time in (fractional) seconds.
pub fn now_ts() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}
