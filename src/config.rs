// src/config.rs
//! Score configuration: loaded once from TOML at startup, validated, then
//! shared read-only (`Arc<ScoreConfig>`) by every component.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::event::RiskEvent;

// --- env defaults & names ---
pub const DEFAULT_SCORE_CONFIG_PATH: &str = "config/score.toml";
pub const ENV_SCORE_CONFIG_PATH: &str = "SCORE_CONFIG_PATH";

pub const DEFAULT_BREAKING_HALF_LIFE_SECS: f64 = 900.0;
pub const DEFAULT_TTL_SECS: f64 = 3600.0;

fn default_baseline() -> f64 {
    95.0
}
fn default_one() -> f64 {
    1.0
}
fn default_tick_secs() -> f64 {
    1.0
}
fn default_heartbeat_secs() -> f64 {
    10.0
}
fn default_ttl() -> f64 {
    DEFAULT_TTL_SECS
}
fn default_ema_half_life() -> f64 {
    30.0
}
fn default_clamp_min() -> f64 {
    -5.0
}
fn default_clamp_max() -> f64 {
    3.0
}
fn default_dedup_window() -> f64 {
    300.0
}
fn default_mid() -> f64 {
    50.0
}
fn default_steepness() -> f64 {
    0.1
}
fn default_scale() -> f64 {
    100.0
}
fn default_capacity() -> usize {
    4
}
fn default_breaking_half_life() -> f64 {
    DEFAULT_BREAKING_HALF_LIFE_SECS
}

/// Root of `config/score.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct ScoreConfig {
    /// Score ceiling when no penalties are active.
    #[serde(default = "default_baseline")]
    pub baseline: f64,
    #[serde(default = "default_tick_secs")]
    pub tick_interval_seconds: f64,
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_interval_seconds: f64,
    /// TTL for events whose category has no `max_age_seconds`.
    #[serde(default = "default_ttl")]
    pub default_ttl_seconds: f64,
    #[serde(default)]
    pub ema: EmaConfig,
    #[serde(default)]
    pub clamp: ClampConfig,
    #[serde(default)]
    pub deduplication: DedupConfig,
    #[serde(default)]
    pub logistic: LogisticConfig,
    #[serde(default)]
    pub hub: HubConfig,
    #[serde(default)]
    pub category_defaults: HashMap<String, CategoryConfig>,
    #[serde(default)]
    pub asset_multipliers: AssetMultipliers,
    #[serde(default)]
    pub timing_rules: TimingRules,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmaConfig {
    #[serde(default = "default_ema_half_life")]
    pub half_life_seconds: f64,
}

impl Default for EmaConfig {
    fn default() -> Self {
        Self {
            half_life_seconds: default_ema_half_life(),
        }
    }
}

/// Per-tick bounds on how far the published score may move.
#[derive(Debug, Clone, Deserialize)]
pub struct ClampConfig {
    #[serde(default = "default_clamp_min")]
    pub min_per_second: f64,
    #[serde(default = "default_clamp_max")]
    pub max_per_second: f64,
}

impl Default for ClampConfig {
    fn default() -> Self {
        Self {
            min_per_second: default_clamp_min(),
            max_per_second: default_clamp_max(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DedupConfig {
    #[serde(default = "default_dedup_window")]
    pub window_seconds: f64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            window_seconds: default_dedup_window(),
        }
    }
}

/// Severity → points curve.
#[derive(Debug, Clone, Deserialize)]
pub struct LogisticConfig {
    #[serde(default = "default_mid")]
    pub mid: f64,
    #[serde(default = "default_steepness")]
    pub steepness: f64,
    #[serde(default = "default_scale")]
    pub scale: f64,
}

impl Default for LogisticConfig {
    fn default() -> Self {
        Self {
            mid: default_mid(),
            steepness: default_steepness(),
            scale: default_scale(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HubConfig {
    #[serde(default = "default_capacity")]
    pub subscriber_capacity: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            subscriber_capacity: default_capacity(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimingKind {
    #[default]
    Breaking,
    Planned,
}

/// Category-level defaults. Missing half-life / max-age fall back to the
/// global defaults at lookup time.
#[derive(Debug, Clone, Deserialize)]
pub struct CategoryConfig {
    #[serde(default = "default_one")]
    pub weight: f64,
    #[serde(default)]
    pub half_life_seconds: Option<f64>,
    #[serde(default)]
    pub max_age_seconds: Option<f64>,
    #[serde(default)]
    pub timing: TimingKind,
}

/// `default` plus one entry per asset symbol.
#[derive(Debug, Clone, Deserialize)]
pub struct AssetMultipliers {
    #[serde(default = "default_one")]
    pub default: f64,
    #[serde(flatten)]
    pub per_asset: HashMap<String, f64>,
}

impl Default for AssetMultipliers {
    fn default() -> Self {
        Self {
            default: 1.0,
            per_asset: HashMap::new(),
        }
    }
}

impl AssetMultipliers {
    /// Case-insensitive lookup with fallback to `default`.
    pub fn for_asset(&self, symbol: &str) -> f64 {
        let wanted = symbol.trim();
        self.per_asset
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(wanted))
            .map(|(_, v)| *v)
            .unwrap_or(self.default)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TimingRules {
    #[serde(default)]
    pub breaking: BreakingRules,
    #[serde(default)]
    pub planned: PlannedRules,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BreakingRules {
    #[serde(default = "default_breaking_half_life")]
    pub default_half_life_seconds: f64,
}

impl Default for BreakingRules {
    fn default() -> Self {
        Self {
            default_half_life_seconds: DEFAULT_BREAKING_HALF_LIFE_SECS,
        }
    }
}

/// Planned-window rule; unset fields defer to the next level down.
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
pub struct PlannedRule {
    pub pre_seconds: Option<f64>,
    pub post_seconds: Option<f64>,
    pub tau_seconds: Option<f64>,
    pub boost: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CategoryPlannedRule {
    #[serde(flatten)]
    pub rule: PlannedRule,
    #[serde(default)]
    pub scenarios: HashMap<String, PlannedRule>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlannedRules {
    #[serde(default)]
    pub default: PlannedRule,
    #[serde(default)]
    pub categories: HashMap<String, CategoryPlannedRule>,
}

fn planned_fields(prefix: &str, rule: &PlannedRule, out: &mut Vec<(String, f64)>) {
    let named = [
        ("pre_seconds", rule.pre_seconds),
        ("post_seconds", rule.post_seconds),
        ("tau_seconds", rule.tau_seconds),
        ("boost", rule.boost),
    ];
    for (field, value) in named {
        if let Some(v) = value {
            out.push((format!("{prefix}.{field}"), v));
        }
    }
}

impl Default for ScoreConfig {
    fn default() -> Self {
        Self {
            baseline: default_baseline(),
            tick_interval_seconds: default_tick_secs(),
            heartbeat_interval_seconds: default_heartbeat_secs(),
            default_ttl_seconds: DEFAULT_TTL_SECS,
            ema: EmaConfig::default(),
            clamp: ClampConfig::default(),
            deduplication: DedupConfig::default(),
            logistic: LogisticConfig::default(),
            hub: HubConfig::default(),
            category_defaults: HashMap::new(),
            asset_multipliers: AssetMultipliers::default(),
            timing_rules: TimingRules::default(),
        }
    }
}

impl ScoreConfig {
    /// Load from `$SCORE_CONFIG_PATH` or `config/score.toml`.
    pub fn load_default() -> Result<Self> {
        let path = std::env::var(ENV_SCORE_CONFIG_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_SCORE_CONFIG_PATH));
        Self::load_from_file(&path)
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading score config from {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("parsing score config {}", path.display()))
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let cfg: ScoreConfig = toml::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject configurations the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        self.ensure_finite()?;
        if !(0.0..=100.0).contains(&self.baseline) {
            bail!("baseline must be within 0..=100, got {}", self.baseline);
        }
        if self.clamp.min_per_second > self.clamp.max_per_second {
            bail!(
                "clamp.min_per_second ({}) exceeds clamp.max_per_second ({})",
                self.clamp.min_per_second,
                self.clamp.max_per_second
            );
        }
        if self.deduplication.window_seconds < 0.0 {
            bail!("deduplication.window_seconds must not be negative");
        }
        if self.logistic.scale < 0.0 {
            bail!("logistic.scale must not be negative");
        }
        if self.tick_interval_seconds <= 0.0 || self.heartbeat_interval_seconds <= 0.0 {
            bail!("tick and heartbeat intervals must be positive");
        }
        if self.hub.subscriber_capacity == 0 {
            bail!("hub.subscriber_capacity must be at least 1");
        }
        Ok(())
    }

    /// Every numeric knob must be a finite number; TOML accepts `nan` and `inf`.
    fn ensure_finite(&self) -> Result<()> {
        let mut fields: Vec<(String, f64)> = vec![
            ("baseline".into(), self.baseline),
            ("tick_interval_seconds".into(), self.tick_interval_seconds),
            ("heartbeat_interval_seconds".into(), self.heartbeat_interval_seconds),
            ("default_ttl_seconds".into(), self.default_ttl_seconds),
            ("ema.half_life_seconds".into(), self.ema.half_life_seconds),
            ("clamp.min_per_second".into(), self.clamp.min_per_second),
            ("clamp.max_per_second".into(), self.clamp.max_per_second),
            ("deduplication.window_seconds".into(), self.deduplication.window_seconds),
            ("logistic.mid".into(), self.logistic.mid),
            ("logistic.steepness".into(), self.logistic.steepness),
            ("logistic.scale".into(), self.logistic.scale),
            ("asset_multipliers.default".into(), self.asset_multipliers.default),
            (
                "timing_rules.breaking.default_half_life_seconds".into(),
                self.timing_rules.breaking.default_half_life_seconds,
            ),
        ];
        for (name, cat) in &self.category_defaults {
            fields.push((format!("category_defaults.{name}.weight"), cat.weight));
            if let Some(v) = cat.half_life_seconds {
                fields.push((format!("category_defaults.{name}.half_life_seconds"), v));
            }
            if let Some(v) = cat.max_age_seconds {
                fields.push((format!("category_defaults.{name}.max_age_seconds"), v));
            }
        }
        for (asset, v) in &self.asset_multipliers.per_asset {
            fields.push((format!("asset_multipliers.{asset}"), *v));
        }
        let planned = &self.timing_rules.planned;
        planned_fields("timing_rules.planned.default", &planned.default, &mut fields);
        for (name, cat) in &planned.categories {
            let prefix = format!("timing_rules.planned.categories.{name}");
            planned_fields(&prefix, &cat.rule, &mut fields);
            for (scenario, rule) in &cat.scenarios {
                planned_fields(&format!("{prefix}.scenarios.{scenario}"), rule, &mut fields);
            }
        }

        match fields.into_iter().find(|(_, v)| !v.is_finite()) {
            Some((name, v)) => bail!("{name} must be a finite number, got {v}"),
            None => Ok(()),
        }
    }

    /// `alpha = 1 - exp(-ln2 / half_life)`; no smoothing for non-positive half-life.
    pub fn ema_alpha(&self) -> f64 {
        let half_life = self.ema.half_life_seconds;
        if half_life <= 0.0 {
            return 1.0;
        }
        1.0 - (-std::f64::consts::LN_2 / half_life).exp()
    }

    pub fn category(&self, name: &str) -> Option<&CategoryConfig> {
        self.category_defaults.get(name)
    }

    pub fn category_weight(&self, name: &str) -> f64 {
        self.category(name).map(|c| c.weight).unwrap_or(1.0)
    }

    pub fn category_half_life(&self, name: &str) -> f64 {
        self.category(name)
            .and_then(|c| c.half_life_seconds)
            .unwrap_or(self.timing_rules.breaking.default_half_life_seconds)
    }

    pub fn category_timing(&self, name: &str) -> TimingKind {
        self.category(name).map(|c| c.timing).unwrap_or_default()
    }

    /// Event TTL → category max-age → global default.
    pub fn ttl_for(&self, event: &RiskEvent) -> f64 {
        event
            .meta
            .ttl()
            .or_else(|| self.category(&event.category).and_then(|c| c.max_age_seconds))
            .unwrap_or(self.default_ttl_seconds)
    }
}
