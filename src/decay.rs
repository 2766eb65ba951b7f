//! # Decay Model
//! Pure time-weight functions. No I/O, no clock: callers pass `now`.
//!
//! - Breaking: exponential half-life decay anchored at the event timestamp.
//! - Planned: a peak of amplitude `boost` centred on `scheduled_ts`, zero
//!   outside `[scheduled_ts - pre, scheduled_ts + post]`.

use crate::config::{PlannedRule, ScoreConfig};
use crate::event::{nonzero, PlannedOverrides, RiskEvent, Timing};

const DEFAULT_PRE_SECS: f64 = 0.0;
const DEFAULT_POST_SECS: f64 = 0.0;
const DEFAULT_TAU_SECS: f64 = 1.0;
const DEFAULT_BOOST: f64 = 1.0;

/// Fully resolved planned-window parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlannedWindow {
    pub pre: f64,
    pub post: f64,
    pub tau: f64,
    pub boost: f64,
}

impl Default for PlannedWindow {
    fn default() -> Self {
        Self {
            pre: DEFAULT_PRE_SECS,
            post: DEFAULT_POST_SECS,
            tau: DEFAULT_TAU_SECS,
            boost: DEFAULT_BOOST,
        }
    }
}

/// `0.5^(age / half_life)`, with negative ages treated as zero.
pub fn breaking_weight(age_secs: f64, half_life: f64) -> f64 {
    if half_life <= 0.0 {
        return 1.0;
    }
    let age = age_secs.max(0.0);
    0.5f64.powf(age / half_life)
}

/// Weight at `dt = scheduled_ts - now` (positive before the instant).
pub fn planned_weight(dt: f64, window: &PlannedWindow) -> f64 {
    if dt > 0.0 && dt > window.pre {
        return 0.0;
    }
    if dt < 0.0 && dt.abs() > window.post {
        return 0.0;
    }
    if window.tau <= 0.0 {
        return window.boost;
    }
    window.boost * (-dt.abs() / window.tau).exp()
}

/// Resolve each field independently: event > scenario > category > global default.
/// Zeros on the scenario and category rules defer downward; the global default
/// is taken as written.
pub fn resolve_planned_window(
    overrides: &PlannedOverrides,
    scenario_rule: Option<&PlannedRule>,
    category_rule: Option<&PlannedRule>,
    default_rule: &PlannedRule,
) -> PlannedWindow {
    let pick = |event: Option<f64>, field: fn(&PlannedRule) -> Option<f64>, fallback: f64| {
        event
            .or_else(|| nonzero(scenario_rule.and_then(field)))
            .or_else(|| nonzero(category_rule.and_then(field)))
            .or_else(|| field(default_rule))
            .unwrap_or(fallback)
    };
    PlannedWindow {
        pre: pick(overrides.pre_seconds, |r| r.pre_seconds, DEFAULT_PRE_SECS),
        post: pick(overrides.post_seconds, |r| r.post_seconds, DEFAULT_POST_SECS),
        tau: pick(overrides.tau_seconds, |r| r.tau_seconds, DEFAULT_TAU_SECS),
        boost: pick(overrides.boost, |r| r.boost, DEFAULT_BOOST),
    }
}

/// Time weight of `event` at `now` under the configured rules.
pub fn time_weight(event: &RiskEvent, now: f64, cfg: &ScoreConfig) -> f64 {
    match event.meta.timing() {
        Timing::Breaking { half_life } => {
            let half_life = half_life.unwrap_or_else(|| cfg.category_half_life(&event.category));
            breaking_weight(now - event.ts, half_life)
        }
        Timing::Planned {
            scheduled_ts,
            scenario,
            overrides,
        } => {
            let planned = &cfg.timing_rules.planned;
            let category_rule = planned.categories.get(&event.category);
            let scenario_rule = scenario
                .as_deref()
                .and_then(|name| category_rule.and_then(|c| c.scenarios.get(name)));
            let window = resolve_planned_window(
                &overrides,
                scenario_rule,
                category_rule.map(|c| &c.rule),
                &planned.default,
            );
            planned_weight(scheduled_ts - now, &window)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn half_life_halves_weight() {
        for hl in [1.0, 60.0, 900.0, 12_345.0] {
            let w0 = breaking_weight(0.0, hl);
            let w1 = breaking_weight(hl, hl);
            assert_eq!(w0, 1.0);
            assert!((w1 - 0.5 * w0).abs() < 1e-12, "hl={hl}");
        }
    }

    #[test]
    fn future_events_are_not_amplified() {
        assert_eq!(breaking_weight(-500.0, 900.0), 1.0);
    }

    #[test]
    fn non_positive_half_life_is_flat() {
        assert_eq!(breaking_weight(10_000.0, 0.0), 1.0);
        assert_eq!(breaking_weight(10_000.0, -3.0), 1.0);
    }

    #[test]
    fn planned_window_edges() {
        let w = PlannedWindow {
            pre: 600.0,
            post: 300.0,
            tau: 120.0,
            boost: 1.5,
        };
        assert_eq!(planned_weight(0.0, &w), 1.5);
        assert!(planned_weight(600.0, &w) > 0.0);
        assert_eq!(planned_weight(600.5, &w), 0.0);
        assert!(planned_weight(-300.0, &w) > 0.0);
        assert_eq!(planned_weight(-300.5, &w), 0.0);
        // symmetric inside the window
        assert!((planned_weight(100.0, &w) - planned_weight(-100.0, &w)).abs() < 1e-12);
    }

    #[test]
    fn planned_flat_plateau_when_tau_non_positive() {
        let w = PlannedWindow {
            pre: 60.0,
            post: 60.0,
            tau: 0.0,
            boost: 0.8,
        };
        assert_eq!(planned_weight(59.0, &w), 0.8);
        assert_eq!(planned_weight(-59.0, &w), 0.8);
    }

    #[test]
    fn precedence_is_per_field() {
        let default_rule = PlannedRule {
            pre_seconds: Some(10.0),
            post_seconds: Some(10.0),
            tau_seconds: Some(10.0),
            boost: Some(1.0),
        };
        let category = PlannedRule {
            pre_seconds: Some(100.0),
            post_seconds: Some(100.0),
            ..Default::default()
        };
        let scenario = PlannedRule {
            pre_seconds: Some(1000.0),
            ..Default::default()
        };
        let overrides = PlannedOverrides {
            boost: Some(2.0),
            ..Default::default()
        };
        let w = resolve_planned_window(&overrides, Some(&scenario), Some(&category), &default_rule);
        assert_eq!(w.pre, 1000.0);
        assert_eq!(w.post, 100.0);
        assert_eq!(w.tau, 10.0);
        assert_eq!(w.boost, 2.0);

        let zeroed = PlannedRule {
            pre_seconds: Some(0.0),
            boost: Some(0.0),
            ..Default::default()
        };
        let w = resolve_planned_window(&PlannedOverrides::default(), Some(&zeroed), Some(&category), &default_rule);
        assert_eq!(w.pre, 100.0);
        assert_eq!(w.boost, 1.0);

        let bare = resolve_planned_window(&PlannedOverrides::default(), None, None, &PlannedRule::default());
        assert_eq!(bare, PlannedWindow::default());
    }
}
