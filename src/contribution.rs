//! # Contribution Calculator
//! Turns one event into its current signed penalty:
//! `logistic(severity) * category weight * time weight * asset multiplier
//!  * urgency factor - score adjustment`.

use crate::config::{LogisticConfig, ScoreConfig};
use crate::decay;
use crate::event::{ActiveContribution, RiskEvent};

/// Severity → points on a logistic curve, bounded in `[0, scale]`.
pub fn severity_points(severity: f64, cfg: &LogisticConfig) -> f64 {
    let s = severity.clamp(0.0, 100.0);
    let logistic = 1.0 / (1.0 + (-cfg.steepness * (s - cfg.mid)).exp());
    logistic * cfg.scale
}

/// Worst-case asset: the maximum multiplier across the listed currencies.
pub fn asset_multiplier(event: &RiskEvent, cfg: &ScoreConfig) -> f64 {
    let table = &cfg.asset_multipliers;
    event
        .meta
        .currencies
        .iter()
        .map(|c| table.for_asset(c))
        .fold(None, |acc: Option<f64>, m| Some(acc.map_or(m, |a| a.max(m))))
        .unwrap_or(table.default)
}

/// `0.75 + urgency/100 * 0.5`, i.e. `[0.75, 1.25]` for urgency in `[0, 100]`.
pub fn urgency_factor(urgency: f64) -> f64 {
    0.75 + (urgency / 100.0) * 0.5
}

/// Compute the contribution of `event` at `now`.
pub fn compute(event: &RiskEvent, now: f64, cfg: &ScoreConfig) -> ActiveContribution {
    let points = severity_points(f64::from(event.severity), &cfg.logistic);
    let weight = cfg.category_weight(&event.category);
    let asset_multiplier = asset_multiplier(event, cfg);
    let time_weight = decay::time_weight(event, now, cfg);

    let mut value = if time_weight <= 0.0 {
        0.0
    } else {
        points * weight * time_weight * asset_multiplier
    };
    value *= urgency_factor(event.meta.urgency_or_default());

    let penalty = value - event.meta.adjustment_points();

    ActiveContribution {
        event: event.clone(),
        contribution: penalty,
        weight,
        time_weight,
        asset_multiplier,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventMeta;

    #[test]
    fn logistic_is_monotone_and_bounded() {
        let cfg = LogisticConfig::default();
        let mut prev = -1.0;
        for s in 0..=100 {
            let p = severity_points(f64::from(s), &cfg);
            assert!(p >= prev, "not monotone at {s}");
            assert!((0.0..=cfg.scale).contains(&p));
            prev = p;
        }
        assert!((severity_points(50.0, &cfg) - 50.0).abs() < 1e-9);
        // out-of-range input is clamped
        assert_eq!(severity_points(250.0, &cfg), severity_points(100.0, &cfg));
    }

    #[test]
    fn asset_multiplier_takes_worst_case() {
        let cfg = ScoreConfig::from_toml_str(
            "[asset_multipliers]\ndefault = 0.9\nBTC = 1.1\nETH = 1.3\n",
        )
        .unwrap();
        let mut ev = RiskEvent::new("s", "c", "t", 0.0, 50);
        assert_eq!(asset_multiplier(&ev, &cfg), 0.9);
        ev.meta.currencies = vec!["BTC".into(), "ETH".into(), "XRP".into()];
        assert_eq!(asset_multiplier(&ev, &cfg), 1.3);
        ev.meta.currencies = vec!["XRP".into()];
        assert_eq!(asset_multiplier(&ev, &cfg), 0.9);
    }

    #[test]
    fn urgency_factor_range() {
        assert_eq!(urgency_factor(0.0), 0.75);
        assert_eq!(urgency_factor(50.0), 1.0);
        assert_eq!(urgency_factor(100.0), 1.25);
    }

    #[test]
    fn adjustment_is_subtracted_even_when_decayed_out() {
        let cfg = ScoreConfig::default();
        let meta = EventMeta {
            scheduled_ts: Some(10_000.0),
            score_adjustment_points: Some(4.0),
            ..Default::default()
        };
        let ev = RiskEvent::new("s", "c", "t", 0.0, 90).with_meta(meta);
        let c = compute(&ev, 0.0, &cfg);
        assert_eq!(c.time_weight, 0.0);
        assert_eq!(c.contribution, -4.0);
    }

    #[test]
    fn fresh_breaking_event_full_weight() {
        let cfg = ScoreConfig::default();
        let ev = RiskEvent::new("s", "c", "t", 1_000.0, 50);
        let c = compute(&ev, 1_000.0, &cfg);
        assert_eq!(c.time_weight, 1.0);
        assert_eq!(c.weight, 1.0);
        assert_eq!(c.asset_multiplier, 1.0);
        // severity 50 → 50 points, urgency default → factor 1.0
        assert!((c.contribution - 50.0).abs() < 1e-9);
    }
}
