// tests/engine_scenarios.rs
//
// End-to-end behaviour of the scoring engine with an explicit clock.
//
// Covered:
// - breaking event: full weight at t0, half weight one half-life later
// - planned event: peak curve inside the window, excluded outside it
// - duplicates: first record wins, re-accepted after the dedup window
// - per-tick rate clamp and [0, 100] bounds under random load
// - concurrent submissions of one key admit exactly one

use std::sync::{Arc, Barrier};
use std::thread;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use market_trust_score::config::ScoreConfig;
use market_trust_score::engine::ScoreEngine;
use market_trust_score::event::{EventMeta, RiskEvent};

const T0: f64 = 1_700_000_000.0;

fn engine() -> ScoreEngine {
    ScoreEngine::new(Arc::new(ScoreConfig::default()))
}

#[test]
fn scenario_a_breaking_event_halves_after_half_life() {
    let e = engine();
    let ev = RiskEvent::new("BinanceStatus", "EXCHANGE_OUTAGE", "Withdrawals paused", T0, 80);
    assert!(e.add_event_at(ev, T0));

    let st = e.tick_at(T0);
    assert_eq!(st.active.len(), 1);
    assert_eq!(st.active[0].time_weight, 1.0);
    assert_eq!(st.active[0].weight, 1.0);
    assert_eq!(st.active[0].asset_multiplier, 1.0);

    let st = e.tick_at(T0 + 900.0);
    assert_eq!(st.active.len(), 1);
    assert!((st.active[0].time_weight - 0.5).abs() < 1e-12);
}

#[test]
fn scenario_b_planned_event_window() {
    let e = engine();
    let meta = EventMeta {
        scheduled_ts: Some(T0 + 300.0),
        pre_window_seconds: Some(600.0),
        post_window_seconds: Some(600.0),
        tau_seconds: Some(120.0),
        ..Default::default()
    };
    let ev = RiskEvent::new("MacroCalendar", "MACRO_EVENT", "CPI release", T0, 70).with_meta(meta);
    assert!(e.add_event_at(ev, T0));

    let st = e.tick_at(T0);
    assert_eq!(st.active.len(), 1);
    let expected = (-300.0f64 / 120.0).exp();
    assert!((st.active[0].time_weight - expected).abs() < 1e-12);

    let st = e.tick_at(T0 + 1_500.0);
    assert!(st.active.is_empty(), "event outside its window must not be active");
    // still stored: only TTL removes it
    assert_eq!(e.stored_events(), 1);
}

#[test]
fn scenario_c_duplicate_keeps_first_severity() {
    let e = engine();
    let first = RiskEvent::new("Twitter", "SECURITY_INCIDENT", "Bridge exploit", T0, 90);
    let second = RiskEvent::new("Twitter", "SECURITY_INCIDENT", "Bridge exploit", T0 + 5.0, 20);
    assert!(e.add_event_at(first, T0));
    assert!(!e.add_event_at(second, T0 + 5.0));

    let st = e.tick_at(T0 + 5.0);
    assert_eq!(st.active.len(), 1);
    assert_eq!(st.active[0].event.severity, 90);
}

#[test]
fn duplicate_accepted_again_after_window() {
    let e = engine();
    let ev = || RiskEvent::new("Feed", "REGULATORY", "SEC filing", T0, 40);
    assert!(e.add_event_at(ev(), T0));
    assert!(!e.add_event_at(ev(), T0 + 10.0));
    // window is measured from the last sighting (T0 + 10)
    assert!(e.add_event_at(ev(), T0 + 311.0));
}

#[test]
fn score_moves_at_most_clamp_per_tick() {
    let cfg = ScoreConfig::default();
    let bound = cfg.clamp.min_per_second.abs().max(cfg.clamp.max_per_second.abs());
    let e = ScoreEngine::new(Arc::new(cfg));
    let mut rng = StdRng::seed_from_u64(7);

    let mut prev = e.state().score;
    let mut now = T0;
    for i in 0..400 {
        if rng.random_range(0..4) == 0 {
            let sev = rng.random_range(0..=100u8);
            e.add_event_at(RiskEvent::new("rng", "X", format!("ev{i}"), now, sev), now);
        }
        now += 1.0;
        let st = e.tick_at(now);
        // published score is rounded to 2 decimals
        assert!((st.score - prev).abs() <= bound + 0.01, "tick {i}: {prev} -> {}", st.score);
        prev = st.score;
    }
}

#[test]
fn score_stays_in_bounds_under_extreme_load() {
    let e = engine();
    let mut rng = StdRng::seed_from_u64(42);
    for i in 0..300 {
        let meta = EventMeta {
            urgency: Some(100.0),
            currencies: vec!["BTC".into()],
            score_adjustment_points: Some(rng.random_range(-500.0..500.0)),
            ..Default::default()
        };
        let ev = RiskEvent::new("flood", "X", format!("e{i}"), T0, 100).with_meta(meta);
        e.add_event_at(ev, T0);
    }
    for step in 0..200 {
        let st = e.tick_at(T0 + f64::from(step));
        assert!((0.0..=100.0).contains(&st.score));
        assert!((0.0..=100.0).contains(&e.raw_score()));
    }
}

#[test]
fn recovers_toward_baseline_after_expiry() {
    let e = engine();
    e.add_event_at(RiskEvent::new("s", "X", "big", T0, 100), T0);
    for step in 0..60 {
        e.tick_at(T0 + f64::from(step));
    }
    let low = e.state().score;
    assert!(low < 95.0);

    // past the default 3600s TTL the table empties and the score climbs back
    let mut now = T0 + 3_700.0;
    for _ in 0..600 {
        e.tick_at(now);
        now += 1.0;
    }
    assert_eq!(e.stored_events(), 0);
    assert!(e.state().score > low);
    assert!((e.state().score - 95.0).abs() < 0.5);
}

#[test]
fn concurrent_duplicates_admit_exactly_one() {
    const THREADS: usize = 16;
    let e = Arc::new(engine());
    let start = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|i| {
            let e = Arc::clone(&e);
            let start = Arc::clone(&start);
            thread::spawn(move || {
                let ev = RiskEvent::new("Feed", "EXCHANGE_OUTAGE", "Deposits halted", T0, 40 + i as u8);
                start.wait();
                e.add_event_at(ev, T0)
            })
        })
        .collect();

    let accepted = handles
        .into_iter()
        .map(|h| h.join().expect("submitter thread"))
        .filter(|ok| *ok)
        .count();
    assert_eq!(accepted, 1);
    assert_eq!(e.stored_events(), 1);
    assert_eq!(e.tick_at(T0).active.len(), 1);
}
