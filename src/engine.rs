//! # Score Engine
//! Owns the event tables and the smoother behind a single mutex.
//!
//! Every operation (`add_event`, `tick`, `state`) takes the lock once, does
//! O(live events) work with no I/O and releases it. A tick reflects whatever
//! is in the table at the instant it acquires the lock.

use std::cmp::Ordering;
use std::sync::Arc;

use metrics::{counter, gauge};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::config::ScoreConfig;
use crate::contribution;
use crate::event::{now_ts, ActiveContribution, RiskEvent, ScoreState};
use crate::smoothing::ScoreSmoother;
use crate::store::{Admission, EventTable};

/// Contributions at or below this are treated as zero when pruning.
const PENALTY_EPSILON: f64 = 1e-6;

#[derive(Debug)]
struct EngineState {
    table: EventTable,
    smoother: ScoreSmoother,
    active: Vec<ActiveContribution>,
    raw_score: f64,
    updated_at: f64,
}

/// Thread-safe scoring engine shared via `Arc`.
#[derive(Debug)]
pub struct ScoreEngine {
    config: Arc<ScoreConfig>,
    state: Mutex<EngineState>,
}

impl ScoreEngine {
    pub fn new(config: Arc<ScoreConfig>) -> Self {
        let state = EngineState {
            table: EventTable::new(),
            smoother: ScoreSmoother::from_config(&config),
            active: Vec::new(),
            raw_score: config.baseline,
            updated_at: now_ts(),
        };
        Self {
            config,
            state: Mutex::new(state),
        }
    }

    pub fn config(&self) -> &ScoreConfig {
        &self.config
    }

    /// Add an event at the current time. Returns `true` when newly accepted.
    pub fn add_event(&self, event: RiskEvent) -> bool {
        self.add_event_at(event, now_ts())
    }

    pub fn add_event_at(&self, event: RiskEvent, now: f64) -> bool {
        let key = event.dedup_key();
        let admission = {
            let mut st = self.state.lock();
            st.table.housekeep(now, &self.config);
            st.table
                .admit(event, now, self.config.deduplication.window_seconds)
        };

        match admission {
            Admission::Accepted => {
                counter!("score_events_accepted_total").increment(1);
                debug!(target: "engine", %key, "event stored");
            }
            Admission::Duplicate => {
                counter!("score_events_duplicate_total").increment(1);
                debug!(target: "engine", %key, "duplicate within dedup window");
            }
        }
        admission.is_accepted()
    }

    /// Recompute the score from the live table at the current time.
    pub fn tick(&self) -> ScoreState {
        self.tick_at(now_ts())
    }

    pub fn tick_at(&self, now: f64) -> ScoreState {
        let mut st = self.state.lock();
        let report = st.table.housekeep(now, &self.config);

        let mut scored: Vec<(ActiveContribution, f64)> = Vec::with_capacity(st.table.len());
        let mut total_penalty = 0.0;
        for (event, arrived) in st.table.iter() {
            let c = contribution::compute(event, now, &self.config);
            if !c.contribution.is_finite() {
                warn!(
                    target: "engine",
                    key = %event.dedup_key(),
                    "non-finite contribution skipped"
                );
                continue;
            }
            if c.contribution <= PENALTY_EPSILON && c.time_weight <= 0.0 {
                continue;
            }
            total_penalty += c.contribution;
            scored.push((c, arrived));
        }

        scored.sort_by(|(a, a_arrived), (b, b_arrived)| {
            b.contribution
                .partial_cmp(&a.contribution)
                .unwrap_or(Ordering::Equal)
                .then(a_arrived.partial_cmp(b_arrived).unwrap_or(Ordering::Equal))
        });

        let raw = (self.config.baseline - total_penalty).clamp(0.0, 100.0);
        let score = st.smoother.update(raw);
        let ema = st.smoother.ema();
        let stored = st.table.len();

        st.raw_score = raw;
        st.active = scored.into_iter().map(|(c, _)| c).collect();
        st.updated_at = now;

        if report.expired_events > 0 {
            counter!("score_events_expired_total").increment(report.expired_events as u64);
        }
        gauge!("score_current").set(score);
        gauge!("score_raw").set(raw);
        gauge!("score_ema").set(ema);
        gauge!("score_active_events").set(st.active.len() as f64);
        gauge!("score_stored_events").set(stored as f64);

        snapshot(&st)
    }

    /// Last computed state, without recomputing.
    pub fn state(&self) -> ScoreState {
        let st = self.state.lock();
        snapshot(&st)
    }

    /// Last raw (unsmoothed) score.
    pub fn raw_score(&self) -> f64 {
        self.state.lock().raw_score
    }

    /// Number of stored events (including ones outside their window).
    pub fn stored_events(&self) -> usize {
        self.state.lock().table.len()
    }
}

fn snapshot(st: &EngineState) -> ScoreState {
    ScoreState {
        score: round2(st.smoother.current()),
        updated_at: st.updated_at,
        active: st.active.clone(),
    }
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}
