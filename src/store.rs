//! # Score Store
//! In-memory tables of live events keyed by `source|title`:
//! - `events`: the stored record (first accepted write within a dedup window wins);
//! - `arrivals`: when each key was last accepted;
//! - `recent`: dedup recency, refreshed by every sighting.
//!
//! Not synchronized on its own; `ScoreEngine` owns it behind one mutex so
//! check-then-act on the dedup and event tables stays atomic.

use std::collections::HashMap;

use crate::config::ScoreConfig;
use crate::event::RiskEvent;

/// Outcome of handing an event to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Accepted,
    /// Same key seen within the dedup window; recency refreshed, record untouched.
    Duplicate,
}

impl Admission {
    pub fn is_accepted(self) -> bool {
        matches!(self, Admission::Accepted)
    }
}

/// Counts removed by one housekeeping pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Housekeeping {
    pub expired_events: usize,
    pub stale_dedup_keys: usize,
}

#[derive(Debug, Default)]
pub struct EventTable {
    events: HashMap<String, RiskEvent>,
    arrivals: HashMap<String, f64>,
    recent: HashMap<String, f64>,
}

impl EventTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dedup check and insert as one step. Caller must hold the engine lock.
    pub fn admit(&mut self, event: RiskEvent, now: f64, dedup_window: f64) -> Admission {
        let key = event.dedup_key();
        if let Some(&last_seen) = self.recent.get(&key) {
            if now - last_seen < dedup_window {
                self.recent.insert(key, now);
                return Admission::Duplicate;
            }
        }

        self.arrivals.insert(key.clone(), now);
        self.recent.insert(key.clone(), now);
        self.events.insert(key, event);
        Admission::Accepted
    }

    /// Drop TTL-expired events and dedup entries older than the window.
    pub fn housekeep(&mut self, now: f64, cfg: &ScoreConfig) -> Housekeeping {
        let expired: Vec<String> = self
            .events
            .iter()
            .filter(|(_, ev)| now - ev.ts > cfg.ttl_for(ev))
            .map(|(k, _)| k.clone())
            .collect();
        for key in &expired {
            self.events.remove(key);
            self.arrivals.remove(key);
        }

        let window = cfg.deduplication.window_seconds;
        let before = self.recent.len();
        self.recent.retain(|_, seen| now - *seen <= window);

        Housekeeping {
            expired_events: expired.len(),
            stale_dedup_keys: before - self.recent.len(),
        }
    }

    /// Live events with their arrival time.
    pub fn iter(&self) -> impl Iterator<Item = (&RiskEvent, f64)> + '_ {
        self.events.iter().map(move |(key, ev)| {
            let arrived = self.arrivals.get(key).copied().unwrap_or(ev.ts);
            (ev, arrived)
        })
    }

    pub fn get(&self, key: &str) -> Option<&RiskEvent> {
        self.events.get(key)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn dedup_len(&self) -> usize {
        self.recent.len()
    }
}
