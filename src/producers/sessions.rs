// src/producers/sessions.rs
//! Trading-session producer: emits a planned event around each configured
//! session open so the score dips ahead of, and recovers after, known
//! liquidity transitions.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Datelike, Days, NaiveDate, NaiveTime, TimeZone};
use chrono_tz::Tz;
use parking_lot::Mutex;
use serde::Deserialize;
use tracing::debug;

use crate::event::{now_ts, EventMeta};
use crate::intake::EventRouter;
use crate::producers::{Backoff, Producer};

pub const DEFAULT_SESSIONS_CONFIG_PATH: &str = "config/sessions.toml";
pub const ENV_SESSIONS_CONFIG_PATH: &str = "SESSIONS_CONFIG_PATH";

const SOURCE: &str = "SessionWatcher";
const POLL_EVERY: Duration = Duration::from_secs(30);
/// Same session occurrence is not re-emitted within this many seconds.
const REEMIT_SUPPRESS_SECS: f64 = 300.0;
/// Extra lifetime past the post window.
const TTL_SLACK_SECS: f64 = 900.0;

fn default_timezone() -> String {
    "Europe/Paris".to_string()
}
fn default_category() -> String {
    "SESSION_EVENT".to_string()
}
fn default_weekdays() -> Vec<u32> {
    vec![1, 2, 3, 4, 5]
}
fn default_time() -> String {
    "08:00".to_string()
}
fn default_severity() -> i64 {
    20
}
fn default_window_minutes() -> u32 {
    15
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionsFile {
    /// IANA zone of the session clocks, e.g. "America/New_York". A session
    /// may name its own zone.
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default)]
    pub sessions: Vec<SessionEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionEntry {
    pub name: String,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub timezone: Option<String>,
    /// ISO weekdays, Monday = 1 .. Sunday = 7.
    #[serde(default = "default_weekdays")]
    pub weekdays: Vec<u32>,
    /// Local "HH:MM".
    #[serde(default = "default_time")]
    pub time: String,
    #[serde(default = "default_severity")]
    pub severity: i64,
    #[serde(default)]
    pub scenario: Option<String>,
    #[serde(default = "default_window_minutes")]
    pub pre_window_minutes: u32,
    #[serde(default = "default_window_minutes")]
    pub post_window_minutes: u32,
}

/// A validated session.
#[derive(Debug, Clone)]
pub struct Session {
    pub name: String,
    pub category: String,
    pub title: String,
    pub weekdays: Vec<u32>,
    pub time: NaiveTime,
    pub tz: Tz,
    pub severity: i64,
    pub scenario: Option<String>,
    pub pre_seconds: f64,
    pub post_seconds: f64,
}

fn parse_tz(name: &str) -> Result<Tz> {
    name.trim()
        .parse::<Tz>()
        .map_err(|e| anyhow!("unknown timezone {name:?}: {e}"))
}

impl Session {
    /// Validate an entry; `default_tz` applies when it names no zone.
    pub fn from_entry(e: SessionEntry, default_tz: Tz) -> Result<Self> {
        let tz = match e.timezone.as_deref() {
            Some(name) => parse_tz(name).with_context(|| format!("session `{}`", e.name))?,
            None => default_tz,
        };
        let time = NaiveTime::parse_from_str(e.time.trim(), "%H:%M")
            .with_context(|| format!("session `{}`: bad time {:?}", e.name, e.time))?;
        if let Some(bad) = e.weekdays.iter().find(|d| !(1..=7).contains(*d)) {
            return Err(anyhow!("session `{}`: weekday {bad} outside 1..=7", e.name));
        }
        Ok(Self {
            title: e.title.unwrap_or_else(|| e.name.clone()),
            name: e.name,
            category: e.category,
            weekdays: e.weekdays,
            time,
            tz,
            severity: e.severity,
            scenario: e.scenario,
            pre_seconds: f64::from(e.pre_window_minutes) * 60.0,
            post_seconds: f64::from(e.post_window_minutes) * 60.0,
        })
    }

    /// Whether `scheduled_ts - now` lies within `[-post, pre]`.
    pub fn in_window(&self, scheduled_ts: f64, now: f64) -> bool {
        let dt = scheduled_ts - now;
        dt <= self.pre_seconds && dt >= -self.post_seconds
    }

    fn meta(&self, scheduled_ts: f64) -> EventMeta {
        EventMeta {
            scheduled_ts: Some(scheduled_ts),
            scenario: self.scenario.clone(),
            pre_window_seconds: Some(self.pre_seconds),
            post_window_seconds: Some(self.post_seconds),
            ttl_seconds: Some(self.pre_seconds + self.post_seconds + TTL_SLACK_SECS),
            ..Default::default()
        }
    }
}

pub struct SessionProducer {
    sessions: Vec<Session>,
    emitted: Mutex<HashMap<String, f64>>,
}

impl SessionProducer {
    pub fn new(sessions: Vec<Session>) -> Self {
        Self {
            sessions,
            emitted: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let file: SessionsFile = toml::from_str(s).context("parsing sessions config")?;
        let tz = parse_tz(&file.timezone)?;
        let sessions = file
            .sessions
            .into_iter()
            .map(|entry| Session::from_entry(entry, tz))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(sessions))
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading sessions config from {}", path.display()))?;
        Self::from_toml_str(&content)
    }

    /// Load from `$SESSIONS_CONFIG_PATH` or `config/sessions.toml`.
    pub fn load_default() -> Result<Self> {
        let path = std::env::var(ENV_SESSIONS_CONFIG_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_SESSIONS_CONFIG_PATH));
        Self::load_from_file(&path)
    }

    pub fn sessions(&self) -> &[Session] {
        &self.sessions
    }

    /// Scheduled instants for yesterday, today and tomorrow (local calendar)
    /// that fall on one of the session's weekdays. A local time skipped by a
    /// DST jump has no instant and is dropped; a repeated one takes the earlier.
    pub fn candidates(&self, session: &Session, now: f64) -> Vec<(NaiveDate, f64)> {
        let Some(now_utc) = DateTime::from_timestamp(now.floor() as i64, 0) else {
            return Vec::new();
        };
        let today = now_utc.with_timezone(&session.tz).date_naive();
        let days = [
            today.checked_sub_days(Days::new(1)),
            Some(today),
            today.checked_add_days(Days::new(1)),
        ];

        days.into_iter()
            .flatten()
            .filter(|d| session.weekdays.contains(&d.weekday().number_from_monday()))
            .filter_map(|d| {
                let local = d.and_time(session.time);
                session
                    .tz
                    .from_local_datetime(&local)
                    .earliest()
                    .map(|dt| (d, dt.timestamp() as f64))
            })
            .collect()
    }

    /// Occurrences due at `now`, marking them as emitted.
    fn due_at(&self, now: f64) -> Vec<(&Session, f64)> {
        let mut emitted = self.emitted.lock();
        emitted.retain(|_, at| now - *at < REEMIT_SUPPRESS_SECS);

        let mut due = Vec::new();
        for session in &self.sessions {
            for (date, scheduled) in self.candidates(session, now) {
                if !session.in_window(scheduled, now) {
                    continue;
                }
                let key = format!("{}|{}", session.name, date);
                if emitted.contains_key(&key) {
                    continue;
                }
                emitted.insert(key, now);
                due.push((session, scheduled));
            }
        }
        due
    }

    /// One poll at an explicit `now`. Returns accepted count.
    pub fn poll_at(&self, router: &EventRouter, now: f64) -> usize {
        let mut accepted = 0;
        for (session, scheduled) in self.due_at(now) {
            debug!(
                target: "producer",
                session = %session.name,
                scheduled_ts = scheduled,
                "session window open"
            );
            if router.emit(
                SOURCE,
                &session.category,
                &session.title,
                session.severity,
                session.meta(scheduled),
                Some(scheduled),
            ) {
                accepted += 1;
            }
        }
        accepted
    }
}

#[async_trait::async_trait]
impl Producer for SessionProducer {
    fn name(&self) -> &'static str {
        "sessions"
    }

    async fn poll(&self, router: &EventRouter) -> Result<usize> {
        Ok(self.poll_at(router, now_ts()))
    }

    fn backoff(&self) -> Backoff {
        Backoff::fixed(POLL_EVERY)
    }
}
