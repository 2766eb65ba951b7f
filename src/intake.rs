//! # Event Intake Router
//! The one entry point producers use. Builds a `RiskEvent`, hands it to the
//! engine and, when it is newly accepted, recomputes and publishes at once
//! instead of waiting for the next tick.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::TimingKind;
use crate::event::{now_ts, EventMeta, RiskEvent, Timing};
use crate::service::ScoreService;

#[derive(Debug, Clone)]
pub struct EventRouter {
    service: Arc<ScoreService>,
}

impl EventRouter {
    pub fn new(service: Arc<ScoreService>) -> Self {
        Self { service }
    }

    /// Build and submit an event. `ts` defaults to now; severity is clamped
    /// to `0..=100`. Returns `true` when newly accepted.
    pub fn emit(
        &self,
        source: &str,
        category: &str,
        title: &str,
        severity: i64,
        meta: EventMeta,
        ts: Option<f64>,
    ) -> bool {
        let severity = severity.clamp(0, 100) as u8;
        let ts = ts.unwrap_or_else(now_ts);
        let event = RiskEvent::new(source, category, title, ts, severity).with_meta(meta);
        self.emit_event(event)
    }

    /// Submit an already-built event.
    pub fn emit_event(&self, event: RiskEvent) -> bool {
        if matches!(event.meta.timing(), Timing::Breaking { .. })
            && self.service.config().category_timing(&event.category) == TimingKind::Planned
        {
            warn!(
                target: "intake",
                category = %event.category,
                title = %event.title,
                "planned category without scheduled_ts, decaying as breaking"
            );
        }

        let source = event.source.clone();
        let category = event.category.clone();
        let title = event.title.clone();
        let severity = event.severity;

        let accepted = self.service.engine().add_event(event);
        if accepted {
            info!(target: "intake", %source, %category, %title, severity, "event accepted");
            self.service.recompute_and_publish();
        } else {
            debug!(target: "intake", %source, %title, "duplicate ignored");
        }
        accepted
    }

    pub fn service(&self) -> &Arc<ScoreService> {
        &self.service
    }
}
