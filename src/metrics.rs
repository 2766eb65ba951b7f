use anyhow::{Context, Result};
use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the global Prometheus recorder. Fails if one is already installed.
    pub fn init() -> Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("prometheus: install recorder")?;
        describe_all();
        Ok(Self { handle })
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}

fn describe_all() {
    describe_counter!("score_events_accepted_total", "Events newly accepted by the engine.");
    describe_counter!(
        "score_events_duplicate_total",
        "Events rejected as duplicates within the dedup window."
    );
    describe_counter!("score_events_expired_total", "Events purged after their TTL.");
    describe_gauge!("score_current", "Published (smoothed) trust score.");
    describe_gauge!("score_raw", "Unsmoothed score from the last tick.");
    describe_gauge!("score_ema", "EMA state from the last tick.");
    describe_gauge!("score_active_events", "Events contributing on the last tick.");
    describe_gauge!("score_stored_events", "Events currently stored.");
    describe_counter!("hub_dropped_total", "Messages evicted from full subscriber queues.");
    describe_gauge!("hub_subscribers", "Connected subscribers.");
    describe_counter!("inference_events_total", "Social posts turned into events.");
    describe_counter!("inference_dropped_total", "Classified posts dropped by gating.");
    describe_counter!("inference_errors_total", "Reasoner call failures.");
    describe_counter!("social_inbox_full_total", "Social posts dropped on a full inbox.");
}
