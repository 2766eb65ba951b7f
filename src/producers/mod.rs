// src/producers/mod.rs
//! Event producers: anything that polls a source and feeds the intake router.

pub mod sessions;
pub mod social;

use std::sync::Arc;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use once_cell::sync::OnceCell;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::event::now_ts;
use crate::intake::EventRouter;
use crate::runtime::Shutdown;

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("producer_polls_total", "Producer poll cycles.");
        describe_counter!("producer_events_total", "Events emitted by producers.");
        describe_counter!(
            "producer_errors_total",
            "Producer poll failures (retried with backoff)."
        );
        describe_gauge!("producer_last_poll_ts", "Unix ts of the last successful poll.");
    });
}

/// Retry cadence: `initial` after success, multiplied per consecutive failure
/// and capped at `max`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    pub initial: Duration,
    pub multiplier: f64,
    pub max: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, multiplier: f64, max: Duration) -> Self {
        Self {
            initial,
            multiplier,
            max,
        }
    }

    /// Fixed cadence, failures do not slow it down.
    pub fn fixed(every: Duration) -> Self {
        Self::new(every, 1.0, every)
    }

    /// Delay before the next poll given the previous delay and outcome.
    pub fn next_delay(&self, previous: Duration, succeeded: bool) -> Duration {
        if succeeded {
            return self.initial;
        }
        let grown = previous.as_secs_f64() * self.multiplier.max(1.0);
        Duration::from_secs_f64(grown.min(self.max.as_secs_f64()))
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(30), 2.0, Duration::from_secs(300))
    }
}

#[async_trait::async_trait]
pub trait Producer: Send + Sync {
    fn name(&self) -> &'static str;

    /// One acquisition cycle. Returns how many events were accepted.
    async fn poll(&self, router: &EventRouter) -> anyhow::Result<usize>;

    fn backoff(&self) -> Backoff {
        Backoff::default()
    }
}

/// Drive `producer` until shutdown. Failures are logged and retried, never fatal.
pub fn spawn_producer(
    producer: Arc<dyn Producer>,
    router: EventRouter,
    mut shutdown: Shutdown,
) -> JoinHandle<()> {
    ensure_metrics_described();
    tokio::spawn(async move {
        let name = producer.name();
        let backoff = producer.backoff();
        let mut delay = backoff.initial;
        loop {
            if shutdown.is_cancelled() {
                break;
            }
            counter!("producer_polls_total", "producer" => name).increment(1);
            let ok = match producer.poll(&router).await {
                Ok(accepted) => {
                    if accepted > 0 {
                        counter!("producer_events_total", "producer" => name)
                            .increment(accepted as u64);
                    }
                    gauge!("producer_last_poll_ts", "producer" => name).set(now_ts());
                    debug!(target: "producer", producer = name, accepted, "poll ok");
                    true
                }
                Err(e) => {
                    counter!("producer_errors_total", "producer" => name).increment(1);
                    warn!(target: "producer", producer = name, error = %format!("{e:#}"), "poll failed");
                    false
                }
            };
            delay = backoff.next_delay(delay, ok);

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.cancelled() => break,
            }
        }
        info!(target: "producer", producer = name, "producer stopped");
    })
}
