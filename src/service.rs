//! Score service: glues the engine to the hub and runs the periodic loops.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::ScoreConfig;
use crate::engine::ScoreEngine;
use crate::event::{now_ts, ScoreState};
use crate::hub::{DistributionHub, HubMessage, Subscription};
use crate::runtime::Shutdown;

#[derive(Debug)]
pub struct ScoreService {
    engine: Arc<ScoreEngine>,
    hub: DistributionHub,
}

impl ScoreService {
    pub fn new(config: Arc<ScoreConfig>) -> Self {
        let hub = DistributionHub::new(config.hub.subscriber_capacity);
        Self {
            engine: Arc::new(ScoreEngine::new(config)),
            hub,
        }
    }

    pub fn engine(&self) -> &Arc<ScoreEngine> {
        &self.engine
    }

    pub fn hub(&self) -> &DistributionHub {
        &self.hub
    }

    pub fn config(&self) -> &ScoreConfig {
        self.engine.config()
    }

    /// Tick the engine and fan the new state out to every subscriber.
    pub fn recompute_and_publish(&self) -> ScoreState {
        let state = self.engine.tick();
        self.hub.publish(HubMessage::score_update(state.clone()));
        state
    }

    /// New subscriber, pre-loaded with the current state. The snapshot is
    /// taken under the hub lock so no concurrent publish is missed.
    pub fn subscribe(&self) -> Subscription {
        let engine = &self.engine;
        self.hub
            .subscribe_with(|| Some(HubMessage::score_update(engine.state())))
    }

    pub fn publish_heartbeat(&self) {
        self.hub.publish(HubMessage::Heartbeat { ts: now_ts() });
    }

    pub fn current(&self) -> ScoreState {
        self.engine.state()
    }
}

fn seconds(secs: f64) -> Duration {
    Duration::from_secs_f64(secs.max(0.001))
}

/// Recompute every `tick_interval_seconds` until shutdown.
pub fn spawn_score_loop(service: Arc<ScoreService>, mut shutdown: Shutdown) -> JoinHandle<()> {
    let period = seconds(service.config().tick_interval_seconds);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(target: "engine", period_ms = period.as_millis() as u64, "score loop started");
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let state = service.recompute_and_publish();
                    debug!(target: "engine", score = state.score, active = state.active.len(), "tick");
                }
                _ = shutdown.cancelled() => break,
            }
        }
        info!(target: "engine", "score loop stopped");
    })
}

/// Heartbeat every `heartbeat_interval_seconds` until shutdown.
pub fn spawn_heartbeat_loop(service: Arc<ScoreService>, mut shutdown: Shutdown) -> JoinHandle<()> {
    let period = seconds(service.config().heartbeat_interval_seconds);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        // first tick fires immediately; subscribers already have the state
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => service.publish_heartbeat(),
                _ = shutdown.cancelled() => break,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscriber_starts_with_current_state() {
        let svc = ScoreService::new(Arc::new(ScoreConfig::default()));
        let mut sub = svc.subscribe();
        match sub.try_recv() {
            Some(HubMessage::ScoreUpdate { payload }) => assert_eq!(payload.score, 95.0),
            other => panic!("expected score_update, got {other:?}"),
        }
        assert!(sub.try_recv().is_none());
    }

    #[test]
    fn recompute_reaches_subscribers() {
        let svc = ScoreService::new(Arc::new(ScoreConfig::default()));
        let mut sub = svc.subscribe();
        sub.try_recv();
        svc.recompute_and_publish();
        svc.publish_heartbeat();
        assert!(matches!(sub.try_recv(), Some(HubMessage::ScoreUpdate { .. })));
        assert!(matches!(sub.try_recv(), Some(HubMessage::Heartbeat { .. })));
    }
}
