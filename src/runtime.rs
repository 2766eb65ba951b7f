//! Process-level wiring: one service, its loops and the producers, all
//! stopped together through a shared shutdown signal.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::ScoreConfig;
use crate::intake::EventRouter;
use crate::producers::{spawn_producer, Producer};
use crate::service::{spawn_heartbeat_loop, spawn_score_loop, ScoreService};

/// Cloneable receiver side of the shutdown signal.
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once shutdown is requested or the sender is gone.
    pub async fn cancelled(&mut self) {
        // Err means the sender was dropped; treat it as a shutdown too.
        let _ = self.rx.wait_for(|stop| *stop).await;
    }
}

/// Create a linked trigger/listener pair.
pub fn shutdown_channel() -> (watch::Sender<bool>, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (tx, Shutdown { rx })
}

#[derive(Debug)]
pub struct Runtime {
    service: Arc<ScoreService>,
    router: EventRouter,
    shutdown_tx: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Runtime {
    /// Spawn the score loop, heartbeat loop and one task per producer.
    /// Must be called inside a Tokio runtime.
    pub fn start(config: Arc<ScoreConfig>, producers: Vec<Arc<dyn Producer>>) -> Self {
        let service = Arc::new(ScoreService::new(config));
        let router = EventRouter::new(Arc::clone(&service));
        let (shutdown_tx, shutdown) = shutdown_channel();

        let mut tasks = vec![
            spawn_score_loop(Arc::clone(&service), shutdown.clone()),
            spawn_heartbeat_loop(Arc::clone(&service), shutdown.clone()),
        ];
        for producer in producers {
            info!(target: "producer", name = producer.name(), "starting producer");
            tasks.push(spawn_producer(producer, router.clone(), shutdown.clone()));
        }

        Self {
            service,
            router,
            shutdown_tx,
            tasks: Mutex::new(tasks),
        }
    }

    pub fn service(&self) -> &Arc<ScoreService> {
        &self.service
    }

    pub fn router(&self) -> &EventRouter {
        &self.router
    }

    pub fn shutdown_signal(&self) -> Shutdown {
        Shutdown {
            rx: self.shutdown_tx.subscribe(),
        }
    }

    /// Signal shutdown, close subscribers and wait for every task.
    pub async fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
        self.service.hub().close_all();
        let tasks: Vec<_> = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "background task ended abnormally");
            }
        }
        info!("runtime stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cancelled_resolves_on_send_and_on_drop() {
        let (tx, mut a) = shutdown_channel();
        let mut b = a.clone();
        assert!(!a.is_cancelled());
        tx.send(true).unwrap();
        a.cancelled().await;
        assert!(b.is_cancelled());
        b.cancelled().await;

        let (tx, mut c) = shutdown_channel();
        drop(tx);
        c.cancelled().await;
    }

    #[tokio::test]
    async fn start_and_stop() {
        let rt = Runtime::start(Arc::new(ScoreConfig::default()), Vec::new());
        let mut sub = rt.service().subscribe();
        assert!(sub.recv().await.is_some());
        rt.stop().await;
        assert!(rt.shutdown_signal().is_cancelled());
    }
}
