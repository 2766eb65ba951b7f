//! Market Trust Score: binary entrypoint.
//! Loads configuration, starts the scoring runtime and serves the Axum router.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use market_trust_score::api::{self, AppState};
use market_trust_score::classify::inference::{InferenceConfig, InferenceEngine};
use market_trust_score::classify::reasoner::build_reasoner_from_env;
use market_trust_score::metrics::Metrics;
use market_trust_score::producers::sessions::SessionProducer;
use market_trust_score::producers::social::{SocialProducer, DEFAULT_INBOX_CAPACITY};
use market_trust_score::producers::Producer;
use market_trust_score::{Runtime, ScoreConfig};

/// Compact logs filtered by `RUST_LOG`. `try_init` so a host-installed
/// subscriber is left alone.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("market_trust_score=info,warn"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .try_init();
}

/// Router plus the runtime behind it, so shutdown can stop the loops too.
struct TrustScoreService {
    router: Router,
    runtime: Arc<Runtime>,
}

#[shuttle_runtime::async_trait]
impl shuttle_runtime::Service for TrustScoreService {
    async fn bind(self, addr: SocketAddr) -> Result<(), shuttle_runtime::Error> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("binding {addr}"))?;
        api::serve(listener, self.router, self.runtime, shutdown_signal()).await?;
        Ok(())
    }
}

/// Ctrl+C, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "ctrl-c handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

#[shuttle_runtime::main]
async fn axum() -> Result<TrustScoreService, shuttle_runtime::Error> {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    // Recorder first so early counters are not lost.
    let metrics = match Metrics::init() {
        Ok(m) => Some(m),
        Err(e) => {
            warn!(error = %format!("{e:#}"), "metrics endpoint disabled");
            None
        }
    };

    let config = Arc::new(ScoreConfig::load_default().context("loading score config")?);
    info!(baseline = config.baseline, "score config loaded");

    let mut producers: Vec<Arc<dyn Producer>> = Vec::new();
    match SessionProducer::load_default() {
        Ok(p) => {
            info!(target: "producer", sessions = p.sessions().len(), "session producer configured");
            producers.push(Arc::new(p));
        }
        Err(e) => warn!(target: "producer", error = %format!("{e:#}"), "session producer disabled"),
    }

    let reasoner = build_reasoner_from_env().context("building reasoner")?;
    let inference = InferenceEngine::new(reasoner, InferenceConfig::default());
    let (social, inbox) = SocialProducer::new(inference, DEFAULT_INBOX_CAPACITY);
    producers.push(Arc::new(social));

    let runtime = Arc::new(Runtime::start(config, producers));
    let state = AppState::new(Arc::clone(&runtime)).with_social(inbox);
    let mut router = api::create_router(state);
    if let Some(metrics) = metrics {
        router = router.merge(metrics.router());
    }

    Ok(TrustScoreService { router, runtime })
}
