// tests/metrics.rs
use std::sync::Arc;

use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use once_cell::sync::OnceCell;
use tower::ServiceExt;

use market_trust_score::api::{create_router, AppState};
use market_trust_score::config::ScoreConfig;
use market_trust_score::event::EventMeta;
use market_trust_score::metrics::Metrics;
use market_trust_score::runtime::Runtime;

// The recorder is process-global; install it once for this test binary.
fn metrics() -> &'static Metrics {
    static M: OnceCell<Metrics> = OnceCell::new();
    M.get_or_init(|| Metrics::init().expect("install recorder"))
}

fn build_app(rt: Arc<Runtime>) -> Router {
    create_router(AppState::new(rt)).merge(metrics().router())
}

#[tokio::test]
async fn metrics_endpoint_contains_engine_series() {
    let rt = Arc::new(Runtime::start(Arc::new(ScoreConfig::default()), Vec::new()));
    let app = build_app(Arc::clone(&rt));

    rt.router()
        .emit("Feed", "EXCHANGE_OUTAGE", "Halt", 70, EventMeta::default(), None);
    rt.router()
        .emit("Feed", "EXCHANGE_OUTAGE", "Halt", 70, EventMeta::default(), None);

    let resp = app
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    // axum::body::to_bytes requires an explicit limit
    let body = body::to_bytes(resp.into_body(), 1_048_576).await.unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();

    for needle in [
        "score_events_accepted_total",
        "score_events_duplicate_total",
        "score_current",
        "score_raw",
        "score_active_events",
    ] {
        assert!(
            text.contains(needle),
            "metrics exposition missing '{needle}'\n{text}"
        );
    }

    rt.stop().await;
}
