// src/api.rs
//! HTTP surface: health, current score, event intake and live streams.

use std::convert::Infallible;
use std::future::Future;
use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures_util::stream::{self, Stream};
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::{debug, info, warn};

use crate::classify::SocialPost;
use crate::event::{EventMeta, ScoreState};
use crate::hub::Subscription;
use crate::producers::social::SocialInbox;
use crate::runtime::Runtime;

#[derive(Clone)]
pub struct AppState {
    pub runtime: Arc<Runtime>,
    /// Present when the social producer is running.
    pub social: Option<SocialInbox>,
}

impl AppState {
    pub fn new(runtime: Arc<Runtime>) -> Self {
        Self {
            runtime,
            social: None,
        }
    }

    pub fn with_social(mut self, inbox: SocialInbox) -> Self {
        self.social = Some(inbox);
        self
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/version", get(version))
        .route("/api/score", get(score))
        .route("/api/ingest", post(ingest))
        .route("/api/social", post(social))
        .route("/sse", get(sse))
        .route("/ws", get(ws))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

/// Serve `router` until `signal` resolves, then drain in-flight requests and
/// stop the runtime's loops and producers.
pub async fn serve<F>(
    listener: TcpListener,
    router: Router,
    runtime: Arc<Runtime>,
    signal: F,
) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr().context("reading listener address")?;
    info!(%addr, "listening");

    // Live streams never finish on their own; the hub is closed as soon as
    // the signal fires so graceful shutdown can complete.
    let stopper = Arc::clone(&runtime);
    let result = axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            signal.await;
            warn!("shutdown requested, draining connections");
            stopper.service().hub().close_all();
        })
        .await
        .context("serving http");

    runtime.stop().await;
    result
}

async fn version() -> Json<serde_json::Value> {
    Json(json!({ "version": env!("CARGO_PKG_VERSION") }))
}

async fn score(State(state): State<AppState>) -> Json<ScoreState> {
    Json(state.runtime.service().current())
}

#[derive(Debug, Deserialize)]
struct IngestReq {
    source: String,
    category: String,
    title: String,
    severity: i64,
    #[serde(default)]
    ts: Option<f64>,
    #[serde(default)]
    meta: EventMeta,
}

fn reply(status: StatusCode, body: serde_json::Value) -> Response {
    (status, Json(body)).into_response()
}

async fn ingest(State(state): State<AppState>, Json(req): Json<IngestReq>) -> Response {
    if !(0..=100).contains(&req.severity) {
        return reply(
            StatusCode::BAD_REQUEST,
            json!({ "status": "error", "detail": "severity must be within 0..=100" }),
        );
    }

    let accepted = state.runtime.router().emit(
        &req.source,
        &req.category,
        &req.title,
        req.severity,
        req.meta,
        req.ts,
    );
    if accepted {
        reply(StatusCode::OK, json!({ "status": "accepted" }))
    } else {
        reply(
            StatusCode::ACCEPTED,
            json!({ "status": "duplicate", "detail": "Duplicate ignored" }),
        )
    }
}

async fn social(State(state): State<AppState>, Json(post): Json<SocialPost>) -> Response {
    let Some(inbox) = state.social.as_ref() else {
        return reply(
            StatusCode::SERVICE_UNAVAILABLE,
            json!({ "status": "disabled", "detail": "social producer not running" }),
        );
    };
    if inbox.submit(post) {
        reply(StatusCode::ACCEPTED, json!({ "status": "queued" }))
    } else {
        reply(
            StatusCode::SERVICE_UNAVAILABLE,
            json!({ "status": "busy", "detail": "social inbox full" }),
        )
    }
}

fn subscription_stream(sub: Subscription) -> impl Stream<Item = Result<Event, Infallible>> {
    stream::unfold(sub, |mut sub| async move {
        loop {
            let msg = sub.recv().await?;
            match Event::default().json_data(&msg) {
                Ok(ev) => return Some((Ok(ev), sub)),
                Err(e) => debug!(target: "api", error = %e, "skipping unserializable message"),
            }
        }
    })
}

async fn sse(State(state): State<AppState>) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let sub = state.runtime.service().subscribe();
    info!(target: "api", id = sub.id(), "sse client connected");
    Sse::new(subscription_stream(sub)).keep_alive(KeepAlive::default())
}

async fn ws(State(state): State<AppState>, upgrade: WebSocketUpgrade) -> Response {
    let sub = state.runtime.service().subscribe();
    upgrade.on_upgrade(move |socket| pump_ws(socket, sub))
}

async fn pump_ws(mut socket: WebSocket, mut sub: Subscription) {
    info!(target: "api", id = sub.id(), "ws client connected");
    loop {
        tokio::select! {
            msg = sub.recv() => {
                let Some(msg) = msg else { break };
                let Ok(text) = serde_json::to_string(&msg) else { continue };
                if socket.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
            incoming = socket.recv() => match incoming {
                None | Some(Err(_)) | Some(Ok(Message::Close(_))) => break,
                Some(Ok(_)) => {}
            },
        }
    }
    info!(target: "api", id = sub.id(), "ws client disconnected");
}
