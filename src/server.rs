//! # Status Server
//!
//! An `axum` server that keeps the process reachable for uptime pings and
//! exposes the burst control surface over HTTP:
//!
//! - `GET /` and `GET /ping` for keep-alive checks.
//! - `GET /status` for a snapshot of the burst state.
//! - `POST /start` and `POST /stop` to trigger and acknowledge bursts.
//! - `GET /metrics` for Prometheus, when metrics are enabled.

use crate::controller::BurstController;
use crate::dispatch::{MediaAttachment, NotificationPayload};
use anyhow::Result;
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;
use serde_json::json;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{info, trace};

/// Shared handler state.
#[derive(Clone)]
pub struct ServerState {
    pub controller: BurstController,
    /// Chat used when a start request does not name one.
    pub default_chat_id: String,
    pub media: Option<MediaAttachment>,
    pub prom_handle: Option<PrometheusHandle>,
}

#[derive(Debug, Deserialize)]
pub struct StartRequest {
    pub text: String,
    #[serde(default)]
    pub chat_id: Option<String>,
}

/// Builds the router; exposed so tests can serve it on an ephemeral port.
pub fn router(state: ServerState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/ping", get(ping))
        .route("/status", get(status))
        .route("/start", post(start))
        .route("/stop", post(stop))
        .route("/metrics", get(render_metrics))
        .with_state(state)
}

async fn root(State(state): State<ServerState>) -> impl IntoResponse {
    Json(json!({
        "status": "running",
        "service": env!("CARGO_PKG_NAME"),
        "burst_active": state.controller.is_active(),
    }))
}

async fn ping() -> &'static str {
    "alive"
}

async fn status(State(state): State<ServerState>) -> impl IntoResponse {
    Json(state.controller.status())
}

async fn start(
    State(state): State<ServerState>,
    Json(request): Json<StartRequest>,
) -> impl IntoResponse {
    let mut payload = NotificationPayload::new(
        request.chat_id.unwrap_or_else(|| state.default_chat_id.clone()),
        request.text,
    );
    payload.media = state.media.clone();

    match state.controller.start(payload) {
        Ok(()) => (StatusCode::ACCEPTED, Json(json!({ "started": true }))),
        Err(e) => (
            StatusCode::CONFLICT,
            Json(json!({ "started": false, "error": e.to_string() })),
        ),
    }
}

async fn stop(State(state): State<ServerState>) -> impl IntoResponse {
    let stop_requested = state.controller.stop();
    Json(json!({ "stop_requested": stop_requested }))
}

async fn render_metrics(State(state): State<ServerState>) -> impl IntoResponse {
    match &state.prom_handle {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (StatusCode::NOT_FOUND, "metrics are disabled".to_string()),
    }
}

/// A bound server that runs until the shutdown signal fires.
pub struct StatusServer {
    listener: TcpListener,
    state: ServerState,
    shutdown_rx: watch::Receiver<bool>,
}

impl StatusServer {
    pub async fn bind(
        addr: SocketAddr,
        state: ServerState,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            state,
            shutdown_rx,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub async fn run(self) -> Result<()> {
        info!("Status server listening on {}", self.local_addr()?);
        let mut shutdown_rx = self.shutdown_rx;
        axum::serve(self.listener, router(self.state))
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.wait_for(|stop| *stop).await;
                trace!("Status server received shutdown signal.");
            })
            .await?;
        trace!("Status server task finished.");
        Ok(())
    }
}
