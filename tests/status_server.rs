//! End-to-end tests for the keep-alive and control endpoint.

use alarmburst::config::MetricsConfig;
use alarmburst::dispatch::MediaAttachment;
use alarmburst::internal_metrics::MetricsBuilder;
use alarmburst::server::{ServerState, StatusServer};
use alarmburst::BurstController;
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

mod helpers;
use helpers::mock_channel::{CallKind, ScriptedChannel};
use helpers::{controller, settings};

struct TestServer {
    addr: SocketAddr,
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<anyhow::Result<()>>,
    http: reqwest::Client,
}

impl TestServer {
    async fn spawn(controller: BurstController, media: Option<MediaAttachment>) -> Self {
        Self::spawn_with_metrics(controller, media, None).await
    }

    async fn spawn_with_metrics(
        controller: BurstController,
        media: Option<MediaAttachment>,
        prom_handle: Option<PrometheusHandle>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let state = ServerState {
            controller,
            default_chat_id: "-100777".to_string(),
            media,
            prom_handle,
        };
        let server = StatusServer::bind("127.0.0.1:0".parse().unwrap(), state, shutdown_rx)
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();
        let handle = tokio::spawn(server.run());
        Self {
            addr,
            shutdown_tx,
            handle,
            http: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    async fn get(&self, path: &str) -> reqwest::Response {
        self.http.get(self.url(path)).send().await.unwrap()
    }

    async fn post(&self, path: &str, body: Value) -> reqwest::Response {
        self.http.post(self.url(path)).json(&body).send().await.unwrap()
    }
}

#[tokio::test]
async fn test_keep_alive_routes() {
    let channel = Arc::new(ScriptedChannel::new());
    let server = TestServer::spawn(
        controller(channel, &["1:a"], settings(3, Duration::from_millis(20))),
        None,
    )
    .await;

    let ping = server.get("/ping").await;
    assert_eq!(ping.status(), 200);
    assert_eq!(ping.text().await.unwrap(), "alive");

    let root: Value = server.get("/").await.json().await.unwrap();
    assert_eq!(root["status"], "running");
    assert_eq!(root["service"], "alarmburst");
    assert_eq!(root["burst_active"], false);

    let status: Value = server.get("/status").await.json().await.unwrap();
    assert_eq!(status["active"], false);
    assert_eq!(status["max_count"], 3);
    assert_eq!(status["last_report"], Value::Null);
}

#[tokio::test]
async fn test_start_conflict_and_stop_over_http() {
    let channel = Arc::new(ScriptedChannel::new());
    let controller = controller(channel.clone(), &["1:a", "2:b"], settings(1_000, Duration::from_millis(50)));
    let server = TestServer::spawn(controller.clone(), None).await;

    let started = server.post("/start", json!({ "text": "new drop" })).await;
    assert_eq!(started.status(), 202);
    assert_eq!(started.json::<Value>().await.unwrap(), json!({ "started": true }));

    let again = server.post("/start", json!({ "text": "another drop" })).await;
    assert_eq!(again.status(), 409);
    let body: Value = again.json().await.unwrap();
    assert_eq!(body["started"], false);
    assert!(body["error"].as_str().unwrap().contains("already active"));

    let status: Value = server.get("/status").await.json().await.unwrap();
    assert_eq!(status["active"], true);

    let stopped: Value = server.post("/stop", json!({})).await.json().await.unwrap();
    assert_eq!(stopped, json!({ "stop_requested": true }));

    let idle = tokio::time::timeout(Duration::from_secs(5), controller.wait_idle())
        .await
        .unwrap();
    let report = idle.last_report.unwrap();
    assert_eq!(report.outcome, alarmburst::BurstOutcome::Stopped);
    assert!(report.sent_count < 1_000);

    let calls = channel.calls();
    // No request named a chat, so the configured default was used.
    assert!(calls.iter().all(|c| c.target == "-100777"));
    assert!(calls[0].body.as_deref().unwrap().contains("new drop"));
    assert!(calls.iter().all(|c| !c.body.as_deref().unwrap_or("").contains("another drop")));

    let status: Value = server.get("/status").await.json().await.unwrap();
    assert_eq!(status["active"], false);
    assert_eq!(status["last_report"]["outcome"], "stopped");

    let stopped: Value = server.post("/stop", json!({})).await.json().await.unwrap();
    assert_eq!(stopped, json!({ "stop_requested": false }));
}

#[tokio::test]
async fn test_start_uses_requested_chat_and_configured_media() {
    let channel = Arc::new(ScriptedChannel::new());
    let controller = controller(channel.clone(), &["1:a"], settings(2, Duration::from_millis(10)));
    let media = MediaAttachment {
        bytes: Arc::from(vec![1u8, 2, 3]),
        filename: "wake.webp".to_string(),
    };
    let server = TestServer::spawn(controller.clone(), Some(media)).await;

    let started = server
        .post("/start", json!({ "text": "drop", "chat_id": "@night_ops" }))
        .await;
    assert_eq!(started.status(), 202);
    tokio::time::timeout(Duration::from_secs(5), controller.wait_idle())
        .await
        .unwrap();

    assert_eq!(channel.count(CallKind::Media), 1);
    assert_eq!(channel.count(CallKind::Text), 2);
    assert!(channel.calls().iter().all(|c| c.target == "@night_ops"));
}

#[tokio::test]
async fn test_malformed_start_request_is_rejected() {
    let channel = Arc::new(ScriptedChannel::new());
    let controller = controller(channel.clone(), &["1:a"], settings(2, Duration::from_millis(10)));
    let server = TestServer::spawn(controller.clone(), None).await;

    let response = server.post("/start", json!({ "message": "no text field" })).await;

    assert!(response.status().is_client_error());
    assert!(!controller.is_active());
    assert!(channel.calls().is_empty());
}

#[tokio::test]
async fn test_metrics_disabled_returns_not_found() {
    let channel = Arc::new(ScriptedChannel::new());
    let server = TestServer::spawn(
        controller(channel, &["1:a"], settings(1, Duration::from_millis(10))),
        None,
    )
    .await;

    let response = server.get("/metrics").await;
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn test_metrics_enabled_renders_burst_counters() {
    // The recorder is global to the test binary; only this test installs it.
    let (_metrics, handle) = MetricsBuilder::new(MetricsConfig { enabled: true }).build();
    let handle = handle.expect("recorder installs once per process");
    let channel = Arc::new(ScriptedChannel::new());
    // Counter handles bind to the recorder that exists when they are created.
    let controller = controller(channel, &["1:a"], settings(2, Duration::from_millis(10)));
    let server = TestServer::spawn_with_metrics(controller.clone(), None, Some(handle)).await;

    assert_eq!(server.post("/start", json!({ "text": "drop" })).await.status(), 202);
    tokio::time::timeout(Duration::from_secs(5), controller.wait_idle())
        .await
        .unwrap();

    let response = server.get("/metrics").await;
    assert_eq!(response.status(), 200);
    let body = response.text().await.unwrap();
    assert!(body.contains("notifications_sent_total"), "{}", body);
    assert!(body.contains("bursts_finished_total{outcome=\"exhausted\"}"), "{}", body);
}

#[tokio::test]
async fn test_shutdown_signal_stops_the_server() {
    let channel = Arc::new(ScriptedChannel::new());
    let server = TestServer::spawn(
        controller(channel, &["1:a"], settings(1, Duration::from_millis(10))),
        None,
    )
    .await;
    assert_eq!(server.get("/ping").await.status(), 200);

    server.shutdown_tx.send(true).unwrap();
    let result = tokio::time::timeout(Duration::from_secs(5), server.handle)
        .await
        .unwrap()
        .unwrap();

    assert!(result.is_ok());
}
