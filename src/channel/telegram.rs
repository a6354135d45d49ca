//! A client for the Telegram Bot API.

use crate::channel::{ChannelError, MessageId, OutboundChannel};
use crate::credentials::Credential;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, instrument, warn};

pub const DEFAULT_API_BASE_URL: &str = "https://api.telegram.org/";

/// The envelope every Bot API method answers with.
#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error_code: Option<i64>,
    #[serde(default)]
    description: Option<String>,
}

/// Sends messages through `POST {base}/bot<token>/<method>`.
#[derive(Debug, Clone)]
pub struct TelegramClient {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl TelegramClient {
    /// Creates a new `TelegramClient` with a fixed per-request timeout.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        let mut base_url = base_url.into();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        Ok(Self {
            http,
            base_url,
            timeout,
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn method_url(&self, credential: &Credential, method: &str) -> String {
        format!("{}bot{}/{}", self.base_url, credential.expose(), method)
    }

    /// Interprets the outcome of a single request.
    async fn read_response(
        result: Result<reqwest::Response, reqwest::Error>,
    ) -> Result<MessageId, ChannelError> {
        let response = result.map_err(classify)?;
        let status = response.status();
        let body: ApiResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                ChannelError::Timeout
            } else {
                ChannelError::Transport(format!("unreadable response (status {}): {}", status, e))
            }
        })?;

        if !body.ok {
            return Err(ChannelError::Rejected {
                code: body.error_code,
                description: body
                    .description
                    .unwrap_or_else(|| format!("status {}", status)),
            });
        }

        body.result
            .as_ref()
            .and_then(|r| r.get("message_id"))
            .and_then(Value::as_i64)
            .ok_or_else(|| ChannelError::Transport("response is missing result.message_id".into()))
    }
}

fn classify(error: reqwest::Error) -> ChannelError {
    if error.is_timeout() {
        ChannelError::Timeout
    } else {
        ChannelError::Transport(error.to_string())
    }
}

#[async_trait]
impl OutboundChannel for TelegramClient {
    #[instrument(skip(self, credential, body_text), fields(bot = %credential))]
    async fn send_text(
        &self,
        credential: &Credential,
        target_channel_id: &str,
        body_text: &str,
    ) -> Result<MessageId, ChannelError> {
        let payload = json!({
            "chat_id": target_channel_id,
            "text": body_text,
            "parse_mode": "HTML",
            "disable_web_page_preview": true,
        });

        let result = self
            .http
            .post(self.method_url(credential, "sendMessage"))
            .json(&payload)
            .send()
            .await;
        let outcome = Self::read_response(result).await;
        match &outcome {
            Ok(id) => debug!(message_id = id, "sendMessage delivered"),
            Err(e) => warn!(error = %e, "sendMessage failed"),
        }
        outcome
    }

    #[instrument(skip(self, credential, media_bytes), fields(bot = %credential, size = media_bytes.len()))]
    async fn send_media(
        &self,
        credential: &Credential,
        target_channel_id: &str,
        media_bytes: &[u8],
        filename: &str,
    ) -> Result<MessageId, ChannelError> {
        let part = Part::bytes(media_bytes.to_vec())
            .file_name(filename.to_string())
            .mime_str("application/octet-stream")
            .map_err(|e| ChannelError::Transport(e.to_string()))?;
        let form = Form::new()
            .text("chat_id", target_channel_id.to_string())
            .part("sticker", part);

        let result = self
            .http
            .post(self.method_url(credential, "sendSticker"))
            .multipart(form)
            .send()
            .await;
        let outcome = Self::read_response(result).await;
        match &outcome {
            Ok(id) => debug!(message_id = id, "sendSticker delivered"),
            Err(e) => warn!(error = %e, "sendSticker failed"),
        }
        outcome
    }
}
