//! A scripted outbound channel for driving bursts without a network.

use alarmburst::channel::{ChannelError, MessageId, OutboundChannel};
use alarmburst::Credential;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Text,
    Media,
}

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub kind: CallKind,
    pub token: String,
    pub target: String,
    pub body: Option<String>,
    pub filename: Option<String>,
    pub at: tokio::time::Instant,
}

/// Records every call. Calls made with a failing token return `Rejected`;
/// each call takes `latency` of (possibly paused) tokio time.
#[derive(Debug, Default)]
pub struct ScriptedChannel {
    calls: Mutex<Vec<RecordedCall>>,
    failing_tokens: HashSet<String>,
    fail_everything: bool,
    latency: Duration,
    next_id: AtomicI64,
}

impl ScriptedChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_all() -> Self {
        Self {
            fail_everything: true,
            ..Self::default()
        }
    }

    pub fn with_failing_tokens(tokens: &[&str]) -> Self {
        Self {
            failing_tokens: tokens.iter().map(|t| t.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, kind: CallKind) -> usize {
        self.calls().iter().filter(|c| c.kind == kind).count()
    }

    /// For each media call, how many text calls preceded it.
    pub fn media_positions(&self) -> Vec<usize> {
        let mut texts = 0;
        let mut positions = Vec::new();
        for call in self.calls() {
            match call.kind {
                CallKind::Text => texts += 1,
                CallKind::Media => positions.push(texts),
            }
        }
        positions
    }

    async fn answer(&self, call: RecordedCall) -> Result<MessageId, ChannelError> {
        let fails = self.fail_everything || self.failing_tokens.contains(&call.token);
        self.calls.lock().unwrap().push(call);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if fails {
            Err(ChannelError::Rejected {
                code: Some(401),
                description: "Unauthorized".into(),
            })
        } else {
            Ok(self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
        }
    }
}

#[async_trait]
impl OutboundChannel for ScriptedChannel {
    async fn send_text(
        &self,
        credential: &Credential,
        target_channel_id: &str,
        body_text: &str,
    ) -> Result<MessageId, ChannelError> {
        self.answer(RecordedCall {
            kind: CallKind::Text,
            token: credential.expose().to_string(),
            target: target_channel_id.to_string(),
            body: Some(body_text.to_string()),
            filename: None,
            at: tokio::time::Instant::now(),
        })
        .await
    }

    async fn send_media(
        &self,
        credential: &Credential,
        target_channel_id: &str,
        _media_bytes: &[u8],
        filename: &str,
    ) -> Result<MessageId, ChannelError> {
        self.answer(RecordedCall {
            kind: CallKind::Media,
            token: credential.expose().to_string(),
            target: target_channel_id.to_string(),
            body: None,
            filename: Some(filename.to_string()),
            at: tokio::time::Instant::now(),
        })
        .await
    }
}
