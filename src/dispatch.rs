//! The dispatch engine: turns one event into a bounded, cancellable burst of
//! outbound notifications.
//!
//! Every outbound call is tried against the credential pool in rotation. A
//! step whose every attempt fails is skipped; nothing inside a burst aborts it
//! except cancellation or reaching the configured count.

use crate::channel::{ChannelError, MessageId, OutboundChannel};
use crate::credentials::CredentialRotator;
use crate::formatting::MessageFormatter;
use crate::internal_metrics::Metrics;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

/// Timing and size limits for every burst an engine runs.
#[derive(Debug, Clone, PartialEq)]
pub struct BurstSettings {
    /// Upper bound on numbered alerts per burst.
    pub max_count: u32,
    pub notification_interval: Duration,
    pub post_media_delay: Duration,
    /// Re-send the media every N alerts. Zero disables escalation.
    pub escalation_period: u32,
}

impl Default for BurstSettings {
    fn default() -> Self {
        Self {
            max_count: 50,
            notification_interval: Duration::from_secs(2),
            post_media_delay: Duration::from_secs(1),
            escalation_period: 5,
        }
    }
}

/// A binary attachment sent to grab attention.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaAttachment {
    pub bytes: Arc<[u8]>,
    pub filename: String,
}

/// What a burst delivers and where.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationPayload {
    pub target_channel_id: String,
    pub body_text: String,
    pub media: Option<MediaAttachment>,
}

impl NotificationPayload {
    pub fn new(target_channel_id: impl Into<String>, body_text: impl Into<String>) -> Self {
        Self {
            target_channel_id: target_channel_id.into(),
            body_text: body_text.into(),
            media: None,
        }
    }

    pub fn with_media(mut self, bytes: impl Into<Arc<[u8]>>, filename: impl Into<String>) -> Self {
        self.media = Some(MediaAttachment {
            bytes: bytes.into(),
            filename: filename.into(),
        });
        self
    }
}

/// How a burst ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BurstOutcome {
    /// Every configured alert was attempted.
    Exhausted,
    /// An operator acknowledged the event.
    Stopped,
    /// The dispatch task died unexpectedly.
    Faulted,
}

impl BurstOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            BurstOutcome::Exhausted => "exhausted",
            BurstOutcome::Stopped => "stopped",
            BurstOutcome::Faulted => "faulted",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BurstReport {
    pub outcome: BurstOutcome,
    pub sent_count: u32,
}

/// A level-triggered stop flag for one burst.
///
/// Once raised it stays raised; a new burst gets a new signal.
#[derive(Debug, Clone)]
pub struct CancellationSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for CancellationSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl CancellationSignal {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once the signal has been raised.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so the channel cannot close under us.
        let _ = rx.wait_for(|raised| *raised).await;
    }
}

enum Outbound<'a> {
    Text(&'a str),
    Media(&'a MediaAttachment),
}

impl Outbound<'_> {
    fn method(&self) -> &'static str {
        match self {
            Outbound::Text(_) => "sendMessage",
            Outbound::Media(_) => "sendSticker",
        }
    }
}

/// Runs bursts against one channel and credential pool.
pub struct DispatchEngine {
    channel: Arc<dyn OutboundChannel>,
    rotator: Arc<CredentialRotator>,
    formatter: Arc<dyn MessageFormatter>,
    settings: BurstSettings,
    metrics: Metrics,
}

impl DispatchEngine {
    pub fn new(
        channel: Arc<dyn OutboundChannel>,
        rotator: Arc<CredentialRotator>,
        formatter: Arc<dyn MessageFormatter>,
        settings: BurstSettings,
        metrics: Metrics,
    ) -> Self {
        Self {
            channel,
            rotator,
            formatter,
            settings,
            metrics,
        }
    }

    pub fn settings(&self) -> &BurstSettings {
        &self.settings
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Runs one burst to completion or cancellation.
    ///
    /// `on_progress` is called with the new count right after each increment,
    /// before the corresponding message is sent.
    #[instrument(skip_all, fields(target = %payload.target_channel_id, max = self.settings.max_count))]
    pub async fn run<F>(
        &self,
        payload: &NotificationPayload,
        signal: &CancellationSignal,
        on_progress: F,
    ) -> BurstReport
    where
        F: Fn(u32) + Send + Sync,
    {
        if let Some(media) = &payload.media {
            if self.send_media(&payload.target_channel_id, media).await.is_some() {
                info!("Wake-up media delivered.");
            }
        }
        self.pause(self.settings.post_media_delay, signal).await;

        let mut sent_count = 0;
        while sent_count < self.settings.max_count && !signal.is_cancelled() {
            sent_count += 1;
            on_progress(sent_count);

            let text = self
                .formatter
                .format_notification(sent_count, &payload.body_text);
            match self
                .send_with_fallback(&payload.target_channel_id, Outbound::Text(&text))
                .await
            {
                Some(_) => {
                    self.metrics.notification_sent();
                    info!("Notification #{} sent.", sent_count);
                }
                None => {
                    self.metrics.notification_failed();
                    error!("Notification #{} failed on every credential.", sent_count);
                }
            }
            // Stop after the in-flight call, before any escalation media.
            if signal.is_cancelled() {
                break;
            }

            if self.settings.escalation_period > 0
                && sent_count % self.settings.escalation_period == 0
            {
                if let Some(media) = &payload.media {
                    if self.send_media(&payload.target_channel_id, media).await.is_some() {
                        info!(
                            "Escalation media #{} sent.",
                            sent_count / self.settings.escalation_period
                        );
                    }
                }
            }

            if signal.is_cancelled() {
                break;
            }
            self.pause(self.settings.notification_interval, signal).await;
        }

        if signal.is_cancelled() {
            info!("Burst stopped by operator at #{}.", sent_count);
            BurstReport {
                outcome: BurstOutcome::Stopped,
                sent_count,
            }
        } else {
            info!("Burst exhausted after {} notifications.", sent_count);
            BurstReport {
                outcome: BurstOutcome::Exhausted,
                sent_count,
            }
        }
    }

    async fn send_media(&self, target: &str, media: &MediaAttachment) -> Option<MessageId> {
        let delivered = self.send_with_fallback(target, Outbound::Media(media)).await;
        if delivered.is_some() {
            self.metrics.media_sent();
        } else {
            self.metrics.media_failed();
            warn!("Wake-up media failed on every credential, continuing burst.");
        }
        delivered
    }

    /// One attempt per credential in the pool, stopping at the first success.
    async fn send_with_fallback(&self, target: &str, outbound: Outbound<'_>) -> Option<MessageId> {
        let attempts = self.rotator.len();
        for attempt in 1..=attempts {
            let credential = self.rotator.next();
            let result: Result<MessageId, ChannelError> = match &outbound {
                Outbound::Text(text) => self.channel.send_text(&credential, target, text).await,
                Outbound::Media(media) => {
                    self.channel
                        .send_media(&credential, target, &media.bytes, &media.filename)
                        .await
                }
            };
            match result {
                Ok(message_id) => {
                    debug!(
                        method = outbound.method(),
                        bot = %credential,
                        attempt,
                        message_id,
                        "Outbound call succeeded"
                    );
                    return Some(message_id);
                }
                Err(e) => {
                    self.metrics.channel_error(&e);
                    warn!(
                        method = outbound.method(),
                        bot = %credential,
                        attempt,
                        attempts,
                        error = %e,
                        "Outbound call failed, rotating credential"
                    );
                }
            }
        }
        None
    }

    /// Sleeps for `duration`, returning early if the signal is raised.
    async fn pause(&self, duration: Duration, signal: &CancellationSignal) {
        if duration.is_zero() || signal.is_cancelled() {
            return;
        }
        tokio::select! {
            biased;
            _ = signal.cancelled() => {
                debug!("Suspension cut short by cancellation.");
            }
            _ = tokio::time::sleep(duration) => {}
        }
    }
}
