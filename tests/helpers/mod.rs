#![allow(dead_code)]

pub mod mock_channel;

use alarmburst::formatting::WakeUpFormatter;
use alarmburst::internal_metrics::Metrics;
use alarmburst::{BurstController, BurstSettings, CredentialRotator, DispatchEngine, NotificationPayload};
use mock_channel::ScriptedChannel;
use std::sync::Arc;
use std::time::Duration;

/// Builds a controller over the given channel and token pool.
pub fn controller(
    channel: Arc<ScriptedChannel>,
    tokens: &[&str],
    settings: BurstSettings,
) -> BurstController {
    let engine = DispatchEngine::new(
        channel,
        Arc::new(CredentialRotator::from_tokens(tokens.iter().copied()).unwrap()),
        Arc::new(WakeUpFormatter),
        settings,
        Metrics::new(),
    );
    BurstController::new(Arc::new(engine))
}

/// Settings with no post-media delay and escalation turned off.
pub fn settings(max_count: u32, interval: Duration) -> BurstSettings {
    BurstSettings {
        max_count,
        notification_interval: interval,
        post_media_delay: Duration::ZERO,
        escalation_period: 0,
    }
}

pub fn payload() -> NotificationPayload {
    NotificationPayload::new("-100123", "A new item just appeared")
}

pub fn payload_with_media() -> NotificationPayload {
    payload().with_media(vec![0x52, 0x49, 0x46, 0x46], "wake.webp")
}
