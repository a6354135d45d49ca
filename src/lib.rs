/// alarmburst - wake an operator with a bounded burst of notifications
///
/// A single trigger becomes a cancellable sequence of Telegram messages and
/// wake-up stickers, sent through a rotating pool of bot tokens. At most one
/// burst runs at a time; an operator acknowledgement stops it.
pub mod channel;
pub mod cli;
pub mod config;
pub mod controller;
pub mod credentials;
pub mod dispatch;
pub mod formatting;
pub mod internal_metrics;
pub mod server;
pub mod supervisor;

pub use controller::{AlreadyActiveError, BurstController, BurstState};
pub use credentials::{Credential, CredentialRotator};
pub use dispatch::{
    BurstOutcome, BurstReport, BurstSettings, CancellationSignal, DispatchEngine,
    NotificationPayload,
};

use crate::channel::TelegramClient;
use crate::config::Config;
use crate::formatting::WakeUpFormatter;
use crate::internal_metrics::Metrics;
use anyhow::Result;
use std::sync::Arc;

/// Wires the production engine and controller from a validated config.
pub fn build_controller(config: &Config, metrics: Metrics) -> Result<BurstController> {
    let rotator = CredentialRotator::from_tokens(config.telegram.bot_tokens.iter().cloned())?;
    let client = TelegramClient::new(config.telegram.api_base_url.clone(), config.request_timeout())?;
    let engine = DispatchEngine::new(
        Arc::new(client),
        Arc::new(rotator),
        Arc::new(WakeUpFormatter),
        config.burst_settings(),
        metrics,
    );
    Ok(BurstController::new(Arc::new(engine)))
}
