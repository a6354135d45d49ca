//! Outbound messaging channels.
//!
//! A channel performs exactly one outbound call per invocation with the
//! credential it is handed. Retrying and credential fallback live in the
//! dispatch engine, never here.
pub mod telegram;

use crate::credentials::Credential;
use async_trait::async_trait;
use thiserror::Error;

pub use telegram::TelegramClient;

/// Identifier the remote endpoint assigned to a delivered message.
pub type MessageId = i64;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChannelError {
    #[error("request timed out")]
    Timeout,

    #[error("rejected by endpoint (code {code:?}): {description}")]
    Rejected {
        code: Option<i64>,
        description: String,
    },

    #[error("transport failure: {0}")]
    Transport(String),
}

impl ChannelError {
    /// Short label used for metrics and structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ChannelError::Timeout => "timeout",
            ChannelError::Rejected { .. } => "rejected",
            ChannelError::Transport(_) => "transport",
        }
    }
}

/// A client able to deliver text and media to a target channel.
#[async_trait]
pub trait OutboundChannel: Send + Sync {
    /// Sends one text message.
    async fn send_text(
        &self,
        credential: &Credential,
        target_channel_id: &str,
        body_text: &str,
    ) -> Result<MessageId, ChannelError>;

    /// Sends one binary attachment.
    async fn send_media(
        &self,
        credential: &Credential,
        target_channel_id: &str,
        media_bytes: &[u8],
        filename: &str,
    ) -> Result<MessageId, ChannelError>;
}
