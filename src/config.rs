//! Configuration management for alarmburst
//!
//! This module defines the main `Config` struct and its sub-structs. Values
//! are layered with `figment`: built-in defaults, then `alarmburst.toml` (or
//! the file given on the command line), then `ALARMBURST_` environment
//! variables, then command-line flags. The result is validated once and is
//! immutable for the life of the process.

use crate::cli::Cli;
use crate::dispatch::BurstSettings;
use anyhow::Result;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Deserializer, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_CONFIG_FILE: &str = "alarmburst.toml";

/// The main configuration struct for the application.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Config {
    /// The logging level for the application.
    pub log_level: String,
    pub telegram: TelegramConfig,
    pub burst: BurstConfig,
    #[serde(default)]
    pub media: MediaConfig,
    pub server: ServerConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    pub supervisor: SupervisorConfig,
}

/// Where and as whom notifications are sent.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct TelegramConfig {
    pub api_base_url: String,
    /// Bot tokens, tried in this order. Accepts a list or one comma-separated string.
    #[serde(deserialize_with = "token_list")]
    pub bot_tokens: Vec<String>,
    /// The chat that receives the burst: a numeric id or an `@channel` name.
    #[serde(deserialize_with = "chat_id")]
    pub chat_id: String,
    pub request_timeout_ms: u64,
}

/// Size and pacing of each burst.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct BurstConfig {
    pub max_notifications: u32,
    pub notification_interval_secs: f64,
    pub post_media_delay_secs: f64,
    /// Re-send the wake-up media every N notifications; 0 disables it.
    pub escalation_period: u32,
}

/// The attention-grabbing attachment.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
pub struct MediaConfig {
    pub sticker_path: Option<PathBuf>,
    /// Name sent with the upload; defaults to the file name of `sticker_path`.
    pub sticker_filename: Option<String>,
}

/// The keep-alive and control endpoint.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ServerConfig {
    pub enabled: bool,
    pub listen_address: SocketAddr,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
pub struct MetricsConfig {
    /// Expose Prometheus metrics at `/metrics`.
    pub enabled: bool,
}

/// Restart policy for long-running services.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SupervisorConfig {
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    /// Give up after this many consecutive failures. Unbounded if unset.
    pub max_restarts: Option<u32>,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("telegram.bot_tokens must contain at least one token")]
    NoBotTokens,
    #[error("telegram.bot_tokens contains a blank entry")]
    BlankBotToken,
    #[error("telegram.chat_id is required")]
    MissingChatId,
    #[error("burst.notification_interval_secs must be a positive number of seconds, got {0}")]
    NonPositiveInterval(f64),
    #[error("burst.post_media_delay_secs must be a non-negative number of seconds, got {0}")]
    NegativeDelay(f64),
    #[error("telegram.request_timeout_ms must be positive")]
    ZeroTimeout,
    #[error("supervisor backoff must satisfy 0 < initial_backoff_ms ({initial}) <= max_backoff_ms ({max})")]
    InvalidBackoff { initial: u64, max: u64 },
}

fn token_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Tokens {
        List(Vec<String>),
        Joined(String),
    }

    let tokens = match Tokens::deserialize(deserializer)? {
        Tokens::List(list) => list,
        Tokens::Joined(joined) => joined.split(',').map(str::to_string).collect(),
    };
    Ok(tokens
        .into_iter()
        .map(|t| t.trim().to_string())
        .collect())
}

fn chat_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum ChatId {
        Numeric(i64),
        Name(String),
    }

    Ok(match ChatId::deserialize(deserializer)? {
        ChatId::Numeric(id) => id.to_string(),
        ChatId::Name(name) => name.trim().to_string(),
    })
}

impl Config {
    /// Loads the application configuration by layering all sources.
    pub fn load(cli: &Cli) -> Result<Self> {
        let config_path = cli
            .config
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(config_path))
            // e.g. ALARMBURST_TELEGRAM__CHAT_ID=-100123
            .merge(Env::prefixed("ALARMBURST_").split("__"))
            .merge(cli.clone())
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the invariants the dispatcher relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.telegram.bot_tokens.is_empty() {
            return Err(ConfigError::NoBotTokens);
        }
        if self.telegram.bot_tokens.iter().any(|t| t.is_empty()) {
            return Err(ConfigError::BlankBotToken);
        }
        if self.telegram.chat_id.trim().is_empty() {
            return Err(ConfigError::MissingChatId);
        }
        if self.telegram.request_timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        // `try_from_secs_f64` also rejects NaN, infinities and values too
        // large for a `Duration`.
        let interval = self.burst.notification_interval_secs;
        if !(interval > 0.0 && Duration::try_from_secs_f64(interval).is_ok()) {
            return Err(ConfigError::NonPositiveInterval(interval));
        }
        let delay = self.burst.post_media_delay_secs;
        if Duration::try_from_secs_f64(delay).is_err() {
            return Err(ConfigError::NegativeDelay(delay));
        }
        let (initial, max) = (
            self.supervisor.initial_backoff_ms,
            self.supervisor.max_backoff_ms,
        );
        if initial == 0 || max < initial {
            return Err(ConfigError::InvalidBackoff { initial, max });
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.telegram.request_timeout_ms)
    }

    /// Converts the burst section into engine settings. Call after `validate`.
    pub fn burst_settings(&self) -> BurstSettings {
        BurstSettings {
            max_count: self.burst.max_notifications,
            notification_interval: Duration::from_secs_f64(self.burst.notification_interval_secs),
            post_media_delay: Duration::from_secs_f64(self.burst.post_media_delay_secs),
            escalation_period: self.burst.escalation_period,
        }
    }
}

impl MediaConfig {
    /// The upload name: explicit setting, else the file name, else a fallback.
    pub fn filename(&self) -> String {
        self.sticker_filename
            .clone()
            .or_else(|| {
                self.sticker_path
                    .as_ref()
                    .and_then(|p| p.file_name())
                    .map(|n| n.to_string_lossy().into_owned())
            })
            .unwrap_or_else(|| "sticker.webp".to_string())
    }
}

// Provide a default implementation for tests and easy setup.
impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            telegram: TelegramConfig {
                api_base_url: crate::channel::telegram::DEFAULT_API_BASE_URL.to_string(),
                bot_tokens: vec![],
                chat_id: String::new(),
                request_timeout_ms: 10_000,
            },
            burst: BurstConfig {
                max_notifications: 50,
                notification_interval_secs: 2.0,
                post_media_delay_secs: 1.0,
                escalation_period: 5,
            },
            media: MediaConfig::default(),
            server: ServerConfig {
                enabled: true,
                listen_address: SocketAddr::from(([0, 0, 0, 0], 5000)),
            },
            metrics: MetricsConfig::default(),
            supervisor: SupervisorConfig {
                initial_backoff_ms: 1_000,
                max_backoff_ms: 30_000,
                max_restarts: None,
            },
        }
    }
}
