//! Command-Line Interface (CLI) argument parsing.
//!
//! These arguments are parsed at startup and merged on top of the
//! `alarmburst.toml` file and environment variables, so a flag always wins.

use clap::Parser;
use figment::{
    value::{Dict, Map, Value},
    Error, Metadata, Profile, Provider,
};
use std::path::PathBuf;

/// Wakes an operator up with a burst of Telegram notifications.
#[derive(Parser, Debug, Clone, Default)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Logging level (overrides `log_level`).
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Chat that receives the notifications.
    #[arg(long, value_name = "ID")]
    pub chat_id: Option<String>,

    /// Maximum number of notifications per burst.
    #[arg(long, value_name = "COUNT")]
    pub max_notifications: Option<u32>,

    /// Seconds between two notifications.
    #[arg(long, value_name = "SECONDS")]
    pub interval: Option<f64>,

    /// Port for the keep-alive endpoint; binds on all interfaces.
    #[arg(long, env = "PORT", value_name = "PORT")]
    pub port: Option<u16>,
}

impl Provider for Cli {
    fn metadata(&self) -> Metadata {
        Metadata::named("Command-Line Arguments")
    }

    fn data(&self) -> Result<Map<Profile, Dict>, Error> {
        let mut telegram = Dict::new();
        let mut burst = Dict::new();
        let mut dict = Dict::new();

        if let Some(level) = &self.log_level {
            dict.insert("log_level".into(), Value::from(level.clone()));
        }

        if let Some(chat_id) = &self.chat_id {
            telegram.insert("chat_id".into(), Value::from(chat_id.clone()));
        }

        if let Some(max) = self.max_notifications {
            burst.insert("max_notifications".into(), Value::from(max));
        }

        if let Some(interval) = self.interval {
            burst.insert("notification_interval_secs".into(), Value::from(interval));
        }

        if let Some(port) = self.port {
            let mut server = Dict::new();
            server.insert(
                "listen_address".into(),
                Value::from(format!("0.0.0.0:{}", port)),
            );
            dict.insert("server".into(), Value::from(server));
        }

        if !telegram.is_empty() {
            dict.insert("telegram".into(), Value::from(telegram));
        }
        if !burst.is_empty() {
            dict.insert("burst".into(), Value::from(burst));
        }

        let mut map = Map::new();
        map.insert(Profile::Default, dict);
        Ok(map)
    }
}
