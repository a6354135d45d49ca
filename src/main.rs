//! alarmburst - notification burst service
//!
//! Loads configuration, wires the dispatcher, and keeps the status/control
//! endpoint alive under a restart supervisor until Ctrl-C.

use alarmburst::{
    build_controller,
    cli::Cli,
    config::Config,
    dispatch::MediaAttachment,
    internal_metrics::MetricsBuilder,
    server::{ServerState, StatusServer},
    supervisor::Supervisor,
};
use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match Config::load(&cli) {
        Ok(config) => config,
        Err(err) => {
            // Logging is not configured yet, install a default subscriber for this error.
            tracing_subscriber::fmt().init();
            error!("Failed to load configuration: {:#}", err);
            std::process::exit(1);
        }
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("alarmburst starting up...");
    info!("-------------------- Configuration --------------------");
    info!("Log Level: {}", config.log_level);
    info!("API Base URL: {}", config.telegram.api_base_url);
    info!("Bot Tokens: {}", config.telegram.bot_tokens.len());
    info!("Chat: {}", config.telegram.chat_id);
    info!("Request Timeout: {}ms", config.telegram.request_timeout_ms);
    info!("Max Notifications: {}", config.burst.max_notifications);
    info!("Notification Interval: {}s", config.burst.notification_interval_secs);
    info!("Post Media Delay: {}s", config.burst.post_media_delay_secs);
    info!("Escalation Period: {}", config.burst.escalation_period);
    info!(
        "Status Server: {}",
        if config.server.enabled {
            config.server.listen_address.to_string()
        } else {
            "Disabled".to_string()
        }
    );
    info!("Metrics: {}", if config.metrics.enabled { "Enabled" } else { "Disabled" });
    info!("-------------------------------------------------------");

    let media = match &config.media.sticker_path {
        Some(path) => {
            let bytes = tokio::fs::read(path)
                .await
                .with_context(|| format!("reading sticker file {}", path.display()))?;
            Some(MediaAttachment {
                bytes: Arc::from(bytes),
                filename: config.media.filename(),
            })
        }
        None => {
            warn!("No sticker configured; bursts will send text only.");
            None
        }
    };

    let (metrics, prom_handle) = MetricsBuilder::new(config.metrics.clone()).build();
    let controller = build_controller(&config, metrics)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let supervisor = Supervisor::new(config.supervisor.clone(), shutdown_rx.clone());

    let server_task = if config.server.enabled {
        let state = ServerState {
            controller: controller.clone(),
            default_chat_id: config.telegram.chat_id.clone(),
            media,
            prom_handle,
        };
        let addr = config.server.listen_address;
        let shutdown_rx = shutdown_rx.clone();
        Some(tokio::spawn(async move {
            supervisor
                .run("StatusServer", || {
                    let state = state.clone();
                    let shutdown_rx = shutdown_rx.clone();
                    async move { StatusServer::bind(addr, state, shutdown_rx).await?.run().await }
                })
                .await
        }))
    } else {
        None
    };

    info!("alarmburst initialized. Waiting for triggers...");

    match server_task {
        Some(mut task) => {
            let mut server_done = false;
            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    result?;
                    info!("Shutdown signal received. Shutting down gracefully...");
                }
                joined = &mut task => {
                    server_done = true;
                    // The supervisor only returns early once it has given up.
                    match joined {
                        Ok(Ok(())) => info!("Status server exited."),
                        Ok(Err(e)) => error!("Status server gave up: {:#}", e),
                        Err(e) => error!("Status server task panicked: {:?}", e),
                    }
                }
            }
            controller.stop();
            let _ = shutdown_tx.send(true);
            if !server_done {
                if let Err(e) = task.await {
                    error!("Status server task panicked: {:?}", e);
                }
            }
        }
        None => {
            tokio::signal::ctrl_c().await?;
            info!("Shutdown signal received. Shutting down gracefully...");
            controller.stop();
            let _ = shutdown_tx.send(true);
        }
    }

    if controller.is_active() {
        info!("Waiting for the running burst to acknowledge the stop...");
        let state = controller.wait_idle().await;
        if let Some(report) = state.last_report {
            info!("Final burst ended {:?} after {} notifications.", report.outcome, report.sent_count);
        }
    }

    info!("All tasks shut down. Exiting.");
    Ok(())
}
