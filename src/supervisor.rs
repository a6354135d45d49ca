//! Restarts failing long-running services with bounded exponential backoff.

use crate::config::SupervisorConfig;
use anyhow::Result;
use std::future::Future;
use tokio::sync::watch;
use tokio::time::{sleep, Duration, Instant};
use tracing::{error, info, warn};

/// Owns the restart policy for the process entry point.
#[derive(Debug, Clone)]
pub struct Supervisor {
    config: SupervisorConfig,
    shutdown_rx: watch::Receiver<bool>,
}

impl Supervisor {
    pub fn new(config: SupervisorConfig, shutdown_rx: watch::Receiver<bool>) -> Self {
        Self {
            config,
            shutdown_rx,
        }
    }

    /// Runs the service produced by `factory` until it returns `Ok`, the
    /// shutdown signal fires, or `max_restarts` consecutive failures pile up.
    ///
    /// A run that stays up for at least `max_backoff_ms` counts as healthy and
    /// resets both the backoff and the failure count. A zero backoff never
    /// counts a run as healthy.
    pub async fn run<F, Fut>(&self, name: &'static str, mut factory: F) -> Result<()>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let initial_backoff = Duration::from_millis(self.config.initial_backoff_ms);
        let max_backoff = Duration::from_millis(self.config.max_backoff_ms.max(self.config.initial_backoff_ms));
        let mut backoff = initial_backoff;
        let mut failures: u32 = 0;
        let mut shutdown_rx = self.shutdown_rx.clone();

        loop {
            if *shutdown_rx.borrow() {
                info!(service = name, "Shutdown requested, not starting service.");
                return Ok(());
            }

            info!(service = name, "Starting supervised service.");
            let started = Instant::now();
            let result = tokio::select! {
                biased;
                _ = shutdown_rx.wait_for(|stop| *stop) => {
                    info!(service = name, "Supervised service stopped by shutdown signal.");
                    return Ok(());
                }
                result = factory() => result,
            };

            let err = match result {
                Ok(()) => {
                    info!(service = name, "Supervised service finished.");
                    return Ok(());
                }
                Err(e) => e,
            };

            // With a zero backoff every run would count as healthy and the
            // restart limit would never be reached.
            if !max_backoff.is_zero() && started.elapsed() >= max_backoff {
                backoff = initial_backoff;
                failures = 0;
            }
            failures += 1;

            if let Some(max_restarts) = self.config.max_restarts {
                if failures > max_restarts {
                    error!(service = name, failures, error = %err, "Giving up on supervised service.");
                    return Err(err.context(format!(
                        "{} failed {} times in a row",
                        name, failures
                    )));
                }
            }

            warn!(
                service = name,
                failures,
                error = %err,
                "Supervised service failed, restarting in {} ms",
                backoff.as_millis()
            );
            tokio::select! {
                biased;
                _ = shutdown_rx.wait_for(|stop| *stop) => {
                    info!(service = name, "Shutdown requested during restart backoff.");
                    return Ok(());
                }
                _ = sleep(backoff) => {}
            }
            backoff = std::cmp::min(backoff * 2, max_backoff);
        }
    }
}
