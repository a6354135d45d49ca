//! # Internal Metrics Module
//!
//! - **`Metrics`**: a cloneable handle with one method per burst event.
//!   Calls go through the `metrics` facade, so they are no-ops until a
//!   recorder is installed.
//!
//! - **`MetricsBuilder`**: installs the Prometheus recorder when metrics are
//!   enabled and hands back the `PrometheusHandle` the status server renders
//!   at `/metrics`.

use crate::channel::ChannelError;
use crate::config::MetricsConfig;
use crate::dispatch::BurstOutcome;
use metrics::{Counter, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::error;

/// The public API for the metrics system.
#[derive(Clone)]
pub struct Metrics {
    bursts_started_total: Counter,
    notifications_sent_total: Counter,
    notifications_failed_total: Counter,
    media_sent_total: Counter,
    media_failed_total: Counter,
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics").finish_non_exhaustive()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    /// Registers descriptions and creates the counter handles.
    pub fn new() -> Self {
        metrics::describe_counter!("bursts_started_total", Unit::Count, "Total number of notification bursts started.");
        metrics::describe_counter!("bursts_finished_total", Unit::Count, "Total number of bursts finished, labeled by outcome.");
        metrics::describe_counter!("notifications_sent_total", Unit::Count, "Alert messages delivered.");
        metrics::describe_counter!("notifications_failed_total", Unit::Count, "Alert messages that failed on every credential.");
        metrics::describe_counter!("media_sent_total", Unit::Count, "Wake-up media attachments delivered.");
        metrics::describe_counter!("media_failed_total", Unit::Count, "Wake-up media attachments that failed on every credential.");
        metrics::describe_counter!("channel_errors_total", Unit::Count, "Individual outbound call failures, labeled by kind.");

        Self {
            bursts_started_total: metrics::counter!("bursts_started_total"),
            notifications_sent_total: metrics::counter!("notifications_sent_total"),
            notifications_failed_total: metrics::counter!("notifications_failed_total"),
            media_sent_total: metrics::counter!("media_sent_total"),
            media_failed_total: metrics::counter!("media_failed_total"),
        }
    }

    pub fn burst_started(&self) {
        self.bursts_started_total.increment(1);
    }

    pub fn burst_finished(&self, outcome: BurstOutcome) {
        metrics::counter!("bursts_finished_total", "outcome" => outcome.as_str()).increment(1);
    }

    pub fn notification_sent(&self) {
        self.notifications_sent_total.increment(1);
    }

    pub fn notification_failed(&self) {
        self.notifications_failed_total.increment(1);
    }

    pub fn media_sent(&self) {
        self.media_sent_total.increment(1);
    }

    pub fn media_failed(&self) {
        self.media_failed_total.increment(1);
    }

    pub fn channel_error(&self, error: &ChannelError) {
        metrics::counter!("channel_errors_total", "kind" => error.kind()).increment(1);
    }
}

/// Builder for the metrics system.
pub struct MetricsBuilder {
    config: MetricsConfig,
}

impl MetricsBuilder {
    pub fn new(config: MetricsConfig) -> Self {
        Self { config }
    }

    /// Installs the global Prometheus recorder if enabled.
    ///
    /// A recorder that fails to install is logged and metrics stay disabled;
    /// the burst path never depends on it.
    pub fn build(self) -> (Metrics, Option<PrometheusHandle>) {
        if !self.config.enabled {
            return (Metrics::new(), None);
        }

        match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => (Metrics::new(), Some(handle)),
            Err(e) => {
                error!("Failed to install Prometheus recorder: {}", e);
                (Metrics::new(), None)
            }
        }
    }
}
