//! # Internal Metrics Module
//!
//! This module provides the infrastructure for collecting and exposing
//! dispatch metrics.
//!
//! ## Components:
//!
//! - **`MetricsBuilder`**: The entry point for initializing the metrics system.
//!   It sets up the Prometheus recorder, binds the metrics listener, and
//!   constructs the `Metrics` handle.
//!
//! - **`Metrics`**: A lightweight, cloneable struct that serves as the public
//!   API for the rest of the application to interact with the metrics system.
//!
//! - **`MetricsServer`**: (Defined in `server.rs`) An `axum`-based web server
//!   that exposes the `/metrics` endpoint for Prometheus to scrape.

use crate::config::MetricsConfig;
use crate::core::DispatchOutcome;
use crate::internal_metrics::server::MetricsServer;
use metrics::{Counter, Histogram, Unit};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::error;

/// The public API for the metrics system.
///
/// This struct holds cloneable handles to the metrics collectors.
#[derive(Clone)]
pub struct Metrics {
    pub alert_requests_total: Counter,
    pub notifications_sent_total: Counter,
    pub notifications_failed_total: Counter,
    pub gateway_batches_total: Counter,
    pub dispatch_duration_seconds: Histogram,
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
    /// Creates a new `Metrics` instance and registers descriptions for all
    /// supported metrics with the global recorder.
    pub fn new() -> Self {
        metrics::describe_counter!("alert_requests_total", Unit::Count, "Total number of alert dispatch requests received.");
        metrics::describe_counter!("alert_outcomes_total", Unit::Count, "Total number of finished dispatches, labeled by outcome.");
        metrics::describe_counter!("notifications_sent_total", Unit::Count, "Total number of messages the push gateway reported as delivered.");
        metrics::describe_counter!("notifications_failed_total", Unit::Count, "Total number of messages the push gateway reported as failed.");
        metrics::describe_counter!("gateway_batches_total", Unit::Count, "Total number of bulk calls completed by the push gateway.");
        metrics::describe_histogram!("dispatch_duration_seconds", Unit::Seconds, "The time taken to query the directory and send all batches for one alert.");

        Self {
            alert_requests_total: metrics::counter!("alert_requests_total"),
            notifications_sent_total: metrics::counter!("notifications_sent_total"),
            notifications_failed_total: metrics::counter!("notifications_failed_total"),
            gateway_batches_total: metrics::counter!("gateway_batches_total"),
            dispatch_duration_seconds: metrics::histogram!("dispatch_duration_seconds"),
        }
    }

    /// Creates a `Metrics` instance that performs no operations.
    /// Used when metrics are disabled in the configuration.
    pub fn disabled() -> Self {
        Self {
            alert_requests_total: Counter::noop(),
            notifications_sent_total: Counter::noop(),
            notifications_failed_total: Counter::noop(),
            gateway_batches_total: Counter::noop(),
            dispatch_duration_seconds: Histogram::noop(),
        }
    }

    /// Records the per-message results of one completed gateway call.
    pub fn record_batch(&self, delivered: usize, failed: usize) {
        self.gateway_batches_total.increment(1);
        self.notifications_sent_total.increment(delivered as u64);
        self.notifications_failed_total.increment(failed as u64);
    }

    /// Records how a dispatch ended and how long it took.
    pub fn record_outcome(&self, outcome: &DispatchOutcome, elapsed: Duration) {
        metrics::counter!("alert_outcomes_total", "outcome" => outcome.label()).increment(1);
        self.dispatch_duration_seconds.record(elapsed.as_secs_f64());
    }
}

/// Builder for the metrics system.
///
/// This builder is responsible for initializing the `PrometheusRecorder`,
/// binding the `MetricsServer`, and creating the `Metrics` handle.
pub struct MetricsBuilder {
    config: MetricsConfig,
}

impl MetricsBuilder {
    /// Creates a new `MetricsBuilder` with the given configuration.
    pub fn new(config: MetricsConfig) -> Self {
        Self { config }
    }

    /// Initializes the metrics system and returns a `Metrics` handle and an
    /// optional `MetricsServer` with its bound address.
    ///
    /// If metrics are disabled, or the recorder or listener cannot be set up,
    /// this returns a disabled `Metrics` instance and `None` for the server.
    pub async fn build(
        self,
        shutdown_rx: watch::Receiver<bool>,
    ) -> (Metrics, Option<(MetricsServer, SocketAddr)>) {
        if !self.config.enabled {
            return (Metrics::disabled(), None);
        }

        let recorder = match PrometheusBuilder::new().set_buckets_for_metric(
            Matcher::Suffix("duration_seconds".to_string()),
            &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0],
        ) {
            Ok(builder) => builder.build_recorder(),
            Err(e) => {
                error!("Failed to configure Prometheus buckets: {}", e);
                return (Metrics::disabled(), None);
            }
        };
        let handle = recorder.handle();

        // Bind the listener before installing the recorder so a bind failure
        // leaves the global recorder untouched.
        let listener = match TcpListener::bind(self.config.listen_address).await {
            Ok(listener) => listener,
            Err(e) => {
                error!(
                    "Failed to bind metrics server to {}: {}",
                    self.config.listen_address, e
                );
                return (Metrics::disabled(), None);
            }
        };

        let addr = match listener.local_addr() {
            Ok(addr) => addr,
            Err(e) => {
                error!("Failed to get local address for metrics server: {}", e);
                return (Metrics::disabled(), None);
            }
        };

        if let Err(e) = metrics::set_global_recorder(recorder) {
            error!("Failed to install Prometheus recorder: {}", e);
            return (Metrics::disabled(), None);
        }

        let metrics = Metrics::new();
        let server = MetricsServer::new(listener, handle, shutdown_rx);
        (metrics, Some((server, addr)))
    }
}

pub mod server;
