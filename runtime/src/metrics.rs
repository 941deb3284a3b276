//! Prometheus metrics for the commit pipeline.
//!
//! Metrics are recorded through the `metrics` facade. Nothing is exported unless a
//! recorder is installed, for instance with [`MetricsServer::start`].
//!
//! # Example
//!
//! ```rust,no_run
//! use commitflow_runtime::metrics::MetricsServer;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

// Re-export metrics macros for use in other modules
pub use metrics::{counter, histogram};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus metrics recorder handle.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a new metrics server description.
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Register metric descriptions and install the Prometheus recorder.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built or installed. A recorder that is
    /// already installed (e.g., by another test) is tolerated.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
                tracing::info!(addr = %self.addr, "Metrics recorder installed");
                Ok(())
            }
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            }
        }
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if this instance did not install the recorder.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

fn register_metrics() {
    describe_counter!(
        "commit_attempts_total",
        "Total number of commit attempts started"
    );
    describe_counter!(
        "commit_outcomes_total",
        "Commit attempts by outcome (appended, duplicate, version_conflict, ...)"
    );
    describe_histogram!(
        "commit_append_duration_seconds",
        "Time taken to append an event stream"
    );
    describe_counter!(
        "commit_published_total",
        "Total number of event streams published"
    );
    describe_counter!(
        "command_results_total",
        "Command results reported, by status"
    );
    describe_counter!(
        "command_retries_total",
        "Commands handed back for re-execution"
    );
    describe_counter!(
        "action_attempts_total",
        "Attempts made by the action executor, by action"
    );
    describe_counter!(
        "action_exhausted_total",
        "Actions that exhausted their retry budget, by action"
    );
}

/// Commit pipeline metrics recorder.
pub struct CommitMetrics;

impl CommitMetrics {
    /// Record the start of a commit attempt.
    pub fn record_attempt() {
        counter!("commit_attempts_total").increment(1);
    }

    /// Record the classified outcome of a commit attempt.
    pub fn record_outcome(outcome: &'static str) {
        counter!("commit_outcomes_total", "outcome" => outcome).increment(1);
    }

    /// Record an append round-trip.
    pub fn record_append(duration: Duration) {
        histogram!("commit_append_duration_seconds").record(duration.as_secs_f64());
    }

    /// Record a published stream.
    pub fn record_published() {
        counter!("commit_published_total").increment(1);
    }
}

/// Command outcome metrics recorder.
pub struct CommandMetrics;

impl CommandMetrics {
    /// Record a reported command result.
    pub fn record_result(status: &'static str) {
        counter!("command_results_total", "status" => status).increment(1);
    }

    /// Record a command handed back for re-execution.
    pub fn record_retry() {
        counter!("command_retries_total").increment(1);
    }
}

/// Action executor metrics recorder.
pub struct ActionMetrics;

impl ActionMetrics {
    /// Record one attempt of an action.
    pub fn record_attempt(action: &str) {
        counter!("action_attempts_total", "action" => action.to_string()).increment(1);
    }

    /// Record an action that ran out of attempts.
    pub fn record_exhausted(action: &str) {
        counter!("action_exhausted_total", "action" => action.to_string()).increment(1);
    }
}
