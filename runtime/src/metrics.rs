//! Prometheus metrics for the check-in services.
//!
//! Every service records through the `metrics` facade; [`MetricsServer`]
//! installs the Prometheus recorder and, when started, the scrape endpoint.
//!
//! # Example
//!
//! ```rust,no_run
//! use turnstile_runtime::metrics::MetricsServer;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//!
//! // Metrics available at http://localhost:9090/metrics
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

pub use metrics::{counter, gauge, histogram};

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

/// Prometheus metrics server.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a new metrics server bound to `addr` once started.
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Install the recorder and serve `/metrics` over HTTP.
    ///
    /// Must be called from within a Tokio runtime; the exporter runs as a
    /// spawned task.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built. A recorder that is
    /// already installed is logged and tolerated.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let (recorder, exporter) = builder()?
            .with_http_listener(self.addr)
            .build()
            .map_err(|e| MetricsError::Build(e.to_string()))?;
        let handle = recorder.handle();

        if metrics::set_global_recorder(recorder).is_err() {
            tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
            return Ok(());
        }

        tokio::spawn(async move {
            if exporter.await.is_err() {
                tracing::error!("Metrics exporter stopped");
            }
        });
        self.handle = Some(handle);
        tracing::info!(
            addr = %self.addr,
            "Metrics server started - available at http://{}/metrics",
            self.addr
        );
        Ok(())
    }

    /// Install the recorder without an HTTP listener, for rendering in-process.
    ///
    /// # Errors
    ///
    /// Returns error if the recorder cannot be built.
    pub fn install_recorder(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        match builder()?.install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
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

fn builder() -> Result<PrometheusBuilder, MetricsError> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Suffix("duration_seconds".to_string()),
            &[
                0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5,
            ],
        )
        .map_err(|e| MetricsError::Build(e.to_string()))
}

/// Register all metric descriptions.
fn register_metrics() {
    // Validation
    describe_counter!(
        "turnstile_validation_verdicts_total",
        "Validation verdicts by outcome"
    );
    describe_counter!(
        "turnstile_fraud_signals_total",
        "Fraud signals (bad signatures, cross-actor reuse) by kind"
    );

    // Check-in
    describe_counter!(
        "turnstile_check_in_outcomes_total",
        "Check-in outcomes by kind"
    );
    describe_counter!(
        "turnstile_write_conflicts_total",
        "Optimistic write conflicts observed by the coordinator"
    );
    describe_histogram!(
        "turnstile_check_in_duration_seconds",
        "Time taken to process a check-in"
    );

    // Issuance
    describe_counter!("turnstile_tokens_issued_total", "Tokens issued");
    describe_counter!(
        "turnstile_rate_limited_total",
        "Token requests refused by the issuance rate limit"
    );
    describe_counter!(
        "turnstile_secret_rotations_total",
        "Event signing secrets rotated"
    );

    // Manifests
    describe_gauge!(
        "turnstile_manifest_bytes",
        "Compressed size of the most recently built manifest"
    );
    describe_counter!("turnstile_manifests_built_total", "Manifests built");

    // Reconciliation
    describe_counter!(
        "turnstile_reconciled_records_total",
        "Pending check-ins processed by status"
    );
}

/// Validation metrics recorder.
pub struct ValidationMetrics;

impl ValidationMetrics {
    /// Record a verdict.
    pub fn record_verdict(outcome: &'static str) {
        counter!("turnstile_validation_verdicts_total", "outcome" => outcome).increment(1);
    }

    /// Record a fraud signal.
    pub fn record_fraud_signal(kind: &'static str) {
        counter!("turnstile_fraud_signals_total", "kind" => kind).increment(1);
    }
}

/// Check-in metrics recorder.
pub struct CheckInMetrics;

impl CheckInMetrics {
    /// Record a check-in outcome and its latency.
    pub fn record_outcome(outcome: &'static str, duration: Duration) {
        counter!("turnstile_check_in_outcomes_total", "outcome" => outcome).increment(1);
        histogram!("turnstile_check_in_duration_seconds").record(duration.as_secs_f64());
    }

    /// Record an optimistic write conflict.
    pub fn record_conflict() {
        counter!("turnstile_write_conflicts_total").increment(1);
    }
}

/// Token issuance metrics recorder.
pub struct IssuanceMetrics;

impl IssuanceMetrics {
    /// Record an issued token.
    pub fn record_issued() {
        counter!("turnstile_tokens_issued_total").increment(1);
    }

    /// Record a throttled request.
    pub fn record_rate_limited() {
        counter!("turnstile_rate_limited_total").increment(1);
    }

    /// Record a secret rotation.
    pub fn record_rotation() {
        counter!("turnstile_secret_rotations_total").increment(1);
    }
}

/// Manifest metrics recorder.
pub struct ManifestMetrics;

impl ManifestMetrics {
    /// Record a built manifest.
    #[allow(clippy::cast_precision_loss)]
    pub fn record_built(size: usize) {
        counter!("turnstile_manifests_built_total").increment(1);
        gauge!("turnstile_manifest_bytes").set(size as f64);
    }
}

/// Reconciliation metrics recorder.
pub struct ReconcileMetrics;

impl ReconcileMetrics {
    /// Record a processed pending record.
    pub fn record(status: &'static str) {
        counter!("turnstile_reconciled_records_total", "status" => status).increment(1);
    }
}
