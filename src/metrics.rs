// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Prometheus metrics for the workload secret controller.
//!
//! All metrics use the namespace prefix `citadel_secret_controller_`.
//!
//! # Metrics Categories
//!
//! - **Watch Event Metrics** - `ServiceAccount` and secret lifecycle events seen
//! - **Issuance Metrics** - CSR generation and signing failures
//! - **Secret Metrics** - Secrets created and refreshed
//! - **Trust Bundle Metrics** - Reloads triggered by CA secret divergence
//!
//! # Example
//!
//! ```rust,no_run
//! use workload_secret_controller::metrics::{gather_metrics, record_service_account_created};
//!
//! record_service_account_created();
//! let text = gather_metrics().unwrap();
//! assert!(text.contains("service_account_creations_total"));
//! ```

use axum::{http::StatusCode, routing::get, Router};
use prometheus::{Counter, CounterVec, Encoder, Opts, Registry, TextEncoder};
use std::net::SocketAddr;
use std::sync::LazyLock;
use tracing::{error, info};

// ============================================================================
// Metric Name Constants
// ============================================================================

/// Namespace prefix for all controller metrics (prometheus-safe)
const METRICS_NAMESPACE: &str = "citadel_secret_controller";

// ============================================================================
// Global Metrics Registry
// ============================================================================

/// Global Prometheus metrics registry
///
/// All metrics are registered in this registry and exposed via `/metrics` endpoint.
pub static METRICS_REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

fn register_counter(name: &str, help: &str) -> Counter {
    let counter = Counter::with_opts(Opts::new(format!("{METRICS_NAMESPACE}_{name}"), help)).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
}

fn register_counter_vec(name: &str, help: &str, labels: &[&str]) -> CounterVec {
    let counter = CounterVec::new(Opts::new(format!("{METRICS_NAMESPACE}_{name}"), help), labels).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
}

// ============================================================================
// Watch Event Metrics
// ============================================================================

/// Total number of `ServiceAccount` additions observed
pub static SERVICE_ACCOUNT_CREATIONS_TOTAL: LazyLock<Counter> = LazyLock::new(|| {
    register_counter(
        "service_account_creations_total",
        "Total number of service account additions observed",
    )
});

/// Total number of `ServiceAccount` deletions observed
pub static SERVICE_ACCOUNT_DELETIONS_TOTAL: LazyLock<Counter> = LazyLock::new(|| {
    register_counter(
        "service_account_deletions_total",
        "Total number of service account deletions observed",
    )
});

/// Total number of managed secret deletions whose owner still exists
pub static SECRET_DELETIONS_TOTAL: LazyLock<Counter> = LazyLock::new(|| {
    register_counter(
        "secret_deletions_total",
        "Total number of managed secret deletions whose service account still exists",
    )
});

// ============================================================================
// Issuance Metrics
// ============================================================================

/// Total number of CSR generation failures
pub static CSR_ERRORS_TOTAL: LazyLock<Counter> = LazyLock::new(|| {
    register_counter("csr_errors_total", "Total number of CSR generation failures")
});

/// Total number of signing failures by CA error type
///
/// Labels:
/// - `error_type`: `CA_NOT_READY`, `CSR_ERROR`, `TTL_ERROR`, `CERT_GEN_ERROR`
pub static CERT_SIGN_ERRORS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    register_counter_vec(
        "cert_sign_errors_total",
        "Total number of certificate signing failures by error type",
        &["error_type"],
    )
});

// ============================================================================
// Secret Metrics
// ============================================================================

/// Total number of managed secrets created
pub static SECRETS_CREATED_TOTAL: LazyLock<Counter> = LazyLock::new(|| {
    register_counter("secrets_created_total", "Total number of managed secrets created")
});

/// Total number of managed secrets refreshed
///
/// Labels:
/// - `reason`: `expiring` or `root_mismatch`
pub static SECRETS_REFRESHED_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    register_counter_vec(
        "secrets_refreshed_total",
        "Total number of managed secrets refreshed by reason",
        &["reason"],
    )
});

/// Total number of failed operations
///
/// Labels:
/// - `operation`: `create`, `update`, `delete`, `generate`, `bundle_sync`
pub static ERRORS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    register_counter_vec(
        "errors_total",
        "Total number of failed operations by operation",
        &["operation"],
    )
});

// ============================================================================
// Trust Bundle Metrics
// ============================================================================

/// Total number of trust bundle reloads from the CA secret
pub static TRUST_BUNDLE_RELOADS_TOTAL: LazyLock<Counter> = LazyLock::new(|| {
    register_counter(
        "trust_bundle_reloads_total",
        "Total number of trust bundle reloads from the CA secret",
    )
});

// ============================================================================
// Helper Functions
// ============================================================================

/// Record an observed `ServiceAccount` addition
pub fn record_service_account_created() {
    SERVICE_ACCOUNT_CREATIONS_TOTAL.inc();
}

/// Record an observed `ServiceAccount` deletion
pub fn record_service_account_deleted() {
    SERVICE_ACCOUNT_DELETIONS_TOTAL.inc();
}

/// Record a managed secret deletion
pub fn record_secret_deleted() {
    SECRET_DELETIONS_TOTAL.inc();
}

/// Record a CSR generation failure
pub fn record_csr_error() {
    CSR_ERRORS_TOTAL.inc();
}

/// Record a signing failure
///
/// # Arguments
/// * `error_type` - Stable CA error label (see [`crate::errors::CaError::error_type`])
pub fn record_sign_error(error_type: &str) {
    CERT_SIGN_ERRORS_TOTAL
        .with_label_values(&[error_type])
        .inc();
}

/// Record a created secret
pub fn record_secret_created() {
    SECRETS_CREATED_TOTAL.inc();
}

/// Record a refreshed secret
///
/// # Arguments
/// * `reason` - Why the secret was refreshed
pub fn record_secret_refreshed(reason: &str) {
    SECRETS_REFRESHED_TOTAL.with_label_values(&[reason]).inc();
}

/// Record a failed operation
///
/// # Arguments
/// * `operation` - The operation that failed (e.g., `create`)
pub fn record_error(operation: &str) {
    ERRORS_TOTAL.with_label_values(&[operation]).inc();
}

/// Record a trust bundle reload
pub fn record_bundle_reload() {
    TRUST_BUNDLE_RELOADS_TOTAL.inc();
}

/// Gather and encode all metrics in Prometheus text format
///
/// # Errors
/// Returns error if encoding fails
pub fn gather_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = METRICS_REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(format!("UTF-8 error: {e}")))
}

async fn metrics_handler() -> (StatusCode, String) {
    match gather_metrics() {
        Ok(body) => (StatusCode::OK, body),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

/// Router exposing `/metrics` and `/healthz`
pub fn router() -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(|| async { "ok" }))
}

/// Serve the monitoring endpoints until the listener fails.
///
/// # Errors
/// Returns an error if the port cannot be bound or the server fails.
pub async fn serve(port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "Serving metrics");
    axum::serve(listener, router()).await
}
