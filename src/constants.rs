// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Global constants for the workload secret controller.
//!
//! This module contains all numeric and string constants used throughout the codebase.
//! Constants are organized by category for easy maintenance.

// ============================================================================
// Managed Secret Shape
// ============================================================================

/// Value of the `type` field on every secret this controller owns.
///
/// Also used as the field selector for the secret watch.
pub const ISTIO_SECRET_TYPE: &str = "istio.io/key-and-cert";

/// Data key holding the leaf certificate followed by the CA chain
pub const CERT_CHAIN_ID: &str = "cert-chain.pem";

/// Data key holding the workload private key
pub const PRIVATE_KEY_ID: &str = "key.pem";

/// Data key holding the trust root certificate
pub const ROOT_CERT_ID: &str = "root-cert.pem";

/// Prefix prepended to the `ServiceAccount` name to derive the secret name
pub const SECRET_NAME_PREFIX: &str = "istio.";

// ============================================================================
// CA Secret Constants
// ============================================================================

/// Name of the shared secret holding the authoritative self-signed CA
pub const CA_SECRET_NAME: &str = "istio-ca-secret";

/// Type of the shared CA secret
pub const CA_SECRET_TYPE: &str = "istio.io/ca-root";

/// Data key for the CA certificate inside the CA secret
pub const CA_CERT_ID: &str = "ca-cert.pem";

/// Data key for the CA private key inside the CA secret
pub const CA_PRIVATE_KEY_ID: &str = "ca-key.pem";

/// Default namespace where the CA secret lives
pub const DEFAULT_CA_STORAGE_NAMESPACE: &str = "istio-system";

// ============================================================================
// Plugged CA File Names
// ============================================================================

/// File name of the intermediate chain in a plugged CA directory
pub const PLUGGED_CERT_CHAIN_FILE: &str = "cert-chain.pem";

/// File name of the root certificate in a plugged CA directory
pub const PLUGGED_ROOT_CERT_FILE: &str = "root-cert.pem";

// ============================================================================
// Retry and Timing Constants
// ============================================================================

/// Number of attempts when creating a workload secret
pub const SECRET_CREATION_RETRY: u32 = 3;

/// Fixed wait between secret creation attempts (1 second)
pub const SECRET_CREATION_RETRY_INTERVAL_MILLIS: u64 = 1000;

/// Poll interval when loading the CA secret (100ms)
pub const CA_SECRET_POLL_INTERVAL_MILLIS: u64 = 100;

/// Overall timeout when loading the CA secret (5 seconds)
pub const CA_SECRET_LOAD_TIMEOUT_SECS: u64 = 5;

/// Minimum spacing between two trust bundle synchronizations (30 seconds)
pub const BUNDLE_SYNC_COOLDOWN_SECS: u64 = 30;

/// Period at which every cached secret is re-evaluated for rotation (1 minute)
pub const SECRET_RESYNC_PERIOD_SECS: u64 = 60;

/// Capacity of each watch event channel
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

// ============================================================================
// Certificate Defaults
// ============================================================================

/// Default workload certificate TTL (90 days)
pub const DEFAULT_WORKLOAD_CERT_TTL_SECS: u64 = 90 * 24 * 3600;

/// Default grace period ratio for rotation
pub const DEFAULT_GRACE_PERIOD_RATIO: f32 = 0.5;

/// Default minimum grace period (10 minutes)
pub const DEFAULT_MIN_GRACE_PERIOD_SECS: u64 = 600;

/// Lower bound of the recommended grace period ratio window
pub const RECOMMENDED_MIN_GRACE_PERIOD_RATIO: f32 = 0.2;

/// Upper bound of the recommended grace period ratio window
pub const RECOMMENDED_MAX_GRACE_PERIOD_RATIO: f32 = 0.8;

/// Organization placed in the self-signed CA subject
pub const SELF_SIGNED_CA_ORG: &str = "cluster.local";

// ============================================================================
// Identity Constants
// ============================================================================

/// URI scheme for workload identities
pub const SPIFFE_SCHEME: &str = "spiffe";

/// Default trust domain for workload identities
pub const DEFAULT_TRUST_DOMAIN: &str = "cluster.local";

/// Sentinel meaning "watch every namespace"
pub const NAMESPACE_ALL: &str = "";

// ============================================================================
// Runtime Constants
// ============================================================================

/// Default port for the `/metrics` and `/healthz` endpoints
pub const DEFAULT_MONITORING_PORT: u16 = 15014;

/// Number of tokio worker threads
pub const TOKIO_WORKER_THREADS: usize = 4;
