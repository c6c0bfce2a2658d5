// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Error types for the workload secret controller.
//!
//! This module provides specialized error types for:
//! - Kubernetes API operations (distinguishing not-found and already-exists)
//! - Certificate authority signing failures
//! - Certificate parsing and rotation window checks
//!
//! Event handlers never let these escape; they are logged at the handler
//! boundary and counted in metrics.

use thiserror::Error;

/// Result alias used across the controller.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors raised by cluster API calls and controller operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Object does not exist (HTTP 404)
    #[error("{kind} '{namespace}/{name}' not found")]
    NotFound {
        /// Kubernetes kind of the missing object
        kind: &'static str,
        /// Namespace searched (empty for cluster-scoped kinds)
        namespace: String,
        /// Name of the missing object
        name: String,
    },

    /// Object already exists (HTTP 409 on create)
    #[error("{kind} '{namespace}/{name}' already exists")]
    AlreadyExists {
        /// Kubernetes kind of the conflicting object
        kind: &'static str,
        /// Namespace of the conflicting object
        namespace: String,
        /// Name of the conflicting object
        name: String,
    },

    /// Any other Kubernetes client error
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// Key or certificate generation for a workload failed
    #[error("failed to generate key and certificate for {namespace}/{name}: {reason}")]
    Generation {
        /// Workload namespace
        namespace: String,
        /// `ServiceAccount` name
        name: String,
        /// Underlying failure
        reason: String,
    },

    /// Signing request rejected by the certificate authority
    #[error("CSR signing error ({0})")]
    Signing(#[from] CaError),

    /// CA secret could not be loaded within the retry budget
    #[error("failed to load CA secret {namespace}/{name}: {reason}")]
    CaSecret {
        /// CA storage namespace
        namespace: String,
        /// CA secret name
        name: String,
        /// Underlying failure
        reason: String,
    },

    /// Candidate key/certificate material failed verification
    #[error("failed to verify key cert bundle: {0}")]
    BundleVerification(String),

    /// Certificate or key parsing failure
    #[error(transparent)]
    Cert(#[from] CertError),

    /// A bounded retry loop ran out of attempts or time
    #[error("{operation} failed after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        /// Human-readable operation name
        operation: String,
        /// Attempts made
        attempts: u32,
        /// Last error observed
        last_error: String,
    },

    /// Shutdown was requested while an operation was waiting
    #[error("{0} cancelled by shutdown")]
    Cancelled(String),

    /// Invalid configuration detected before the engine starts
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Filesystem error while loading plugged CA material
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// `true` when the error denotes a missing object.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }

    /// `true` when the error denotes a create conflict.
    #[must_use]
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Error::AlreadyExists { .. })
    }

    /// Classify a raw Kubernetes error for an object of `kind`.
    #[must_use]
    pub fn from_kube(err: kube::Error, kind: &'static str, namespace: &str, name: &str) -> Self {
        match err {
            kube::Error::Api(ref ae) if ae.code == 404 => Error::NotFound {
                kind,
                namespace: namespace.to_string(),
                name: name.to_string(),
            },
            kube::Error::Api(ref ae) if ae.code == 409 => Error::AlreadyExists {
                kind,
                namespace: namespace.to_string(),
                name: name.to_string(),
            },
            other => Error::Kube(other),
        }
    }
}

/// Errors returned by a certificate authority when signing.
///
/// Each variant maps to a stable label used in the sign error metric.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaError {
    /// Signing material is not loaded
    #[error("CA is not ready: {0}")]
    NotReady(String),

    /// The CSR could not be parsed
    #[error("failed to parse CSR: {0}")]
    CsrError(String),

    /// Requested TTL exceeds what the CA will issue
    #[error("requested TTL {requested:?} is greater than the max allowed TTL {max:?}")]
    TtlError {
        /// TTL requested by the caller
        requested: std::time::Duration,
        /// Maximum TTL the CA allows
        max: std::time::Duration,
    },

    /// Certificate generation failed after the CSR was accepted
    #[error("failed to generate certificate: {0}")]
    CertGenError(String),
}

impl CaError {
    /// Metric label for this error.
    #[must_use]
    pub fn error_type(&self) -> &'static str {
        match self {
            CaError::NotReady(_) => "CA_NOT_READY",
            CaError::CsrError(_) => "CSR_ERROR",
            CaError::TtlError { .. } => "TTL_ERROR",
            CaError::CertGenError(_) => "CERT_GEN_ERROR",
        }
    }
}

/// Errors from certificate parsing and the rotation window check.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CertError {
    /// No PEM certificate could be decoded
    #[error("failed to parse certificate: {0}")]
    Parse(String),

    /// Private key could not be decoded or re-encoded
    #[error("failed to process private key: {0}")]
    Key(String),

    /// Certificate is past its `notAfter`
    #[error("certificate already expired at {expired_at}, but now is {now}")]
    Expired {
        /// Expiry timestamp (RFC 3339)
        expired_at: String,
        /// Evaluation time (RFC 3339)
        now: String,
    },

    /// Certificate is inside its rotation grace window
    #[error("got a certificate that should be renewed now")]
    RenewNow,

    /// Identity URI could not be built
    #[error("invalid identity: {0}")]
    Identity(String),
}

#[cfg(test)]
#[path = "errors_tests.rs"]
mod errors_tests;
