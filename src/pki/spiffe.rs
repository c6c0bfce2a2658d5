// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Workload identity URIs.

use crate::constants::SPIFFE_SCHEME;
use crate::errors::CertError;

/// Build `spiffe://<trust-domain>/ns/<namespace>/sa/<service-account>`.
///
/// # Errors
///
/// Returns [`CertError::Identity`] if the trust domain is empty.
pub fn generate_spiffe_uri(
    trust_domain: &str,
    namespace: &str,
    service_account: &str,
) -> Result<String, CertError> {
    if trust_domain.is_empty() {
        return Err(CertError::Identity(
            "trust domain is not configured".to_string(),
        ));
    }
    Ok(format!(
        "{SPIFFE_SCHEME}://{trust_domain}/ns/{namespace}/sa/{service_account}"
    ))
}
