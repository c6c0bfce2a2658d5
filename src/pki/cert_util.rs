// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! PEM helpers and the rotation window check.

use crate::errors::CertError;
use chrono::{DateTime, TimeZone, Utc};
use std::time::Duration;
use x509_parser::prelude::*;

/// Decode every `CERTIFICATE` block in `pem_bytes` to DER.
///
/// # Errors
///
/// Returns [`CertError::Parse`] if the input is not PEM or holds no certificate.
pub fn parse_pem_certs(pem_bytes: &[u8]) -> Result<Vec<Vec<u8>>, CertError> {
    let blocks = ::pem::parse_many(pem_bytes)
        .map_err(|e| CertError::Parse(format!("invalid PEM: {e}")))?;
    let certs: Vec<Vec<u8>> = blocks
        .into_iter()
        .filter(|block| block.tag() == "CERTIFICATE")
        .map(|block| block.contents().to_vec())
        .collect();
    if certs.is_empty() {
        return Err(CertError::Parse("no certificate found in PEM".to_string()));
    }
    Ok(certs)
}

/// DER of the first certificate in a PEM chain.
///
/// # Errors
///
/// Returns [`CertError::Parse`] if no certificate can be decoded.
pub fn first_cert_der(pem_bytes: &[u8]) -> Result<Vec<u8>, CertError> {
    parse_pem_certs(pem_bytes)?
        .into_iter()
        .next()
        .ok_or_else(|| CertError::Parse("empty certificate chain".to_string()))
}

fn to_utc(ts: i64) -> Result<DateTime<Utc>, CertError> {
    Utc.timestamp_opt(ts, 0)
        .single()
        .ok_or_else(|| CertError::Parse(format!("timestamp {ts} out of range")))
}

/// How long until the first certificate in `cert_chain` enters its rotation window.
///
/// The grace period is `max(lifetime * grace_ratio, min_grace)`, where the
/// lifetime is `notAfter - notBefore`.
///
/// # Errors
///
/// - [`CertError::Parse`] if the chain cannot be decoded
/// - [`CertError::Expired`] if the certificate is already past `notAfter`
/// - [`CertError::RenewNow`] if the certificate is inside its grace window
///
/// Any error means the certificate should be rotated.
pub fn wait_time(
    cert_chain: &[u8],
    now: DateTime<Utc>,
    grace_ratio: f32,
    min_grace: Duration,
) -> Result<Duration, CertError> {
    let der = first_cert_der(cert_chain)?;
    let (_, cert) = X509Certificate::from_der(&der)
        .map_err(|e| CertError::Parse(format!("invalid certificate: {e}")))?;

    let not_before = to_utc(cert.validity().not_before.timestamp())?;
    let not_after = to_utc(cert.validity().not_after.timestamp())?;

    let time_to_expire = not_after - now;
    if time_to_expire < chrono::Duration::zero() {
        return Err(CertError::Expired {
            expired_at: not_after.to_rfc3339(),
            now: now.to_rfc3339(),
        });
    }

    let lifetime = (not_after - not_before).to_std().unwrap_or_default();
    let grace = lifetime.mul_f64(f64::from(grace_ratio)).max(min_grace);
    let grace = chrono::Duration::from_std(grace).unwrap_or(chrono::Duration::MAX);

    let wait = time_to_expire - grace;
    if wait <= chrono::Duration::zero() {
        return Err(CertError::RenewNow);
    }
    wait.to_std().map_err(|_| CertError::RenewNow)
}
