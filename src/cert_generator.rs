// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Key and certificate generation for a `ServiceAccount`.

use crate::config::ControllerConfig;
use crate::context::Context;
use crate::errors::{Error, Result};
use crate::metrics::{record_csr_error, record_sign_error};
use crate::pki::{gen_csr, generate_spiffe_uri, CertOptions};
use tracing::error;

/// Issued chain, its private key, and the root that signed it, PEM encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyCertMaterial {
    /// Leaf certificate followed by the CA chain
    pub cert_chain: Vec<u8>,
    /// Private key matching the leaf
    pub private_key: Vec<u8>,
    /// Trust root from the same bundle snapshot as the chain
    pub root_cert: Vec<u8>,
}

/// Identities placed in the certificate for `name` in `namespace`.
///
/// The first entry is always the workload URI. Control plane entries keyed by
/// the bare account name add `service.namespace.svc` and `service.namespace`
/// when the namespace matches; entries keyed by `name.namespace` add their
/// custom domains.
///
/// # Errors
///
/// Returns [`Error::Generation`] if the identity URI cannot be built.
pub fn subject_ids(config: &ControllerConfig, name: &str, namespace: &str) -> Result<Vec<String>> {
    let uri = generate_spiffe_uri(&config.trust_domain, namespace, name).map_err(|e| {
        Error::Generation {
            namespace: namespace.to_string(),
            name: name.to_string(),
            reason: e.to_string(),
        }
    })?;
    let mut ids = vec![uri];

    if let Some(entry) = config.dns_names.get(name) {
        if entry.namespace == namespace {
            ids.push(format!("{}.{}.svc", entry.service_name, entry.namespace));
            ids.push(format!("{}.{}", entry.service_name, entry.namespace));
        }
    }
    if let Some(entry) = config.dns_names.get(&format!("{name}.{namespace}")) {
        ids.extend(entry.custom_domains.iter().cloned());
    }
    Ok(ids)
}

/// Generate a key and obtain a signed chain for `name` in `namespace`.
///
/// Signing failures are counted by error type and returned as
/// [`Error::Signing`]; they are not retried here.
///
/// # Errors
///
/// Returns [`Error::Generation`] if the CSR cannot be built, or
/// [`Error::Signing`] if the CA rejects it.
pub fn generate(ctx: &Context, name: &str, namespace: &str) -> Result<KeyCertMaterial> {
    let config = &ctx.config;
    let ids = subject_ids(config, name, namespace)?;

    let options = CertOptions {
        host: ids.join(","),
        dual_use: config.dual_use,
        pkcs8_key: config.pkcs8_key,
    };
    let csr = gen_csr(&options).map_err(|e| {
        error!(namespace, name, error = %e, "CSR generation error");
        record_csr_error();
        Error::Generation {
            namespace: namespace.to_string(),
            name: name.to_string(),
            reason: e.to_string(),
        }
    })?;

    let signed = ctx
        .ca
        .sign_with_cert_chain(&csr.csr_pem, &ids, config.cert_ttl, config.for_ca)
        .map_err(|e| {
            error!(namespace, name, error = %e, "CSR signing error");
            record_sign_error(e.error_type());
            Error::Signing(e)
        })?;

    Ok(KeyCertMaterial {
        cert_chain: signed.cert_chain,
        private_key: csr.key_pem,
        root_cert: signed.root_cert,
    })
}

#[cfg(test)]
#[path = "cert_generator_tests.rs"]
mod cert_generator_tests;
