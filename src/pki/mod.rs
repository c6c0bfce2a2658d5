// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Certificate authority capability and the PKI primitives it is built on.
//!
//! The controller only depends on [`CertificateAuthority`]; the in-tree
//! [`IstioCa`] implements it over a [`KeyCertBundle`] that can be swapped
//! atomically when replicas disagree about the trust root.
//!
//! # Modules
//!
//! - [`ca`] - Self-signed and plugged CA construction and signing
//! - [`csr`] - Key pair and CSR generation
//! - [`spiffe`] - Workload identity URIs
//! - [`cert_util`] - PEM helpers and the rotation window check

pub mod ca;
pub mod cert_util;
pub mod csr;
pub mod spiffe;

#[cfg(test)]
mod csr_tests;

pub use ca::IstioCa;
pub use cert_util::wait_time;
pub use csr::{gen_csr, CertOptions, CsrBundle};
pub use spiffe::generate_spiffe_uri;

use crate::errors::{CaError, Error};
use cert_util::first_cert_der;
use rcgen::{CertificateParams, Issuer, KeyPair};
use std::sync::{PoisonError, RwLock};
use std::time::Duration;
use x509_parser::prelude::*;

/// PEM material held by a [`KeyCertBundle`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyCertPems {
    /// Signing certificate
    pub ca_cert: Vec<u8>,
    /// Signing private key
    pub ca_key: Vec<u8>,
    /// Intermediates between the signing certificate and the root; empty when self-signed
    pub cert_chain: Vec<u8>,
    /// Trust root distributed to workloads
    pub root_cert: Vec<u8>,
}

/// The CA's signing material.
///
/// Readers always observe a complete set: [`KeyCertBundle::verify_and_set_all`]
/// replaces all four fields under one write lock, and only after the new
/// material has been verified.
#[derive(Debug, Default)]
pub struct KeyCertBundle {
    inner: RwLock<KeyCertPems>,
}

impl KeyCertBundle {
    /// Build a bundle from verified material.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BundleVerification`] if the material is inconsistent.
    pub fn new(pems: KeyCertPems) -> Result<Self, Error> {
        verify_bundle(&pems)?;
        Ok(Self {
            inner: RwLock::new(pems),
        })
    }

    /// Copy of all four PEM values.
    #[must_use]
    pub fn all_pem(&self) -> KeyCertPems {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Signing certificate PEM.
    #[must_use]
    pub fn ca_cert_pem(&self) -> Vec<u8> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .ca_cert
            .clone()
    }

    /// Intermediate chain PEM.
    #[must_use]
    pub fn cert_chain_pem(&self) -> Vec<u8> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .cert_chain
            .clone()
    }

    /// Trust root PEM.
    #[must_use]
    pub fn root_cert_pem(&self) -> Vec<u8> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .root_cert
            .clone()
    }

    /// Verify candidate material and, only if it is consistent, replace the bundle.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BundleVerification`] and leaves the bundle untouched
    /// if the material fails verification.
    pub fn verify_and_set_all(
        &self,
        ca_cert: Vec<u8>,
        ca_key: Vec<u8>,
        cert_chain: Vec<u8>,
        root_cert: Vec<u8>,
    ) -> Result<(), Error> {
        let pems = KeyCertPems {
            ca_cert,
            ca_key,
            cert_chain,
            root_cert,
        };
        verify_bundle(&pems)?;
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = pems;
        Ok(())
    }
}

fn invalid(reason: impl std::fmt::Display) -> Error {
    Error::BundleVerification(reason.to_string())
}

fn pem_str(bytes: &[u8], what: &str) -> Result<String, Error> {
    String::from_utf8(bytes.to_vec()).map_err(|e| invalid(format!("{what} is not UTF-8: {e}")))
}

/// Check that the CA certificate, key, chain, and root fit together.
///
/// - the CA certificate and root parse
/// - the CA key parses and signs certificates that verify against the CA certificate
/// - with no chain, the CA certificate is signed by the root
/// - with a chain, every entry parses and the last one is signed by the root
fn verify_bundle(pems: &KeyCertPems) -> Result<(), Error> {
    let ca_der = first_cert_der(&pems.ca_cert).map_err(invalid)?;
    let (_, ca_cert) = X509Certificate::from_der(&ca_der)
        .map_err(|e| invalid(format!("invalid CA certificate: {e}")))?;

    let root_der = first_cert_der(&pems.root_cert).map_err(invalid)?;
    let (_, root_cert) = X509Certificate::from_der(&root_der)
        .map_err(|e| invalid(format!("invalid root certificate: {e}")))?;

    let ca_cert_pem = pem_str(&pems.ca_cert, "CA certificate")?;
    let key = KeyPair::from_pem(&pem_str(&pems.ca_key, "CA key")?)
        .map_err(|e| invalid(format!("invalid CA key: {e}")))?;

    // Issue a throwaway certificate with the key and check it against the CA certificate.
    let issuer = Issuer::from_ca_cert_pem(&ca_cert_pem, &key)
        .map_err(|e| invalid(format!("CA certificate cannot issue: {e}")))?;
    let probe_key = KeyPair::generate().map_err(invalid)?;
    let probe = CertificateParams::new(vec!["key-match.probe".to_string()])
        .and_then(|params| params.signed_by(&probe_key, &issuer))
        .map_err(|e| invalid(format!("CA key cannot sign: {e}")))?;
    let (_, probe_cert) = X509Certificate::from_der(probe.der())
        .map_err(|e| invalid(format!("invalid probe certificate: {e}")))?;
    probe_cert
        .verify_signature(Some(ca_cert.public_key()))
        .map_err(|_| invalid("CA key does not match CA certificate"))?;

    if pems.cert_chain.is_empty() {
        ca_cert
            .verify_signature(Some(root_cert.public_key()))
            .map_err(|_| invalid("CA certificate is not signed by the root certificate"))?;
    } else {
        let chain = cert_util::parse_pem_certs(&pems.cert_chain).map_err(invalid)?;
        let mut last = None;
        for der in &chain {
            let (_, cert) = X509Certificate::from_der(der)
                .map_err(|e| invalid(format!("invalid chain certificate: {e}")))?;
            last = Some(cert);
        }
        if let Some(last) = last {
            last.verify_signature(Some(root_cert.public_key()))
                .map_err(|_| invalid("certificate chain does not end at the root certificate"))?;
        }
    }
    Ok(())
}

/// An issued chain together with the root it chains to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedChain {
    /// Leaf certificate followed by the intermediate chain
    pub cert_chain: Vec<u8>,
    /// Root of the bundle snapshot that signed the leaf
    pub root_cert: Vec<u8>,
}

/// A certificate authority able to sign workload CSRs.
///
/// Every signing path works from one [`KeyCertPems`] snapshot, so a bundle
/// swap during issuance never mixes a leaf from one CA with the root or chain
/// of another.
pub trait CertificateAuthority: Send + Sync {
    /// Sign `csr_pem` for `subject_ids`, valid for `ttl`, with the material in `pems`.
    ///
    /// # Errors
    ///
    /// Returns a typed [`CaError`]; callers never retry inline.
    fn sign_with_pems(
        &self,
        pems: &KeyCertPems,
        csr_pem: &[u8],
        subject_ids: &[String],
        ttl: Duration,
        for_ca: bool,
    ) -> Result<Vec<u8>, CaError>;

    /// Sign with the bundle's current material.
    ///
    /// # Errors
    ///
    /// Same as [`CertificateAuthority::sign_with_pems`].
    fn sign(
        &self,
        csr_pem: &[u8],
        subject_ids: &[String],
        ttl: Duration,
        for_ca: bool,
    ) -> Result<Vec<u8>, CaError> {
        let pems = self.key_cert_bundle().all_pem();
        self.sign_with_pems(&pems, csr_pem, subject_ids, ttl, for_ca)
    }

    /// Sign, append the intermediate chain, and return the matching root.
    ///
    /// # Errors
    ///
    /// Same as [`CertificateAuthority::sign_with_pems`].
    fn sign_with_cert_chain(
        &self,
        csr_pem: &[u8],
        subject_ids: &[String],
        ttl: Duration,
        for_ca: bool,
    ) -> Result<SignedChain, CaError> {
        let pems = self.key_cert_bundle().all_pem();
        let mut cert_chain = self.sign_with_pems(&pems, csr_pem, subject_ids, ttl, for_ca)?;
        cert_chain.extend_from_slice(&pems.cert_chain);
        Ok(SignedChain {
            cert_chain,
            root_cert: pems.root_cert,
        })
    }

    /// The signing material backing this CA.
    fn key_cert_bundle(&self) -> &KeyCertBundle;
}
