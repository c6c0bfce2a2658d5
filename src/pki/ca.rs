// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! The in-tree certificate authority.
//!
//! [`IstioCa`] runs in one of two modes:
//!
//! - **Self-signed**: the CA certificate is its own root and the intermediate
//!   chain is empty. The key pair is shared between replicas through the
//!   `istio-ca-secret` in the CA storage namespace.
//! - **Plugged**: an operator-provided CA certificate, key, chain, and root
//!   are read from a directory.

use super::{CertificateAuthority, KeyCertBundle, KeyCertPems};
use crate::api::ClusterApi;
use crate::constants::{
    CA_CERT_ID, CA_PRIVATE_KEY_ID, CA_SECRET_NAME, CA_SECRET_TYPE, PLUGGED_CERT_CHAIN_FILE,
    PLUGGED_ROOT_CERT_FILE,
};
use crate::errors::{CaError, CertError, Error, Result};
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use rcgen::{
    string::Ia5String, BasicConstraints, CertificateParams, CertificateSigningRequestParams,
    DistinguishedName, DnType, DnValue, ExtendedKeyUsagePurpose, IsCa, Issuer, KeyPair,
    KeyUsagePurpose, SanType,
};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use time::OffsetDateTime;
use tracing::{info, warn};

/// Certificate authority backed by a [`KeyCertBundle`].
#[derive(Debug)]
pub struct IstioCa {
    bundle: KeyCertBundle,
    max_cert_ttl: Duration,
}

impl IstioCa {
    /// Wrap an existing bundle.
    #[must_use]
    pub fn new(bundle: KeyCertBundle, max_cert_ttl: Duration) -> Self {
        Self {
            bundle,
            max_cert_ttl,
        }
    }

    /// Create a self-signed CA held only in memory.
    ///
    /// # Errors
    ///
    /// Returns an error if key or certificate generation fails.
    pub fn new_self_signed(org: &str, ca_cert_ttl: Duration, max_cert_ttl: Duration) -> Result<Self> {
        let (ca_cert, ca_key) = generate_self_signed_ca(org, ca_cert_ttl)?;
        Self::from_self_signed_pems(ca_cert, ca_key, max_cert_ttl)
    }

    /// Load the self-signed CA from the CA secret, creating it if absent.
    ///
    /// When another replica creates the secret first, its material is read
    /// back and used instead of the locally generated one.
    ///
    /// # Errors
    ///
    /// Returns an error if the secret cannot be read or written, or its
    /// material does not verify.
    pub async fn load_or_create_self_signed(
        api: &dyn ClusterApi,
        namespace: &str,
        org: &str,
        ca_cert_ttl: Duration,
        max_cert_ttl: Duration,
    ) -> Result<Self> {
        match api.get_secret(namespace, CA_SECRET_NAME).await {
            Ok(secret) => {
                info!(namespace, secret = CA_SECRET_NAME, "Loaded existing self-signed CA");
                let (ca_cert, ca_key) = ca_pems_from_secret(&secret, namespace)?;
                return Self::from_self_signed_pems(ca_cert, ca_key, max_cert_ttl);
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }

        info!(namespace, secret = CA_SECRET_NAME, "CA secret not found, generating a self-signed CA");
        let (ca_cert, ca_key) = generate_self_signed_ca(org, ca_cert_ttl)?;
        let secret = build_ca_secret(namespace, &ca_cert, &ca_key);

        match api.create_secret(namespace, &secret).await {
            Ok(_) => Self::from_self_signed_pems(ca_cert, ca_key, max_cert_ttl),
            Err(e) if e.is_already_exists() => {
                warn!(namespace, secret = CA_SECRET_NAME, "CA secret was created concurrently, using the stored CA");
                let stored = api.get_secret(namespace, CA_SECRET_NAME).await?;
                let (ca_cert, ca_key) = ca_pems_from_secret(&stored, namespace)?;
                Self::from_self_signed_pems(ca_cert, ca_key, max_cert_ttl)
            }
            Err(e) => Err(e),
        }
    }

    /// Load an operator-provided CA from `dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if a file cannot be read or the material does not verify.
    pub async fn from_plugged_dir(dir: &Path, max_cert_ttl: Duration) -> Result<Self> {
        let pems = KeyCertPems {
            ca_cert: tokio::fs::read(dir.join(CA_CERT_ID)).await?,
            ca_key: tokio::fs::read(dir.join(CA_PRIVATE_KEY_ID)).await?,
            cert_chain: tokio::fs::read(dir.join(PLUGGED_CERT_CHAIN_FILE)).await?,
            root_cert: tokio::fs::read(dir.join(PLUGGED_ROOT_CERT_FILE)).await?,
        };
        info!(dir = %dir.display(), "Loaded plugged CA");
        Ok(Self::new(KeyCertBundle::new(pems)?, max_cert_ttl))
    }

    fn from_self_signed_pems(ca_cert: Vec<u8>, ca_key: Vec<u8>, max_cert_ttl: Duration) -> Result<Self> {
        let bundle = KeyCertBundle::new(KeyCertPems {
            root_cert: ca_cert.clone(),
            ca_cert,
            ca_key,
            cert_chain: Vec::new(),
        })?;
        Ok(Self::new(bundle, max_cert_ttl))
    }
}

impl CertificateAuthority for IstioCa {
    fn sign_with_pems(
        &self,
        pems: &KeyCertPems,
        csr_pem: &[u8],
        subject_ids: &[String],
        ttl: Duration,
        for_ca: bool,
    ) -> std::result::Result<Vec<u8>, CaError> {
        if ttl > self.max_cert_ttl {
            return Err(CaError::TtlError {
                requested: ttl,
                max: self.max_cert_ttl,
            });
        }

        if pems.ca_cert.is_empty() || pems.ca_key.is_empty() {
            return Err(CaError::NotReady("signing material is not loaded".to_string()));
        }

        let csr = std::str::from_utf8(csr_pem)
            .map_err(|e| CaError::CsrError(format!("CSR is not UTF-8: {e}")))?;
        let mut csr_params = CertificateSigningRequestParams::from_pem(csr)
            .map_err(|e| CaError::CsrError(e.to_string()))?;

        let not_before = OffsetDateTime::now_utc();
        let lifetime = time::Duration::try_from(ttl)
            .map_err(|e| CaError::CertGenError(format!("invalid TTL: {e}")))?;
        csr_params.params.not_before = not_before;
        csr_params.params.not_after = not_before + lifetime;
        csr_params.params.subject_alt_names = subject_alt_names(subject_ids)?;
        if for_ca {
            csr_params.params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
            csr_params.params.key_usages = vec![
                KeyUsagePurpose::KeyCertSign,
                KeyUsagePurpose::CrlSign,
                KeyUsagePurpose::DigitalSignature,
            ];
            csr_params.params.extended_key_usages = Vec::new();
        } else {
            csr_params.params.is_ca = IsCa::ExplicitNoCa;
            csr_params.params.key_usages = vec![
                KeyUsagePurpose::DigitalSignature,
                KeyUsagePurpose::KeyEncipherment,
            ];
            csr_params.params.extended_key_usages = vec![
                ExtendedKeyUsagePurpose::ServerAuth,
                ExtendedKeyUsagePurpose::ClientAuth,
            ];
        }

        let ca_cert = std::str::from_utf8(&pems.ca_cert)
            .map_err(|e| CaError::NotReady(format!("CA certificate is not UTF-8: {e}")))?;
        let ca_key = std::str::from_utf8(&pems.ca_key)
            .map_err(|e| CaError::NotReady(format!("CA key is not UTF-8: {e}")))?;
        let key = KeyPair::from_pem(ca_key).map_err(|e| CaError::NotReady(e.to_string()))?;
        let issuer = Issuer::from_ca_cert_pem(ca_cert, &key)
            .map_err(|e| CaError::CertGenError(format!("failed to load issuer: {e}")))?;

        let cert = csr_params
            .signed_by(&issuer)
            .map_err(|e| CaError::CertGenError(e.to_string()))?;
        Ok(cert.pem().into_bytes())
    }

    fn key_cert_bundle(&self) -> &KeyCertBundle {
        &self.bundle
    }
}

fn subject_alt_names(subject_ids: &[String]) -> std::result::Result<Vec<SanType>, CaError> {
    subject_ids
        .iter()
        .filter(|id| !id.is_empty())
        .map(|id| {
            let value = Ia5String::try_from(id.clone())
                .map_err(|e| CaError::CertGenError(format!("invalid subject ID '{id}': {e}")))?;
            Ok(if id.contains("://") {
                SanType::URI(value)
            } else {
                SanType::DnsName(value)
            })
        })
        .collect()
}

/// Generate a self-signed CA certificate and key, both PEM encoded.
///
/// # Errors
///
/// Returns [`CertError::Key`] if generation fails.
pub fn generate_self_signed_ca(
    org: &str,
    ttl: Duration,
) -> std::result::Result<(Vec<u8>, Vec<u8>), CertError> {
    let mut params = CertificateParams::default();
    let mut dn = DistinguishedName::new();
    dn.push(DnType::OrganizationName, DnValue::Utf8String(org.to_string()));
    params.distinguished_name = dn;
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params.key_usages = vec![
        KeyUsagePurpose::KeyCertSign,
        KeyUsagePurpose::CrlSign,
        KeyUsagePurpose::DigitalSignature,
    ];

    let lifetime = time::Duration::try_from(ttl)
        .map_err(|e| CertError::Key(format!("invalid CA TTL: {e}")))?;
    params.not_before = OffsetDateTime::now_utc();
    params.not_after = params.not_before + lifetime;

    let key_pair = KeyPair::generate()
        .map_err(|e| CertError::Key(format!("failed to generate CA key: {e}")))?;
    let cert = params
        .self_signed(&key_pair)
        .map_err(|e| CertError::Key(format!("failed to create CA certificate: {e}")))?;

    Ok((cert.pem().into_bytes(), key_pair.serialize_pem().into_bytes()))
}

/// Extract the CA certificate and key from the CA secret.
///
/// # Errors
///
/// Returns [`Error::CaSecret`] if either key is missing or empty.
pub fn ca_pems_from_secret(secret: &Secret, namespace: &str) -> Result<(Vec<u8>, Vec<u8>)> {
    let field = |key: &str| -> Result<Vec<u8>> {
        secret
            .data
            .as_ref()
            .and_then(|data| data.get(key))
            .map(|value| value.0.clone())
            .filter(|value| !value.is_empty())
            .ok_or_else(|| Error::CaSecret {
                namespace: namespace.to_string(),
                name: CA_SECRET_NAME.to_string(),
                reason: format!("missing {key}"),
            })
    };
    Ok((field(CA_CERT_ID)?, field(CA_PRIVATE_KEY_ID)?))
}

/// Build the CA secret object.
#[must_use]
pub fn build_ca_secret(namespace: &str, ca_cert: &[u8], ca_key: &[u8]) -> Secret {
    let mut data = BTreeMap::new();
    data.insert(CA_CERT_ID.to_string(), ByteString(ca_cert.to_vec()));
    data.insert(CA_PRIVATE_KEY_ID.to_string(), ByteString(ca_key.to_vec()));
    Secret {
        metadata: ObjectMeta {
            name: Some(CA_SECRET_NAME.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        data: Some(data),
        type_: Some(CA_SECRET_TYPE.to_string()),
        ..Default::default()
    }
}
