// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Key pair and certificate signing request generation.

use crate::errors::CertError;
use rcgen::{
    string::Ia5String, CertificateParams, DistinguishedName, DnType, DnValue, KeyPair, SanType,
};
use yasna::{models::ObjectIdentifier, Tag};

/// Options controlling a single CSR.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CertOptions {
    /// Comma separated identities; `scheme://` values become URI SANs, the rest DNS SANs
    pub host: String,
    /// Also place the first identity in the subject common name
    pub dual_use: bool,
    /// Emit the private key as PKCS#8 instead of SEC1
    pub pkcs8_key: bool,
}

/// Generated CSR and its private key, both PEM encoded.
#[derive(Debug, Clone)]
pub struct CsrBundle {
    /// `CERTIFICATE REQUEST` PEM
    pub csr_pem: Vec<u8>,
    /// `PRIVATE KEY` or `EC PRIVATE KEY` PEM
    pub key_pem: Vec<u8>,
}

/// Turn a host string into SAN entries.
///
/// # Errors
///
/// Returns [`CertError::Identity`] if an entry is not a valid IA5 string.
pub fn build_subject_alt_names(host: &str) -> Result<Vec<SanType>, CertError> {
    host.split(',')
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .map(|h| {
            let value = Ia5String::try_from(h.to_string())
                .map_err(|e| CertError::Identity(format!("invalid SAN '{h}': {e}")))?;
            Ok(if h.contains("://") {
                SanType::URI(value)
            } else {
                SanType::DnsName(value)
            })
        })
        .collect()
}

/// Generate an ECDSA P-256 key pair and a CSR for `options.host`.
///
/// # Errors
///
/// Returns [`CertError::Identity`] for an empty or invalid host list and
/// [`CertError::Key`] if key generation or encoding fails.
pub fn gen_csr(options: &CertOptions) -> Result<CsrBundle, CertError> {
    let sans = build_subject_alt_names(&options.host)?;
    if sans.is_empty() {
        return Err(CertError::Identity("CSR requires at least one host".to_string()));
    }

    let mut params = CertificateParams::default();
    let mut dn = DistinguishedName::new();
    if options.dual_use {
        if let Some(first) = options.host.split(',').map(str::trim).find(|h| !h.is_empty()) {
            dn.push(DnType::CommonName, DnValue::Utf8String(first.to_string()));
        }
    }
    params.distinguished_name = dn;
    params.subject_alt_names = sans;

    let key_pair = KeyPair::generate()
        .map_err(|e| CertError::Key(format!("failed to generate key: {e}")))?;
    let csr = params
        .serialize_request(&key_pair)
        .map_err(|e| CertError::Key(format!("failed to create CSR: {e}")))?;
    let csr_pem = csr
        .pem()
        .map_err(|e| CertError::Key(format!("failed to serialize CSR: {e}")))?;

    let key_pem = if options.pkcs8_key {
        key_pair.serialize_pem()
    } else {
        let sec1 = pkcs8_to_sec1(&key_pair.serialize_der())?;
        pem::encode(&pem::Pem::new("EC PRIVATE KEY", sec1))
    };

    Ok(CsrBundle {
        csr_pem: csr_pem.into_bytes(),
        key_pem: key_pem.into_bytes(),
    })
}

/// Re-encode a PKCS#8 EC private key as a SEC1 `ECPrivateKey` carrying its curve.
///
/// # Errors
///
/// Returns [`CertError::Key`] if the input is not a PKCS#8 EC key.
pub fn pkcs8_to_sec1(pkcs8_der: &[u8]) -> Result<Vec<u8>, CertError> {
    let (curve, inner) = yasna::parse_der(pkcs8_der, |r| {
        r.read_sequence(|r| {
            let _version = r.next().read_u8()?;
            let curve = r.next().read_sequence(|r| {
                let _algorithm = r.next().read_oid()?;
                r.next().read_oid()
            })?;
            let inner = r.next().read_bytes()?;
            let _attributes = r.read_optional(|r| r.read_tagged_implicit(Tag::context(0), |r| r.read_der()))?;
            Ok((curve, inner))
        })
    })
    .map_err(|e| CertError::Key(format!("invalid PKCS#8 key: {e}")))?;

    let (private_key, public_key) = yasna::parse_der(&inner, |r| {
        r.read_sequence(|r| {
            let _version = r.next().read_u8()?;
            let private_key = r.next().read_bytes()?;
            let _params: Option<ObjectIdentifier> =
                r.read_optional(|r| r.read_tagged(Tag::context(0), |r| r.read_oid()))?;
            let public_key =
                r.read_optional(|r| r.read_tagged(Tag::context(1), |r| r.read_bitvec_bytes()))?;
            Ok((private_key, public_key))
        })
    })
    .map_err(|e| CertError::Key(format!("invalid EC private key: {e}")))?;

    Ok(yasna::construct_der(|w| {
        w.write_sequence(|w| {
            w.next().write_u8(1);
            w.next().write_bytes(&private_key);
            w.next()
                .write_tagged(Tag::context(0), |w| w.write_oid(&curve));
            if let Some((bits, len)) = &public_key {
                w.next()
                    .write_tagged(Tag::context(1), |w| w.write_bitvec_bytes(bits, *len));
            }
        })
    }))
}
