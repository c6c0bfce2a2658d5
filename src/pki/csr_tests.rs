// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `csr.rs`

#[cfg(test)]
mod tests {
    use crate::errors::CertError;
    use crate::pki::csr::{build_subject_alt_names, gen_csr, CertOptions};
    use rcgen::{CertificateSigningRequestParams, DnType, DnValue, SanType};

    const HOST: &str = "spiffe://cluster.local/ns/istio-system/sa/istio-pilot-service-account,istio-pilot.istio-system.svc";

    fn parse_csr(pem: &[u8]) -> CertificateSigningRequestParams {
        CertificateSigningRequestParams::from_pem(std::str::from_utf8(pem).unwrap()).unwrap()
    }

    #[test]
    fn test_sans_split_uri_and_dns() {
        let sans = build_subject_alt_names(HOST).unwrap();
        assert_eq!(sans.len(), 2);
        assert!(matches!(&sans[0], SanType::URI(uri) if uri.as_str().starts_with("spiffe://")));
        assert!(
            matches!(&sans[1], SanType::DnsName(dns) if dns.as_str() == "istio-pilot.istio-system.svc")
        );
    }

    #[test]
    fn test_csr_carries_all_hosts() {
        let bundle = gen_csr(&CertOptions {
            host: HOST.to_string(),
            ..Default::default()
        })
        .unwrap();

        let csr = parse_csr(&bundle.csr_pem);
        assert_eq!(csr.params.subject_alt_names.len(), 2);
        assert!(csr.params.distinguished_name.get(&DnType::CommonName).is_none());
    }

    #[test]
    fn test_dual_use_sets_common_name() {
        let bundle = gen_csr(&CertOptions {
            host: HOST.to_string(),
            dual_use: true,
            ..Default::default()
        })
        .unwrap();

        let csr = parse_csr(&bundle.csr_pem);
        let expected = HOST.split(',').next().unwrap();
        match csr.params.distinguished_name.get(&DnType::CommonName) {
            Some(DnValue::Utf8String(cn)) => assert_eq!(cn, expected),
            Some(DnValue::PrintableString(cn)) => assert_eq!(cn.as_str(), expected),
            other => panic!("unexpected common name {other:?}"),
        }
    }

    #[test]
    fn test_key_encoding_follows_pkcs8_flag() {
        let sec1 = gen_csr(&CertOptions {
            host: HOST.to_string(),
            pkcs8_key: false,
            ..Default::default()
        })
        .unwrap();
        let block = pem::parse(&sec1.key_pem).unwrap();
        assert_eq!(block.tag(), "EC PRIVATE KEY");
        // SEC1 ECPrivateKey starts with version 1.
        let version = yasna::parse_der(block.contents(), |r| {
            r.read_sequence(|r| {
                let version = r.next().read_u8()?;
                let _key = r.next().read_bytes()?;
                let _curve = r.read_optional(|r| {
                    r.read_tagged(yasna::Tag::context(0), |r| r.read_oid())
                })?;
                let _public =
                    r.read_optional(|r| r.read_tagged(yasna::Tag::context(1), |r| r.read_bitvec_bytes()))?;
                Ok(version)
            })
        })
        .unwrap();
        assert_eq!(version, 1);

        let pkcs8 = gen_csr(&CertOptions {
            host: HOST.to_string(),
            pkcs8_key: true,
            ..Default::default()
        })
        .unwrap();
        assert_eq!(pem::parse(&pkcs8.key_pem).unwrap().tag(), "PRIVATE KEY");
        assert!(rcgen::KeyPair::from_pem(std::str::from_utf8(&pkcs8.key_pem).unwrap()).is_ok());
    }

    #[test]
    fn test_empty_host_is_rejected() {
        for host in ["", " , "] {
            let err = gen_csr(&CertOptions {
                host: host.to_string(),
                ..Default::default()
            })
            .unwrap_err();
            assert!(matches!(err, CertError::Identity(_)), "host {host:?}");
        }
    }
}
