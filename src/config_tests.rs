// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `config.rs`

#[cfg(test)]
mod tests {
    use super::super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ControllerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.namespaces, vec![String::new()]);
    }

    #[test]
    fn test_grace_ratio_bounds() {
        for ratio in [-0.1_f32, 1.5] {
            let config = ControllerConfig {
                grace_period_ratio: ratio,
                ..Default::default()
            };
            assert!(
                matches!(config.validate(), Err(Error::Config(_))),
                "ratio {ratio} should be rejected"
            );
        }
    }

    #[test]
    fn test_empty_trust_domain_is_rejected() {
        let config = ControllerConfig {
            trust_domain: String::new(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_grace_ratio_outside_recommended_window_is_accepted() {
        for ratio in [0.0_f32, 0.1, 0.9, 1.0] {
            let config = ControllerConfig {
                grace_period_ratio: ratio,
                ..Default::default()
            };
            assert!(config.validate().is_ok(), "ratio {ratio} should be accepted");
        }
    }

    #[test]
    fn test_parse_dns_name_entry() {
        let (account, entry) =
            parse_dns_name_entry("istio-pilot-service-account=istio-pilot.istio-system").unwrap();
        assert_eq!(account, "istio-pilot-service-account");
        assert_eq!(entry.service_name, "istio-pilot");
        assert_eq!(entry.namespace, "istio-system");
        assert!(entry.custom_domains.is_empty());
    }

    #[test]
    fn test_parse_dns_name_entry_rejects_malformed() {
        assert!(parse_dns_name_entry("no-equals").is_err());
        assert!(parse_dns_name_entry("account=nodot").is_err());
        assert!(parse_dns_name_entry("=svc.ns").is_err());
    }

    #[test]
    fn test_parse_custom_dns_names() {
        let pairs =
            parse_custom_dns_names("bookinfo.default:bookinfo.com, bookinfo.default:bi.io,,").unwrap();
        assert_eq!(
            pairs,
            vec![
                ("bookinfo.default".to_string(), "bookinfo.com".to_string()),
                ("bookinfo.default".to_string(), "bi.io".to_string()),
            ]
        );
        assert!(parse_custom_dns_names("missing-colon").is_err());
    }

    #[test]
    fn test_build_dns_names_merges_custom_domains() {
        let (account, entry) = parse_dns_name_entry("pilot=istio-pilot.istio-system").unwrap();
        let names = build_dns_names(
            vec![(account, entry)],
            vec![
                ("pilot".to_string(), "pilot.example.com".to_string()),
                ("bookinfo.default".to_string(), "bookinfo.com".to_string()),
            ],
        );
        assert_eq!(names["pilot"].service_name, "istio-pilot");
        assert_eq!(names["pilot"].custom_domains, vec!["pilot.example.com"]);
        assert_eq!(names["bookinfo.default"].custom_domains, vec!["bookinfo.com"]);
        assert!(names["bookinfo.default"].service_name.is_empty());
    }
}
