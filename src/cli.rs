// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Command line arguments for the controller binary.
//!
//! Every flag can also be set through the environment variable named next to
//! it. [`Args::controller_config`] turns the parsed flags into a
//! [`ControllerConfig`].

use crate::config::{build_dns_names, parse_custom_dns_names, parse_dns_name_entry, ControllerConfig};
use crate::constants::{
    DEFAULT_CA_STORAGE_NAMESPACE, DEFAULT_MONITORING_PORT, DEFAULT_TRUST_DOMAIN, NAMESPACE_ALL,
    SELF_SIGNED_CA_ORG,
};
use crate::errors::Result;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// Provision and rotate key/certificate secrets for every `ServiceAccount`.
#[derive(Debug, Clone, Parser)]
#[command(name = "workload-secret-controller", version, about)]
pub struct Args {
    /// TTL of issued workload certificates
    #[arg(long, env = "WORKLOAD_CERT_TTL", default_value = "2160h", value_parser = humantime::parse_duration)]
    pub workload_cert_ttl: Duration,

    /// Maximum TTL the CA will sign
    #[arg(long, env = "MAX_WORKLOAD_CERT_TTL", default_value = "2160h", value_parser = humantime::parse_duration)]
    pub max_workload_cert_ttl: Duration,

    /// Fraction of the certificate lifetime reserved for rotation, in [0, 1]
    #[arg(long, env = "WORKLOAD_CERT_GRACE_PERIOD_RATIO", default_value_t = 0.5)]
    pub workload_cert_grace_period_ratio: f32,

    /// Lower bound for the rotation window
    #[arg(long, env = "WORKLOAD_CERT_MIN_GRACE_PERIOD", default_value = "10m", value_parser = humantime::parse_duration)]
    pub workload_cert_min_grace_period: Duration,

    /// Put the identity in the subject CN as well as the SAN
    #[arg(long, env = "DUAL_USE")]
    pub dual_use: bool,

    /// Emit PKCS#8 private keys
    #[arg(long, env = "PKCS8_KEY")]
    pub pkcs8_key: bool,

    /// Require namespaces to opt in through the `istio-managed` label
    #[arg(long, env = "EXPLICIT_OPT_IN")]
    pub explicit_opt_in: bool,

    /// Comma separated namespaces to watch; empty means all namespaces
    #[arg(long, env = "LISTENED_NAMESPACES", default_value = "")]
    pub listened_namespaces: String,

    /// Control plane DNS entries, `account=service.namespace` (repeatable)
    #[arg(long = "dns-name", env = "DNS_NAMES", value_delimiter = ';')]
    pub dns_names: Vec<String>,

    /// Custom DNS names, `account.namespace:domain` pairs separated by commas
    #[arg(long, env = "CUSTOM_DNS_NAMES", default_value = "")]
    pub custom_dns_names: String,

    /// Namespace holding the shared CA secret
    #[arg(long, env = "CA_STORAGE_NAMESPACE", default_value = DEFAULT_CA_STORAGE_NAMESPACE)]
    pub ca_storage_namespace: String,

    /// Trust domain used in workload identity URIs
    #[arg(long, env = "TRUST_DOMAIN", default_value = DEFAULT_TRUST_DOMAIN)]
    pub trust_domain: String,

    /// Directory with ca-cert.pem, ca-key.pem, cert-chain.pem and root-cert.pem;
    /// when unset a self-signed CA is loaded from or stored in the CA secret
    #[arg(long, env = "PLUGGED_CA_DIR")]
    pub plugged_ca_dir: Option<PathBuf>,

    /// Organization of the self-signed CA
    #[arg(long, env = "SELF_SIGNED_CA_ORG", default_value = SELF_SIGNED_CA_ORG)]
    pub self_signed_ca_org: String,

    /// TTL of a newly generated self-signed CA certificate
    #[arg(long, env = "SELF_SIGNED_CA_CERT_TTL", default_value = "87600h", value_parser = humantime::parse_duration)]
    pub self_signed_ca_cert_ttl: Duration,

    /// Port serving `/metrics` and `/healthz`
    #[arg(long, env = "MONITORING_PORT", default_value_t = DEFAULT_MONITORING_PORT)]
    pub monitoring_port: u16,
}

impl Args {
    /// Build the engine configuration from the parsed flags.
    ///
    /// # Errors
    ///
    /// Returns an error if a DNS flag is malformed or the grace period ratio is
    /// out of range.
    pub fn controller_config(&self) -> Result<ControllerConfig> {
        let entries = self
            .dns_names
            .iter()
            .filter(|raw| !raw.trim().is_empty())
            .map(|raw| parse_dns_name_entry(raw.trim()))
            .collect::<Result<Vec<_>>>()?;
        let custom = parse_custom_dns_names(&self.custom_dns_names)?;

        let config = ControllerConfig {
            cert_ttl: self.workload_cert_ttl,
            grace_period_ratio: self.workload_cert_grace_period_ratio,
            min_grace_period: self.workload_cert_min_grace_period,
            dual_use: self.dual_use,
            pkcs8_key: self.pkcs8_key,
            for_ca: false,
            explicit_opt_in: self.explicit_opt_in,
            namespaces: split_namespaces(&self.listened_namespaces),
            dns_names: build_dns_names(entries, custom),
            ca_storage_namespace: self.ca_storage_namespace.clone(),
            trust_domain: self.trust_domain.clone(),
        };
        config.validate()?;
        Ok(config)
    }
}

/// Split a comma separated namespace list. An empty list watches everything.
fn split_namespaces(raw: &str) -> Vec<String> {
    let namespaces: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|ns| !ns.is_empty())
        .map(ToString::to_string)
        .collect();
    if namespaces.is_empty() {
        vec![NAMESPACE_ALL.to_string()]
    } else {
        namespaces
    }
}

#[cfg(test)]
#[path = "cli_tests.rs"]
mod cli_tests;
