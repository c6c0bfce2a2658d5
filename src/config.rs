// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Controller configuration.
//!
//! [`ControllerConfig`] is the single configuration value consumed by the
//! engine. It is built by the CLI layer (see [`crate::cli`]) and validated once
//! before anything starts; an invalid grace period ratio is the only fatal
//! configuration error.

use crate::constants::{
    DEFAULT_CA_STORAGE_NAMESPACE, DEFAULT_GRACE_PERIOD_RATIO, DEFAULT_MIN_GRACE_PERIOD_SECS,
    DEFAULT_TRUST_DOMAIN, DEFAULT_WORKLOAD_CERT_TTL_SECS, NAMESPACE_ALL,
    RECOMMENDED_MAX_GRACE_PERIOD_RATIO, RECOMMENDED_MIN_GRACE_PERIOD_RATIO,
};
use crate::errors::{Error, Result};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tracing::warn;

/// Extra DNS names for a `ServiceAccount`.
///
/// Entries keyed by a bare account name match control plane accounts and add
/// `service.namespace.svc` and `service.namespace` when the namespace matches.
/// Entries keyed by `account.namespace` contribute their custom domains.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DnsNameEntry {
    /// Service whose DNS names are added
    pub service_name: String,
    /// Namespace the account must live in
    pub namespace: String,
    /// User-defined extra domains
    pub custom_domains: Vec<String>,
}

/// Everything the engine needs to know at construction time.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// TTL of issued workload certificates
    pub cert_ttl: Duration,
    /// Fraction of the certificate lifetime reserved for rotation, in [0, 1]
    pub grace_period_ratio: f32,
    /// Lower bound for the rotation window
    pub min_grace_period: Duration,
    /// Put the identity in the subject CN as well as the SAN
    pub dual_use: bool,
    /// Emit PKCS#8 private keys instead of SEC1
    pub pkcs8_key: bool,
    /// Issue CA certificates instead of leaf certificates
    pub for_ca: bool,
    /// Require namespaces to opt in via label
    pub explicit_opt_in: bool,
    /// Namespaces to watch; an empty string means all namespaces
    pub namespaces: Vec<String>,
    /// Extra DNS SAN configuration
    pub dns_names: HashMap<String, DnsNameEntry>,
    /// Namespace holding the shared CA secret
    pub ca_storage_namespace: String,
    /// Trust domain used in workload identity URIs
    pub trust_domain: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            cert_ttl: Duration::from_secs(DEFAULT_WORKLOAD_CERT_TTL_SECS),
            grace_period_ratio: DEFAULT_GRACE_PERIOD_RATIO,
            min_grace_period: Duration::from_secs(DEFAULT_MIN_GRACE_PERIOD_SECS),
            dual_use: false,
            pkcs8_key: false,
            for_ca: false,
            explicit_opt_in: false,
            namespaces: vec![NAMESPACE_ALL.to_string()],
            dns_names: HashMap::new(),
            ca_storage_namespace: DEFAULT_CA_STORAGE_NAMESPACE.to_string(),
            trust_domain: DEFAULT_TRUST_DOMAIN.to_string(),
        }
    }
}

impl ControllerConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when the grace period ratio is outside [0, 1]
    /// or the trust domain is empty. A ratio outside the recommended window
    /// only logs a warning.
    pub fn validate(&self) -> Result<()> {
        if self.trust_domain.is_empty() {
            return Err(Error::Config("trust domain must not be empty".to_string()));
        }
        let ratio = self.grace_period_ratio;
        if !(0.0..=1.0).contains(&ratio) {
            return Err(Error::Config(format!(
                "grace period ratio {ratio} should be within [0, 1]"
            )));
        }
        if !(RECOMMENDED_MIN_GRACE_PERIOD_RATIO..=RECOMMENDED_MAX_GRACE_PERIOD_RATIO)
            .contains(&ratio)
        {
            warn!(
                grace_period_ratio = ratio,
                "grace period ratio {ratio} is out of the recommended window [{RECOMMENDED_MIN_GRACE_PERIOD_RATIO:.2}, {RECOMMENDED_MAX_GRACE_PERIOD_RATIO:.2}]"
            );
        }
        Ok(())
    }

    /// The set of explicitly watched namespaces.
    #[must_use]
    pub fn watched_namespaces(&self) -> HashSet<String> {
        self.namespaces.iter().cloned().collect()
    }
}

/// Parse a control plane entry of the form `account=service.namespace`.
///
/// # Errors
///
/// Returns [`Error::Config`] if the entry is malformed.
pub fn parse_dns_name_entry(raw: &str) -> Result<(String, DnsNameEntry)> {
    let (account, target) = raw
        .split_once('=')
        .ok_or_else(|| Error::Config(format!("DNS name entry '{raw}' must be account=service.namespace")))?;
    let (service, namespace) = target
        .split_once('.')
        .ok_or_else(|| Error::Config(format!("DNS name target '{target}' must be service.namespace")))?;
    if account.is_empty() || service.is_empty() || namespace.is_empty() {
        return Err(Error::Config(format!("DNS name entry '{raw}' has empty parts")));
    }
    Ok((
        account.to_string(),
        DnsNameEntry {
            service_name: service.to_string(),
            namespace: namespace.to_string(),
            custom_domains: Vec::new(),
        },
    ))
}

/// Parse `account.namespace:domain` pairs separated by commas.
///
/// Several pairs may target the same key; their domains accumulate in order.
///
/// # Errors
///
/// Returns [`Error::Config`] if a pair has no `:` separator.
pub fn parse_custom_dns_names(raw: &str) -> Result<Vec<(String, String)>> {
    raw.split(',')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            pair.split_once(':')
                .map(|(key, domain)| (key.to_string(), domain.to_string()))
                .ok_or_else(|| {
                    Error::Config(format!(
                        "custom DNS name '{pair}' must be account.namespace:domain"
                    ))
                })
        })
        .collect()
}

/// Merge control plane entries and custom domains into one lookup table.
#[must_use]
pub fn build_dns_names(
    entries: Vec<(String, DnsNameEntry)>,
    custom: Vec<(String, String)>,
) -> HashMap<String, DnsNameEntry> {
    let mut names: HashMap<String, DnsNameEntry> = entries.into_iter().collect();
    for (key, domain) in custom {
        names.entry(key).or_default().custom_domains.push(domain);
    }
    names
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod config_tests;
