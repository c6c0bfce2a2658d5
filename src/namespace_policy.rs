// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Namespace opt-in policy.
//!
//! A namespace is managed when it is explicitly watched or when opt-in is not
//! required. Otherwise the `istio-managed` label decides; an absent or
//! unrecognised value, or a failed namespace lookup, falls back to the default
//! (`!explicit_opt_in`). The evaluator never returns an error.

use crate::api::ClusterApi;
use crate::labels::{DISABLED_VALUES, ENABLED_VALUES, NAMESPACE_MANAGED_LABEL};
use std::collections::HashSet;
use tracing::debug;

/// Apply the label value to `default`.
#[must_use]
pub fn label_decision(value: Option<&str>, default: bool) -> bool {
    let Some(value) = value else {
        return default;
    };
    let value = value.to_lowercase();
    if ENABLED_VALUES.contains(&value.as_str()) {
        true
    } else if DISABLED_VALUES.contains(&value.as_str()) {
        false
    } else {
        default
    }
}

/// Decide whether objects in `namespace` are managed.
pub async fn is_enabled(
    api: &dyn ClusterApi,
    namespace: &str,
    explicit_opt_in: bool,
    watched_namespaces: &HashSet<String>,
) -> bool {
    if watched_namespaces.contains(namespace) || !explicit_opt_in {
        return true;
    }

    let default = !explicit_opt_in;
    match api.get_namespace(namespace).await {
        Ok(ns) => {
            let value = ns
                .metadata
                .labels
                .as_ref()
                .and_then(|labels| labels.get(NAMESPACE_MANAGED_LABEL))
                .map(String::as_str);
            label_decision(value, default)
        }
        Err(e) => {
            debug!(namespace, error = %e, "Namespace lookup failed, using default policy");
            default
        }
    }
}

#[cfg(test)]
#[path = "namespace_policy_tests.rs"]
mod namespace_policy_tests;
