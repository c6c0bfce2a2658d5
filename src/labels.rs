// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Label and annotation keys read or written by the controller.

/// Annotation recording which `ServiceAccount` a managed secret belongs to
pub const SERVICE_ACCOUNT_NAME_ANNOTATION: &str = "istio.io/service-account.name";

/// Namespace label controlling opt-in when explicit opt-in is required
pub const NAMESPACE_MANAGED_LABEL: &str = "istio-managed";

/// Label values (lowercased) that enable management for a namespace
pub const ENABLED_VALUES: &[&str] = &["enabled", "enable", "true", "yes", "y"];

/// Label values (lowercased) that disable management for a namespace
pub const DISABLED_VALUES: &[&str] = &["disabled", "disable", "false", "no", "n"];
