// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! # Workload Secret Controller
//!
//! A Kubernetes controller that keeps exactly one key and certificate secret
//! per `ServiceAccount`, rotates it before it expires, and keeps its trust
//! root consistent across controller replicas.
//!
//! ## Overview
//!
//! For every managed `ServiceAccount` the controller maintains a secret
//! `istio.<account>` of type `istio.io/key-and-cert` holding:
//!
//! - `cert-chain.pem` - a leaf certificate for
//!   `spiffe://<trust-domain>/ns/<namespace>/sa/<account>` followed by the CA chain
//! - `key.pem` - the leaf's private key
//! - `root-cert.pem` - the trust root
//!
//! ## Modules
//!
//! - [`controller`] - Event dispatch loops, handlers, and watch sources
//! - [`secret_manager`] - Secret creation, deletion, and refresh
//! - [`cert_generator`] - CSR construction and signing per account
//! - [`bundle_sync`] - Trust bundle reconciliation against the CA secret
//! - [`namespace_policy`] - Namespace opt-in decisions
//! - [`pki`] - Certificate authority, CSR, and certificate helpers
//! - [`api`] - Cluster API seam
//! - [`context`] - Shared handler context and secret cache
//!
//! ## Example
//!
//! ```rust,no_run
//! use workload_secret_controller::pki::generate_spiffe_uri;
//!
//! let uri = generate_spiffe_uri("cluster.local", "default", "bookinfo").unwrap();
//! assert_eq!(uri, "spiffe://cluster.local/ns/default/sa/bookinfo");
//! ```

pub mod api;
pub mod bundle_sync;
pub mod cert_generator;
pub mod cli;
pub mod config;
pub mod constants;
pub mod context;
pub mod controller;
pub mod errors;
pub mod labels;
pub mod metrics;
pub mod namespace_policy;
pub mod pki;
pub mod retry;
pub mod secret_manager;
pub mod shutdown;

#[cfg(test)]
mod testing;
