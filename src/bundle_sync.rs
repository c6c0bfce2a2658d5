// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Trust bundle synchronization against the shared CA secret.
//!
//! Several replicas running with a self-signed CA can each generate a root
//! and race to store it in `istio-ca-secret`. The stored CA certificate is
//! authoritative: when it differs from the in-memory one, the bundle is
//! reloaded from the secret.
//!
//! The whole compare-and-reload sequence runs under the [`SyncClock`] lock, so
//! concurrent callers never reload twice or observe a half-written bundle. A
//! successful sync starts a cool-down during which no API calls are made.

use crate::constants::{BUNDLE_SYNC_COOLDOWN_SECS, CA_SECRET_NAME};
use crate::context::Context;
use crate::errors::{Error, Result};
use crate::metrics::{record_bundle_reload, record_error};
use crate::pki::ca::ca_pems_from_secret;
use crate::retry::{retry_fixed, FixedBackoff};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Time of the last successful synchronization.
#[derive(Debug, Default)]
pub struct SyncClock {
    last_sync: Mutex<Option<Instant>>,
}

impl SyncClock {
    /// Time of the last successful synchronization, if any.
    pub async fn last_sync(&self) -> Option<Instant> {
        *self.last_sync.lock().await
    }
}

/// Reconcile the in-memory trust bundle with the CA secret.
///
/// Returns the root certificate to use after synchronization. Inside the
/// cool-down window the current root is returned without touching the API.
///
/// # Errors
///
/// Returns an error if the CA secret cannot be loaded within the retry budget
/// or its material fails verification. The clock is not advanced in that case.
pub async fn sync_if_needed(ctx: &Context) -> Result<Vec<u8>> {
    let mut last_sync = ctx.sync_clock.last_sync.lock().await;
    let bundle = ctx.ca.key_cert_bundle();
    let current = bundle.all_pem();

    let cooldown = Duration::from_secs(BUNDLE_SYNC_COOLDOWN_SECS);
    if last_sync.is_some_and(|at| at.elapsed() < cooldown) {
        debug!("Trust bundle synchronized recently, skipping");
        return Ok(current.root_cert);
    }

    let namespace = ctx.config.ca_storage_namespace.as_str();
    let secret = retry_fixed(
        FixedBackoff::ca_secret_load(),
        &ctx.shutdown,
        "load CA secret",
        move |_| ctx.api.get_secret(namespace, CA_SECRET_NAME),
    )
    .await
    .map_err(|e| {
        record_error("bundle_sync");
        Error::CaSecret {
            namespace: namespace.to_string(),
            name: CA_SECRET_NAME.to_string(),
            reason: e.to_string(),
        }
    })?;
    let (ca_cert, ca_key) = ca_pems_from_secret(&secret, namespace)?;

    let root = if ca_cert == current.ca_cert {
        info!("CA certificate matches {namespace}/{CA_SECRET_NAME}, no reload needed");
        current.root_cert
    } else {
        warn!(
            "CA certificate does not match {namespace}/{CA_SECRET_NAME}, reloading trust bundle"
        );
        // Self-signed: the CA certificate is the root and there is no chain.
        bundle
            .verify_and_set_all(ca_cert.clone(), ca_key, Vec::new(), ca_cert.clone())
            .inspect_err(|_| record_error("bundle_sync"))?;
        record_bundle_reload();
        info!("Reloaded trust bundle from {namespace}/{CA_SECRET_NAME}");
        ca_cert
    };

    *last_sync = Some(Instant::now());
    Ok(root)
}

#[cfg(test)]
#[path = "bundle_sync_tests.rs"]
mod bundle_sync_tests;
