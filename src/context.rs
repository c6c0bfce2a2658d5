// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Shared context for the event handlers.
//!
//! Every handler receives an `Arc<Context>` holding:
//! - the cluster API used for reads and writes
//! - the local secret cache kept current by the secret watchers
//! - the certificate authority
//! - the validated configuration
//! - the bundle sync clock and the shutdown signal
//!
//! The cache is read-only from the handlers' point of view; only the
//! reflectors driven by [`crate::controller::watch`] write to it.

use crate::api::ClusterApi;
use crate::bundle_sync::SyncClock;
use crate::config::ControllerConfig;
use crate::errors::Result;
use crate::pki::CertificateAuthority;
use crate::shutdown::Shutdown;
use k8s_openapi::api::core::v1::Secret;
use kube::runtime::reflector::{ObjectRef, Store};
use std::sync::Arc;

/// Read-side view of the managed secrets.
pub trait SecretCache: Send + Sync {
    /// `true` if a secret named `name` exists in `namespace`.
    fn contains(&self, namespace: &str, name: &str) -> bool;

    /// Every cached secret.
    fn secrets(&self) -> Vec<Arc<Secret>>;
}

/// [`SecretCache`] over one reflector store per watched namespace.
#[derive(Clone, Default)]
pub struct SecretStores {
    stores: Vec<Store<Secret>>,
}

impl SecretStores {
    /// Wrap the stores fed by the secret watchers.
    #[must_use]
    pub fn new(stores: Vec<Store<Secret>>) -> Self {
        Self { stores }
    }

    /// Resolve once every store has received its initial list.
    ///
    /// Returns `false` if a store's writer was dropped before it became ready.
    pub async fn wait_until_ready(&self) -> bool {
        for store in &self.stores {
            if store.wait_until_ready().await.is_err() {
                return false;
            }
        }
        true
    }
}

impl SecretCache for SecretStores {
    fn contains(&self, namespace: &str, name: &str) -> bool {
        let key = ObjectRef::<Secret>::new(name).within(namespace);
        self.stores.iter().any(|store| store.get(&key).is_some())
    }

    fn secrets(&self) -> Vec<Arc<Secret>> {
        self.stores.iter().flat_map(|store| store.state()).collect()
    }
}

/// Shared state handed to every handler.
pub struct Context {
    /// Cluster API for object reads and writes
    pub api: Arc<dyn ClusterApi>,

    /// Local mirror of managed secrets
    pub cache: Arc<dyn SecretCache>,

    /// Signer and owner of the trust bundle
    pub ca: Arc<dyn CertificateAuthority>,

    /// Validated configuration
    pub config: ControllerConfig,

    /// Last successful trust bundle synchronization
    pub sync_clock: SyncClock,

    /// Stop signal observed by retry loops
    pub shutdown: Shutdown,
}

impl Context {
    /// Build a context after validating `config`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::errors::Error::Config`] if the configuration is invalid.
    pub fn new(
        api: Arc<dyn ClusterApi>,
        cache: Arc<dyn SecretCache>,
        ca: Arc<dyn CertificateAuthority>,
        config: ControllerConfig,
        shutdown: Shutdown,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            api,
            cache,
            ca,
            config,
            sync_clock: SyncClock::default(),
            shutdown,
        })
    }
}
