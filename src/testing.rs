// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! In-memory fakes shared by the unit tests.

use crate::api::ClusterApi;
use crate::config::ControllerConfig;
use crate::context::{Context, SecretCache};
use crate::errors::{CaError, Error, Result};
use crate::labels::NAMESPACE_MANAGED_LABEL;
use crate::pki::{CertificateAuthority, IstioCa, KeyCertBundle, KeyCertPems};
use crate::shutdown::Shutdown;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Namespace, Secret, ServiceAccount};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Calls made against a [`FakeCluster`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Calls {
    pub get_namespace: u32,
    pub get_service_account: u32,
    pub get_secret: u32,
    pub create_secret: u32,
    pub update_secret: u32,
    pub delete_secret: u32,
}

#[derive(Default)]
struct State {
    namespaces: HashMap<String, Namespace>,
    service_accounts: HashSet<(String, String)>,
    secrets: BTreeMap<(String, String), Secret>,
    calls: Calls,
    create_failures: u32,
    fail_updates: bool,
    fail_deletes: bool,
    stale_cache: bool,
    race_on_create: Option<Secret>,
}

/// Cluster API and secret cache backed by the same in-memory objects, so the
/// cache always reflects acknowledged writes.
#[derive(Default)]
pub struct FakeCluster {
    state: Mutex<State>,
}

fn transient(op: &str) -> Error {
    Error::Config(format!("injected {op} failure"))
}

impl FakeCluster {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub fn add_namespace(&self, name: &str, managed_label: Option<&str>) {
        let labels = managed_label.map(|value| {
            BTreeMap::from([(NAMESPACE_MANAGED_LABEL.to_string(), value.to_string())])
        });
        let ns = Namespace {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                labels,
                ..Default::default()
            },
            ..Default::default()
        };
        self.state().namespaces.insert(name.to_string(), ns);
    }

    pub fn add_service_account(&self, namespace: &str, name: &str) {
        self.state()
            .service_accounts
            .insert((namespace.to_string(), name.to_string()));
    }

    pub fn put_secret(&self, secret: Secret) {
        let key = (
            secret.metadata.namespace.clone().unwrap_or_default(),
            secret.metadata.name.clone().unwrap_or_default(),
        );
        self.state().secrets.insert(key, secret);
    }

    pub fn remove_secret(&self, namespace: &str, name: &str) -> Option<Secret> {
        self.state()
            .secrets
            .remove(&(namespace.to_string(), name.to_string()))
    }

    pub fn secret(&self, namespace: &str, name: &str) -> Option<Secret> {
        self.state()
            .secrets
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    pub fn calls(&self) -> Calls {
        self.state().calls
    }

    /// Fail the next `count` create calls with a transient error.
    pub fn fail_creates(&self, count: u32) {
        self.state().create_failures = count;
    }

    pub fn fail_updates(&self) {
        self.state().fail_updates = true;
    }

    pub fn fail_deletes(&self) {
        self.state().fail_deletes = true;
    }

    /// Make the cache report every secret as absent.
    pub fn make_cache_stale(&self) {
        self.state().stale_cache = true;
    }

    /// On the next create, store `winner` instead and report a conflict.
    pub fn lose_create_race_to(&self, winner: Secret) {
        self.state().race_on_create = Some(winner);
    }
}

#[async_trait]
impl ClusterApi for FakeCluster {
    async fn get_namespace(&self, name: &str) -> Result<Namespace> {
        let mut state = self.state();
        state.calls.get_namespace += 1;
        state
            .namespaces
            .get(name)
            .cloned()
            .ok_or_else(|| Error::NotFound {
                kind: "Namespace",
                namespace: String::new(),
                name: name.to_string(),
            })
    }

    async fn get_service_account(&self, namespace: &str, name: &str) -> Result<ServiceAccount> {
        let mut state = self.state();
        state.calls.get_service_account += 1;
        if state
            .service_accounts
            .contains(&(namespace.to_string(), name.to_string()))
        {
            Ok(service_account(namespace, name))
        } else {
            Err(Error::NotFound {
                kind: "ServiceAccount",
                namespace: namespace.to_string(),
                name: name.to_string(),
            })
        }
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Secret> {
        let mut state = self.state();
        state.calls.get_secret += 1;
        state
            .secrets
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| Error::NotFound {
                kind: "Secret",
                namespace: namespace.to_string(),
                name: name.to_string(),
            })
    }

    async fn create_secret(&self, namespace: &str, secret: &Secret) -> Result<Secret> {
        let mut state = self.state();
        state.calls.create_secret += 1;
        let name = secret.metadata.name.clone().unwrap_or_default();
        let key = (namespace.to_string(), name.clone());

        if let Some(winner) = state.race_on_create.take() {
            state.secrets.insert(key.clone(), winner);
        }
        if state.create_failures > 0 {
            state.create_failures -= 1;
            return Err(transient("create"));
        }
        if state.secrets.contains_key(&key) {
            return Err(Error::AlreadyExists {
                kind: "Secret",
                namespace: namespace.to_string(),
                name,
            });
        }
        state.secrets.insert(key, secret.clone());
        Ok(secret.clone())
    }

    async fn update_secret(&self, namespace: &str, secret: &Secret) -> Result<Secret> {
        let mut state = self.state();
        state.calls.update_secret += 1;
        if state.fail_updates {
            return Err(transient("update"));
        }
        let name = secret.metadata.name.clone().unwrap_or_default();
        let key = (namespace.to_string(), name.clone());
        if !state.secrets.contains_key(&key) {
            return Err(Error::NotFound {
                kind: "Secret",
                namespace: namespace.to_string(),
                name,
            });
        }
        state.secrets.insert(key, secret.clone());
        Ok(secret.clone())
    }

    async fn delete_secret(&self, namespace: &str, name: &str) -> Result<()> {
        let mut state = self.state();
        state.calls.delete_secret += 1;
        if state.fail_deletes {
            return Err(transient("delete"));
        }
        state
            .secrets
            .remove(&(namespace.to_string(), name.to_string()))
            .map(|_| ())
            .ok_or_else(|| Error::NotFound {
                kind: "Secret",
                namespace: namespace.to_string(),
                name: name.to_string(),
            })
    }
}

impl SecretCache for FakeCluster {
    fn contains(&self, namespace: &str, name: &str) -> bool {
        let state = self.state();
        !state.stale_cache
            && state
                .secrets
                .contains_key(&(namespace.to_string(), name.to_string()))
    }

    fn secrets(&self) -> Vec<Arc<Secret>> {
        self.state()
            .secrets
            .values()
            .cloned()
            .map(Arc::new)
            .collect()
    }
}

/// Signer that always fails with a fixed error.
pub struct FailingCa {
    pub error: CaError,
    pub bundle: KeyCertBundle,
}

impl CertificateAuthority for FailingCa {
    fn sign_with_pems(
        &self,
        _pems: &KeyCertPems,
        _csr_pem: &[u8],
        _subject_ids: &[String],
        _ttl: Duration,
        _for_ca: bool,
    ) -> std::result::Result<Vec<u8>, CaError> {
        Err(self.error.clone())
    }

    fn key_cert_bundle(&self) -> &KeyCertBundle {
        &self.bundle
    }
}

/// CA whose bundle is replaced with `next` while a signature is in flight,
/// as a concurrent bundle sync would do.
pub struct SwappingCa {
    pub inner: IstioCa,
    pub next: KeyCertPems,
}

impl CertificateAuthority for SwappingCa {
    fn sign_with_pems(
        &self,
        pems: &KeyCertPems,
        csr_pem: &[u8],
        subject_ids: &[String],
        ttl: Duration,
        for_ca: bool,
    ) -> std::result::Result<Vec<u8>, CaError> {
        let next = self.next.clone();
        self.inner
            .key_cert_bundle()
            .verify_and_set_all(next.ca_cert, next.ca_key, next.cert_chain, next.root_cert)
            .map_err(|e| CaError::NotReady(e.to_string()))?;
        self.inner.sign_with_pems(pems, csr_pem, subject_ids, ttl, for_ca)
    }

    fn key_cert_bundle(&self) -> &KeyCertBundle {
        self.inner.key_cert_bundle()
    }
}

pub const DAY: Duration = Duration::from_secs(24 * 3600);

/// A fresh self-signed CA able to sign the default workload TTL.
pub fn self_signed_ca() -> IstioCa {
    IstioCa::new_self_signed("cluster.local", 365 * DAY, 90 * DAY).unwrap()
}

pub fn service_account(namespace: &str, name: &str) -> ServiceAccount {
    ServiceAccount {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        ..Default::default()
    }
}

pub fn context(
    cluster: &Arc<FakeCluster>,
    ca: Arc<dyn CertificateAuthority>,
    config: ControllerConfig,
) -> Context {
    Context::new(
        cluster.clone(),
        cluster.clone(),
        ca,
        config,
        Shutdown::never(),
    )
    .unwrap()
}
