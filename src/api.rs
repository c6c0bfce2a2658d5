// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Cluster API seam.
//!
//! Every read or write the controller performs against the API server goes
//! through [`ClusterApi`]. Production code uses [`KubeClusterApi`]; tests swap
//! in an in-memory implementation.

use crate::errors::{Error, Result};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Namespace, Secret, ServiceAccount};
use kube::api::{DeleteParams, PostParams};
use kube::{Api, Client};
use tracing::debug;

/// Object operations the controller depends on.
///
/// Not-found and already-exists conditions are reported as
/// [`Error::NotFound`] and [`Error::AlreadyExists`].
#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// Fetch a namespace.
    async fn get_namespace(&self, name: &str) -> Result<Namespace>;

    /// Fetch a `ServiceAccount`.
    async fn get_service_account(&self, namespace: &str, name: &str) -> Result<ServiceAccount>;

    /// Fetch a secret.
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Secret>;

    /// Create a secret.
    async fn create_secret(&self, namespace: &str, secret: &Secret) -> Result<Secret>;

    /// Replace an existing secret.
    async fn update_secret(&self, namespace: &str, secret: &Secret) -> Result<Secret>;

    /// Delete a secret.
    async fn delete_secret(&self, namespace: &str, name: &str) -> Result<()>;
}

/// [`ClusterApi`] backed by a `kube` client.
#[derive(Clone)]
pub struct KubeClusterApi {
    client: Client,
}

impl KubeClusterApi {
    /// Wrap a client.
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

fn secret_name(secret: &Secret) -> Result<&str> {
    secret
        .metadata
        .name
        .as_deref()
        .ok_or_else(|| Error::Config("secret has no name".to_string()))
}

#[async_trait]
impl ClusterApi for KubeClusterApi {
    async fn get_namespace(&self, name: &str) -> Result<Namespace> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        api.get(name)
            .await
            .map_err(|e| Error::from_kube(e, "Namespace", "", name))
    }

    async fn get_service_account(&self, namespace: &str, name: &str) -> Result<ServiceAccount> {
        let api: Api<ServiceAccount> = Api::namespaced(self.client.clone(), namespace);
        api.get(name)
            .await
            .map_err(|e| Error::from_kube(e, "ServiceAccount", namespace, name))
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Secret> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        api.get(name)
            .await
            .map_err(|e| Error::from_kube(e, "Secret", namespace, name))
    }

    async fn create_secret(&self, namespace: &str, secret: &Secret) -> Result<Secret> {
        let name = secret_name(secret)?;
        debug!(namespace, name, "Creating secret");
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        api.create(&PostParams::default(), secret)
            .await
            .map_err(|e| Error::from_kube(e, "Secret", namespace, name))
    }

    async fn update_secret(&self, namespace: &str, secret: &Secret) -> Result<Secret> {
        let name = secret_name(secret)?;
        debug!(namespace, name, "Updating secret");
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        api.replace(name, &PostParams::default(), secret)
            .await
            .map_err(|e| Error::from_kube(e, "Secret", namespace, name))
    }

    async fn delete_secret(&self, namespace: &str, name: &str) -> Result<()> {
        debug!(namespace, name, "Deleting secret");
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        api.delete(name, &DeleteParams::default())
            .await
            .map(|_| ())
            .map_err(|e| Error::from_kube(e, "Secret", namespace, name))
    }
}
