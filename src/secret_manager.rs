// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Creation, deletion, and refresh of per-`ServiceAccount` secrets.
//!
//! # Secret Shape
//!
//! - name: `istio.<service-account>`
//! - type: `istio.io/key-and-cert`
//! - annotation `istio.io/service-account.name`: the owning account
//! - data: `cert-chain.pem`, `key.pem`, `root-cert.pem`
//!
//! Only creation is retried (3 attempts, 1s apart). Deletion and refresh are
//! single attempts; the next watch event re-drives them.

use crate::cert_generator::{generate, KeyCertMaterial};
use crate::constants::{CERT_CHAIN_ID, ISTIO_SECRET_TYPE, PRIVATE_KEY_ID, ROOT_CERT_ID, SECRET_NAME_PREFIX};
use crate::context::Context;
use crate::errors::{Error, Result};
use crate::labels::SERVICE_ACCOUNT_NAME_ANNOTATION;
use crate::metrics::{record_error, record_secret_created};
use crate::retry::{retry_fixed, FixedBackoff};
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use std::collections::BTreeMap;
use tracing::{error, info};

/// Name of the secret owned by `service_account`.
#[must_use]
pub fn secret_name(service_account: &str) -> String {
    format!("{SECRET_NAME_PREFIX}{service_account}")
}

/// Build the canonical secret for `service_account`.
#[must_use]
pub fn build_secret(
    service_account: &str,
    namespace: &str,
    material: &KeyCertMaterial,
) -> Secret {
    let data = BTreeMap::from([
        (CERT_CHAIN_ID.to_string(), ByteString(material.cert_chain.clone())),
        (PRIVATE_KEY_ID.to_string(), ByteString(material.private_key.clone())),
        (ROOT_CERT_ID.to_string(), ByteString(material.root_cert.clone())),
    ]);

    Secret {
        metadata: ObjectMeta {
            name: Some(secret_name(service_account)),
            namespace: Some(namespace.to_string()),
            annotations: Some(BTreeMap::from([(
                SERVICE_ACCOUNT_NAME_ANNOTATION.to_string(),
                service_account.to_string(),
            )])),
            ..Default::default()
        },
        data: Some(data),
        type_: Some(ISTIO_SECRET_TYPE.to_string()),
        ..Default::default()
    }
}

/// Result of [`upsert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// The secret is already in the local cache; nothing was done
    Exists,
    /// The secret was created
    Created,
    /// Another actor created the secret first
    AlreadyExists,
    /// Generation or creation failed; the next event will retry
    Failed,
}

/// Ensure the secret for `service_account` exists.
///
/// Existing secrets are left alone; rotation happens only through
/// [`refresh`].
pub async fn upsert(ctx: &Context, service_account: &str, namespace: &str) -> UpsertOutcome {
    let name = secret_name(service_account);
    if ctx.cache.contains(namespace, &name) {
        return UpsertOutcome::Exists;
    }

    let material = match generate(ctx, service_account, namespace) {
        Ok(material) => material,
        Err(e) => {
            error!(namespace, name, error = %e, "Failed to generate key/cert");
            record_error("generate");
            return UpsertOutcome::Failed;
        }
    };
    let secret = build_secret(service_account, namespace, &material);

    let api = ctx.api.as_ref();
    let secret = &secret;
    let created = retry_fixed(
        FixedBackoff::secret_creation(),
        &ctx.shutdown,
        "create secret",
        move |_| async move {
            match api.create_secret(namespace, secret).await {
                Ok(_) => Ok(true),
                Err(e) if e.is_already_exists() => Ok(false),
                Err(e) => Err(e),
            }
        },
    )
    .await;

    match created {
        Ok(true) => {
            info!(namespace, name, "Secret created");
            record_secret_created();
            UpsertOutcome::Created
        }
        Ok(false) => {
            info!(namespace, name, "Secret already exists, skipping");
            UpsertOutcome::AlreadyExists
        }
        Err(e) => {
            error!(namespace, name, error = %e, "Giving up on secret creation");
            record_error("create");
            UpsertOutcome::Failed
        }
    }
}

/// Delete the secret for `service_account`. A missing secret counts as deleted.
///
/// # Errors
///
/// Returns the API error for anything other than not-found.
pub async fn delete(ctx: &Context, service_account: &str, namespace: &str) -> Result<()> {
    let name = secret_name(service_account);
    match ctx.api.delete_secret(namespace, &name).await {
        Ok(()) => {
            info!(namespace, name, "Secret deleted");
            Ok(())
        }
        Err(e) if e.is_not_found() => {
            info!(namespace, name, "Secret already gone");
            Ok(())
        }
        Err(e) => {
            error!(namespace, name, error = %e, "Failed to delete secret");
            record_error("delete");
            Err(e)
        }
    }
}

/// Reissue the material in `secret` and persist it.
///
/// The owning account is read from the annotation; the new root comes from
/// the same bundle snapshot that signed the new leaf.
///
/// # Errors
///
/// Returns an error if the annotation is missing, generation fails, or the
/// update call fails.
pub async fn refresh(ctx: &Context, secret: &Secret) -> Result<Secret> {
    let namespace = secret.metadata.namespace.clone().unwrap_or_default();
    let service_account = secret
        .metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(SERVICE_ACCOUNT_NAME_ANNOTATION))
        .cloned()
        .ok_or_else(|| Error::Generation {
            namespace: namespace.clone(),
            name: secret.metadata.name.clone().unwrap_or_default(),
            reason: format!("missing {SERVICE_ACCOUNT_NAME_ANNOTATION} annotation"),
        })?;

    let material = generate(ctx, &service_account, &namespace)?;

    let mut updated = secret.clone();
    let data = updated.data.get_or_insert_with(BTreeMap::new);
    data.insert(CERT_CHAIN_ID.to_string(), ByteString(material.cert_chain));
    data.insert(PRIVATE_KEY_ID.to_string(), ByteString(material.private_key));
    data.insert(ROOT_CERT_ID.to_string(), ByteString(material.root_cert));

    ctx.api.update_secret(&namespace, &updated).await.inspect_err(|_| {
        record_error("update");
    })
}

#[cfg(test)]
#[path = "secret_manager_tests.rs"]
mod secret_manager_tests;
