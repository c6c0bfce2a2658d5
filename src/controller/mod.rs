// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Event handling for `ServiceAccount` and managed secret changes.
//!
//! # Architecture
//!
//! Two queues of [`WatchEvent`]s, one per watched kind, are drained by two
//! independent dispatch loops. Within a queue events are handled one at a
//! time and in order; the two loops run concurrently.
//!
//! The identity loop does not start until the secret caches have completed
//! their initial list, so [`upsert`] never races ahead of knowledge of
//! pre-existing secrets.
//!
//! # Handlers
//!
//! - [`on_identity_added`] - create the secret if the namespace is managed
//! - [`on_identity_deleted`] - delete the secret unconditionally
//! - [`on_secret_deleted`] - recreate the secret if its account still exists
//! - [`on_secret_updated`] - rotate expiring certificates and stale roots
//!
//! No handler returns an error; failures are logged and counted.

pub mod events;
pub mod watch;

#[cfg(test)]
mod watch_tests;

pub use events::WatchEvent;

use crate::bundle_sync::sync_if_needed;
use crate::constants::{CERT_CHAIN_ID, ROOT_CERT_ID};
use crate::context::Context;
use crate::labels::SERVICE_ACCOUNT_NAME_ANNOTATION;
use crate::metrics::{
    record_secret_deleted, record_secret_refreshed, record_service_account_created,
    record_service_account_deleted,
};
use crate::namespace_policy::is_enabled;
use crate::pki::wait_time;
use crate::secret_manager::{delete, refresh, secret_name, upsert};
use crate::shutdown::Shutdown;
use chrono::Utc;
use k8s_openapi::api::core::v1::{Secret, ServiceAccount};
use kube::{Resource, ResourceExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

fn object_key<K: Resource>(obj: &K, kind: &str) -> Option<(String, String)> {
    let name = obj.meta().name.clone().filter(|n| !n.is_empty());
    let namespace = obj.meta().namespace.clone().filter(|n| !n.is_empty());
    match (name, namespace) {
        (Some(name), Some(namespace)) => Some((name, namespace)),
        _ => {
            warn!(kind, "Dropping event for object without name or namespace");
            None
        }
    }
}

fn secret_field<'a>(secret: &'a Secret, key: &str) -> &'a [u8] {
    secret
        .data
        .as_ref()
        .and_then(|data| data.get(key))
        .map_or(&[][..], |value| value.0.as_slice())
}

/// Handle a new `ServiceAccount`.
pub async fn on_identity_added(ctx: &Context, account: &ServiceAccount) {
    record_service_account_created();
    let Some((name, namespace)) = object_key(account, "ServiceAccount") else {
        return;
    };
    let watched = ctx.config.watched_namespaces();
    if is_enabled(ctx.api.as_ref(), &namespace, ctx.config.explicit_opt_in, &watched).await {
        let outcome = upsert(ctx, &name, &namespace).await;
        debug!(namespace, name, ?outcome, "Processed service account addition");
    } else {
        debug!(namespace, name, "Namespace not managed, skipping service account");
    }
}

/// Handle a removed `ServiceAccount`.
pub async fn on_identity_deleted(ctx: &Context, account: &ServiceAccount) {
    record_service_account_deleted();
    let Some((name, namespace)) = object_key(account, "ServiceAccount") else {
        return;
    };
    // Errors are logged by the secret manager; deletion is not retried.
    let _ = delete(ctx, &name, &namespace).await;
}

/// Handle a removed managed secret.
///
/// The secret is recreated when its owning account still exists and its
/// namespace is managed. A failed account lookup ends the handler.
pub async fn on_secret_deleted(ctx: &Context, secret: &Secret) {
    let Some((name, namespace)) = object_key(secret, "Secret") else {
        return;
    };
    let Some(account_name) = secret
        .annotations()
        .get(SERVICE_ACCOUNT_NAME_ANNOTATION)
        .filter(|a| !a.is_empty())
        .cloned()
    else {
        warn!(namespace, name, "Deleted secret has no service account annotation");
        return;
    };

    match ctx.api.get_service_account(&namespace, &account_name).await {
        Ok(_) => {
            info!(namespace, secret = %secret_name(&account_name), "Re-creating deleted secret");
            let watched = ctx.config.watched_namespaces();
            if is_enabled(ctx.api.as_ref(), &namespace, ctx.config.explicit_opt_in, &watched).await {
                upsert(ctx, &account_name, &namespace).await;
            }
            record_secret_deleted();
        }
        Err(e) => {
            debug!(namespace, account = account_name, error = %e, "Owner of deleted secret not found");
        }
    }
}

/// Handle an observed managed secret.
///
/// The secret is refreshed when its certificate is inside the rotation
/// window, or when its root differs from the trust bundle's root even after
/// synchronizing with the CA secret.
pub async fn on_secret_updated(ctx: &Context, secret: &Secret) {
    let Some((name, namespace)) = object_key(secret, "Secret") else {
        return;
    };

    let wait = wait_time(
        secret_field(secret, CERT_CHAIN_ID),
        Utc::now(),
        ctx.config.grace_period_ratio,
        ctx.config.min_grace_period,
    );

    let embedded_root = secret_field(secret, ROOT_CERT_ID);
    let mut root = ctx.ca.key_cert_bundle().root_cert_pem();
    if root != embedded_root {
        root = match sync_if_needed(ctx).await {
            Ok(root) => root,
            Err(e) => {
                error!(namespace, name, error = %e, "Failed to sync trust bundle, skipping secret update");
                return;
            }
        };
    }

    let reason = match &wait {
        Err(e) => {
            info!(namespace, name, reason = %e, "Refreshing about to expire secret");
            "expiring"
        }
        Ok(_) if root != embedded_root => {
            info!(namespace, name, "Refreshing secret with outdated root certificate");
            "root_mismatch"
        }
        Ok(remaining) => {
            debug!(namespace, name, ?remaining, "Secret does not need rotation");
            return;
        }
    };

    match refresh(ctx, secret).await {
        Ok(_) => {
            info!(namespace, name, "Secret refreshed");
            record_secret_refreshed(reason);
        }
        Err(e) => error!(namespace, name, error = %e, "Failed to refresh secret"),
    }
}

/// Route one event to its handler.
pub async fn handle_event(ctx: &Context, event: WatchEvent) {
    match &event {
        WatchEvent::IdentityAdded(account) => on_identity_added(ctx, account).await,
        WatchEvent::IdentityDeleted(account) => on_identity_deleted(ctx, account).await,
        WatchEvent::SecretDeleted(secret) => on_secret_deleted(ctx, secret).await,
        WatchEvent::SecretUpdated(secret) => on_secret_updated(ctx, secret).await,
    }
}

async fn dispatch_loop(
    ctx: Arc<Context>,
    mut events: mpsc::Receiver<WatchEvent>,
    mut shutdown: Shutdown,
    queue: &'static str,
) {
    info!(queue, "Dispatch loop started");
    loop {
        tokio::select! {
            () = shutdown.stopped() => break,
            event = events.recv() => match event {
                Some(event) => {
                    debug!(queue, kind = event.kind(), "Handling event");
                    handle_event(&ctx, event).await;
                }
                None => break,
            },
        }
    }
    info!(queue, "Dispatch loop stopped");
}

/// Drain both queues until shutdown or until both sources close.
///
/// Identity events are held back until `secrets_synced` reports `true`.
pub async fn run(
    ctx: Arc<Context>,
    identity_events: mpsc::Receiver<WatchEvent>,
    secret_events: mpsc::Receiver<WatchEvent>,
    mut secrets_synced: tokio::sync::watch::Receiver<bool>,
) {
    let secret_loop = tokio::spawn(dispatch_loop(
        ctx.clone(),
        secret_events,
        ctx.shutdown.clone(),
        "secret",
    ));

    let identity_ctx = ctx.clone();
    let identity_loop = tokio::spawn(async move {
        let mut shutdown = identity_ctx.shutdown.clone();
        tokio::select! {
            () = shutdown.stopped() => return,
            synced = async { secrets_synced.wait_for(|synced| *synced).await.is_ok() } => {
                if !synced {
                    warn!("Secret sources closed before their initial sync");
                    return;
                }
            }
        }
        info!("Secret caches synced, processing service account events");
        dispatch_loop(identity_ctx, identity_events, shutdown, "identity").await;
    });

    let (secret_result, identity_result) = tokio::join!(secret_loop, identity_loop);
    for result in [secret_result, identity_result] {
        if let Err(e) = result {
            error!(error = %e, "Dispatch loop panicked");
        }
    }
}
