// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Watch sources feeding the dispatch loops.
//!
//! For every configured namespace (an empty name means all namespaces):
//! - a secret watcher filtered to `type=istio.io/key-and-cert`, reflected into
//!   a store backing [`SecretStores`]
//! - a `ServiceAccount` watcher, started only after every secret store has
//!   completed its initial list
//!
//! A resync task replays every cached secret as [`WatchEvent::SecretUpdated`]
//! once a minute so rotation is evaluated without server-side changes.

use super::WatchEvent;
use crate::constants::{EVENT_CHANNEL_CAPACITY, ISTIO_SECRET_TYPE, NAMESPACE_ALL, SECRET_RESYNC_PERIOD_SECS};
use crate::context::{SecretCache, SecretStores};
use crate::shutdown::Shutdown;
use futures::{Stream, StreamExt};
use k8s_openapi::api::core::v1::{Secret, ServiceAccount};
use kube::runtime::reflector::{self, ObjectRef};
use kube::runtime::{watcher, WatchStreamExt};
use kube::{Api, Client, Resource};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// Channels and caches produced by [`start`].
pub struct WatchSources {
    /// Secret cache shared with the handlers
    pub cache: SecretStores,
    /// `ServiceAccount` events
    pub identity_events: mpsc::Receiver<WatchEvent>,
    /// Managed secret events
    pub secret_events: mpsc::Receiver<WatchEvent>,
    /// Flips to `true` once every secret store has its initial list
    pub secrets_synced: watch::Receiver<bool>,
}

/// Map a secret watch event to a dispatch event.
///
/// Initial list entries are not forwarded; they reach the handlers through
/// the periodic resync.
#[must_use]
pub fn secret_event(event: watcher::Event<Secret>) -> Option<WatchEvent> {
    match event {
        watcher::Event::Apply(secret) => Some(WatchEvent::SecretUpdated(secret)),
        watcher::Event::Delete(secret) => Some(WatchEvent::SecretDeleted(secret)),
        watcher::Event::Init | watcher::Event::InitApply(_) | watcher::Event::InitDone => None,
    }
}

/// Turns `ServiceAccount` watch events into add/delete notifications.
///
/// Modifications of an already known account are dropped. After a relist,
/// accounts that vanished while the watch was down are reported as deleted.
#[derive(Debug, Default)]
pub struct IdentityTracker {
    known: HashMap<ObjectRef<ServiceAccount>, ServiceAccount>,
    relisted: Option<HashSet<ObjectRef<ServiceAccount>>>,
}

impl IdentityTracker {
    /// Translate one watch event.
    pub fn observe(&mut self, event: watcher::Event<ServiceAccount>) -> Vec<WatchEvent> {
        match event {
            watcher::Event::Init => {
                self.relisted = Some(HashSet::new());
                Vec::new()
            }
            watcher::Event::InitApply(account) => {
                if let Some(relisted) = self.relisted.as_mut() {
                    relisted.insert(ObjectRef::from_obj(&account));
                }
                self.apply(account)
            }
            watcher::Event::Apply(account) => self.apply(account),
            watcher::Event::Delete(account) => {
                self.known.remove(&ObjectRef::from_obj(&account));
                vec![WatchEvent::IdentityDeleted(account)]
            }
            watcher::Event::InitDone => {
                let Some(relisted) = self.relisted.take() else {
                    return Vec::new();
                };
                let gone: Vec<_> = self
                    .known
                    .keys()
                    .filter(|key| !relisted.contains(key))
                    .cloned()
                    .collect();
                gone.into_iter()
                    .filter_map(|key| self.known.remove(&key))
                    .map(WatchEvent::IdentityDeleted)
                    .collect()
            }
        }
    }

    fn apply(&mut self, account: ServiceAccount) -> Vec<WatchEvent> {
        let key = ObjectRef::from_obj(&account);
        if self.known.insert(key, account.clone()).is_some() {
            Vec::new()
        } else {
            vec![WatchEvent::IdentityAdded(account)]
        }
    }
}

fn scoped_api<K>(client: &Client, namespace: &str) -> Api<K>
where
    K: Resource<Scope = k8s_openapi::NamespaceResourceScope>,
    <K as Resource>::DynamicType: Default,
{
    if namespace == NAMESPACE_ALL {
        Api::all(client.clone())
    } else {
        Api::namespaced(client.clone(), namespace)
    }
}

fn display_namespace(namespace: &str) -> &str {
    if namespace == NAMESPACE_ALL {
        "<all>"
    } else {
        namespace
    }
}

async fn forward<S, K, F>(
    stream: S,
    mut translate: F,
    events: mpsc::Sender<WatchEvent>,
    mut shutdown: Shutdown,
    source: &'static str,
    namespace: String,
) where
    S: Stream<Item = Result<watcher::Event<K>, watcher::Error>>,
    F: FnMut(watcher::Event<K>) -> Vec<WatchEvent>,
{
    tokio::pin!(stream);
    info!(source, namespace = display_namespace(&namespace), "Watch started");
    loop {
        tokio::select! {
            () = shutdown.stopped() => break,
            item = stream.next() => match item {
                Some(Ok(event)) => {
                    for event in translate(event) {
                        if events.send(event).await.is_err() {
                            debug!(source, "Event queue closed");
                            return;
                        }
                    }
                }
                Some(Err(e)) => {
                    warn!(source, namespace = display_namespace(&namespace), error = %e, "Watch error");
                }
                None => break,
            },
        }
    }
    info!(source, namespace = display_namespace(&namespace), "Watch stopped");
}

/// Replay every cached secret on a fixed period until shutdown.
pub async fn resync_loop(
    cache: Arc<dyn SecretCache>,
    events: mpsc::Sender<WatchEvent>,
    mut shutdown: Shutdown,
    period: Duration,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;
    loop {
        tokio::select! {
            () = shutdown.stopped() => break,
            _ = ticker.tick() => {
                let secrets = cache.secrets();
                debug!(count = secrets.len(), "Resyncing secrets");
                for secret in secrets {
                    if events.send(WatchEvent::SecretUpdated((*secret).clone())).await.is_err() {
                        return;
                    }
                }
            }
        }
    }
}

/// Start the watchers for `namespaces`.
///
/// Must be called from within a tokio runtime.
#[must_use]
pub fn start(client: Client, namespaces: Vec<String>, shutdown: Shutdown) -> WatchSources {
    let (secret_tx, secret_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let (identity_tx, identity_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let (synced_tx, synced_rx) = watch::channel(false);

    let secret_config = watcher::Config::default().fields(&format!("type={ISTIO_SECRET_TYPE}"));
    let mut stores = Vec::with_capacity(namespaces.len());
    for namespace in &namespaces {
        let (reader, writer) = reflector::store();
        stores.push(reader);
        let stream = watcher(scoped_api::<Secret>(&client, namespace), secret_config.clone())
            .default_backoff()
            .reflect(writer);
        tokio::spawn(forward(
            stream,
            |event| secret_event(event).into_iter().collect(),
            secret_tx.clone(),
            shutdown.clone(),
            "secret",
            namespace.clone(),
        ));
    }
    let cache = SecretStores::new(stores);

    let barrier_cache = cache.clone();
    let mut barrier_shutdown = shutdown.clone();
    tokio::spawn(async move {
        tokio::select! {
            () = barrier_shutdown.stopped() => return,
            ready = barrier_cache.wait_until_ready() => {
                if !ready {
                    warn!("Secret store closed before its initial list completed");
                    return;
                }
            }
        }
        info!("Secret stores ready, starting service account watchers");
        synced_tx.send_replace(true);

        for namespace in namespaces {
            let mut tracker = IdentityTracker::default();
            let stream = watcher(
                scoped_api::<ServiceAccount>(&client, &namespace),
                watcher::Config::default(),
            )
            .default_backoff();
            tokio::spawn(forward(
                stream,
                move |event| tracker.observe(event),
                identity_tx.clone(),
                shutdown.clone(),
                "identity",
                namespace,
            ));
        }

        tokio::spawn(resync_loop(
            Arc::new(barrier_cache),
            secret_tx,
            shutdown,
            Duration::from_secs(SECRET_RESYNC_PERIOD_SECS),
        ));
    });

    WatchSources {
        cache,
        identity_events: identity_rx,
        secret_events: secret_rx,
        secrets_synced: synced_rx,
    }
}
