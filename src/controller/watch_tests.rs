// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `controller/watch.rs`

#[cfg(test)]
mod tests {
    use crate::controller::watch::{resync_loop, secret_event, IdentityTracker};
    use crate::controller::WatchEvent;
    use crate::shutdown::Shutdown;
    use crate::testing::{service_account, FakeCluster};
    use k8s_openapi::api::core::v1::{Secret, ServiceAccount};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use kube::runtime::watcher::Event;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn secret(namespace: &str, name: &str) -> Secret {
        Secret {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn names(events: &[WatchEvent]) -> Vec<String> {
        events
            .iter()
            .map(|event| match event {
                WatchEvent::IdentityAdded(sa) => format!("+{}", sa.metadata.name.as_deref().unwrap_or_default()),
                WatchEvent::IdentityDeleted(sa) => format!("-{}", sa.metadata.name.as_deref().unwrap_or_default()),
                other => format!("?{}", other.kind()),
            })
            .collect()
    }

    fn account(name: &str) -> ServiceAccount {
        service_account("default", name)
    }

    #[test]
    fn test_secret_events_map_to_dispatch_events() {
        let s = secret("default", "istio.bookinfo");

        assert!(matches!(
            secret_event(Event::Apply(s.clone())),
            Some(WatchEvent::SecretUpdated(_))
        ));
        assert!(matches!(
            secret_event(Event::Delete(s.clone())),
            Some(WatchEvent::SecretDeleted(_))
        ));
        assert!(secret_event(Event::Init).is_none());
        assert!(secret_event(Event::InitApply(s)).is_none());
        assert!(secret_event(Event::InitDone).is_none());
    }

    #[test]
    fn test_tracker_reports_new_accounts_once() {
        let mut tracker = IdentityTracker::default();

        assert_eq!(names(&tracker.observe(Event::Apply(account("bookinfo")))), vec!["+bookinfo"]);
        // A modification of a known account is not an addition.
        assert!(tracker.observe(Event::Apply(account("bookinfo"))).is_empty());
        assert_eq!(names(&tracker.observe(Event::Delete(account("bookinfo")))), vec!["-bookinfo"]);
        assert_eq!(names(&tracker.observe(Event::Apply(account("bookinfo")))), vec!["+bookinfo"]);
    }

    #[test]
    fn test_tracker_initial_list_adds_accounts() {
        let mut tracker = IdentityTracker::default();

        assert!(tracker.observe(Event::Init).is_empty());
        assert_eq!(names(&tracker.observe(Event::InitApply(account("a")))), vec!["+a"]);
        assert_eq!(names(&tracker.observe(Event::InitApply(account("b")))), vec!["+b"]);
        assert!(tracker.observe(Event::InitDone).is_empty());
    }

    #[test]
    fn test_tracker_relist_reports_vanished_accounts() {
        let mut tracker = IdentityTracker::default();
        tracker.observe(Event::Apply(account("kept")));
        tracker.observe(Event::Apply(account("gone")));

        tracker.observe(Event::Init);
        assert!(tracker.observe(Event::InitApply(account("kept"))).is_empty());
        assert_eq!(names(&tracker.observe(Event::InitApply(account("new")))), vec!["+new"]);
        let deleted = tracker.observe(Event::InitDone);

        assert_eq!(names(&deleted), vec!["-gone"]);
        // The vanished account is forgotten.
        assert_eq!(names(&tracker.observe(Event::Apply(account("gone")))), vec!["+gone"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resync_replays_cached_secrets() {
        let cluster = FakeCluster::new();
        cluster.put_secret(secret("default", "istio.a"));
        cluster.put_secret(secret("default", "istio.b"));
        let (tx, mut rx) = mpsc::channel(16);
        let (trigger, shutdown) = Shutdown::channel();
        let task = tokio::spawn(resync_loop(cluster.clone(), tx, shutdown, Duration::from_secs(60)));

        // Nothing is replayed before the first period elapses.
        tokio::time::sleep(Duration::from_secs(59)).await;
        assert!(rx.try_recv().is_err());

        tokio::time::sleep(Duration::from_secs(2)).await;
        let mut replayed = Vec::new();
        while let Ok(event) = rx.try_recv() {
            match event {
                WatchEvent::SecretUpdated(s) => replayed.push(s.metadata.name.unwrap_or_default()),
                other => panic!("unexpected event {}", other.kind()),
            }
        }
        replayed.sort();
        assert_eq!(replayed, vec!["istio.a", "istio.b"]);

        trigger.trigger();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("resync loop should stop on shutdown")
            .unwrap();
    }
}
