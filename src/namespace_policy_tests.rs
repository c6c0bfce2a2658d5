// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `namespace_policy.rs`

#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::testing::FakeCluster;

    #[test]
    fn test_label_decision_values() {
        for value in ["enabled", "Enable", "TRUE", "yes", "y"] {
            assert!(label_decision(Some(value), false), "{value} should enable");
        }
        for value in ["disabled", "DISABLE", "false", "No", "n"] {
            assert!(!label_decision(Some(value), true), "{value} should disable");
        }
        assert!(label_decision(None, true));
        assert!(!label_decision(None, false));
        assert!(label_decision(Some("maybe"), true));
        assert!(!label_decision(Some("maybe"), false));
    }

    #[tokio::test]
    async fn test_opt_in_not_required_skips_lookup() {
        let cluster = FakeCluster::new();
        assert!(is_enabled(cluster.as_ref(), "default", false, &HashSet::new()).await);
        assert_eq!(cluster.calls().get_namespace, 0);
    }

    #[tokio::test]
    async fn test_watched_namespace_is_always_enabled() {
        let cluster = FakeCluster::new();
        cluster.add_namespace("bookinfo", Some("disabled"));
        let watched = HashSet::from(["bookinfo".to_string()]);

        assert!(is_enabled(cluster.as_ref(), "bookinfo", true, &watched).await);
        assert_eq!(cluster.calls().get_namespace, 0);
    }

    #[tokio::test]
    async fn test_explicit_opt_in_reads_label() {
        let cluster = FakeCluster::new();
        cluster.add_namespace("enabled-ns", Some("enabled"));
        cluster.add_namespace("disabled-ns", Some("disabled"));
        cluster.add_namespace("unlabeled", None);
        cluster.add_namespace("odd", Some("sometimes"));
        let watched = HashSet::new();

        assert!(is_enabled(cluster.as_ref(), "enabled-ns", true, &watched).await);
        assert!(!is_enabled(cluster.as_ref(), "disabled-ns", true, &watched).await);
        assert!(!is_enabled(cluster.as_ref(), "unlabeled", true, &watched).await);
        assert!(!is_enabled(cluster.as_ref(), "odd", true, &watched).await);
    }

    #[tokio::test]
    async fn test_lookup_failure_uses_default() {
        let cluster = FakeCluster::new();
        assert!(!is_enabled(cluster.as_ref(), "missing", true, &HashSet::new()).await);
        assert_eq!(cluster.calls().get_namespace, 1);
    }
}
