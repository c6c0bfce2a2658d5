// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Messages delivered from the watch sources to the dispatch loops.

use k8s_openapi::api::core::v1::{Secret, ServiceAccount};

/// A change observed on a watched object.
#[derive(Debug, Clone)]
pub enum WatchEvent {
    /// A `ServiceAccount` appeared
    IdentityAdded(ServiceAccount),
    /// A `ServiceAccount` was removed
    IdentityDeleted(ServiceAccount),
    /// A managed secret was removed
    SecretDeleted(Secret),
    /// A managed secret was observed with a new value (or replayed by resync)
    SecretUpdated(Secret),
}

impl WatchEvent {
    /// Short name used in logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            WatchEvent::IdentityAdded(_) => "identity_added",
            WatchEvent::IdentityDeleted(_) => "identity_deleted",
            WatchEvent::SecretDeleted(_) => "secret_deleted",
            WatchEvent::SecretUpdated(_) => "secret_updated",
        }
    }
}
