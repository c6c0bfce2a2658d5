// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Shared stop signal for the controller.
//!
//! One [`ShutdownTrigger`] fans out to any number of cloned [`Shutdown`]
//! handles. Dispatch loops select on [`Shutdown::stopped`]; retry loops poll
//! [`Shutdown::is_stopped`] between attempts.

use tokio::sync::watch;

/// Sending half of the stop signal.
#[derive(Debug)]
pub struct ShutdownTrigger(watch::Sender<bool>);

/// Receiving half of the stop signal. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Shutdown(watch::Receiver<bool>);

impl ShutdownTrigger {
    /// Signal every [`Shutdown`] handle. Idempotent.
    pub fn trigger(&self) {
        self.0.send_replace(true);
    }
}

impl Shutdown {
    /// Create a connected trigger/handle pair.
    #[must_use]
    pub fn channel() -> (ShutdownTrigger, Shutdown) {
        let (tx, rx) = watch::channel(false);
        (ShutdownTrigger(tx), Shutdown(rx))
    }

    /// A handle that never fires.
    #[cfg(test)]
    #[must_use]
    pub fn never() -> Shutdown {
        let (tx, rx) = watch::channel(false);
        // Keep the channel open for the life of the process.
        std::mem::forget(tx);
        Shutdown(rx)
    }

    /// `true` once the trigger has fired.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        *self.0.borrow()
    }

    /// Resolve once the trigger fires (or its sender is dropped).
    pub async fn stopped(&mut self) {
        // An error means the trigger was dropped, which also ends the process.
        let _ = self.0.wait_for(|stopped| *stopped).await;
    }
}
