// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Bounded retry with a fixed interval.
//!
//! Secret creation and CA secret loading retry a bounded number of times with
//! a constant pause between attempts (no exponential growth). Every other
//! operation is single-attempt and relies on the next watch event to re-drive
//! it. Waits use `tokio::time`, so tests drive them with a paused clock.

use crate::constants::{
    CA_SECRET_LOAD_TIMEOUT_SECS, CA_SECRET_POLL_INTERVAL_MILLIS, SECRET_CREATION_RETRY,
    SECRET_CREATION_RETRY_INTERVAL_MILLIS,
};
use crate::errors::Error;
use crate::shutdown::Shutdown;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Fixed backoff policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedBackoff {
    /// Pause between attempts
    pub interval: Duration,
    /// Maximum number of attempts, if bounded by count
    pub max_attempts: Option<u32>,
    /// Maximum total time, if bounded by time
    pub max_elapsed: Option<Duration>,
}

impl FixedBackoff {
    /// Policy for creating workload secrets: 3 attempts, 1s apart.
    #[must_use]
    pub fn secret_creation() -> Self {
        Self {
            interval: Duration::from_millis(SECRET_CREATION_RETRY_INTERVAL_MILLIS),
            max_attempts: Some(SECRET_CREATION_RETRY),
            max_elapsed: None,
        }
    }

    /// Policy for loading the CA secret: poll every 100ms for up to 5s.
    #[must_use]
    pub fn ca_secret_load() -> Self {
        Self {
            interval: Duration::from_millis(CA_SECRET_POLL_INTERVAL_MILLIS),
            max_attempts: None,
            max_elapsed: Some(Duration::from_secs(CA_SECRET_LOAD_TIMEOUT_SECS)),
        }
    }

    fn exhausted(&self, attempt: u32, started: Instant) -> bool {
        self.max_attempts.is_some_and(|max| attempt >= max)
            || self
                .max_elapsed
                .is_some_and(|max| started.elapsed() + self.interval > max)
    }
}

/// Run `operation` until it succeeds, the policy is exhausted, or shutdown fires.
///
/// The stop signal is checked before every attempt, so a shutdown during a
/// pause abandons the loop at the next check point.
///
/// # Errors
///
/// Returns [`Error::RetriesExhausted`] carrying the last failure, or
/// [`Error::Cancelled`] if shutdown fired first.
pub async fn retry_fixed<T, F, Fut>(
    policy: FixedBackoff,
    shutdown: &Shutdown,
    operation_name: &str,
    mut operation: F,
) -> Result<T, Error>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, Error>>,
{
    let started = Instant::now();
    let mut attempt = 0;

    loop {
        if shutdown.is_stopped() {
            return Err(Error::Cancelled(operation_name.to_string()));
        }
        attempt += 1;

        match operation(attempt).await {
            Ok(value) => {
                debug!(operation = operation_name, attempt, "Operation succeeded");
                return Ok(value);
            }
            Err(e) => {
                if policy.exhausted(attempt, started) {
                    return Err(Error::RetriesExhausted {
                        operation: operation_name.to_string(),
                        attempts: attempt,
                        last_error: e.to_string(),
                    });
                }
                warn!(
                    operation = operation_name,
                    attempt,
                    retry_after = ?policy.interval,
                    error = %e,
                    "Operation failed, will retry"
                );
                tokio::time::sleep(policy.interval).await;
            }
        }
    }
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod retry_tests;
