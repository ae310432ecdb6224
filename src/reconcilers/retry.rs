// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Jittered exponential backoff.
//!
//! Kubernetes reads and writes made during a reconcile are retried in place for
//! a short window on 429, 5xx and connection errors. Anything longer becomes a
//! `Transient` failure and is left to the requeue policy so the key is not
//! blocked. The load balancer adapter paces its own attempts with the same
//! [`ExponentialBackoff`], bounded by attempt count rather than by time.

use crate::errors::ReconcileError;
use rand::Rng;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

/// Shape of a backoff sequence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    pub initial: Duration,
    pub ceiling: Duration,
    /// Stop handing out delays once this much time has passed since the start.
    pub give_up_after: Option<Duration>,
    pub multiplier: f64,
    /// Fraction of each delay that is randomized in both directions.
    pub jitter: f64,
}

impl BackoffPolicy {
    /// Budget for in-place Kubernetes API retries: 100ms doubling to 5s, 30s total.
    pub const KUBE_API: Self = Self {
        initial: Duration::from_millis(100),
        ceiling: Duration::from_secs(5),
        give_up_after: Some(Duration::from_secs(30)),
        multiplier: 2.0,
        jitter: 0.1,
    };

    #[must_use]
    pub fn start(self) -> ExponentialBackoff {
        ExponentialBackoff {
            policy: self,
            upcoming: self.initial,
            started: Instant::now(),
        }
    }
}

/// A running backoff sequence.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    policy: BackoffPolicy,
    upcoming: Duration,
    started: Instant,
}

impl ExponentialBackoff {
    /// Doubling backoff with ±10% jitter and no time limit.
    #[must_use]
    pub fn bounded_by_attempts(initial: Duration, ceiling: Duration) -> Self {
        BackoffPolicy {
            initial,
            ceiling,
            give_up_after: None,
            ..BackoffPolicy::KUBE_API
        }
        .start()
    }

    #[must_use]
    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    /// The next delay, or `None` once the time budget is spent.
    pub fn next_backoff(&mut self) -> Option<Duration> {
        if self
            .policy
            .give_up_after
            .is_some_and(|limit| self.started.elapsed() >= limit)
        {
            return None;
        }

        let base = self.upcoming;
        self.upcoming = base.mul_f64(self.policy.multiplier).min(self.policy.ceiling);
        Some(jittered(base, self.policy.jitter))
    }
}

fn jittered(base: Duration, jitter: f64) -> Duration {
    if jitter <= 0.0 {
        return base;
    }
    let secs = base.as_secs_f64();
    let spread = secs * jitter;
    let picked = rand::rng().random_range((secs - spread)..=(secs + spread));
    Duration::from_secs_f64(picked.max(0.0))
}

/// A fresh [`BackoffPolicy::KUBE_API`] sequence.
#[must_use]
pub fn default_backoff() -> ExponentialBackoff {
    BackoffPolicy::KUBE_API.start()
}

/// Run a Kubernetes API call, retrying retryable failures under [`default_backoff`].
///
/// The error that ends the loop is classified with [`ReconcileError::from_kube`],
/// so a 404 comes back as `NotFound`.
///
/// # Errors
///
/// The classified error from the first non-retryable failure, or from the last
/// attempt once the backoff is spent.
pub async fn retry_api_call<T, F, Fut>(
    mut operation: F,
    operation_name: &str,
) -> Result<T, ReconcileError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, kube::Error>>,
{
    let mut backoff = default_backoff();
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;
        let err = match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(operation = operation_name, attempt, "Succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) => err,
        };

        if !is_retryable_error(&err) {
            return Err(ReconcileError::from_kube(&err, operation_name));
        }

        let Some(delay) = backoff.next_backoff() else {
            error!(
                operation = operation_name,
                attempt,
                error = %err,
                "Retry budget for Kubernetes API call spent"
            );
            return Err(ReconcileError::from_kube(&err, operation_name));
        };

        warn!(
            operation = operation_name,
            attempt,
            retry_after = ?delay,
            error = %err,
            "Kubernetes API call failed, retrying"
        );
        tokio::time::sleep(delay).await;
    }
}

/// Rate limiting, server errors and connection failures are worth another try.
fn is_retryable_error(err: &kube::Error) -> bool {
    match err {
        kube::Error::Api(status) => status.code == 429 || (500..600).contains(&status.code),
        kube::Error::Service(_) => true,
        _ => false,
    }
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod retry_tests;
