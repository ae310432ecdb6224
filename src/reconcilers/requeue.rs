// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Requeue policy for Ingress reconciles.
//!
//! | Outcome | Next reconcile |
//! |---------|----------------|
//! | `Ready` | drift check after 5 minutes |
//! | `Provisioning` | after 15 seconds |
//! | `Deleted` | on the next change |
//! | `Failed(Transient)` | 5s, 10s, 20s ... capped at 5 minutes, for 8 attempts |
//! | `Failed(other)` | on the next change |

use crate::constants::{
    DEFAULT_REQUEUE_DURATION_SECS, MAX_TRANSIENT_ATTEMPTS, PROVISIONING_REQUEUE_DURATION_SECS,
    TRANSIENT_BACKOFF_BASE_SECS, TRANSIENT_BACKOFF_MAX_SECS,
};
use crate::errors::ReconcileError;
use crate::model::IngressRef;
use kube::runtime::controller::Action;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Terminal result of one reconcile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The load balancer is active and matches the Ingress
    Ready {
        load_balancer_id: String,
        addresses: Vec<String>,
    },
    /// The load balancer exists (or is being created) but is not active yet
    Provisioning { load_balancer_id: Option<String> },
    /// The load balancer was released and the Ingress is no longer managed
    Deleted,
    Failed(ReconcileError),
}

impl ReconcileOutcome {
    /// Metric label for this outcome.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ready { .. } => "ready",
            Self::Provisioning { .. } => "provisioning",
            Self::Deleted => "deleted",
            Self::Failed(_) => "failed",
        }
    }
}

/// When to look at an Ingress again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequeueDecision {
    After {
        delay: Duration,
        reason: &'static str,
    },
    AwaitChange { reason: &'static str },
}

impl RequeueDecision {
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            Self::After { reason, .. } | Self::AwaitChange { reason } => reason,
        }
    }

    #[must_use]
    pub fn to_action(self) -> Action {
        match self {
            Self::After { delay, .. } => Action::requeue(delay),
            Self::AwaitChange { .. } => Action::await_change(),
        }
    }
}

/// Decide the requeue for `outcome`. `attempts` counts consecutive transient
/// failures of the key including this one.
#[must_use]
pub fn decide_requeue(outcome: &ReconcileOutcome, attempts: u32) -> RequeueDecision {
    match outcome {
        ReconcileOutcome::Ready { .. } => RequeueDecision::After {
            delay: Duration::from_secs(DEFAULT_REQUEUE_DURATION_SECS),
            reason: "drift_check",
        },
        ReconcileOutcome::Provisioning { .. } => RequeueDecision::After {
            delay: Duration::from_secs(PROVISIONING_REQUEUE_DURATION_SECS),
            reason: "provisioning",
        },
        ReconcileOutcome::Deleted => RequeueDecision::AwaitChange { reason: "deleted" },
        ReconcileOutcome::Failed(err) if err.is_retryable() => {
            if attempts > MAX_TRANSIENT_ATTEMPTS {
                RequeueDecision::AwaitChange {
                    reason: "retries_exhausted",
                }
            } else {
                RequeueDecision::After {
                    delay: transient_backoff(attempts),
                    reason: "transient",
                }
            }
        }
        ReconcileOutcome::Failed(err) => RequeueDecision::AwaitChange {
            reason: err.class().as_str(),
        },
    }
}

/// Backoff for the `attempt`-th consecutive transient failure (1-based).
#[must_use]
pub fn transient_backoff(attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16);
    let secs = TRANSIENT_BACKOFF_BASE_SECS.saturating_mul(1u64 << exponent);
    Duration::from_secs(secs.min(TRANSIENT_BACKOFF_MAX_SECS))
}

/// Consecutive transient failures per Ingress.
#[derive(Debug, Default)]
pub struct RetryTracker {
    attempts: Mutex<HashMap<IngressRef, u32>>,
}

impl RetryTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one more failure and return the new total.
    pub fn record_failure(&self, key: &IngressRef) -> u32 {
        let mut attempts = self.attempts.lock().unwrap_or_else(PoisonError::into_inner);
        let count = attempts.entry(key.clone()).or_insert(0);
        *count = count.saturating_add(1);
        *count
    }

    pub fn reset(&self, key: &IngressRef) {
        self.attempts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }

    #[must_use]
    pub fn attempts(&self, key: &IngressRef) -> u32 {
        self.attempts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .copied()
            .unwrap_or(0)
    }
}

#[cfg(test)]
#[path = "requeue_tests.rs"]
mod requeue_tests;
