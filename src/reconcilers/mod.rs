// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Reconciliation of Ingress objects against the cloud load balancer.
//!
//! # Reconciliation Architecture
//!
//! The controller follows the standard Kubernetes controller pattern:
//!
//! 1. **Watch** - Ingress events, plus Node membership changes fanned out to every managed Ingress
//! 2. **Reconcile** - Build the desired load balancer and converge the observed one to it
//! 3. **Status** - Publish addresses and a `Ready` condition back on the Ingress
//! 4. **Requeue** - Pick the next look at the Ingress from the outcome
//!
//! # Modules
//!
//! - [`ingress`] - The per-Ingress state machine
//! - [`requeue`] - Outcome to requeue mapping and per-key retry accounting
//! - [`status`] - Condition helpers and the status patch builder
//! - [`finalizers`] - Cleanup finalizer management
//! - [`retry`] - Exponential backoff for Kubernetes API calls

pub mod finalizers;
pub mod ingress;
pub mod requeue;
pub mod retry;
pub mod status;

pub use ingress::{IngressReconciler, ReconcilePhase};
pub use requeue::{decide_requeue, ReconcileOutcome, RequeueDecision, RetryTracker};
