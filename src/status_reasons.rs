// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Standard condition types and reasons written to the Ingress status annotation.
//!
//! Reasons are `CamelCase` programmatic identifiers; operators read them together
//! with the condition message to tell apart failures that clear on their own from
//! failures that need a change to the Ingress or to the cloud resource.

// ============================================================================
// Condition Types
// ============================================================================

/// The load balancer for this Ingress is active and serving
pub const CONDITION_TYPE_READY: &str = "Ready";

// ============================================================================
// Condition Status Values
// ============================================================================

pub const CONDITION_STATUS_TRUE: &str = "True";
pub const CONDITION_STATUS_FALSE: &str = "False";

// ============================================================================
// Success Reasons
// ============================================================================

/// Load balancer is `ACTIVE` and matches the desired configuration
pub const REASON_LOAD_BALANCER_READY: &str = "LoadBalancerReady";

// ============================================================================
// Failure Reasons
// ============================================================================

/// A referenced object (Service, Secret, load balancer) does not exist
pub const REASON_NOT_FOUND: &str = "NotFound";

/// Timeout, throttling or provider 5xx; retried automatically
pub const REASON_TRANSIENT_FAILURE: &str = "TransientFailure";

/// Desired configuration cannot be applied to the existing load balancer
///
/// Examples: changing visibility or subnets, a load balancer in `FAILED` state,
/// a provider `409 Conflict`. Requires operator intervention.
pub const REASON_LOAD_BALANCER_CONFLICT: &str = "LoadBalancerConflict";

/// The Ingress references something invalid, such as a missing TLS secret
pub const REASON_INVALID_INGRESS: &str = "InvalidIngress";

/// Transient failures kept recurring past the retry budget
pub const REASON_RETRIES_EXHAUSTED: &str = "RetriesExhausted";
