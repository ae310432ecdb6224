// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Annotation, finalizer and tag constants recognised or written by the controller.
//!
//! Keys keep the `ingress.beta.kubernetes.io/oci-load-balancer-*` form that existing
//! manifests already use.

// ============================================================================
// Ingress Annotations (read)
// ============================================================================

/// Load balancer visibility: `"private"` requests a private load balancer
pub const LB_VISIBILITY: &str = "ingress.beta.kubernetes.io/oci-load-balancer-visibility";

/// Load balancer shape (bandwidth class), e.g. `"400Mbps"`
pub const LB_SHAPE: &str = "ingress.beta.kubernetes.io/oci-load-balancer-shape";

/// Compartment OCID override for the load balancer
pub const LB_COMPARTMENT: &str = "ingress.beta.kubernetes.io/oci-load-balancer-compartment";

/// Legacy ingress class annotation, consulted when `spec.ingressClassName` is unset
pub const INGRESS_CLASS: &str = "kubernetes.io/ingress.class";

/// Value of the visibility annotation that selects a private load balancer
pub const VISIBILITY_PRIVATE: &str = "private";

/// Value of the visibility annotation that selects a public load balancer
pub const VISIBILITY_PUBLIC: &str = "public";

// ============================================================================
// Controller-Owned Metadata (written)
// ============================================================================

/// Finalizer guarding load balancer cleanup
pub const FINALIZER_LB_CLEANUP: &str = "ingress.beta.kubernetes.io/oci-load-balancer-cleanup";

/// JSON-encoded condition list describing the last reconcile
pub const LB_STATUS: &str = "ingress.beta.kubernetes.io/oci-load-balancer-status";

// ============================================================================
// Cloud Tags
// ============================================================================

/// Freeform tag key identifying the Ingress that owns a load balancer
pub const OWNERSHIP_TAG_KEY: &str = "oci-ingress-owner";

// ============================================================================
// Secret Keys
// ============================================================================

/// Certificate chain in a `kubernetes.io/tls` secret
pub const SECRET_TLS_CERT: &str = "tls.crt";

/// Private key in a `kubernetes.io/tls` secret
pub const SECRET_TLS_KEY: &str = "tls.key";

/// Optional CA bundle in a TLS secret
pub const SECRET_CA_CERT: &str = "ca.crt";
