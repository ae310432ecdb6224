// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Pure diff from an observed load balancer to a desired spec.
//!
//! The plan is ordered so that every intermediate state is valid on the provider:
//! things are created before anything references them and deleted only after
//! nothing references them.
//!
//! 1. shape
//! 2. new certificates
//! 3. new and changed backend sets, then individual backend additions and removals
//! 4. new and changed path route sets
//! 5. new and changed listeners
//! 6. deletions: listeners, path route sets, backend sets, certificates
//! 7. tags

use super::ChangeOp;
use crate::errors::ReconcileError;
use crate::model::{CertificateBundles, LoadBalancerSpec, ObservedLoadBalancer};
use std::collections::BTreeSet;

/// Compute the minimal ordered change list. An empty list means the load
/// balancer already matches.
///
/// # Errors
///
/// - `Conflict` when visibility or subnets differ (both immutable on the provider)
/// - `Malformed` when a new certificate has no material in `bundles`
pub fn plan_changes(
    spec: &LoadBalancerSpec,
    observed: &ObservedLoadBalancer,
    bundles: &CertificateBundles,
) -> Result<Vec<ChangeOp>, ReconcileError> {
    if observed.is_private != spec.visibility.is_private() {
        return Err(ReconcileError::Conflict(format!(
            "load balancer {} is {} but the Ingress asks for {}; visibility cannot change after creation",
            observed.id,
            if observed.is_private { "private" } else { "public" },
            spec.visibility
        )));
    }

    let observed_subnets: BTreeSet<&String> = observed.subnets.iter().collect();
    let desired_subnets: BTreeSet<&String> = spec.subnets.iter().collect();
    if observed_subnets != desired_subnets {
        return Err(ReconcileError::Conflict(format!(
            "load balancer {} is in subnets [{}] but configuration lists [{}]; subnets cannot change after creation",
            observed.id,
            observed.subnets.join(", "),
            spec.subnets.join(", ")
        )));
    }

    let mut ops = Vec::new();

    if observed.shape != spec.shape {
        ops.push(ChangeOp::UpdateShape {
            shape: spec.shape.clone(),
        });
    }

    for name in spec.certificates.keys() {
        if observed.certificates.contains(name) {
            continue;
        }
        let bundle = bundles.get(name).ok_or_else(|| {
            ReconcileError::Malformed(format!("no certificate material for '{name}'"))
        })?;
        ops.push(ChangeOp::CreateCertificate {
            name: name.clone(),
            bundle: bundle.clone(),
        });
    }

    let mut backend_adds = Vec::new();
    let mut backend_removes = Vec::new();
    for (name, desired) in &spec.backend_sets {
        match observed.backend_sets.get(name) {
            None => ops.push(ChangeOp::CreateBackendSet {
                name: name.clone(),
                spec: desired.clone(),
            }),
            Some(current)
                if current.policy != desired.policy
                    || current.health_check != desired.health_check =>
            {
                ops.push(ChangeOp::UpdateBackendSet {
                    name: name.clone(),
                    spec: desired.clone(),
                });
            }
            Some(current) => {
                for backend in desired.backends.difference(&current.backends) {
                    backend_adds.push(ChangeOp::AddBackend {
                        backend_set: name.clone(),
                        backend: backend.clone(),
                    });
                }
                for backend in current.backends.difference(&desired.backends) {
                    backend_removes.push(ChangeOp::RemoveBackend {
                        backend_set: name.clone(),
                        backend: backend.clone(),
                    });
                }
            }
        }
    }
    ops.extend(backend_adds);
    ops.extend(backend_removes);

    for (name, routes) in &spec.path_route_sets {
        match observed.path_route_sets.get(name) {
            None => ops.push(ChangeOp::CreatePathRouteSet {
                name: name.clone(),
                routes: routes.clone(),
            }),
            Some(current) if current != routes => ops.push(ChangeOp::UpdatePathRouteSet {
                name: name.clone(),
                routes: routes.clone(),
            }),
            Some(_) => {}
        }
    }

    for (name, listener) in &spec.listeners {
        match observed.listeners.get(name) {
            None => ops.push(ChangeOp::CreateListener {
                name: name.clone(),
                spec: listener.clone(),
            }),
            Some(current) if current != listener => ops.push(ChangeOp::UpdateListener {
                name: name.clone(),
                spec: listener.clone(),
            }),
            Some(_) => {}
        }
    }

    for name in observed.listeners.keys() {
        if !spec.listeners.contains_key(name) {
            ops.push(ChangeOp::DeleteListener { name: name.clone() });
        }
    }
    for name in observed.path_route_sets.keys() {
        if !spec.path_route_sets.contains_key(name) {
            ops.push(ChangeOp::DeletePathRouteSet { name: name.clone() });
        }
    }
    for name in observed.backend_sets.keys() {
        if !spec.backend_sets.contains_key(name) {
            ops.push(ChangeOp::DeleteBackendSet { name: name.clone() });
        }
    }
    for name in &observed.certificates {
        if !spec.certificates.contains_key(name) {
            ops.push(ChangeOp::DeleteCertificate { name: name.clone() });
        }
    }

    if observed.tags != spec.tags {
        ops.push(ChangeOp::UpdateTags {
            tags: spec.tags.clone(),
        });
    }

    Ok(ops)
}

#[cfg(test)]
#[path = "plan_tests.rs"]
mod plan_tests;
