// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Conditions and addresses published on managed Ingresses.
//!
//! `networking.k8s.io/v1` Ingress status only has room for load balancer
//! addresses, so the `Ready` condition is kept JSON-encoded in the
//! `ingress.beta.kubernetes.io/oci-load-balancer-status` annotation.
//! [`IngressStatusUpdater`] collects one reconcile's changes and reduces them
//! to the smallest [`IngressStatusPatch`].

use crate::annotations::LB_STATUS;
use crate::model::{Condition, IngressRef};
use chrono::Utc;
use k8s_openapi::api::networking::v1::{Ingress, IngressLoadBalancerIngress};
use kube::ResourceExt;
use std::net::IpAddr;
use tracing::warn;

/// A condition stamped with the current time.
#[must_use]
pub fn create_condition(
    condition_type: &str,
    status: &str,
    reason: &str,
    message: &str,
) -> Condition {
    Condition {
        r#type: condition_type.to_string(),
        status: status.to_string(),
        reason: Some(reason.to_string()),
        message: Some(message.to_string()),
        last_transition_time: Some(Utc::now().to_rfc3339()),
    }
}

#[must_use]
pub fn find_condition<'a>(
    conditions: &'a [Condition],
    condition_type: &str,
) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.r#type == condition_type)
}

/// Replace or append the condition of `condition_type`.
///
/// `lastTransitionTime` only moves when `status` flips.
pub fn upsert_condition(
    conditions: &mut Vec<Condition>,
    condition_type: &str,
    status: &str,
    reason: &str,
    message: &str,
) {
    let mut next = create_condition(condition_type, status, reason, message);
    match conditions.iter_mut().find(|c| c.r#type == condition_type) {
        Some(existing) => {
            if existing.status == status && existing.last_transition_time.is_some() {
                next.last_transition_time = existing.last_transition_time.take();
            }
            *existing = next;
        }
        None => conditions.push(next),
    }
}

/// Same conditions by type, status, reason and message. Timestamps are ignored.
#[must_use]
pub fn conditions_equal(current: &[Condition], new: &[Condition]) -> bool {
    let same = |a: &Condition, b: &Condition| {
        a.status == b.status && a.reason == b.reason && a.message == b.message
    };
    current.len() == new.len()
        && new.iter().all(|n| {
            find_condition(current, &n.r#type).is_some_and(|c| same(c, n))
        })
}

/// Conditions stored on an Ingress. A missing or unreadable annotation is an
/// empty list; the next write replaces it.
#[must_use]
pub fn read_conditions(ingress: &Ingress) -> Vec<Condition> {
    let Some(raw) = ingress.annotations().get(LB_STATUS) else {
        return Vec::new();
    };
    serde_json::from_str(raw).unwrap_or_else(|e| {
        warn!(
            ingress = %IngressRef::from_ingress(ingress),
            error = %e,
            "Ignoring unreadable status annotation"
        );
        Vec::new()
    })
}

/// Status entry for one load balancer address: `ip` when it parses as an IP
/// address, `hostname` otherwise.
#[must_use]
pub fn load_balancer_ingress(address: &str) -> IngressLoadBalancerIngress {
    if address.parse::<IpAddr>().is_ok() {
        IngressLoadBalancerIngress {
            ip: Some(address.to_string()),
            ..IngressLoadBalancerIngress::default()
        }
    } else {
        IngressLoadBalancerIngress {
            hostname: Some(address.to_string()),
            ..IngressLoadBalancerIngress::default()
        }
    }
}

/// Status changes to persist for one Ingress. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngressStatusPatch {
    /// New value of the status annotation
    pub conditions: Option<Vec<Condition>>,
    /// New value of `status.loadBalancer.ingress`
    pub load_balancer: Option<Vec<IngressLoadBalancerIngress>>,
}

impl IngressStatusPatch {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.conditions.is_none() && self.load_balancer.is_none()
    }
}

/// Collects the status changes of one reconcile and emits a single patch.
pub struct IngressStatusUpdater {
    current_conditions: Vec<Condition>,
    new_conditions: Vec<Condition>,
    current_addresses: Vec<IngressLoadBalancerIngress>,
    new_addresses: Option<Vec<IngressLoadBalancerIngress>>,
}

impl IngressStatusUpdater {
    #[must_use]
    pub fn new(ingress: &Ingress) -> Self {
        let current_conditions = read_conditions(ingress);
        let current_addresses = ingress
            .status
            .as_ref()
            .and_then(|s| s.load_balancer.as_ref())
            .and_then(|lb| lb.ingress.clone())
            .unwrap_or_default();

        Self {
            new_conditions: current_conditions.clone(),
            current_conditions,
            current_addresses,
            new_addresses: None,
        }
    }

    pub fn set_condition(
        &mut self,
        condition_type: &str,
        status: &str,
        reason: &str,
        message: &str,
    ) {
        upsert_condition(
            &mut self.new_conditions,
            condition_type,
            status,
            reason,
            message,
        );
    }

    /// Publish `addresses` in `status.loadBalancer.ingress`.
    pub fn set_addresses(&mut self, addresses: &[String]) {
        self.new_addresses = Some(addresses.iter().map(|a| load_balancer_ingress(a)).collect());
    }

    #[must_use]
    pub fn conditions(&self) -> &[Condition] {
        &self.new_conditions
    }

    #[must_use]
    pub fn has_changes(&self) -> bool {
        !self.patch().is_empty()
    }

    /// The minimal patch: only the parts that changed.
    #[must_use]
    pub fn patch(&self) -> IngressStatusPatch {
        let conditions = (!conditions_equal(&self.current_conditions, &self.new_conditions))
            .then(|| self.new_conditions.clone());
        let load_balancer = self
            .new_addresses
            .as_ref()
            .filter(|new| **new != self.current_addresses)
            .cloned();
        IngressStatusPatch {
            conditions,
            load_balancer,
        }
    }
}

#[cfg(test)]
#[path = "status_tests.rs"]
mod status_tests;
