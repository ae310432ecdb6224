// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Value types shared by the builder, the load balancer adapter and the reconciler.
//!
//! Everything here is plain data. Maps are `BTreeMap` and sets are `BTreeSet` so
//! that two values built from the same inputs compare (and serialize) identically.

use crate::annotations::OWNERSHIP_TAG_KEY;
use k8s_openapi::api::core::v1::Node;
use k8s_openapi::api::networking::v1::Ingress;
use kube::ResourceExt;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Identity of an Ingress object: namespace plus name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct IngressRef {
    pub namespace: String,
    pub name: String,
}

impl IngressRef {
    #[must_use]
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Key of an Ingress object. Cluster-scoped objects never reach here, so a
    /// missing namespace is read as empty.
    #[must_use]
    pub fn from_ingress(ingress: &Ingress) -> Self {
        Self::new(ingress.namespace().unwrap_or_default(), ingress.name_any())
    }
}

impl fmt::Display for IngressRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// A cluster worker as seen by the backend builder.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeInfo {
    pub name: String,
    /// `InternalIP` from `status.addresses`; `None` is a configuration fault
    pub address: Option<String>,
    pub schedulable: bool,
    pub ready: bool,
}

impl NodeInfo {
    /// Extract the routing-relevant facts from a Node object.
    #[must_use]
    pub fn from_node(node: &Node) -> Self {
        let status = node.status.as_ref();

        let address = status
            .and_then(|s| s.addresses.as_ref())
            .and_then(|addrs| addrs.iter().find(|a| a.type_ == "InternalIP"))
            .map(|a| a.address.clone())
            .filter(|a| !a.is_empty());

        let ready = status
            .and_then(|s| s.conditions.as_ref())
            .and_then(|conds| conds.iter().find(|c| c.type_ == "Ready"))
            .is_some_and(|c| c.status == "True");

        let schedulable = !node
            .spec
            .as_ref()
            .and_then(|s| s.unschedulable)
            .unwrap_or(false);

        Self {
            name: node.name_any(),
            address,
            schedulable,
            ready,
        }
    }

    /// Whether this node may receive traffic from the load balancer.
    #[must_use]
    pub fn is_routable(&self) -> bool {
        self.schedulable && self.ready && self.address.as_deref().is_some_and(|a| !a.is_empty())
    }
}

/// Public or private load balancer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Visibility {
    #[default]
    Public,
    Private,
}

impl Visibility {
    #[must_use]
    pub fn is_private(self) -> bool {
        matches!(self, Self::Private)
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Public => f.write_str("public"),
            Self::Private => f.write_str("private"),
        }
    }
}

/// Port of a Service as referenced from an Ingress backend.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ServicePortRef {
    Number(u16),
    Name(String),
}

impl fmt::Display for ServicePortRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Name(name) => f.write_str(name),
        }
    }
}

/// A Service backend referenced by an Ingress (default backend or rule path).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ServiceBackend {
    pub service: String,
    pub port: ServicePortRef,
}

/// Resolved NodePorts for the Service backends of one Ingress.
pub type ServicePorts = BTreeMap<ServiceBackend, u16>;

/// A single load balancer target.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Backend {
    pub address: String,
    pub port: u16,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.address, self.port)
    }
}

/// Health check settings applied to every backend set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HealthCheck {
    pub protocol: String,
    pub port: u16,
    pub url_path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendSetSpec {
    pub policy: String,
    pub health_check: HealthCheck,
    pub backends: BTreeSet<Backend>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenerSpec {
    pub port: u16,
    pub protocol: String,
    pub default_backend_set: String,
    pub path_route_set: Option<String>,
    pub certificate: Option<String>,
}

/// How a path route compares the request path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatchType {
    Exact,
    Prefix,
}

impl MatchType {
    /// Provider wire value.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Exact => "EXACT_MATCH",
            Self::Prefix => "PREFIX_MATCH",
        }
    }

    /// Parse a provider wire value. Unknown values fall back to prefix matching.
    #[must_use]
    pub fn from_provider(value: &str) -> Self {
        if value == "EXACT_MATCH" {
            Self::Exact
        } else {
            Self::Prefix
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PathRoute {
    pub path: String,
    pub match_type: MatchType,
    pub backend_set: String,
}

/// TLS certificate referenced by an Ingress; the material lives in a Secret.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CertificateRef {
    pub secret_name: String,
}

/// Deterministic marker identifying the Ingress that owns a load balancer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OwnershipTag {
    value: String,
}

impl OwnershipTag {
    #[must_use]
    pub fn new(cluster_name: &str, ingress: &IngressRef) -> Self {
        Self {
            value: format!("{cluster_name}/{}/{}", ingress.namespace, ingress.name),
        }
    }

    #[must_use]
    pub fn key(&self) -> &'static str {
        OWNERSHIP_TAG_KEY
    }

    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }
}

impl fmt::Display for OwnershipTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", OWNERSHIP_TAG_KEY, self.value)
    }
}

/// Desired state of the load balancer for one Ingress. Derived every reconcile,
/// never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadBalancerSpec {
    pub name: String,
    pub shape: String,
    pub visibility: Visibility,
    pub compartment: String,
    pub subnets: Vec<String>,
    pub listeners: BTreeMap<String, ListenerSpec>,
    pub backend_sets: BTreeMap<String, BackendSetSpec>,
    pub path_route_sets: BTreeMap<String, Vec<PathRoute>>,
    pub certificates: BTreeMap<String, CertificateRef>,
    pub tags: BTreeMap<String, String>,
}

impl LoadBalancerSpec {
    /// The ownership tag value carried in `tags`.
    #[must_use]
    pub fn ownership_value(&self) -> Option<&str> {
        self.tags.get(OWNERSHIP_TAG_KEY).map(String::as_str)
    }
}

/// Provider lifecycle state of a load balancer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProvisioningState {
    Provisioning,
    Active,
    Failed,
    Deleting,
}

impl ProvisioningState {
    /// Map an OCI `lifecycleState`. Unknown states are read as still provisioning.
    #[must_use]
    pub fn from_provider(value: &str) -> Self {
        match value {
            "ACTIVE" => Self::Active,
            "FAILED" => Self::Failed,
            "DELETING" | "DELETED" => Self::Deleting,
            _ => Self::Provisioning,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Provisioning => "PROVISIONING",
            Self::Active => "ACTIVE",
            Self::Failed => "FAILED",
            Self::Deleting => "DELETING",
        }
    }
}

impl fmt::Display for ProvisioningState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Load balancer state as last reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedLoadBalancer {
    pub id: String,
    pub display_name: String,
    pub compartment: String,
    pub state: ProvisioningState,
    pub addresses: Vec<String>,
    pub shape: String,
    pub is_private: bool,
    pub subnets: Vec<String>,
    pub listeners: BTreeMap<String, ListenerSpec>,
    pub backend_sets: BTreeMap<String, BackendSetSpec>,
    pub path_route_sets: BTreeMap<String, Vec<PathRoute>>,
    pub certificates: BTreeSet<String>,
    pub tags: BTreeMap<String, String>,
}

/// PEM material read from a TLS secret.
#[derive(Clone, PartialEq, Eq)]
pub struct CertificateBundle {
    pub public_certificate: String,
    pub private_key: String,
    pub ca_certificate: Option<String>,
}

impl fmt::Debug for CertificateBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CertificateBundle")
            .field("public_certificate_len", &self.public_certificate.len())
            .field("private_key", &"<redacted>")
            .field("ca_certificate", &self.ca_certificate.is_some())
            .finish()
    }
}

/// Certificate material keyed by certificate name.
pub type CertificateBundles = BTreeMap<String, CertificateBundle>;

/// Handle of an asynchronous provider mutation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkRequestId(pub String);

impl fmt::Display for WorkRequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Standard Kubernetes-style condition, stored JSON-encoded in the
/// `oci-load-balancer-status` annotation because Ingress status has no
/// conditions field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition; this controller only writes `Ready`.
    pub r#type: String,

    /// Status of the condition: True, False, or Unknown.
    pub status: String,

    /// Brief CamelCase reason for the condition's last transition.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Human-readable message indicating details about the transition.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Last time the condition transitioned from one status to another (RFC3339 format).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,
}
