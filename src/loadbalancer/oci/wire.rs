// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! JSON bodies of the OCI Load Balancing API (version `20170115`).

use crate::model::{
    Backend, BackendSetSpec, CertificateBundle, HealthCheck, ListenerSpec, LoadBalancerSpec,
    MatchType, ObservedLoadBalancer, PathRoute, ProvisioningState,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

// ============================================================================
// Responses
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadBalancer {
    pub id: String,
    pub compartment_id: String,
    pub display_name: String,
    pub lifecycle_state: String,
    #[serde(default)]
    pub ip_addresses: Vec<IpAddress>,
    pub shape_name: String,
    #[serde(default)]
    pub is_private: bool,
    #[serde(default)]
    pub subnet_ids: Vec<String>,
    #[serde(default)]
    pub listeners: BTreeMap<String, Listener>,
    #[serde(default)]
    pub backend_sets: BTreeMap<String, BackendSet>,
    #[serde(default)]
    pub path_route_sets: BTreeMap<String, PathRouteSet>,
    #[serde(default)]
    pub certificates: BTreeMap<String, Certificate>,
    #[serde(default)]
    pub freeform_tags: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IpAddress {
    pub ip_address: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Listener {
    pub default_backend_set_name: String,
    pub port: u16,
    pub protocol: String,
    #[serde(default)]
    pub path_route_set_name: Option<String>,
    #[serde(default)]
    pub ssl_configuration: Option<SslConfiguration>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendSet {
    pub policy: String,
    #[serde(default)]
    pub backends: Vec<BackendDetails>,
    pub health_checker: HealthChecker,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathRouteSet {
    #[serde(default)]
    pub path_routes: Vec<PathRouteDetails>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Certificate {
    pub certificate_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkRequest {
    pub lifecycle_state: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error_details: Vec<WorkRequestError>,
}

#[derive(Debug, Deserialize)]
pub struct WorkRequestError {
    pub message: String,
}

/// Error body returned with every non-2xx response.
#[derive(Debug, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

// ============================================================================
// Shared between requests and responses
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SslConfiguration {
    pub certificate_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendDetails {
    pub ip_address: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthChecker {
    pub protocol: String,
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathRouteDetails {
    pub path: String,
    pub path_match_type: PathMatchType,
    pub backend_set_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathMatchType {
    pub match_type: String,
}

// ============================================================================
// Requests
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateLoadBalancerDetails {
    pub compartment_id: String,
    pub display_name: String,
    pub shape_name: String,
    pub is_private: bool,
    pub subnet_ids: Vec<String>,
    pub listeners: BTreeMap<String, ListenerDetails>,
    pub backend_sets: BTreeMap<String, BackendSetDetails>,
    pub path_route_sets: BTreeMap<String, PathRouteSetDetails>,
    pub certificates: BTreeMap<String, CertificateDetails>,
    pub freeform_tags: BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListenerDetails {
    /// Required when creating a listener on its own, absent inside a create
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub default_backend_set_name: String,
    pub port: u16,
    pub protocol: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path_route_set_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssl_configuration: Option<SslConfiguration>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendSetDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub policy: String,
    pub backends: Vec<BackendDetails>,
    pub health_checker: HealthChecker,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PathRouteSetDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub path_routes: Vec<PathRouteDetails>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateDetails {
    pub certificate_name: String,
    pub public_certificate: String,
    pub private_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ca_certificate: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateShapeDetails {
    pub shape_name: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateLoadBalancerDetails {
    pub freeform_tags: BTreeMap<String, String>,
}

// ============================================================================
// Conversions
// ============================================================================

impl From<&Backend> for BackendDetails {
    fn from(backend: &Backend) -> Self {
        Self {
            ip_address: backend.address.clone(),
            port: backend.port,
        }
    }
}

impl From<&HealthCheck> for HealthChecker {
    fn from(check: &HealthCheck) -> Self {
        Self {
            protocol: check.protocol.clone(),
            port: check.port,
            url_path: Some(check.url_path.clone()),
        }
    }
}

impl From<&PathRoute> for PathRouteDetails {
    fn from(route: &PathRoute) -> Self {
        Self {
            path: route.path.clone(),
            path_match_type: PathMatchType {
                match_type: route.match_type.as_str().to_string(),
            },
            backend_set_name: route.backend_set.clone(),
        }
    }
}

impl ListenerDetails {
    pub fn from_spec(name: Option<&str>, spec: &ListenerSpec) -> Self {
        Self {
            name: name.map(str::to_string),
            default_backend_set_name: spec.default_backend_set.clone(),
            port: spec.port,
            protocol: spec.protocol.clone(),
            path_route_set_name: spec.path_route_set.clone(),
            ssl_configuration: spec.certificate.as_ref().map(|c| SslConfiguration {
                certificate_name: c.clone(),
            }),
        }
    }
}

impl BackendSetDetails {
    pub fn from_spec(name: Option<&str>, spec: &BackendSetSpec) -> Self {
        Self {
            name: name.map(str::to_string),
            policy: spec.policy.clone(),
            backends: spec.backends.iter().map(BackendDetails::from).collect(),
            health_checker: HealthChecker::from(&spec.health_check),
        }
    }
}

impl PathRouteSetDetails {
    pub fn from_routes(name: Option<&str>, routes: &[PathRoute]) -> Self {
        Self {
            name: name.map(str::to_string),
            path_routes: routes.iter().map(PathRouteDetails::from).collect(),
        }
    }
}

impl CertificateDetails {
    pub fn from_bundle(name: &str, bundle: &CertificateBundle) -> Self {
        Self {
            certificate_name: name.to_string(),
            public_certificate: bundle.public_certificate.clone(),
            private_key: bundle.private_key.clone(),
            ca_certificate: bundle.ca_certificate.clone(),
        }
    }
}

impl CreateLoadBalancerDetails {
    pub fn from_spec(
        spec: &LoadBalancerSpec,
        certificates: &BTreeMap<String, CertificateBundle>,
    ) -> Self {
        Self {
            compartment_id: spec.compartment.clone(),
            display_name: spec.name.clone(),
            shape_name: spec.shape.clone(),
            is_private: spec.visibility.is_private(),
            subnet_ids: spec.subnets.clone(),
            listeners: spec
                .listeners
                .iter()
                .map(|(name, l)| (name.clone(), ListenerDetails::from_spec(None, l)))
                .collect(),
            backend_sets: spec
                .backend_sets
                .iter()
                .map(|(name, b)| (name.clone(), BackendSetDetails::from_spec(None, b)))
                .collect(),
            path_route_sets: spec
                .path_route_sets
                .iter()
                .map(|(name, r)| (name.clone(), PathRouteSetDetails::from_routes(None, r)))
                .collect(),
            certificates: certificates
                .iter()
                .map(|(name, b)| (name.clone(), CertificateDetails::from_bundle(name, b)))
                .collect(),
            freeform_tags: spec.tags.clone(),
        }
    }
}

impl LoadBalancer {
    /// Convert to the provider-neutral observed model.
    pub fn into_observed(self) -> ObservedLoadBalancer {
        ObservedLoadBalancer {
            id: self.id,
            display_name: self.display_name,
            compartment: self.compartment_id,
            state: ProvisioningState::from_provider(&self.lifecycle_state),
            addresses: self
                .ip_addresses
                .into_iter()
                .map(|ip| ip.ip_address)
                .collect(),
            shape: self.shape_name,
            is_private: self.is_private,
            subnets: self.subnet_ids,
            listeners: self
                .listeners
                .into_iter()
                .map(|(name, l)| {
                    let spec = ListenerSpec {
                        port: l.port,
                        protocol: l.protocol,
                        default_backend_set: l.default_backend_set_name,
                        path_route_set: l.path_route_set_name,
                        certificate: l.ssl_configuration.map(|s| s.certificate_name),
                    };
                    (name, spec)
                })
                .collect(),
            backend_sets: self
                .backend_sets
                .into_iter()
                .map(|(name, b)| {
                    let spec = BackendSetSpec {
                        policy: b.policy,
                        health_check: HealthCheck {
                            protocol: b.health_checker.protocol,
                            port: b.health_checker.port,
                            url_path: b.health_checker.url_path.unwrap_or_default(),
                        },
                        backends: b
                            .backends
                            .into_iter()
                            .map(|d| Backend {
                                address: d.ip_address,
                                port: d.port,
                            })
                            .collect::<BTreeSet<_>>(),
                    };
                    (name, spec)
                })
                .collect(),
            path_route_sets: self
                .path_route_sets
                .into_iter()
                .map(|(name, set)| {
                    let routes = set
                        .path_routes
                        .into_iter()
                        .map(|r| PathRoute {
                            path: r.path,
                            match_type: MatchType::from_provider(&r.path_match_type.match_type),
                            backend_set: r.backend_set_name,
                        })
                        .collect();
                    (name, routes)
                })
                .collect(),
            certificates: self
                .certificates
                .into_values()
                .map(|c| c.certificate_name)
                .collect(),
            tags: self.freeform_tags,
        }
    }
}
