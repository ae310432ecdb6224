// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Desired-state builder: Ingress + nodes + configuration to `LoadBalancerSpec`.
//!
//! [`build`] is pure and total. It performs no I/O and no logging, and it never
//! fails: missing or malformed annotations fall back to the configured defaults.
//! Identical inputs always produce equal specs, which is what makes the adapter's
//! diff (and therefore idempotent re-application) work.
//!
//! # Annotations
//!
//! | Key | Effect | Default |
//! |-----|--------|---------|
//! | `ingress.beta.kubernetes.io/oci-load-balancer-visibility` | `private` selects a private load balancer | public |
//! | `ingress.beta.kubernetes.io/oci-load-balancer-shape` | one of `100Mbps`, `400Mbps`, `8000Mbps` | `loadBalancer.defaultShape` |
//! | `ingress.beta.kubernetes.io/oci-load-balancer-compartment` | compartment OCID override | `loadBalancer.compartment` |
//!
//! # Example
//!
//! ```rust,ignore
//! use oci_ingress::builder::build;
//!
//! let spec = build(&config, &ingress, &index.snapshot(), &service_ports);
//! assert!(spec.tags.contains_key("oci-ingress-owner"));
//! ```

use crate::annotations::{
    INGRESS_CLASS, LB_COMPARTMENT, LB_SHAPE, LB_VISIBILITY, VISIBILITY_PRIVATE, VISIBILITY_PUBLIC,
};
use crate::config::{is_compartment_ocid, ControllerConfig};
use crate::constants::{
    AVAILABLE_SHAPES, HTTPS_LISTENER_NAME, HTTP_LISTENER_NAME, LISTENER_PROTOCOL,
    MAX_BACKEND_SET_NAME_LEN, PATH_ROUTE_SET_NAME,
};
use crate::model::{
    Backend, BackendSetSpec, CertificateRef, HealthCheck, IngressRef, ListenerSpec,
    LoadBalancerSpec, MatchType, NodeInfo, OwnershipTag, PathRoute, ServiceBackend,
    ServicePortRef, ServicePorts, Visibility,
};
use k8s_openapi::api::networking::v1::{Ingress, IngressBackend};
use kube::ResourceExt;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};

/// Derive the desired load balancer for `ingress`.
///
/// `nodes` is usually a snapshot of the node index; only schedulable, ready nodes
/// with an address become backends. `service_ports` maps each Service backend to
/// its NodePort; a backend without an entry falls back to its numeric service
/// port, and a named port without an entry yields an empty backend set.
#[must_use]
pub fn build(
    config: &ControllerConfig,
    ingress: &Ingress,
    nodes: &[NodeInfo],
    service_ports: &ServicePorts,
) -> LoadBalancerSpec {
    let lb_config = &config.load_balancer;
    let key = IngressRef::from_ingress(ingress);
    let annotations = ingress.annotations();

    let shape = annotations
        .get(LB_SHAPE)
        .map(|s| s.trim())
        .filter(|s| AVAILABLE_SHAPES.contains(s))
        .map_or_else(|| lb_config.default_shape.clone(), str::to_string);

    let visibility = annotations
        .get(LB_VISIBILITY)
        .and_then(|v| parse_visibility(v))
        .unwrap_or_default();

    let compartment = annotations
        .get(LB_COMPARTMENT)
        .map(|c| c.trim())
        .filter(|c| is_compartment_ocid(c))
        .map_or_else(|| lb_config.compartment.clone(), str::to_string);

    let mut subnets: Vec<String> = Vec::with_capacity(lb_config.subnets.len());
    for subnet in &lb_config.subnets {
        if !subnets.contains(subnet) {
            subnets.push(subnet.clone());
        }
    }

    let targets: BTreeSet<&str> = nodes
        .iter()
        .filter(|n| n.is_routable())
        .filter_map(|n| n.address.as_deref())
        .collect();

    let health_check = HealthCheck::from(&lb_config.health_check);
    let mut backend_sets = BTreeMap::new();
    let mut add_backend_set = |backend: &ServiceBackend| -> String {
        let name = backend_set_name(backend);
        backend_sets.entry(name.clone()).or_insert_with(|| {
            let port = service_ports
                .get(backend)
                .copied()
                .or(match backend.port {
                    ServicePortRef::Number(n) => Some(n),
                    ServicePortRef::Name(_) => None,
                });
            let backends = port.map_or_else(BTreeSet::new, |port| {
                targets
                    .iter()
                    .map(|address| Backend {
                        address: (*address).to_string(),
                        port,
                    })
                    .collect()
            });
            BackendSetSpec {
                policy: lb_config.policy.clone(),
                health_check: health_check.clone(),
                backends,
            }
        });
        name
    };

    let spec = ingress.spec.as_ref();

    let default_set = spec
        .and_then(|s| s.default_backend.as_ref())
        .and_then(service_backend)
        .map(|b| add_backend_set(&b));

    let mut routes = Vec::new();
    for rule in spec.and_then(|s| s.rules.as_ref()).into_iter().flatten() {
        let Some(http) = rule.http.as_ref() else {
            continue;
        };
        for path in &http.paths {
            let Some(backend) = service_backend(&path.backend) else {
                continue;
            };
            let backend_set = add_backend_set(&backend);
            let match_type = if path.path_type == "Exact" {
                MatchType::Exact
            } else {
                MatchType::Prefix
            };
            routes.push(PathRoute {
                path: path
                    .path
                    .clone()
                    .filter(|p| !p.is_empty())
                    .unwrap_or_else(|| "/".to_string()),
                match_type,
                backend_set,
            });
        }
    }

    let mut certificates = BTreeMap::new();
    let mut first_certificate = None;
    for tls in spec.and_then(|s| s.tls.as_ref()).into_iter().flatten() {
        let Some(secret_name) = tls.secret_name.as_ref().filter(|s| !s.is_empty()) else {
            continue;
        };
        first_certificate.get_or_insert_with(|| secret_name.clone());
        certificates
            .entry(secret_name.clone())
            .or_insert_with(|| CertificateRef {
                secret_name: secret_name.clone(),
            });
    }

    let mut path_route_sets = BTreeMap::new();
    let route_set = if routes.is_empty() {
        None
    } else {
        path_route_sets.insert(PATH_ROUTE_SET_NAME.to_string(), routes.clone());
        Some(PATH_ROUTE_SET_NAME.to_string())
    };

    let mut listeners = BTreeMap::new();
    if let Some(default_backend_set) =
        default_set.or_else(|| routes.first().map(|r| r.backend_set.clone()))
    {
        listeners.insert(
            HTTP_LISTENER_NAME.to_string(),
            ListenerSpec {
                port: lb_config.http_port,
                protocol: LISTENER_PROTOCOL.to_string(),
                default_backend_set: default_backend_set.clone(),
                path_route_set: route_set.clone(),
                certificate: None,
            },
        );
        if first_certificate.is_some() {
            listeners.insert(
                HTTPS_LISTENER_NAME.to_string(),
                ListenerSpec {
                    port: lb_config.https_port,
                    protocol: LISTENER_PROTOCOL.to_string(),
                    default_backend_set,
                    path_route_set: route_set,
                    certificate: first_certificate,
                },
            );
        }
    }

    let owner = OwnershipTag::new(&config.cluster_name, &key);
    let mut tags = lb_config.tags.clone();
    tags.insert(owner.key().to_string(), owner.value().to_string());

    LoadBalancerSpec {
        name: format!("{}-{}-{}", lb_config.name_prefix, key.namespace, key.name),
        shape,
        visibility,
        compartment,
        subnets,
        listeners,
        backend_sets,
        path_route_sets,
        certificates,
        tags,
    }
}

/// Every Service backend the Ingress references, default backend first, then
/// rule paths in declaration order, without duplicates.
#[must_use]
pub fn service_backends(ingress: &Ingress) -> Vec<ServiceBackend> {
    let mut backends = Vec::new();
    let Some(spec) = ingress.spec.as_ref() else {
        return backends;
    };

    let from_paths = spec
        .rules
        .iter()
        .flatten()
        .filter_map(|rule| rule.http.as_ref())
        .flat_map(|http| http.paths.iter())
        .map(|path| &path.backend);

    for backend in spec.default_backend.iter().chain(from_paths) {
        if let Some(b) = service_backend(backend) {
            if !backends.contains(&b) {
                backends.push(b);
            }
        }
    }
    backends
}

/// TLS secret names referenced by the Ingress, in declaration order.
#[must_use]
pub fn tls_secret_names(ingress: &Ingress) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for tls in ingress
        .spec
        .as_ref()
        .and_then(|s| s.tls.as_ref())
        .into_iter()
        .flatten()
    {
        if let Some(name) = tls.secret_name.as_ref().filter(|s| !s.is_empty()) {
            if !names.contains(name) {
                names.push(name.clone());
            }
        }
    }
    names
}

/// Schedulable nodes that have no internal address. These are a configuration
/// fault; callers log them since the builder cannot.
#[must_use]
pub fn unaddressed_nodes(nodes: &[NodeInfo]) -> Vec<&NodeInfo> {
    nodes
        .iter()
        .filter(|n| n.schedulable && n.address.is_none())
        .collect()
}

/// Whether the Ingress belongs to this controller's ingress class.
#[must_use]
pub fn is_managed_class(config: &ControllerConfig, ingress: &Ingress) -> bool {
    let class = ingress
        .spec
        .as_ref()
        .and_then(|s| s.ingress_class_name.clone())
        .or_else(|| ingress.annotations().get(INGRESS_CLASS).cloned());

    match class {
        Some(class) => class == config.ingress_class.name,
        None => config.ingress_class.manage_unclassed,
    }
}

/// Compartment the Ingress asks for, if its annotation is a valid OCID.
#[must_use]
pub fn compartment_override(ingress: &Ingress) -> Option<String> {
    ingress
        .annotations()
        .get(LB_COMPARTMENT)
        .map(|c| c.trim().to_string())
        .filter(|c| is_compartment_ocid(c))
}

fn parse_visibility(value: &str) -> Option<Visibility> {
    let value = value.trim();
    if value.eq_ignore_ascii_case(VISIBILITY_PRIVATE) {
        Some(Visibility::Private)
    } else if value.eq_ignore_ascii_case(VISIBILITY_PUBLIC) {
        Some(Visibility::Public)
    } else {
        None
    }
}

fn service_backend(backend: &IngressBackend) -> Option<ServiceBackend> {
    let service = backend.service.as_ref()?;
    let port = service.port.as_ref()?;
    let port = match (port.number, port.name.as_ref()) {
        (Some(n), _) => ServicePortRef::Number(u16::try_from(n).ok()?),
        (None, Some(name)) if !name.is_empty() => ServicePortRef::Name(name.clone()),
        _ => return None,
    };
    Some(ServiceBackend {
        service: service.name.clone(),
        port,
    })
}

/// Stable backend set name for a Service backend.
///
/// A Service with a numeric port maps to `<service>-<port>` when that is already
/// within `[A-Za-z0-9_-]` and the provider length limit. Named ports, sanitized
/// names and long names end with a short SHA-256 of the exact backend instead,
/// so `web-http` on port 80 and `web` on port `http-80` stay apart.
#[must_use]
pub fn backend_set_name(backend: &ServiceBackend) -> String {
    let raw = format!("{}-{}", backend.service, backend.port);
    let sanitized: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();

    let plain = matches!(backend.port, ServicePortRef::Number(_))
        && sanitized == raw
        && sanitized.len() <= MAX_BACKEND_SET_NAME_LEN;
    if plain {
        return sanitized;
    }

    let identity = match &backend.port {
        ServicePortRef::Number(n) => format!("{}\0number:{n}", backend.service),
        ServicePortRef::Name(name) => format!("{}\0name:{name}", backend.service),
    };
    let digest = format!("{:x}", Sha256::digest(identity.as_bytes()));
    let keep = sanitized.len().min(MAX_BACKEND_SET_NAME_LEN - 9);
    format!("{}-{}", &sanitized[..keep], &digest[..8])
}

#[cfg(test)]
#[path = "builder_tests.rs"]
mod builder_tests;
