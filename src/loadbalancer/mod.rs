// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Cloud load balancer adapter.
//!
//! - [`LoadBalancerApi`] - capability trait over the provider API
//! - [`plan`] - pure diff from observed to desired state
//! - [`adapter`] - find/create/update/delete convergence with retries and deadlines
//! - [`oci`] - OCI Load Balancing REST implementation of [`LoadBalancerApi`]

pub mod adapter;
pub mod oci;
pub mod plan;

#[cfg(test)]
pub mod fake;

use crate::errors::ApiError;
use crate::model::{
    Backend, BackendSetSpec, CertificateBundle, CertificateBundles, ListenerSpec,
    LoadBalancerSpec, ObservedLoadBalancer, PathRoute, WorkRequestId,
};
use async_trait::async_trait;
use std::collections::BTreeMap;

pub use adapter::{AdapterSettings, ConvergeAction, Convergence, LoadBalancerAdapter};

/// Everything needed to create a load balancer in one call.
#[derive(Debug, Clone)]
pub struct CreateLoadBalancer {
    pub spec: LoadBalancerSpec,
    /// Material for every certificate in `spec.certificates`
    pub certificates: CertificateBundles,
    /// Idempotency key; a replayed create with the same token is not duplicated
    pub retry_token: String,
}

/// One incremental mutation of an existing load balancer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeOp {
    UpdateShape {
        shape: String,
    },
    CreateCertificate {
        name: String,
        bundle: CertificateBundle,
    },
    CreateBackendSet {
        name: String,
        spec: BackendSetSpec,
    },
    /// Replace policy, health check and the full backend list
    UpdateBackendSet {
        name: String,
        spec: BackendSetSpec,
    },
    AddBackend {
        backend_set: String,
        backend: Backend,
    },
    RemoveBackend {
        backend_set: String,
        backend: Backend,
    },
    CreatePathRouteSet {
        name: String,
        routes: Vec<PathRoute>,
    },
    UpdatePathRouteSet {
        name: String,
        routes: Vec<PathRoute>,
    },
    CreateListener {
        name: String,
        spec: ListenerSpec,
    },
    UpdateListener {
        name: String,
        spec: ListenerSpec,
    },
    DeleteListener {
        name: String,
    },
    DeletePathRouteSet {
        name: String,
    },
    DeleteBackendSet {
        name: String,
    },
    DeleteCertificate {
        name: String,
    },
    UpdateTags {
        tags: BTreeMap<String, String>,
    },
}

impl ChangeOp {
    /// Operation name for logs and metrics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UpdateShape { .. } => "update_shape",
            Self::CreateCertificate { .. } => "create_certificate",
            Self::CreateBackendSet { .. } => "create_backend_set",
            Self::UpdateBackendSet { .. } => "update_backend_set",
            Self::AddBackend { .. } => "add_backend",
            Self::RemoveBackend { .. } => "remove_backend",
            Self::CreatePathRouteSet { .. } => "create_path_route_set",
            Self::UpdatePathRouteSet { .. } => "update_path_route_set",
            Self::CreateListener { .. } => "create_listener",
            Self::UpdateListener { .. } => "update_listener",
            Self::DeleteListener { .. } => "delete_listener",
            Self::DeletePathRouteSet { .. } => "delete_path_route_set",
            Self::DeleteBackendSet { .. } => "delete_backend_set",
            Self::DeleteCertificate { .. } => "delete_certificate",
            Self::UpdateTags { .. } => "update_tags",
        }
    }
}

/// Provider-side progress of an asynchronous mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkRequestStatus {
    InProgress,
    Succeeded,
    Failed(String),
}

/// Capability interface over the cloud load balancer API.
///
/// Mutations are asynchronous on the provider side and return a work request
/// handle. Implementations return `Ok(None)` from lookups when nothing matches
/// rather than a `NotFound` error.
#[async_trait]
pub trait LoadBalancerApi: Send + Sync {
    /// Find the load balancer in `compartment` whose ownership tag equals `owner`.
    /// Load balancers already `DELETED` are ignored.
    async fn find(
        &self,
        compartment: &str,
        owner: &str,
    ) -> Result<Option<ObservedLoadBalancer>, ApiError>;

    /// Read a load balancer by id.
    async fn get(&self, id: &str) -> Result<Option<ObservedLoadBalancer>, ApiError>;

    async fn create(&self, request: &CreateLoadBalancer) -> Result<WorkRequestId, ApiError>;

    async fn update(&self, id: &str, op: &ChangeOp) -> Result<WorkRequestId, ApiError>;

    async fn delete(&self, id: &str) -> Result<WorkRequestId, ApiError>;

    async fn work_request_status(
        &self,
        id: &WorkRequestId,
    ) -> Result<WorkRequestStatus, ApiError>;
}
