// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! In-memory `LoadBalancerApi` for tests.
//!
//! Records every mutating call, applies `ChangeOp`s to its stored state, and can
//! be scripted to fail specific calls.

use super::{ChangeOp, CreateLoadBalancer, LoadBalancerApi, WorkRequestStatus};
use crate::annotations::OWNERSHIP_TAG_KEY;
use crate::errors::ApiError;
use crate::model::{
    Backend, BackendSetSpec, HealthCheck, ListenerSpec, LoadBalancerSpec, MatchType,
    ObservedLoadBalancer, PathRoute, ProvisioningState, Visibility, WorkRequestId,
};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Mutex;

/// Address handed out to every fake load balancer.
pub const FAKE_ADDRESS: &str = "203.0.113.10";

#[derive(Default)]
struct FakeState {
    load_balancers: BTreeMap<String, ObservedLoadBalancer>,
    mutations: Vec<String>,
    failures: BTreeMap<&'static str, VecDeque<ApiError>>,
    /// Errors returned by `create` after the load balancer was stored
    failures_after_create: VecDeque<ApiError>,
    retry_tokens: BTreeMap<String, String>,
    next_id: u64,
    lookups: usize,
    /// Scripted answers for `work_request_status`; `Succeeded` once drained
    work_requests: VecDeque<WorkRequestStatus>,
}

#[derive(Default)]
pub struct FakeLoadBalancerApi {
    state: Mutex<FakeState>,
}

impl FakeLoadBalancerApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of mutating calls (create, update, delete) received.
    pub fn mutation_count(&self) -> usize {
        self.state.lock().unwrap().mutations.len()
    }

    /// Kinds of the mutating calls received, in order.
    pub fn mutations(&self) -> Vec<String> {
        self.state.lock().unwrap().mutations.clone()
    }

    pub fn clear_mutations(&self) {
        self.state.lock().unwrap().mutations.clear();
    }

    /// Number of `find` and `get` calls received.
    pub fn lookup_count(&self) -> usize {
        self.state.lock().unwrap().lookups
    }

    /// Fail the next call of `operation` (`find`, `get`, `create`, `update`, `delete`).
    pub fn fail_next(&self, operation: &'static str, err: ApiError) {
        self.state
            .lock()
            .unwrap()
            .failures
            .entry(operation)
            .or_default()
            .push_back(err);
    }

    /// Accept the next create but answer with `err`, as if the response was lost.
    pub fn fail_after_next_create(&self, err: ApiError) {
        self.state
            .lock()
            .unwrap()
            .failures_after_create
            .push_back(err);
    }

    /// Answer the next work request status poll with `status`.
    pub fn script_work_request(&self, status: WorkRequestStatus) {
        self.state.lock().unwrap().work_requests.push_back(status);
    }

    pub fn insert(&self, lb: ObservedLoadBalancer) {
        self.state
            .lock()
            .unwrap()
            .load_balancers
            .insert(lb.id.clone(), lb);
    }

    pub fn set_state(&self, id: &str, state: ProvisioningState) {
        if let Some(lb) = self.state.lock().unwrap().load_balancers.get_mut(id) {
            lb.state = state;
        }
    }

    /// Mark every provisioning load balancer active.
    pub fn activate_all(&self) {
        for lb in self.state.lock().unwrap().load_balancers.values_mut() {
            if lb.state == ProvisioningState::Provisioning {
                lb.state = ProvisioningState::Active;
            }
        }
    }

    pub fn load_balancers(&self) -> Vec<ObservedLoadBalancer> {
        self.state
            .lock()
            .unwrap()
            .load_balancers
            .values()
            .cloned()
            .collect()
    }

    fn take_failure(&self, operation: &'static str) -> Option<ApiError> {
        self.state
            .lock()
            .unwrap()
            .failures
            .get_mut(operation)
            .and_then(VecDeque::pop_front)
    }
}

#[async_trait]
impl LoadBalancerApi for FakeLoadBalancerApi {
    async fn find(
        &self,
        compartment: &str,
        owner: &str,
    ) -> Result<Option<ObservedLoadBalancer>, ApiError> {
        if let Some(err) = self.take_failure("find") {
            return Err(err);
        }
        let mut state = self.state.lock().unwrap();
        state.lookups += 1;
        Ok(state
            .load_balancers
            .values()
            .find(|lb| {
                lb.compartment == compartment
                    && lb.tags.get(OWNERSHIP_TAG_KEY).map(String::as_str) == Some(owner)
            })
            .cloned())
    }

    async fn get(&self, id: &str) -> Result<Option<ObservedLoadBalancer>, ApiError> {
        if let Some(err) = self.take_failure("get") {
            return Err(err);
        }
        let mut state = self.state.lock().unwrap();
        state.lookups += 1;
        Ok(state.load_balancers.get(id).cloned())
    }

    async fn create(&self, request: &CreateLoadBalancer) -> Result<WorkRequestId, ApiError> {
        if let Some(err) = self.take_failure("create") {
            return Err(err);
        }
        let mut state = self.state.lock().unwrap();
        state.mutations.push("create".to_string());

        if let Some(work_request) = state.retry_tokens.get(&request.retry_token) {
            return Ok(WorkRequestId(work_request.clone()));
        }

        state.next_id += 1;
        let id = format!("ocid1.loadbalancer.oc1..fake{}", state.next_id);
        let work_request = format!("ocid1.workrequest.oc1..create{}", state.next_id);
        let lb = observed_from_spec(&id, &request.spec, ProvisioningState::Provisioning);
        state.load_balancers.insert(id, lb);
        state
            .retry_tokens
            .insert(request.retry_token.clone(), work_request.clone());

        if let Some(err) = state.failures_after_create.pop_front() {
            return Err(err);
        }
        Ok(WorkRequestId(work_request))
    }

    async fn update(&self, id: &str, op: &ChangeOp) -> Result<WorkRequestId, ApiError> {
        if let Some(err) = self.take_failure("update") {
            return Err(err);
        }
        let mut state = self.state.lock().unwrap();
        state.mutations.push(op.kind().to_string());
        let lb = state
            .load_balancers
            .get_mut(id)
            .ok_or_else(|| ApiError::Status {
                status: 404,
                code: "NotAuthorizedOrNotFound".to_string(),
                message: format!("load balancer {id} not found"),
            })?;
        apply_op(lb, op);
        Ok(WorkRequestId(format!("ocid1.workrequest.oc1..{}", op.kind())))
    }

    async fn delete(&self, id: &str) -> Result<WorkRequestId, ApiError> {
        if let Some(err) = self.take_failure("delete") {
            return Err(err);
        }
        let mut state = self.state.lock().unwrap();
        state.mutations.push("delete".to_string());
        match state.load_balancers.get_mut(id) {
            Some(lb) => {
                lb.state = ProvisioningState::Deleting;
                Ok(WorkRequestId("ocid1.workrequest.oc1..delete".to_string()))
            }
            None => Err(ApiError::Status {
                status: 404,
                code: "NotAuthorizedOrNotFound".to_string(),
                message: format!("load balancer {id} not found"),
            }),
        }
    }

    async fn work_request_status(
        &self,
        _id: &WorkRequestId,
    ) -> Result<WorkRequestStatus, ApiError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .work_requests
            .pop_front()
            .unwrap_or(WorkRequestStatus::Succeeded))
    }
}

/// The load balancer the provider would report right after creating `spec`.
pub fn observed_from_spec(
    id: &str,
    spec: &LoadBalancerSpec,
    state: ProvisioningState,
) -> ObservedLoadBalancer {
    ObservedLoadBalancer {
        id: id.to_string(),
        display_name: spec.name.clone(),
        compartment: spec.compartment.clone(),
        state,
        addresses: vec![FAKE_ADDRESS.to_string()],
        shape: spec.shape.clone(),
        is_private: spec.visibility.is_private(),
        subnets: spec.subnets.clone(),
        listeners: spec.listeners.clone(),
        backend_sets: spec.backend_sets.clone(),
        path_route_sets: spec.path_route_sets.clone(),
        certificates: spec.certificates.keys().cloned().collect(),
        tags: spec.tags.clone(),
    }
}

/// Apply a change the way the provider would.
pub fn apply_op(lb: &mut ObservedLoadBalancer, op: &ChangeOp) {
    match op {
        ChangeOp::UpdateShape { shape } => lb.shape.clone_from(shape),
        ChangeOp::CreateCertificate { name, .. } => {
            lb.certificates.insert(name.clone());
        }
        ChangeOp::CreateBackendSet { name, spec } | ChangeOp::UpdateBackendSet { name, spec } => {
            lb.backend_sets.insert(name.clone(), spec.clone());
        }
        ChangeOp::AddBackend {
            backend_set,
            backend,
        } => {
            if let Some(set) = lb.backend_sets.get_mut(backend_set) {
                set.backends.insert(backend.clone());
            }
        }
        ChangeOp::RemoveBackend {
            backend_set,
            backend,
        } => {
            if let Some(set) = lb.backend_sets.get_mut(backend_set) {
                set.backends.remove(backend);
            }
        }
        ChangeOp::CreatePathRouteSet { name, routes }
        | ChangeOp::UpdatePathRouteSet { name, routes } => {
            lb.path_route_sets.insert(name.clone(), routes.clone());
        }
        ChangeOp::CreateListener { name, spec } | ChangeOp::UpdateListener { name, spec } => {
            lb.listeners.insert(name.clone(), spec.clone());
        }
        ChangeOp::DeleteListener { name } => {
            lb.listeners.remove(name);
        }
        ChangeOp::DeletePathRouteSet { name } => {
            lb.path_route_sets.remove(name);
        }
        ChangeOp::DeleteBackendSet { name } => {
            lb.backend_sets.remove(name);
        }
        ChangeOp::DeleteCertificate { name } => {
            lb.certificates.remove(name);
        }
        ChangeOp::UpdateTags { tags } => lb.tags.clone_from(tags),
    }
}

/// Spec for `default/app` with one backend set `web-8080` over `addresses`.
pub fn sample_spec(addresses: &[&str]) -> LoadBalancerSpec {
    let backends: BTreeSet<Backend> = addresses
        .iter()
        .map(|a| Backend {
            address: (*a).to_string(),
            port: 30080,
        })
        .collect();

    let mut backend_sets = BTreeMap::new();
    backend_sets.insert(
        "web-8080".to_string(),
        BackendSetSpec {
            policy: "ROUND_ROBIN".to_string(),
            health_check: HealthCheck {
                protocol: "HTTP".to_string(),
                port: 10256,
                url_path: "/healthz".to_string(),
            },
            backends,
        },
    );

    let mut path_route_sets = BTreeMap::new();
    path_route_sets.insert(
        "ingress-routes".to_string(),
        vec![PathRoute {
            path: "/".to_string(),
            match_type: MatchType::Prefix,
            backend_set: "web-8080".to_string(),
        }],
    );

    let mut listeners = BTreeMap::new();
    listeners.insert(
        "http".to_string(),
        ListenerSpec {
            port: 80,
            protocol: "HTTP".to_string(),
            default_backend_set: "web-8080".to_string(),
            path_route_set: Some("ingress-routes".to_string()),
            certificate: None,
        },
    );

    let mut tags = BTreeMap::new();
    tags.insert(
        OWNERSHIP_TAG_KEY.to_string(),
        "test-cluster/default/app".to_string(),
    );

    LoadBalancerSpec {
        name: "k8s-ingress-default-app".to_string(),
        shape: "100Mbps".to_string(),
        visibility: Visibility::Public,
        compartment: "ocid1.compartment.oc1..default".to_string(),
        subnets: vec!["ocid1.subnet.oc1.iad.aaaa".to_string()],
        listeners,
        backend_sets,
        path_route_sets,
        certificates: BTreeMap::new(),
        tags,
    }
}
