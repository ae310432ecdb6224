// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! In-memory [`ClusterSource`] for reconciler tests.
//!
//! Finalizer and status writes are applied to the stored Ingress, so a second
//! reconcile observes the result of the first.

use super::ClusterSource;
use crate::annotations::{FINALIZER_LB_CLEANUP, LB_STATUS};
use crate::errors::ReconcileError;
use crate::model::IngressRef;
use crate::reconcilers::status::IngressStatusPatch;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Secret, Service};
use k8s_openapi::api::networking::v1::{Ingress, IngressLoadBalancerStatus, IngressStatus};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;

#[derive(Default)]
struct State {
    ingresses: BTreeMap<IngressRef, Ingress>,
    services: BTreeMap<(String, String), Service>,
    secrets: BTreeMap<(String, String), Secret>,
    status_patches: Vec<(IngressRef, IngressStatusPatch)>,
    finalizers_added: usize,
    finalizers_removed: usize,
    status_failures: VecDeque<ReconcileError>,
}

#[derive(Default)]
pub struct FakeCluster {
    state: Mutex<State>,
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_ingress(&self, ingress: Ingress) {
        let key = IngressRef::from_ingress(&ingress);
        self.state.lock().unwrap().ingresses.insert(key, ingress);
    }

    pub fn remove_ingress(&self, key: &IngressRef) {
        self.state.lock().unwrap().ingresses.remove(key);
    }

    pub fn ingress(&self, key: &IngressRef) -> Option<Ingress> {
        self.state.lock().unwrap().ingresses.get(key).cloned()
    }

    pub fn put_service(&self, namespace: &str, service: Service) {
        let name = service.metadata.name.clone().unwrap_or_default();
        self.state
            .lock()
            .unwrap()
            .services
            .insert((namespace.to_string(), name), service);
    }

    pub fn put_secret(&self, namespace: &str, secret: Secret) {
        let name = secret.metadata.name.clone().unwrap_or_default();
        self.state
            .lock()
            .unwrap()
            .secrets
            .insert((namespace.to_string(), name), secret);
    }

    /// Make the next status write fail with `err`.
    pub fn fail_next_status_write(&self, err: ReconcileError) {
        self.state.lock().unwrap().status_failures.push_back(err);
    }

    pub fn status_patches(&self) -> Vec<(IngressRef, IngressStatusPatch)> {
        self.state.lock().unwrap().status_patches.clone()
    }

    pub fn finalizers_added(&self) -> usize {
        self.state.lock().unwrap().finalizers_added
    }

    pub fn finalizers_removed(&self) -> usize {
        self.state.lock().unwrap().finalizers_removed
    }
}

#[async_trait]
impl ClusterSource for FakeCluster {
    async fn get_ingress(&self, key: &IngressRef) -> Result<Option<Ingress>, ReconcileError> {
        Ok(self.ingress(key))
    }

    async fn get_service(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Service>, ReconcileError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .services
            .get(&(namespace.to_string(), name.to_string()))
            .cloned())
    }

    async fn get_secret(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Secret>, ReconcileError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .secrets
            .get(&(namespace.to_string(), name.to_string()))
            .cloned())
    }

    async fn add_finalizer(&self, ingress: &Ingress) -> Result<(), ReconcileError> {
        let key = IngressRef::from_ingress(ingress);
        let mut state = self.state.lock().unwrap();
        state.finalizers_added += 1;
        if let Some(stored) = state.ingresses.get_mut(&key) {
            let finalizers = stored.metadata.finalizers.get_or_insert_with(Vec::new);
            if !finalizers.iter().any(|f| f == FINALIZER_LB_CLEANUP) {
                finalizers.push(FINALIZER_LB_CLEANUP.to_string());
            }
        }
        Ok(())
    }

    async fn remove_finalizer(&self, ingress: &Ingress) -> Result<(), ReconcileError> {
        let key = IngressRef::from_ingress(ingress);
        let mut state = self.state.lock().unwrap();
        state.finalizers_removed += 1;
        if let Some(stored) = state.ingresses.get_mut(&key) {
            if let Some(finalizers) = stored.metadata.finalizers.as_mut() {
                finalizers.retain(|f| f != FINALIZER_LB_CLEANUP);
            }
        }
        Ok(())
    }

    async fn patch_status(
        &self,
        key: &IngressRef,
        patch: &IngressStatusPatch,
    ) -> Result<(), ReconcileError> {
        let mut state = self.state.lock().unwrap();
        if let Some(err) = state.status_failures.pop_front() {
            return Err(err);
        }
        state.status_patches.push((key.clone(), patch.clone()));

        let Some(stored) = state.ingresses.get_mut(key) else {
            return Err(ReconcileError::NotFound(format!("Ingress {key}")));
        };
        if let Some(conditions) = &patch.conditions {
            stored
                .metadata
                .annotations
                .get_or_insert_with(BTreeMap::new)
                .insert(LB_STATUS.to_string(), serde_json::to_string(conditions).unwrap());
        }
        if let Some(load_balancer) = &patch.load_balancer {
            stored.status = Some(IngressStatus {
                load_balancer: Some(IngressLoadBalancerStatus {
                    ingress: Some(load_balancer.clone()),
                }),
            });
        }
        Ok(())
    }
}
