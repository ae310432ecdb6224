// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Kubernetes reads and writes performed by the Ingress reconciler.
//!
//! The reconciler only talks to the cluster through [`ClusterSource`], so it can
//! be exercised against an in-memory fake. [`KubeCluster`] is the production
//! implementation; every call goes through
//! [`retry_api_call`](crate::reconcilers::retry::retry_api_call).

use crate::annotations::{FINALIZER_LB_CLEANUP, LB_STATUS};
use crate::errors::ReconcileError;
use crate::model::IngressRef;
use crate::reconcilers::finalizers::{ensure_finalizer, remove_finalizer};
use crate::reconcilers::retry::retry_api_call;
use crate::reconcilers::status::IngressStatusPatch;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Secret, Service};
use k8s_openapi::api::networking::v1::Ingress;
use kube::api::{Patch, PatchParams};
use kube::{Api, Client};
use serde_json::json;
use tracing::debug;

/// Cluster access needed by one reconcile.
///
/// Lookups return `Ok(None)` for absent objects.
#[async_trait]
pub trait ClusterSource: Send + Sync {
    async fn get_ingress(&self, key: &IngressRef) -> Result<Option<Ingress>, ReconcileError>;

    async fn get_service(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Service>, ReconcileError>;

    async fn get_secret(&self, namespace: &str, name: &str)
        -> Result<Option<Secret>, ReconcileError>;

    /// Add the load balancer cleanup finalizer.
    async fn add_finalizer(&self, ingress: &Ingress) -> Result<(), ReconcileError>;

    /// Remove the load balancer cleanup finalizer.
    async fn remove_finalizer(&self, ingress: &Ingress) -> Result<(), ReconcileError>;

    /// Persist the non-empty parts of `patch`.
    async fn patch_status(
        &self,
        key: &IngressRef,
        patch: &IngressStatusPatch,
    ) -> Result<(), ReconcileError>;
}

/// [`ClusterSource`] backed by the Kubernetes API.
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
}

impl KubeCluster {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ClusterSource for KubeCluster {
    async fn get_ingress(&self, key: &IngressRef) -> Result<Option<Ingress>, ReconcileError> {
        let api: Api<Ingress> = Api::namespaced(self.client.clone(), &key.namespace);
        retry_api_call(|| api.get_opt(&key.name), &format!("get Ingress {key}")).await
    }

    async fn get_service(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Service>, ReconcileError> {
        let api: Api<Service> = Api::namespaced(self.client.clone(), namespace);
        retry_api_call(
            || api.get_opt(name),
            &format!("get Service {namespace}/{name}"),
        )
        .await
    }

    async fn get_secret(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Secret>, ReconcileError> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        retry_api_call(
            || api.get_opt(name),
            &format!("get Secret {namespace}/{name}"),
        )
        .await
    }

    async fn add_finalizer(&self, ingress: &Ingress) -> Result<(), ReconcileError> {
        ensure_finalizer(&self.client, ingress, FINALIZER_LB_CLEANUP).await
    }

    async fn remove_finalizer(&self, ingress: &Ingress) -> Result<(), ReconcileError> {
        match remove_finalizer(&self.client, ingress, FINALIZER_LB_CLEANUP).await {
            Err(ReconcileError::NotFound(_)) => Ok(()),
            other => other,
        }
    }

    async fn patch_status(
        &self,
        key: &IngressRef,
        patch: &IngressStatusPatch,
    ) -> Result<(), ReconcileError> {
        let api: Api<Ingress> = Api::namespaced(self.client.clone(), &key.namespace);
        let params = PatchParams::default();

        if let Some(conditions) = &patch.conditions {
            let encoded = serde_json::to_string(conditions)
                .map_err(|e| ReconcileError::Malformed(format!("encode conditions: {e}")))?;
            let body = json!({ "metadata": { "annotations": { LB_STATUS: encoded } } });
            let merge = Patch::Merge(&body);
            retry_api_call(
                || api.patch(&key.name, &params, &merge),
                &format!("patch status annotation of Ingress {key}"),
            )
            .await?;
        }

        if let Some(load_balancer) = &patch.load_balancer {
            let body = json!({ "status": { "loadBalancer": { "ingress": load_balancer } } });
            let merge = Patch::Merge(&body);
            retry_api_call(
                || api.patch_status(&key.name, &params, &merge),
                &format!("patch status of Ingress {key}"),
            )
            .await?;
        }

        debug!(ingress = %key, "Updated Ingress status");
        Ok(())
    }
}

#[cfg(test)]
#[path = "cluster_fake.rs"]
pub mod fake;
