// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! The load balancer cleanup finalizer on Ingresses.
//!
//! A managed Ingress carries `ingress.beta.kubernetes.io/oci-load-balancer-cleanup`
//! so its deletion is held until the load balancer has been released. The list
//! edits are computed by pure helpers and written back as a merge patch of the
//! whole `metadata.finalizers` array.

use crate::errors::ReconcileError;
use crate::reconcilers::retry::retry_api_call;
use k8s_openapi::api::networking::v1::Ingress;
use kube::api::{Patch, PatchParams};
use kube::{Api, Client, Resource, ResourceExt};
use serde_json::json;
use tracing::info;

/// Whether `resource` currently carries `finalizer`.
#[must_use]
pub fn has_finalizer<T: Resource>(resource: &T, finalizer: &str) -> bool {
    resource
        .meta()
        .finalizers
        .as_ref()
        .is_some_and(|f| f.iter().any(|x| x == finalizer))
}

/// The finalizer list with `finalizer` appended, or `None` if it is already there.
#[must_use]
pub fn finalizers_with(current: Option<&[String]>, finalizer: &str) -> Option<Vec<String>> {
    let current = current.unwrap_or_default();
    if current.iter().any(|f| f == finalizer) {
        return None;
    }
    let mut next = current.to_vec();
    next.push(finalizer.to_string());
    Some(next)
}

/// The finalizer list without `finalizer`, or `None` if it was not present.
#[must_use]
pub fn finalizers_without(current: Option<&[String]>, finalizer: &str) -> Option<Vec<String>> {
    let current = current.unwrap_or_default();
    if !current.iter().any(|f| f == finalizer) {
        return None;
    }
    Some(
        current
            .iter()
            .filter(|f| f.as_str() != finalizer)
            .cloned()
            .collect(),
    )
}

/// Add `finalizer` to the Ingress. A no-op when it is already present.
///
/// # Errors
///
/// Returns the classified Kubernetes error from the patch.
pub async fn ensure_finalizer(
    client: &Client,
    ingress: &Ingress,
    finalizer: &str,
) -> Result<(), ReconcileError> {
    let Some(next) = finalizers_with(ingress.meta().finalizers.as_deref(), finalizer) else {
        return Ok(());
    };
    info!(
        namespace = %ingress.namespace().unwrap_or_default(),
        name = %ingress.name_any(),
        finalizer,
        "Adding finalizer"
    );
    write_finalizers(client, ingress, next).await
}

/// Drop `finalizer` from the Ingress. A no-op when it is already gone.
///
/// # Errors
///
/// Returns the classified Kubernetes error from the patch; an Ingress that no
/// longer exists reports `NotFound`.
pub async fn remove_finalizer(
    client: &Client,
    ingress: &Ingress,
    finalizer: &str,
) -> Result<(), ReconcileError> {
    let Some(next) = finalizers_without(ingress.meta().finalizers.as_deref(), finalizer) else {
        return Ok(());
    };
    info!(
        namespace = %ingress.namespace().unwrap_or_default(),
        name = %ingress.name_any(),
        finalizer,
        "Removing finalizer"
    );
    write_finalizers(client, ingress, next).await
}

async fn write_finalizers(
    client: &Client,
    ingress: &Ingress,
    finalizers: Vec<String>,
) -> Result<(), ReconcileError> {
    let namespace = ingress.namespace().unwrap_or_default();
    let name = ingress.name_any();
    let api: Api<Ingress> = Api::namespaced(client.clone(), &namespace);
    let body = json!({ "metadata": { "finalizers": finalizers } });
    let patch = Patch::Merge(&body);
    let params = PatchParams::default();
    retry_api_call(
        || api.patch(&name, &params, &patch),
        &format!("patch finalizers of Ingress {namespace}/{name}"),
    )
    .await?;
    Ok(())
}

#[cfg(test)]
#[path = "finalizers_tests.rs"]
mod finalizers_tests;
