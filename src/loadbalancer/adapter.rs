// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Converges one cloud load balancer onto a desired [`LoadBalancerSpec`].
//!
//! Load balancers are always located by ownership tag, never by display name.
//! The lookup covers the desired compartment and every home compartment in
//! [`AdapterSettings`], so an annotation that moves an Ingress to another
//! compartment cannot hide the load balancer it already owns.
//!
//! Each attempt starts with a fresh lookup, so a retry after a lost response
//! re-reads what the provider actually did instead of replaying the call.

use super::plan::plan_changes;
use super::{ChangeOp, CreateLoadBalancer, LoadBalancerApi, WorkRequestStatus};
use crate::config::ApiConfig;
use crate::errors::{ApiError, ErrorClass, ReconcileError};
use crate::metrics::{record_api_call, record_load_balancer_event};
use crate::model::{
    CertificateBundles, LoadBalancerSpec, ObservedLoadBalancer, ProvisioningState, WorkRequestId,
};
use crate::reconcilers::retry::ExponentialBackoff;
use sha2::{Digest, Sha256};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Retry and deadline settings for the adapter.
#[derive(Debug, Clone)]
pub struct AdapterSettings {
    /// Attempts per `reconcile`/`delete` before a transient failure is returned
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// Deadline applied to every single API call
    pub call_timeout: Duration,
    pub work_request_poll: Duration,
    /// Longest wait for one mutation's work request
    pub work_request_timeout: Duration,
    /// Compartments searched for owned load balancers besides the desired one
    pub home_compartments: Vec<String>,
}

impl AdapterSettings {
    /// Also look for owned load balancers in `compartment`.
    #[must_use]
    pub fn with_home_compartment(mut self, compartment: impl Into<String>) -> Self {
        let compartment = compartment.into();
        if !self.home_compartments.contains(&compartment) {
            self.home_compartments.push(compartment);
        }
        self
    }
}

impl From<&ApiConfig> for AdapterSettings {
    fn from(cfg: &ApiConfig) -> Self {
        Self {
            max_attempts: cfg.max_attempts,
            initial_backoff: cfg.initial_backoff(),
            max_backoff: cfg.max_backoff(),
            call_timeout: cfg.call_timeout(),
            work_request_poll: cfg.work_request_poll(),
            work_request_timeout: cfg.work_request_timeout(),
            home_compartments: Vec::new(),
        }
    }
}

impl Default for AdapterSettings {
    fn default() -> Self {
        Self::from(&ApiConfig::default())
    }
}

/// What a convergence pass did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConvergeAction {
    /// A create was accepted; the load balancer is provisioning
    Created(WorkRequestId),
    /// This many change operations were applied
    Updated(usize),
    /// The load balancer already matched
    Unchanged,
    /// The load balancer is provisioning or deleting; nothing was sent
    Waiting,
}

#[derive(Debug, Clone)]
pub struct Convergence {
    pub action: ConvergeAction,
    /// Latest observed state, if the provider reported one
    pub load_balancer: Option<ObservedLoadBalancer>,
}

impl Convergence {
    /// True when the load balancer is active and needs no further calls.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(
            self.action,
            ConvergeAction::Updated(_) | ConvergeAction::Unchanged
        ) && self
            .load_balancer
            .as_ref()
            .is_some_and(|lb| lb.state == ProvisioningState::Active)
    }
}

/// Find/create/update/delete driver over a [`LoadBalancerApi`].
#[derive(Clone)]
pub struct LoadBalancerAdapter {
    api: Arc<dyn LoadBalancerApi>,
    settings: AdapterSettings,
}

impl LoadBalancerAdapter {
    #[must_use]
    pub fn new(api: Arc<dyn LoadBalancerApi>, settings: AdapterSettings) -> Self {
        Self { api, settings }
    }

    /// Bring the load balancer owned by `spec` to the desired state.
    ///
    /// `certificates` must carry material for every certificate in `spec`
    /// that the provider does not have yet.
    ///
    /// # Errors
    ///
    /// - `Transient` once `max_attempts` attempts have failed transiently
    /// - `Conflict` for immutable attribute changes or a `FAILED` load balancer
    /// - `Malformed` for a spec without ownership tag or missing certificate material
    pub async fn reconcile(
        &self,
        spec: &LoadBalancerSpec,
        certificates: &CertificateBundles,
    ) -> Result<Convergence, ReconcileError> {
        let owner = spec.ownership_value().ok_or_else(|| {
            ReconcileError::Malformed(format!("load balancer spec '{}' has no owner", spec.name))
        })?;

        let mut backoff = self.backoff();
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.converge_once(spec, owner, certificates).await {
                Ok(convergence) => return Ok(convergence),
                Err(e) if e.is_retryable() && attempt < self.settings.max_attempts => {
                    let delay = backoff
                        .next_backoff()
                        .unwrap_or(self.settings.max_backoff);
                    warn!(
                        owner = owner,
                        attempt = attempt,
                        retry_after = ?delay,
                        error = %e,
                        "Transient load balancer failure, retrying from lookup"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Remove every load balancer carrying ownership tag `owner` in
    /// `compartment` and the home compartments.
    ///
    /// Returns the first delete work request, or `None` when there was nothing
    /// to delete or every delete is already in progress.
    ///
    /// # Errors
    ///
    /// Returns `Transient` once retries are exhausted and `Conflict` when the
    /// provider refuses the delete.
    pub async fn delete(
        &self,
        compartment: &str,
        owner: &str,
    ) -> Result<Option<WorkRequestId>, ReconcileError> {
        let mut first = None;
        for candidate in self.compartments(compartment) {
            let work_request = self.delete_in(candidate, owner).await?;
            first = first.or(work_request);
        }
        Ok(first)
    }

    async fn delete_in(
        &self,
        compartment: &str,
        owner: &str,
    ) -> Result<Option<WorkRequestId>, ReconcileError> {
        let mut backoff = self.backoff();
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.delete_once(compartment, owner).await {
                Ok(work_request) => return Ok(work_request),
                Err(e) if e.is_retryable() && attempt < self.settings.max_attempts => {
                    let delay = backoff
                        .next_backoff()
                        .unwrap_or(self.settings.max_backoff);
                    warn!(
                        owner = owner,
                        attempt = attempt,
                        retry_after = ?delay,
                        error = %e,
                        "Transient failure deleting load balancer, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// `desired` first, then the home compartments, without repeats.
    fn compartments<'a>(&'a self, desired: &'a str) -> Vec<&'a str> {
        let mut all = vec![desired];
        for home in &self.settings.home_compartments {
            if !all.contains(&home.as_str()) {
                all.push(home);
            }
        }
        all
    }

    /// The load balancer tagged with `owner` in any searched compartment.
    async fn locate(
        &self,
        desired: &str,
        owner: &str,
    ) -> Result<Option<ObservedLoadBalancer>, ReconcileError> {
        for compartment in self.compartments(desired) {
            if let Some(lb) = self.call("find", self.api.find(compartment, owner)).await? {
                return Ok(Some(lb));
            }
        }
        Ok(None)
    }

    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff::bounded_by_attempts(
            self.settings.initial_backoff,
            self.settings.max_backoff,
        )
    }

    async fn converge_once(
        &self,
        spec: &LoadBalancerSpec,
        owner: &str,
        certificates: &CertificateBundles,
    ) -> Result<Convergence, ReconcileError> {
        let Some(lb) = self.locate(&spec.compartment, owner).await? else {
            return self.create(spec, owner, certificates).await;
        };

        if lb.compartment != spec.compartment {
            return Err(ReconcileError::Conflict(format!(
                "load balancer {} owned by {owner} is in compartment {}, not {}; \
                 the compartment cannot be changed",
                lb.id, lb.compartment, spec.compartment
            )));
        }

        match lb.state {
            ProvisioningState::Failed => Err(ReconcileError::Conflict(format!(
                "load balancer {} is in state FAILED and needs operator attention",
                lb.id
            ))),
            ProvisioningState::Provisioning | ProvisioningState::Deleting => {
                debug!(
                    load_balancer = %lb.id,
                    state = %lb.state,
                    "Load balancer not active yet, waiting"
                );
                Ok(Convergence {
                    action: ConvergeAction::Waiting,
                    load_balancer: Some(lb),
                })
            }
            ProvisioningState::Active => self.update(spec, lb, certificates).await,
        }
    }

    async fn create(
        &self,
        spec: &LoadBalancerSpec,
        owner: &str,
        certificates: &CertificateBundles,
    ) -> Result<Convergence, ReconcileError> {
        let mut bundles = CertificateBundles::new();
        for name in spec.certificates.keys() {
            let bundle = certificates.get(name).ok_or_else(|| {
                ReconcileError::Malformed(format!("no certificate material for '{name}'"))
            })?;
            bundles.insert(name.clone(), bundle.clone());
        }

        let request = CreateLoadBalancer {
            spec: spec.clone(),
            certificates: bundles,
            retry_token: retry_token(owner, spec),
        };

        info!(
            name = %spec.name,
            owner = owner,
            compartment = %spec.compartment,
            shape = %spec.shape,
            "Creating load balancer"
        );
        let work_request = self.call("create", self.api.create(&request)).await?;
        record_load_balancer_event("created");

        let load_balancer = self
            .call("find", self.api.find(&spec.compartment, owner))
            .await?;
        Ok(Convergence {
            action: ConvergeAction::Created(work_request),
            load_balancer,
        })
    }

    async fn update(
        &self,
        spec: &LoadBalancerSpec,
        lb: ObservedLoadBalancer,
        certificates: &CertificateBundles,
    ) -> Result<Convergence, ReconcileError> {
        let ops = plan_changes(spec, &lb, certificates)?;
        if ops.is_empty() {
            debug!(load_balancer = %lb.id, "Load balancer up to date");
            return Ok(Convergence {
                action: ConvergeAction::Unchanged,
                load_balancer: Some(lb),
            });
        }

        info!(
            load_balancer = %lb.id,
            changes = ops.len(),
            "Applying load balancer changes"
        );
        for op in &ops {
            self.apply(&lb.id, op).await?;
        }
        record_load_balancer_event("updated");

        let refreshed = self.call("get", self.api.get(&lb.id)).await?;
        Ok(Convergence {
            action: ConvergeAction::Updated(ops.len()),
            load_balancer: refreshed.or(Some(lb)),
        })
    }

    async fn apply(&self, id: &str, op: &ChangeOp) -> Result<(), ReconcileError> {
        debug!(load_balancer = id, change = op.kind(), "Sending change");
        let work_request = self.call(op.kind(), self.api.update(id, op)).await?;
        self.await_work_request(&work_request).await
    }

    async fn delete_once(
        &self,
        compartment: &str,
        owner: &str,
    ) -> Result<Option<WorkRequestId>, ReconcileError> {
        let Some(lb) = self.call("find", self.api.find(compartment, owner)).await? else {
            debug!(owner = owner, "No load balancer to delete");
            return Ok(None);
        };

        if lb.state == ProvisioningState::Deleting {
            debug!(load_balancer = %lb.id, "Load balancer already deleting");
            return Ok(None);
        }

        info!(load_balancer = %lb.id, owner = owner, "Deleting load balancer");
        match self.call("delete", self.api.delete(&lb.id)).await {
            Ok(work_request) => {
                record_load_balancer_event("deleted");
                Ok(Some(work_request))
            }
            Err(ReconcileError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Poll a mutation's work request until it finishes.
    async fn await_work_request(&self, id: &WorkRequestId) -> Result<(), ReconcileError> {
        let deadline = Instant::now() + self.settings.work_request_timeout;
        loop {
            match self
                .call("work_request", self.api.work_request_status(id))
                .await?
            {
                WorkRequestStatus::Succeeded => return Ok(()),
                WorkRequestStatus::Failed(message) => {
                    return Err(ReconcileError::Transient(format!(
                        "work request {id} failed: {message}"
                    )));
                }
                WorkRequestStatus::InProgress if Instant::now() >= deadline => {
                    return Err(ReconcileError::Transient(format!(
                        "work request {id} still in progress after {:?}",
                        self.settings.work_request_timeout
                    )));
                }
                WorkRequestStatus::InProgress => {
                    tokio::time::sleep(self.settings.work_request_poll).await;
                }
            }
        }
    }

    /// Run one API call under the call deadline and record it.
    async fn call<T, F>(&self, operation: &'static str, fut: F) -> Result<T, ReconcileError>
    where
        F: Future<Output = Result<T, ApiError>>,
    {
        let start = Instant::now();
        let result = match tokio::time::timeout(self.settings.call_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(ApiError::Timeout {
                operation,
                timeout: self.settings.call_timeout,
            }),
        };

        let outcome = match &result {
            Ok(_) => "success",
            Err(e) => e.class().as_str(),
        };
        record_api_call(operation, outcome, start.elapsed());

        result.map_err(|e| {
            if e.class() != ErrorClass::NotFound {
                debug!(operation = operation, error = %e, "Load balancer API call failed");
            }
            ReconcileError::from(e)
        })
    }
}

/// Idempotency token for a create: hex SHA-256 over the owner and the desired `LoadBalancerSpec`.
///
/// A replayed create for the same desired state carries the same token, so the
/// provider does not create a second load balancer.
#[must_use]
pub fn retry_token(owner: &str, spec: &LoadBalancerSpec) -> String {
    let mut hasher = Sha256::new();
    hasher.update(owner.as_bytes());
    hasher.update([0u8]);
    // LoadBalancerSpec holds only maps, strings and integers; serialization cannot fail.
    hasher.update(serde_json::to_vec(spec).unwrap_or_default());
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
#[path = "adapter_tests.rs"]
mod adapter_tests;
