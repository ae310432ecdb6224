// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Ingress reconciliation logic.
//!
//! One reconcile takes an [`IngressRef`] through
//! `Idle -> Building -> Applying -> UpdatingStatus -> Idle`:
//!
//! 1. Fetch the Ingress. A missing, deleting or foreign-class Ingress releases its
//!    load balancer and ends with [`ReconcileOutcome::Deleted`].
//! 2. Resolve Service NodePorts and TLS secrets.
//! 3. Build the desired [`LoadBalancerSpec`](crate::model::LoadBalancerSpec)
//!    from config, the Ingress and a node snapshot.
//! 4. Converge the load balancer through the adapter.
//! 5. Publish addresses and a `Ready=True` condition once the load balancer is
//!    active.
//!
//! Failures are written as `Ready=False` (best effort) and returned as
//! [`ReconcileOutcome::Failed`] for the requeue decision.

use crate::annotations::{FINALIZER_LB_CLEANUP, SECRET_CA_CERT, SECRET_TLS_CERT, SECRET_TLS_KEY};
use crate::builder::{
    build, compartment_override, is_managed_class, service_backends, tls_secret_names,
};
use crate::cluster::ClusterSource;
use crate::config::ControllerConfig;
use crate::constants::MAX_TRANSIENT_ATTEMPTS;
use crate::context::ManagedIngresses;
use crate::errors::ReconcileError;
use crate::loadbalancer::LoadBalancerAdapter;
use crate::metrics;
use crate::model::{
    CertificateBundle, CertificateBundles, IngressRef, OwnershipTag, ServicePortRef, ServicePorts,
};
use crate::node_index::NodeMembership;
use crate::reconcilers::finalizers::has_finalizer;
use crate::reconcilers::requeue::{ReconcileOutcome, RetryTracker};
use crate::reconcilers::status::{find_condition, read_conditions, IngressStatusUpdater};
use crate::status_reasons::{
    CONDITION_STATUS_FALSE, CONDITION_STATUS_TRUE, CONDITION_TYPE_READY,
    REASON_LOAD_BALANCER_READY, REASON_RETRIES_EXHAUSTED,
};
use k8s_openapi::api::core::v1::{Secret, Service};
use k8s_openapi::api::networking::v1::Ingress;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Step of a single reconcile, logged at `debug` on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcilePhase {
    Idle,
    Building,
    Applying,
    UpdatingStatus,
    Failed,
}

impl fmt::Display for ReconcilePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "Idle",
            Self::Building => "Building",
            Self::Applying => "Applying",
            Self::UpdatingStatus => "UpdatingStatus",
            Self::Failed => "Failed",
        };
        f.write_str(name)
    }
}

/// Drives one Ingress to its load balancer.
pub struct IngressReconciler {
    config: Arc<ControllerConfig>,
    cluster: Arc<dyn ClusterSource>,
    nodes: Arc<dyn NodeMembership>,
    adapter: LoadBalancerAdapter,
    managed: Arc<ManagedIngresses>,
    retries: RetryTracker,
}

impl IngressReconciler {
    #[must_use]
    pub fn new(
        config: Arc<ControllerConfig>,
        cluster: Arc<dyn ClusterSource>,
        nodes: Arc<dyn NodeMembership>,
        adapter: LoadBalancerAdapter,
        managed: Arc<ManagedIngresses>,
    ) -> Self {
        Self {
            config,
            cluster,
            nodes,
            adapter,
            managed,
            retries: RetryTracker::new(),
        }
    }

    /// Consecutive transient failures of `key`, including the latest reconcile.
    #[must_use]
    pub fn retry_attempts(&self, key: &IngressRef) -> u32 {
        self.retries.attempts(key)
    }

    /// Reconcile the Ingress identified by `key`.
    pub async fn reconcile(&self, key: &IngressRef) -> ReconcileOutcome {
        let start = Instant::now();
        debug!(ingress = %key, "Reconciling Ingress");

        let outcome = self.run(key).await;
        let duration = start.elapsed();

        match &outcome {
            ReconcileOutcome::Ready { .. } => metrics::record_reconciliation_success(duration),
            ReconcileOutcome::Provisioning { .. } => {
                metrics::record_reconciliation_provisioning(duration);
            }
            ReconcileOutcome::Deleted => metrics::record_reconciliation_deleted(duration),
            ReconcileOutcome::Failed(e) => {
                metrics::record_reconciliation_error(e.class().as_str(), duration);
            }
        }
        if !matches!(&outcome, ReconcileOutcome::Failed(e) if e.is_retryable()) {
            self.retries.reset(key);
        }
        metrics::set_managed_ingresses(self.managed.len());

        enter(key, ReconcilePhase::Idle);
        outcome
    }

    async fn run(&self, key: &IngressRef) -> ReconcileOutcome {
        enter(key, ReconcilePhase::Building);

        let ingress = match self.cluster.get_ingress(key).await {
            Ok(Some(ingress)) => ingress,
            Ok(None) => {
                debug!(ingress = %key, "Ingress no longer exists, releasing load balancer");
                return self.release(key, None).await;
            }
            Err(e) => return self.fail(key, None, e).await,
        };

        if ingress.metadata.deletion_timestamp.is_some() {
            info!(ingress = %key, "Ingress is being deleted, releasing load balancer");
            return self.release(key, Some(&ingress)).await;
        }

        if !is_managed_class(&self.config, &ingress) {
            if has_finalizer(&ingress, FINALIZER_LB_CLEANUP) || self.managed.contains(key) {
                info!(
                    ingress = %key,
                    "Ingress left this controller's class, releasing load balancer"
                );
                return self.release(key, Some(&ingress)).await;
            }
            debug!(ingress = %key, "Ignoring Ingress of another class");
            return ReconcileOutcome::Deleted;
        }

        match self.apply(key, &ingress).await {
            Ok(outcome) => outcome,
            Err(e) => self.fail(key, Some(&ingress), e).await,
        }
    }

    async fn apply(
        &self,
        key: &IngressRef,
        ingress: &Ingress,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        if self.managed.insert(key) {
            debug!(ingress = %key, "Tracking Ingress");
        }
        if !has_finalizer(ingress, FINALIZER_LB_CLEANUP) {
            self.cluster.add_finalizer(ingress).await?;
        }

        let service_ports = self.resolve_service_ports(key, ingress).await?;
        let certificates = self.resolve_certificates(key, ingress).await?;
        let nodes = self.nodes.snapshot();
        let spec = build(&self.config, ingress, &nodes, &service_ports);
        debug!(
            ingress = %key,
            load_balancer = %spec.name,
            backend_sets = spec.backend_sets.len(),
            listeners = spec.listeners.len(),
            "Built desired load balancer"
        );

        enter(key, ReconcilePhase::Applying);
        let convergence = self.adapter.reconcile(&spec, &certificates).await?;

        let ready = convergence.is_ready();
        let load_balancer = match convergence.load_balancer {
            Some(lb) if ready => lb,
            other => {
                let load_balancer_id = other.map(|lb| lb.id);
                info!(
                    ingress = %key,
                    load_balancer_id = ?load_balancer_id,
                    "Load balancer not active yet"
                );
                return Ok(ReconcileOutcome::Provisioning { load_balancer_id });
            }
        };

        enter(key, ReconcilePhase::UpdatingStatus);
        let mut updater = IngressStatusUpdater::new(ingress);
        updater.set_condition(
            CONDITION_TYPE_READY,
            CONDITION_STATUS_TRUE,
            REASON_LOAD_BALANCER_READY,
            &format!("Load balancer {} is active", load_balancer.id),
        );
        updater.set_addresses(&load_balancer.addresses);
        let patch = updater.patch();
        if patch.is_empty() {
            debug!(ingress = %key, "Status unchanged, skipping update");
        } else {
            self.cluster.patch_status(key, &patch).await?;
            info!(
                ingress = %key,
                addresses = ?load_balancer.addresses,
                "Published load balancer addresses"
            );
        }

        Ok(ReconcileOutcome::Ready {
            load_balancer_id: load_balancer.id,
            addresses: load_balancer.addresses,
        })
    }

    /// Delete the load balancer owned by `key` and let the Ingress go.
    async fn release(&self, key: &IngressRef, ingress: Option<&Ingress>) -> ReconcileOutcome {
        let owner = OwnershipTag::new(&self.config.cluster_name, key);
        let compartment = ingress
            .and_then(compartment_override)
            .unwrap_or_else(|| self.config.load_balancer.compartment.clone());

        enter(key, ReconcilePhase::Applying);
        match self.adapter.delete(&compartment, owner.value()).await {
            Ok(Some(work_request)) => {
                info!(ingress = %key, work_request = %work_request, "Deleting load balancer");
            }
            Ok(None) => debug!(ingress = %key, "No load balancer left to delete"),
            Err(e) => return self.fail(key, ingress, e).await,
        }

        if let Some(ingress) = ingress.filter(|i| has_finalizer(*i, FINALIZER_LB_CLEANUP)) {
            if let Err(e) = self.cluster.remove_finalizer(ingress).await {
                return self.fail(key, Some(ingress), e).await;
            }
        }

        if self.managed.remove(key) {
            info!(ingress = %key, "Stopped managing Ingress");
        }
        ReconcileOutcome::Deleted
    }

    /// Record a failure, report it on the Ingress when one is given, and turn it
    /// into an outcome.
    ///
    /// A `Ready=False` condition with the same reason is left alone even if the
    /// error text differs. Error text carries per-attempt ids, and rewriting it
    /// would trigger a fresh reconcile that skips the requeue backoff.
    async fn fail(
        &self,
        key: &IngressRef,
        ingress: Option<&Ingress>,
        err: ReconcileError,
    ) -> ReconcileOutcome {
        enter(key, ReconcilePhase::Failed);

        let reason = if err.is_retryable() {
            let attempts = self.retries.record_failure(key);
            if attempts > MAX_TRANSIENT_ATTEMPTS {
                error!(
                    ingress = %key,
                    attempts = attempts,
                    error = %err,
                    "Giving up after repeated transient failures"
                );
                REASON_RETRIES_EXHAUSTED
            } else {
                warn!(
                    ingress = %key,
                    attempt = attempts,
                    error = %err,
                    "Reconcile failed, will retry"
                );
                err.reason()
            }
        } else {
            error!(
                ingress = %key,
                error_class = err.class().as_str(),
                error = %err,
                "Reconcile failed"
            );
            err.reason()
        };

        let already_reported = ingress.is_some_and(|i| {
            find_condition(&read_conditions(i), CONDITION_TYPE_READY).is_some_and(|c| {
                c.status == CONDITION_STATUS_FALSE && c.reason.as_deref() == Some(reason)
            })
        });
        if already_reported {
            debug!(ingress = %key, reason, "Failure already reported on Ingress");
        } else if let Some(ingress) = ingress {
            let mut updater = IngressStatusUpdater::new(ingress);
            updater.set_condition(
                CONDITION_TYPE_READY,
                CONDITION_STATUS_FALSE,
                reason,
                &err.to_string(),
            );
            let patch = updater.patch();
            if !patch.is_empty() {
                if let Err(status_err) = self.cluster.patch_status(key, &patch).await {
                    warn!(
                        ingress = %key,
                        error = %status_err,
                        "Failed to record failure on Ingress"
                    );
                }
            }
        }

        ReconcileOutcome::Failed(err)
    }

    async fn resolve_service_ports(
        &self,
        key: &IngressRef,
        ingress: &Ingress,
    ) -> Result<ServicePorts, ReconcileError> {
        let mut ports = ServicePorts::new();
        for backend in service_backends(ingress) {
            let Some(service) = self
                .cluster
                .get_service(&key.namespace, &backend.service)
                .await?
            else {
                warn!(
                    ingress = %key,
                    service = %backend.service,
                    "Referenced Service does not exist"
                );
                continue;
            };
            match node_port(&service, &backend.port) {
                Some(port) => {
                    ports.insert(backend, port);
                }
                None => warn!(
                    ingress = %key,
                    service = %backend.service,
                    port = %backend.port,
                    "Service port has no NodePort"
                ),
            }
        }
        Ok(ports)
    }

    async fn resolve_certificates(
        &self,
        key: &IngressRef,
        ingress: &Ingress,
    ) -> Result<CertificateBundles, ReconcileError> {
        let mut bundles = CertificateBundles::new();
        for name in tls_secret_names(ingress) {
            let secret = self
                .cluster
                .get_secret(&key.namespace, &name)
                .await?
                .ok_or_else(|| {
                    ReconcileError::Malformed(format!(
                        "TLS secret {}/{name} does not exist",
                        key.namespace
                    ))
                })?;
            let bundle = certificate_bundle(&secret, &format!("{}/{name}", key.namespace))?;
            bundles.insert(name, bundle);
        }
        Ok(bundles)
    }
}

fn enter(key: &IngressRef, phase: ReconcilePhase) {
    debug!(ingress = %key, phase = %phase, "Reconcile phase");
}

/// NodePort of the Service port referenced by number or name.
#[must_use]
pub fn node_port(service: &Service, port: &ServicePortRef) -> Option<u16> {
    service
        .spec
        .as_ref()?
        .ports
        .as_ref()?
        .iter()
        .find(|p| match port {
            ServicePortRef::Number(n) => p.port == i32::from(*n),
            ServicePortRef::Name(name) => p.name.as_deref() == Some(name.as_str()),
        })
        .and_then(|p| p.node_port)
        .and_then(|p| u16::try_from(p).ok())
        .filter(|p| *p != 0)
}

/// PEM material of a TLS secret. `tls.crt` and `tls.key` are required.
///
/// # Errors
///
/// Returns `Malformed` when a required key is missing, empty or not UTF-8.
pub fn certificate_bundle(
    secret: &Secret,
    what: &str,
) -> Result<CertificateBundle, ReconcileError> {
    let read = |key: &str| -> Result<Option<String>, ReconcileError> {
        let Some(bytes) = secret.data.as_ref().and_then(|d| d.get(key)) else {
            return Ok(None);
        };
        let value = String::from_utf8(bytes.0.clone()).map_err(|_| {
            ReconcileError::Malformed(format!("TLS secret {what}: {key} is not valid UTF-8"))
        })?;
        Ok(Some(value).filter(|v| !v.trim().is_empty()))
    };
    let required = |key: &str| -> Result<String, ReconcileError> {
        read(key)?.ok_or_else(|| {
            ReconcileError::Malformed(format!("TLS secret {what} has no {key}"))
        })
    };

    Ok(CertificateBundle {
        public_certificate: required(SECRET_TLS_CERT)?,
        private_key: required(SECRET_TLS_KEY)?,
        ca_certificate: read(SECRET_CA_CERT)?,
    })
}

#[cfg(test)]
#[path = "ingress_tests.rs"]
mod ingress_tests;
