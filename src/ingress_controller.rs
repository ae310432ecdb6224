// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Controller wiring: the Ingress controller, the Node watcher and the fan-out
//! between them.
//!
//! The Node watcher keeps the [`NodeIndex`] current. Whenever the set of
//! routable nodes changes, every managed Ingress is pushed onto a channel that
//! the Ingress controller consumes through `reconcile_on`, so backend sets follow
//! cluster membership without waiting for the periodic drift check.

use crate::builder::unaddressed_nodes;
use crate::context::{Context, ManagedIngresses};
use crate::errors::ReconcileError;
use crate::metrics;
use crate::model::{IngressRef, NodeInfo};
use crate::node_index::{NodeIndex, NodeMembership};
use crate::reconcilers::requeue::{decide_requeue, ReconcileOutcome, RequeueDecision};
use anyhow::Result;
use futures::StreamExt;
use k8s_openapi::api::core::v1::Node;
use k8s_openapi::api::networking::v1::Ingress;
use kube::runtime::controller::Action;
use kube::runtime::reflector::ObjectRef;
use kube::runtime::watcher::{self, Config};
use kube::runtime::{Controller, WatchStreamExt};
use kube::{Api, Client, ResourceExt};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};

/// Run the Ingress controller until its watch stream ends.
///
/// `namespace` restricts the watch; `None` watches every namespace. Keys read
/// from `triggers` are reconciled in addition to Ingress watch events.
pub async fn run_ingress_controller(
    client: Client,
    ctx: Arc<Context>,
    namespace: Option<String>,
    triggers: UnboundedReceiver<ObjectRef<Ingress>>,
) -> Result<()> {
    info!(namespace = ?namespace, "Starting Ingress controller");

    let api: Api<Ingress> = match namespace.as_deref() {
        Some(ns) => Api::namespaced(client, ns),
        None => Api::all(client),
    };
    let triggers = futures::stream::unfold(triggers, |mut rx| async move {
        rx.recv().await.map(|key| (key, rx))
    });

    Controller::new(api, Config::default())
        .reconcile_on(triggers)
        .run(reconcile_ingress_wrapper, error_policy, ctx)
        .for_each(|result| {
            match result {
                Ok((object, _)) => debug!(ingress = %object, "Reconciled Ingress"),
                Err(e) => debug!(error = %e, "Ingress reconcile did not complete"),
            }
            futures::future::ready(())
        })
        .await;

    Ok(())
}

/// Reconcile wrapper for `Ingress`.
///
/// Failures are returned as errors so that [`error_policy`] picks the backoff.
async fn reconcile_ingress_wrapper(
    ingress: Arc<Ingress>,
    ctx: Arc<Context>,
) -> Result<Action, ReconcileError> {
    let key = IngressRef::from_ingress(&ingress);
    let outcome = match ctx.reconciler.reconcile(&key).await {
        ReconcileOutcome::Failed(e) => return Err(e),
        outcome => outcome,
    };

    let decision = decide_requeue(&outcome, 0);
    metrics::record_requeue(decision.reason());
    debug!(
        ingress = %key,
        outcome = outcome.as_str(),
        decision = ?decision,
        "Requeue decision"
    );
    Ok(decision.to_action())
}

/// Error policy for the Ingress controller: transient failures back off per key,
/// everything else waits for the Ingress to change.
fn error_policy(ingress: Arc<Ingress>, err: &ReconcileError, ctx: Arc<Context>) -> Action {
    let key = IngressRef::from_ingress(&ingress);
    let attempts = ctx.reconciler.retry_attempts(&key);
    let decision = decide_requeue(&ReconcileOutcome::Failed(err.clone()), attempts);
    metrics::record_requeue(decision.reason());

    match decision {
        RequeueDecision::After { .. } => warn!(
            ingress = %key,
            attempt = attempts,
            decision = ?decision,
            "Requeueing after transient failure"
        ),
        RequeueDecision::AwaitChange { .. } => info!(
            ingress = %key,
            reason = decision.reason(),
            "Waiting for the Ingress to change before retrying"
        ),
    }
    decision.to_action()
}

/// Run the Node watcher until its stream ends.
///
/// Routable membership changes re-enqueue every managed Ingress through
/// `triggers`.
pub async fn run_node_watcher(
    client: Client,
    ctx: Arc<Context>,
    triggers: UnboundedSender<ObjectRef<Ingress>>,
) -> Result<()> {
    info!("Starting Node watcher");

    let api: Api<Node> = Api::all(client);
    let stream = watcher::watcher(api, Config::default()).default_backoff();
    futures::pin_mut!(stream);

    let mut relist = NodeRelist::default();
    while let Some(event) = stream.next().await {
        match event {
            Ok(event) => {
                if relist.handle(&ctx.nodes, event) {
                    let count = fan_out(&ctx.managed, &triggers);
                    info!(
                        ingresses = count,
                        "Routable nodes changed, re-enqueueing Ingresses"
                    );
                }
                metrics::set_routable_nodes(ctx.nodes.routable_count());
            }
            Err(e) => warn!(error = %e, "Node watcher error"),
        }
    }

    Ok(())
}

/// Applies Node watch events to the index.
///
/// Changes seen while a re-list is in progress are folded into one fan-out when
/// the re-list completes; nodes absent from the re-list are dropped.
#[derive(Debug, Default)]
pub struct NodeRelist {
    seen: Option<BTreeSet<String>>,
    changed: bool,
}

impl NodeRelist {
    /// Apply `event`. Returns `true` when every managed Ingress should be
    /// reconciled again.
    pub fn handle(&mut self, nodes: &NodeIndex, event: watcher::Event<Node>) -> bool {
        match event {
            watcher::Event::Apply(node) => apply_node(nodes, &node),
            watcher::Event::Delete(node) => {
                let name = node.name_any();
                debug!(node = %name, "Node deleted");
                nodes.remove(&name)
            }
            watcher::Event::Init => {
                debug!("Node watcher re-list started");
                self.seen = Some(BTreeSet::new());
                self.changed = false;
                false
            }
            watcher::Event::InitApply(node) => {
                if let Some(seen) = self.seen.as_mut() {
                    seen.insert(node.name_any());
                }
                self.changed |= apply_node(nodes, &node);
                false
            }
            watcher::Event::InitDone => {
                let seen = self.seen.take().unwrap_or_default();
                let dropped = nodes.retain_only(&seen);
                info!(nodes = seen.len(), "Node watcher initial sync complete");
                std::mem::take(&mut self.changed) || dropped
            }
        }
    }
}

fn apply_node(nodes: &NodeIndex, node: &Node) -> bool {
    let info = NodeInfo::from_node(node);
    for missing in unaddressed_nodes(std::slice::from_ref(&info)) {
        warn!(
            node = %missing.name,
            "Schedulable node has no InternalIP address; it will not receive traffic"
        );
    }
    debug!(
        node = %info.name,
        ready = info.ready,
        schedulable = info.schedulable,
        "Node updated"
    );
    nodes.upsert(info)
}

/// Push every managed Ingress onto `triggers`. Returns how many were sent.
pub fn fan_out(
    managed: &ManagedIngresses,
    triggers: &UnboundedSender<ObjectRef<Ingress>>,
) -> usize {
    let mut sent = 0;
    for key in managed.snapshot() {
        let object = ObjectRef::new(&key.name).within(&key.namespace);
        if triggers.send(object).is_err() {
            warn!("Ingress controller is gone, dropping Node fan-out");
            break;
        }
        sent += 1;
    }
    sent
}

#[cfg(test)]
#[path = "ingress_controller_tests.rs"]
mod ingress_controller_tests;
