// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Shared context for the Ingress controller and the Node watcher.
//!
//! Both tasks receive an `Arc<Context>` that contains:
//! - the Ingress reconciler (config, cluster access, load balancer adapter)
//! - the Node membership index
//! - the set of Ingresses currently managed, used for Node fan-out
//!
//! The node index and the managed set are the only mutable state shared between
//! concurrent reconciles. Neither lock is held across an `.await`.

use crate::model::IngressRef;
use crate::node_index::NodeIndex;
use crate::reconcilers::ingress::IngressReconciler;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, PoisonError};

/// Shared context passed to the controller tasks.
#[derive(Clone)]
pub struct Context {
    /// Reconciles one Ingress against the cloud load balancer
    pub reconciler: Arc<IngressReconciler>,

    /// Routable cluster workers, kept current by the Node watcher
    pub nodes: Arc<NodeIndex>,

    /// Ingresses re-enqueued whenever routable membership changes
    pub managed: Arc<ManagedIngresses>,
}

/// In-memory set of the Ingresses this controller currently manages.
///
/// Populated from reconciles, not from the API, so it is empty right after a
/// restart until the initial Ingress list has been reconciled.
#[derive(Debug, Default)]
pub struct ManagedIngresses {
    keys: Mutex<BTreeSet<IngressRef>>,
}

impl ManagedIngresses {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Track `key`. Returns `true` if it was not tracked before.
    pub fn insert(&self, key: &IngressRef) -> bool {
        self.lock().insert(key.clone())
    }

    /// Stop tracking `key`. Returns `true` if it was tracked.
    pub fn remove(&self, key: &IngressRef) -> bool {
        self.lock().remove(key)
    }

    #[must_use]
    pub fn contains(&self, key: &IngressRef) -> bool {
        self.lock().contains(key)
    }

    /// Point-in-time copy of the tracked keys, in order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<IngressRef> {
        self.lock().iter().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeSet<IngressRef>> {
        self.keys.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod context_tests;
