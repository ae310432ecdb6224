// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Node membership index shared by all reconciles.
//!
//! The index is the only mutable state shared across concurrent reconciles. It is
//! written by the Node watcher and read by every Ingress reconcile through
//! [`NodeMembership::snapshot`].
//!
//! Writers copy the map, modify the copy and swap the `Arc` under the write lock.
//! Readers only clone the `Arc` under the read lock, so a snapshot is a consistent
//! point-in-time view and waits at most for a pointer swap.

use crate::model::NodeInfo;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, PoisonError, RwLock};

/// Narrow interface over the node set, so reconcilers can be handed a fixture.
pub trait NodeMembership: Send + Sync {
    /// Insert or replace a node. Returns `true` when the set of routable
    /// backends changed (a node gained or lost routability or its address changed).
    fn upsert(&self, node: NodeInfo) -> bool;

    /// Remove a node by name. Returns `true` when a routable node was removed.
    fn remove(&self, name: &str) -> bool;

    /// Nodes with a known address, ordered by name.
    fn snapshot(&self) -> Vec<NodeInfo>;
}

/// Copy-on-write node index.
#[derive(Debug, Default)]
pub struct NodeIndex {
    nodes: RwLock<Arc<BTreeMap<String, NodeInfo>>>,
}

impl NodeIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of nodes currently routable.
    #[must_use]
    pub fn routable_count(&self) -> usize {
        self.current().values().filter(|n| n.is_routable()).count()
    }

    /// Drop every node not in `names`. Used after a watcher re-list, where
    /// deletions that happened while disconnected are not delivered as events.
    /// Returns `true` when a routable node was dropped.
    pub fn retain_only(&self, names: &BTreeSet<String>) -> bool {
        self.modify(|map| {
            let before = routable_view(map);
            map.retain(|name, _| names.contains(name));
            before != routable_view(map)
        })
    }

    fn current(&self) -> Arc<BTreeMap<String, NodeInfo>> {
        let guard = self.nodes.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    fn modify<R>(&self, f: impl FnOnce(&mut BTreeMap<String, NodeInfo>) -> R) -> R {
        let mut guard = self.nodes.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = BTreeMap::clone(&guard);
        let result = f(&mut next);
        *guard = Arc::new(next);
        result
    }
}

impl NodeMembership for NodeIndex {
    fn upsert(&self, node: NodeInfo) -> bool {
        self.modify(|map| {
            let before = map.get(&node.name).map(routable_address);
            let after = routable_address(&node);
            map.insert(node.name.clone(), node);
            before.flatten() != after
        })
    }

    fn remove(&self, name: &str) -> bool {
        self.modify(|map| {
            map.remove(name).is_some_and(|removed| removed.is_routable())
        })
    }

    fn snapshot(&self) -> Vec<NodeInfo> {
        self.current()
            .values()
            .filter(|n| n.address.is_some())
            .cloned()
            .collect()
    }
}

fn routable_address(node: &NodeInfo) -> Option<String> {
    if node.is_routable() {
        node.address.clone()
    } else {
        None
    }
}

fn routable_view(map: &BTreeMap<String, NodeInfo>) -> BTreeMap<String, String> {
    map.iter()
        .filter_map(|(name, node)| routable_address(node).map(|addr| (name.clone(), addr)))
        .collect()
}

#[cfg(test)]
#[path = "node_index_tests.rs"]
mod node_index_tests;
