// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `ingress_controller.rs`

#[cfg(test)]
mod tests {
    use super::super::{fan_out, NodeRelist};
    use crate::context::ManagedIngresses;
    use crate::model::IngressRef;
    use crate::node_index::{NodeIndex, NodeMembership};
    use k8s_openapi::api::core::v1::{Node, NodeAddress, NodeCondition, NodeSpec, NodeStatus};
    use k8s_openapi::api::networking::v1::Ingress;
    use kube::api::ObjectMeta;
    use kube::runtime::reflector::ObjectRef;
    use kube::runtime::watcher::Event;
    use tokio::sync::mpsc;

    fn node(name: &str, address: Option<&str>, ready: bool) -> Node {
        Node {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..ObjectMeta::default()
            },
            spec: Some(NodeSpec {
                unschedulable: Some(false),
                ..NodeSpec::default()
            }),
            status: Some(NodeStatus {
                addresses: address.map(|a| {
                    vec![NodeAddress {
                        address: a.to_string(),
                        type_: "InternalIP".to_string(),
                    }]
                }),
                conditions: Some(vec![NodeCondition {
                    type_: "Ready".to_string(),
                    status: if ready { "True" } else { "False" }.to_string(),
                    ..NodeCondition::default()
                }]),
                ..NodeStatus::default()
            }),
        }
    }

    #[test]
    fn test_apply_and_delete_report_routable_changes() {
        let nodes = NodeIndex::new();
        let mut relist = NodeRelist::default();

        assert!(relist.handle(&nodes, Event::Apply(node("node-a", Some("10.0.0.5"), true))));
        assert!(!relist.handle(&nodes, Event::Apply(node("node-a", Some("10.0.0.5"), true))));
        assert!(relist.handle(&nodes, Event::Apply(node("node-a", Some("10.0.0.5"), false))));
        assert!(!relist.handle(&nodes, Event::Delete(node("node-a", Some("10.0.0.5"), false))));
        assert!(nodes.snapshot().is_empty());
    }

    #[test]
    fn test_unaddressed_node_is_not_routable() {
        let nodes = NodeIndex::new();
        let mut relist = NodeRelist::default();

        assert!(!relist.handle(&nodes, Event::Apply(node("node-b", None, true))));
        assert_eq!(nodes.routable_count(), 0);
        assert!(nodes.snapshot().is_empty());
    }

    #[test]
    fn test_relist_folds_changes_and_drops_missing_nodes() {
        let nodes = NodeIndex::new();
        let mut relist = NodeRelist::default();
        relist.handle(&nodes, Event::Apply(node("node-a", Some("10.0.0.5"), true)));
        relist.handle(&nodes, Event::Apply(node("node-b", Some("10.0.0.6"), true)));

        assert!(!relist.handle(&nodes, Event::Init));
        assert!(!relist.handle(&nodes, Event::InitApply(node("node-a", Some("10.0.0.5"), true))));
        assert!(relist.handle(&nodes, Event::InitDone));

        let names: Vec<String> = nodes.snapshot().into_iter().map(|n| n.name).collect();
        assert_eq!(names, vec!["node-a"]);
    }

    #[test]
    fn test_unchanged_relist_does_not_fan_out() {
        let nodes = NodeIndex::new();
        let mut relist = NodeRelist::default();
        relist.handle(&nodes, Event::Apply(node("node-a", Some("10.0.0.5"), true)));

        relist.handle(&nodes, Event::Init);
        relist.handle(&nodes, Event::InitApply(node("node-a", Some("10.0.0.5"), true)));
        assert!(!relist.handle(&nodes, Event::InitDone));
    }

    #[test]
    fn test_fan_out_enqueues_every_managed_ingress() {
        let managed = ManagedIngresses::new();
        managed.insert(&IngressRef::new("default", "app"));
        managed.insert(&IngressRef::new("prod", "api"));
        let (tx, mut rx) = mpsc::unbounded_channel::<ObjectRef<Ingress>>();

        assert_eq!(fan_out(&managed, &tx), 2);

        let first = rx.try_recv().unwrap();
        assert_eq!(first.name, "app");
        assert_eq!(first.namespace.as_deref(), Some("default"));
        let second = rx.try_recv().unwrap();
        assert_eq!(second.name, "api");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_fan_out_stops_when_controller_is_gone() {
        let managed = ManagedIngresses::new();
        managed.insert(&IngressRef::new("default", "app"));
        let (tx, rx) = mpsc::unbounded_channel::<ObjectRef<Ingress>>();
        drop(rx);

        assert_eq!(fan_out(&managed, &tx), 0);
    }
}
