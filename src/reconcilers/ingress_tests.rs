// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `ingress.rs`

#[cfg(test)]
mod tests {
    use super::super::{certificate_bundle, node_port, IngressReconciler};
    use crate::annotations::{FINALIZER_LB_CLEANUP, LB_COMPARTMENT};
    use crate::cluster::fake::FakeCluster;
    use crate::config::ControllerConfig;
    use crate::context::ManagedIngresses;
    use crate::errors::{ApiError, ReconcileError};
    use crate::loadbalancer::fake::{FakeLoadBalancerApi, FAKE_ADDRESS};
    use crate::loadbalancer::{AdapterSettings, LoadBalancerAdapter};
    use crate::model::{Backend, IngressRef, NodeInfo, ProvisioningState, ServicePortRef};
    use crate::node_index::{NodeIndex, NodeMembership};
    use crate::reconcilers::requeue::ReconcileOutcome;
    use crate::reconcilers::status::read_conditions;
    use crate::status_reasons::{
        REASON_INVALID_INGRESS, REASON_LOAD_BALANCER_CONFLICT, REASON_LOAD_BALANCER_READY,
        REASON_RETRIES_EXHAUSTED, REASON_TRANSIENT_FAILURE,
    };
    use k8s_openapi::api::core::v1::{Secret, Service, ServicePort, ServiceSpec};
    use k8s_openapi::api::networking::v1::{
        HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule,
        IngressServiceBackend, IngressSpec, IngressTLS, ServiceBackendPort,
    };
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
    use k8s_openapi::ByteString;
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use std::time::Duration;

    const CONFIG: &str = r"
clusterName: test-cluster
loadBalancer:
  compartment: ocid1.compartment.oc1..default
  subnets:
    - ocid1.subnet.oc1.iad.aaaa
";

    const DEFAULT_COMPARTMENT: &str = "ocid1.compartment.oc1..default";
    const OTHER_COMPARTMENT: &str = "ocid1.compartment.oc1..other";

    struct Harness {
        cluster: Arc<FakeCluster>,
        api: Arc<FakeLoadBalancerApi>,
        nodes: Arc<NodeIndex>,
        managed: Arc<ManagedIngresses>,
        reconciler: IngressReconciler,
    }

    fn harness() -> Harness {
        let config = Arc::new(ControllerConfig::from_yaml(CONFIG).unwrap());
        let cluster = Arc::new(FakeCluster::new());
        let api = Arc::new(FakeLoadBalancerApi::new());
        let nodes = Arc::new(NodeIndex::new());
        let managed = Arc::new(ManagedIngresses::new());
        let settings = AdapterSettings {
            max_attempts: 1,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(5),
            call_timeout: Duration::from_secs(5),
            work_request_poll: Duration::from_millis(1),
            work_request_timeout: Duration::from_millis(50),
            home_compartments: Vec::new(),
        }
        .with_home_compartment(DEFAULT_COMPARTMENT);
        let reconciler = IngressReconciler::new(
            config,
            cluster.clone(),
            nodes.clone(),
            LoadBalancerAdapter::new(api.clone(), settings),
            managed.clone(),
        );
        nodes.upsert(NodeInfo {
            name: "node-a".to_string(),
            address: Some("10.0.0.5".to_string()),
            schedulable: true,
            ready: true,
        });
        Harness {
            cluster,
            api,
            nodes,
            managed,
            reconciler,
        }
    }

    fn key() -> IngressRef {
        IngressRef::new("default", "app")
    }

    fn app_ingress() -> Ingress {
        Ingress {
            metadata: ObjectMeta {
                name: Some("app".to_string()),
                namespace: Some("default".to_string()),
                ..Default::default()
            },
            spec: Some(IngressSpec {
                ingress_class_name: Some("oci".to_string()),
                rules: Some(vec![IngressRule {
                    host: None,
                    http: Some(HTTPIngressRuleValue {
                        paths: vec![HTTPIngressPath {
                            path: Some("/".to_string()),
                            path_type: "Prefix".to_string(),
                            backend: IngressBackend {
                                service: Some(IngressServiceBackend {
                                    name: "web".to_string(),
                                    port: Some(ServiceBackendPort {
                                        number: Some(8080),
                                        name: None,
                                    }),
                                }),
                                resource: None,
                            },
                        }],
                    }),
                }]),
                ..Default::default()
            }),
            status: None,
        }
    }

    fn mark_deleting(h: &Harness) {
        let mut deleting = h.cluster.ingress(&key()).unwrap();
        deleting.metadata.deletion_timestamp = Some(Time(k8s_openapi::jiff::Timestamp::now()));
        h.cluster.put_ingress(deleting);
    }

    fn with_tls(mut ingress: Ingress, secret: &str) -> Ingress {
        if let Some(spec) = ingress.spec.as_mut() {
            spec.tls = Some(vec![IngressTLS {
                hosts: None,
                secret_name: Some(secret.to_string()),
            }]);
        }
        ingress
    }

    fn web_service(node_port: i32) -> Service {
        Service {
            metadata: ObjectMeta {
                name: Some("web".to_string()),
                namespace: Some("default".to_string()),
                ..Default::default()
            },
            spec: Some(ServiceSpec {
                ports: Some(vec![ServicePort {
                    name: Some("http".to_string()),
                    port: 8080,
                    node_port: Some(node_port),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            status: None,
        }
    }

    fn tls_secret(name: &str, keys: &[(&str, &str)]) -> Secret {
        let data: BTreeMap<String, ByteString> = keys
            .iter()
            .map(|(k, v)| ((*k).to_string(), ByteString(v.as_bytes().to_vec())))
            .collect();
        Secret {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("default".to_string()),
                ..Default::default()
            },
            data: Some(data),
            type_: Some("kubernetes.io/tls".to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_then_ready_then_no_op() {
        let h = harness();
        h.cluster.put_ingress(app_ingress());

        let first = h.reconciler.reconcile(&key()).await;
        assert!(matches!(first, ReconcileOutcome::Provisioning { .. }));
        assert_eq!(h.api.mutations(), vec!["create"]);
        assert_eq!(h.cluster.finalizers_added(), 1);
        assert!(h.cluster.status_patches().is_empty());
        assert!(h.managed.contains(&key()));

        let lbs = h.api.load_balancers();
        assert_eq!(lbs.len(), 1);
        assert_eq!(
            lbs[0].tags.get("oci-ingress-owner").map(String::as_str),
            Some("test-cluster/default/app")
        );
        assert_eq!(lbs[0].shape, "100Mbps");
        assert!(!lbs[0].is_private);

        h.api.activate_all();
        h.api.clear_mutations();
        let second = h.reconciler.reconcile(&key()).await;
        match second {
            ReconcileOutcome::Ready { addresses, .. } => {
                assert_eq!(addresses, vec![FAKE_ADDRESS.to_string()]);
            }
            other => panic!("expected Ready, got {other:?}"),
        }
        assert_eq!(h.api.mutation_count(), 0);

        let stored = h.cluster.ingress(&key()).unwrap();
        let conditions = read_conditions(&stored);
        assert_eq!(conditions[0].status, "True");
        assert_eq!(conditions[0].reason.as_deref(), Some(REASON_LOAD_BALANCER_READY));
        let published = stored
            .status
            .and_then(|s| s.load_balancer)
            .and_then(|lb| lb.ingress)
            .unwrap();
        assert_eq!(published[0].ip.as_deref(), Some(FAKE_ADDRESS));
        assert_eq!(
            stored.metadata.finalizers,
            Some(vec![FINALIZER_LB_CLEANUP.to_string()])
        );

        let patches = h.cluster.status_patches().len();
        let third = h.reconciler.reconcile(&key()).await;
        assert!(matches!(third, ReconcileOutcome::Ready { .. }));
        assert_eq!(h.api.mutation_count(), 0);
        assert_eq!(h.cluster.status_patches().len(), patches);
    }

    #[tokio::test]
    async fn test_node_removal_removes_single_backend() {
        let h = harness();
        h.cluster.put_ingress(app_ingress());
        h.reconciler.reconcile(&key()).await;
        h.api.activate_all();
        h.api.clear_mutations();

        assert!(h.nodes.remove("node-a"));
        let outcome = h.reconciler.reconcile(&key()).await;

        assert!(matches!(outcome, ReconcileOutcome::Ready { .. }));
        assert_eq!(h.api.mutations(), vec!["remove_backend"]);
        let lb = &h.api.load_balancers()[0];
        assert!(lb.backend_sets.get("web-8080").unwrap().backends.is_empty());
    }

    #[tokio::test]
    async fn test_backends_use_service_node_port() {
        let h = harness();
        h.cluster.put_service("default", web_service(30080));
        h.cluster.put_ingress(app_ingress());

        h.reconciler.reconcile(&key()).await;

        let lb = &h.api.load_balancers()[0];
        let backends: Vec<&Backend> = lb
            .backend_sets
            .get("web-8080")
            .unwrap()
            .backends
            .iter()
            .collect();
        assert_eq!(
            backends,
            vec![&Backend {
                address: "10.0.0.5".to_string(),
                port: 30080
            }]
        );
    }

    #[tokio::test]
    async fn test_missing_tls_secret_is_malformed() {
        let h = harness();
        h.cluster.put_ingress(with_tls(app_ingress(), "app-tls"));

        let outcome = h.reconciler.reconcile(&key()).await;

        assert!(matches!(
            outcome,
            ReconcileOutcome::Failed(ReconcileError::Malformed(_))
        ));
        assert_eq!(h.api.mutation_count(), 0);
        let conditions = read_conditions(&h.cluster.ingress(&key()).unwrap());
        assert_eq!(conditions[0].status, "False");
        assert_eq!(conditions[0].reason.as_deref(), Some(REASON_INVALID_INGRESS));
        assert_eq!(h.reconciler.retry_attempts(&key()), 0);
    }

    #[tokio::test]
    async fn test_tls_secret_is_uploaded_with_create() {
        let h = harness();
        h.cluster.put_secret(
            "default",
            tls_secret("app-tls", &[("tls.crt", "CERT"), ("tls.key", "KEY")]),
        );
        h.cluster.put_ingress(with_tls(app_ingress(), "app-tls"));

        let outcome = h.reconciler.reconcile(&key()).await;

        assert!(matches!(outcome, ReconcileOutcome::Provisioning { .. }));
        let lb = &h.api.load_balancers()[0];
        assert!(lb.certificates.contains("app-tls"));
        assert_eq!(lb.listeners.get("https").unwrap().port, 443);
    }

    #[tokio::test]
    async fn test_deleting_ingress_releases_load_balancer() {
        let h = harness();
        h.cluster.put_ingress(app_ingress());
        h.reconciler.reconcile(&key()).await;
        h.api.activate_all();
        h.api.clear_mutations();

        mark_deleting(&h);

        let outcome = h.reconciler.reconcile(&key()).await;

        assert_eq!(outcome, ReconcileOutcome::Deleted);
        assert_eq!(h.api.mutations(), vec!["delete"]);
        assert_eq!(h.api.load_balancers()[0].state, ProvisioningState::Deleting);
        assert_eq!(h.cluster.finalizers_removed(), 1);
        assert!(!h.managed.contains(&key()));

        let again = h.reconciler.reconcile(&key()).await;
        assert_eq!(again, ReconcileOutcome::Deleted);
        assert_eq!(h.api.mutations(), vec!["delete"]);
    }

    #[tokio::test]
    async fn test_compartment_move_is_conflict_and_delete_finds_original() {
        let h = harness();
        h.cluster.put_ingress(app_ingress());
        h.reconciler.reconcile(&key()).await;
        h.api.activate_all();
        h.api.clear_mutations();

        let mut moved = h.cluster.ingress(&key()).unwrap();
        moved
            .metadata
            .annotations
            .get_or_insert_with(BTreeMap::new)
            .insert(LB_COMPARTMENT.to_string(), OTHER_COMPARTMENT.to_string());
        h.cluster.put_ingress(moved);

        let outcome = h.reconciler.reconcile(&key()).await;
        assert!(matches!(
            outcome,
            ReconcileOutcome::Failed(ReconcileError::Conflict(_))
        ));
        assert_eq!(h.api.mutation_count(), 0);
        assert_eq!(h.api.load_balancers().len(), 1);
        let conditions = read_conditions(&h.cluster.ingress(&key()).unwrap());
        assert_eq!(
            conditions[0].reason.as_deref(),
            Some(REASON_LOAD_BALANCER_CONFLICT)
        );

        mark_deleting(&h);
        let outcome = h.reconciler.reconcile(&key()).await;

        assert_eq!(outcome, ReconcileOutcome::Deleted);
        assert_eq!(h.api.mutations(), vec!["delete"]);
        let lbs = h.api.load_balancers();
        assert_eq!(lbs.len(), 1);
        assert_eq!(lbs[0].compartment, DEFAULT_COMPARTMENT);
        assert_eq!(lbs[0].state, ProvisioningState::Deleting);
        assert_eq!(h.cluster.finalizers_removed(), 1);
    }

    #[tokio::test]
    async fn test_delete_failure_is_reported_on_ingress() {
        let h = harness();
        h.cluster.put_ingress(app_ingress());
        h.reconciler.reconcile(&key()).await;
        h.api.activate_all();
        h.api.clear_mutations();
        mark_deleting(&h);
        h.api.fail_next(
            "delete",
            ApiError::Status {
                status: 409,
                code: "Conflict".to_string(),
                message: "load balancer is locked".to_string(),
            },
        );

        let outcome = h.reconciler.reconcile(&key()).await;

        assert!(matches!(
            outcome,
            ReconcileOutcome::Failed(ReconcileError::Conflict(_))
        ));
        let stored = h.cluster.ingress(&key()).unwrap();
        let conditions = read_conditions(&stored);
        assert_eq!(conditions[0].status, "False");
        assert_eq!(
            conditions[0].reason.as_deref(),
            Some(REASON_LOAD_BALANCER_CONFLICT)
        );
        assert_eq!(h.cluster.finalizers_removed(), 0);
        assert_eq!(
            stored.metadata.finalizers,
            Some(vec![FINALIZER_LB_CLEANUP.to_string()])
        );
        assert!(h.managed.contains(&key()));
    }

    #[tokio::test]
    async fn test_repeated_failure_with_new_details_writes_status_once() {
        let h = harness();
        h.cluster.put_ingress(app_ingress());
        for request_id in ["opc-request-id 1111", "opc-request-id 2222"] {
            h.api.fail_next(
                "find",
                ApiError::Status {
                    status: 503,
                    code: "ServiceUnavailable".to_string(),
                    message: request_id.to_string(),
                },
            );
            let outcome = h.reconciler.reconcile(&key()).await;
            assert!(matches!(
                outcome,
                ReconcileOutcome::Failed(ReconcileError::Transient(_))
            ));
        }

        assert_eq!(h.reconciler.retry_attempts(&key()), 2);
        assert_eq!(h.cluster.status_patches().len(), 1);
        let conditions = read_conditions(&h.cluster.ingress(&key()).unwrap());
        assert_eq!(conditions[0].reason.as_deref(), Some(REASON_TRANSIENT_FAILURE));
        assert!(conditions[0]
            .message
            .as_deref()
            .is_some_and(|m| m.contains("1111")));
    }

    #[tokio::test]
    async fn test_missing_ingress_without_load_balancer_is_deleted() {
        let h = harness();

        let outcome = h.reconciler.reconcile(&key()).await;

        assert_eq!(outcome, ReconcileOutcome::Deleted);
        assert_eq!(h.api.mutation_count(), 0);
    }

    #[tokio::test]
    async fn test_vanished_ingress_releases_load_balancer() {
        let h = harness();
        h.cluster.put_ingress(app_ingress());
        h.reconciler.reconcile(&key()).await;
        h.api.clear_mutations();

        h.cluster.remove_ingress(&key());
        let outcome = h.reconciler.reconcile(&key()).await;

        assert_eq!(outcome, ReconcileOutcome::Deleted);
        assert_eq!(h.api.mutations(), vec!["delete"]);
        assert_eq!(h.cluster.finalizers_removed(), 0);
        assert!(!h.managed.contains(&key()));
    }

    #[tokio::test]
    async fn test_failed_load_balancer_is_reported_as_conflict() {
        let h = harness();
        h.cluster.put_ingress(app_ingress());
        h.reconciler.reconcile(&key()).await;
        let id = h.api.load_balancers()[0].id.clone();
        h.api.set_state(&id, ProvisioningState::Failed);

        let outcome = h.reconciler.reconcile(&key()).await;

        assert!(matches!(
            outcome,
            ReconcileOutcome::Failed(ReconcileError::Conflict(_))
        ));
        let conditions = read_conditions(&h.cluster.ingress(&key()).unwrap());
        assert_eq!(conditions[0].status, "False");
        assert_eq!(
            conditions[0].reason.as_deref(),
            Some(REASON_LOAD_BALANCER_CONFLICT)
        );
        assert_eq!(h.reconciler.retry_attempts(&key()), 0);
    }

    #[tokio::test]
    async fn test_foreign_class_is_ignored_without_calls() {
        let h = harness();
        let mut ingress = app_ingress();
        if let Some(spec) = ingress.spec.as_mut() {
            spec.ingress_class_name = Some("nginx".to_string());
        }
        h.cluster.put_ingress(ingress);

        let outcome = h.reconciler.reconcile(&key()).await;

        assert_eq!(outcome, ReconcileOutcome::Deleted);
        assert_eq!(h.api.lookup_count(), 0);
        assert_eq!(h.cluster.finalizers_added(), 0);
        assert!(!h.managed.contains(&key()));
    }

    #[tokio::test]
    async fn test_class_change_releases_managed_ingress() {
        let h = harness();
        h.cluster.put_ingress(app_ingress());
        h.reconciler.reconcile(&key()).await;
        h.api.clear_mutations();

        let mut moved = h.cluster.ingress(&key()).unwrap();
        if let Some(spec) = moved.spec.as_mut() {
            spec.ingress_class_name = Some("nginx".to_string());
        }
        h.cluster.put_ingress(moved);

        let outcome = h.reconciler.reconcile(&key()).await;

        assert_eq!(outcome, ReconcileOutcome::Deleted);
        assert_eq!(h.api.mutations(), vec!["delete"]);
        assert_eq!(h.cluster.finalizers_removed(), 1);
    }

    #[tokio::test]
    async fn test_transient_failures_are_counted_and_reset() {
        let h = harness();
        h.cluster.put_ingress(app_ingress());
        h.api.fail_next(
            "find",
            ApiError::Timeout {
                operation: "find",
                timeout: Duration::from_secs(30),
            },
        );

        let outcome = h.reconciler.reconcile(&key()).await;
        assert!(matches!(
            outcome,
            ReconcileOutcome::Failed(ReconcileError::Transient(_))
        ));
        assert_eq!(h.reconciler.retry_attempts(&key()), 1);
        let conditions = read_conditions(&h.cluster.ingress(&key()).unwrap());
        assert_eq!(conditions[0].reason.as_deref(), Some(REASON_TRANSIENT_FAILURE));

        let outcome = h.reconciler.reconcile(&key()).await;
        assert!(matches!(outcome, ReconcileOutcome::Provisioning { .. }));
        assert_eq!(h.reconciler.retry_attempts(&key()), 0);
    }

    #[tokio::test]
    async fn test_retries_exhausted_is_reported() {
        let h = harness();
        h.cluster.put_ingress(app_ingress());
        for _ in 0..9 {
            h.api.fail_next(
                "find",
                ApiError::Transport("connection reset".to_string()),
            );
            h.reconciler.reconcile(&key()).await;
        }

        assert_eq!(h.reconciler.retry_attempts(&key()), 9);
        let conditions = read_conditions(&h.cluster.ingress(&key()).unwrap());
        assert_eq!(conditions[0].reason.as_deref(), Some(REASON_RETRIES_EXHAUSTED));
    }

    #[tokio::test]
    async fn test_status_write_failure_is_best_effort() {
        let h = harness();
        h.cluster.put_ingress(with_tls(app_ingress(), "missing"));
        h.cluster
            .fail_next_status_write(ReconcileError::Transient("apiserver down".to_string()));

        let outcome = h.reconciler.reconcile(&key()).await;

        assert!(matches!(
            outcome,
            ReconcileOutcome::Failed(ReconcileError::Malformed(_))
        ));
    }

    #[test]
    fn test_node_port_by_number_and_name() {
        let service = web_service(30080);
        assert_eq!(node_port(&service, &ServicePortRef::Number(8080)), Some(30080));
        assert_eq!(
            node_port(&service, &ServicePortRef::Name("http".to_string())),
            Some(30080)
        );
        assert_eq!(node_port(&service, &ServicePortRef::Number(9090)), None);
        assert_eq!(node_port(&web_service(0), &ServicePortRef::Number(8080)), None);
    }

    #[test]
    fn test_certificate_bundle_requires_cert_and_key() {
        let full = tls_secret(
            "app-tls",
            &[("tls.crt", "CERT"), ("tls.key", "KEY"), ("ca.crt", "CA")],
        );
        let bundle = certificate_bundle(&full, "default/app-tls").unwrap();
        assert_eq!(bundle.public_certificate, "CERT");
        assert_eq!(bundle.private_key, "KEY");
        assert_eq!(bundle.ca_certificate.as_deref(), Some("CA"));

        let no_key = tls_secret("app-tls", &[("tls.crt", "CERT")]);
        assert!(matches!(
            certificate_bundle(&no_key, "default/app-tls"),
            Err(ReconcileError::Malformed(_))
        ));

        let empty_cert = tls_secret("app-tls", &[("tls.crt", " "), ("tls.key", "KEY")]);
        assert!(certificate_bundle(&empty_cert, "default/app-tls").is_err());
    }
}
