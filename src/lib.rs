// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! # OCI Ingress Controller
//!
//! A Kubernetes controller that converges an Oracle Cloud Infrastructure load
//! balancer to the routing declared by each Ingress of its class and to the
//! current set of cluster workers.
//!
//! ## Overview
//!
//! - [`builder`] - Pure mapping from an Ingress, config and nodes to a desired load balancer
//! - [`node_index`] - Process-wide view of routable cluster nodes
//! - [`loadbalancer`] - Find/create/update/delete driver and the OCI REST client
//! - [`reconcilers`] - Per-Ingress state machine, status, finalizers and requeue policy
//! - [`ingress_controller`] - kube-rs Controller wiring and the Node watcher
//! - [`config`] - YAML configuration
//! - [`metrics`] - Prometheus metrics
//!
//! ## Example
//!
//! ```rust,no_run
//! use oci_ingress::builder::build;
//! use oci_ingress::config::ControllerConfig;
//! use oci_ingress::model::ServicePorts;
//! use k8s_openapi::api::networking::v1::Ingress;
//!
//! let config = ControllerConfig::from_yaml(
//!     "loadBalancer:\n  compartment: ocid1.compartment.oc1..x\n  subnets: [ocid1.subnet.oc1..y]\n",
//! )
//! .unwrap();
//! let spec = build(&config, &Ingress::default(), &[], &ServicePorts::new());
//! assert_eq!(spec.shape, "100Mbps");
//! ```

pub mod annotations;
pub mod builder;
pub mod cluster;
pub mod config;
pub mod constants;
pub mod context;
pub mod errors;
pub mod ingress_controller;
pub mod loadbalancer;
pub mod metrics;
pub mod model;
pub mod node_index;
pub mod reconcilers;
pub mod status_reasons;
