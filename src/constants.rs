// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Global constants for the OCI ingress controller.
//!
//! This module contains all numeric and string constants used throughout the codebase.
//! Constants are organized by category for easy maintenance.

// ============================================================================
// Controller Identity
// ============================================================================

/// Name reported by the controller in logs and events
pub const CONTROLLER_NAME: &str = "oracle-cloud-ingress-controller";

/// Default ingress class handled by this controller
pub const DEFAULT_INGRESS_CLASS: &str = "oci";

/// Default cluster name used in the ownership tag
pub const DEFAULT_CLUSTER_NAME: &str = "default";

// ============================================================================
// Load Balancer Defaults
// ============================================================================

/// Bandwidth classes accepted by the provider, smallest first
pub const AVAILABLE_SHAPES: &[&str] = &["100Mbps", "400Mbps", "8000Mbps"];

/// Default shape: the smallest available bandwidth class
pub const DEFAULT_SHAPE: &str = "100Mbps";

/// Default backend selection policy
pub const DEFAULT_POLICY: &str = "ROUND_ROBIN";

/// Default prefix for generated load balancer display names
pub const DEFAULT_NAME_PREFIX: &str = "k8s-ingress";

/// Default plain HTTP listener port
pub const DEFAULT_HTTP_PORT: u16 = 80;

/// Default TLS listener port
pub const DEFAULT_HTTPS_PORT: u16 = 443;

/// Listener name for plain HTTP traffic
pub const HTTP_LISTENER_NAME: &str = "http";

/// Listener name for TLS traffic
pub const HTTPS_LISTENER_NAME: &str = "https";

/// Listener protocol for both listeners (TLS terminates at the listener)
pub const LISTENER_PROTOCOL: &str = "HTTP";

/// Name of the single path route set generated per Ingress
pub const PATH_ROUTE_SET_NAME: &str = "ingress-routes";

/// Provider limit on backend set name length
pub const MAX_BACKEND_SET_NAME_LEN: usize = 32;

/// Default health check protocol
pub const DEFAULT_HEALTH_CHECK_PROTOCOL: &str = "HTTP";

/// Default health check path
pub const DEFAULT_HEALTH_CHECK_PATH: &str = "/healthz";

/// Default health check port (kube-proxy health endpoint on every node)
pub const DEFAULT_HEALTH_CHECK_PORT: u16 = 10256;

/// Prefix that identifies a compartment OCID
pub const COMPARTMENT_OCID_PREFIX: &str = "ocid1.compartment.";

/// Prefix that identifies a tenancy OCID (the root compartment)
pub const TENANCY_OCID_PREFIX: &str = "ocid1.tenancy.";

// ============================================================================
// Requeue Durations
// ============================================================================

/// Periodic drift check for ready load balancers (5 minutes)
pub const DEFAULT_REQUEUE_DURATION_SECS: u64 = 300;

/// Recheck interval while the load balancer is provisioning (15 seconds)
pub const PROVISIONING_REQUEUE_DURATION_SECS: u64 = 15;

/// First backoff step for transient failures (5 seconds)
pub const TRANSIENT_BACKOFF_BASE_SECS: u64 = 5;

/// Upper bound for the transient failure backoff (5 minutes)
pub const TRANSIENT_BACKOFF_MAX_SECS: u64 = 300;

/// Consecutive transient failures before the key is treated as failed
pub const MAX_TRANSIENT_ATTEMPTS: u32 = 8;

// ============================================================================
// Cloud API Defaults
// ============================================================================

/// Default OCI Load Balancing endpoint
pub const DEFAULT_API_ENDPOINT: &str = "https://iaas.us-ashburn-1.oraclecloud.com";

/// OCI Load Balancing API version path segment
pub const API_VERSION_PATH: &str = "20170115";

/// Per-call deadline for cloud API calls (30 seconds)
pub const DEFAULT_CALL_TIMEOUT_SECS: u64 = 30;

/// Attempts per adapter convergence before giving up on a transient failure
pub const DEFAULT_MAX_ATTEMPTS: u32 = 4;

/// First retry delay inside the adapter (500ms)
pub const DEFAULT_INITIAL_BACKOFF_MILLIS: u64 = 500;

/// Largest retry delay inside the adapter (10 seconds)
pub const DEFAULT_MAX_BACKOFF_SECS: u64 = 10;

/// Interval between work request status polls (2 seconds)
pub const DEFAULT_WORK_REQUEST_POLL_MILLIS: u64 = 2000;

/// Longest wait for one work request before treating it as transient (120 seconds)
pub const DEFAULT_WORK_REQUEST_TIMEOUT_SECS: u64 = 120;

/// Page size for load balancer listing
pub const LIST_PAGE_LIMIT: u32 = 100;

// ============================================================================
// Process Defaults
// ============================================================================

/// Default configuration file path
pub const DEFAULT_CONFIG_PATH: &str = "/etc/oci/config.yaml";

/// Default bind address for the metrics and health server
pub const DEFAULT_METRICS_ADDR: &str = "0.0.0.0:8080";

/// Tokio worker threads for the controller runtime
pub const TOKIO_WORKER_THREADS: usize = 4;
