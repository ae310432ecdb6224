// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Prometheus metrics for the OCI Ingress controller.
//!
//! All metrics carry the prefix `oci_ingress_`.
//!
//! # Metrics Categories
//!
//! - **Reconciliation Metrics** - Ingress reconcile outcomes, durations and requeues
//! - **Cloud API Metrics** - Calls to the load balancer API by operation and outcome
//! - **Inventory Metrics** - Managed Ingresses and routable nodes
//!
//! # Example
//!
//! ```rust,no_run
//! use oci_ingress::metrics::record_reconciliation_success;
//!
//! record_reconciliation_success(std::time::Duration::from_secs(1));
//! ```

use prometheus::core::Collector;
use prometheus::{
    CounterVec, Encoder, Gauge, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};
use std::sync::LazyLock;
use std::time::Duration;

/// Namespace prefix for all controller metrics
const METRICS_NAMESPACE: &str = "oci_ingress";

/// Global Prometheus metrics registry, exposed on `/metrics`
pub static METRICS_REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

/// Register `collector` on [`METRICS_REGISTRY`] and hand it back.
///
/// Metric names are fixed, so a registration failure is a programming error.
fn registered<C: Collector + Clone + 'static>(collector: C) -> C {
    METRICS_REGISTRY
        .register(Box::new(collector.clone()))
        .expect("metric names are unique");
    collector
}

fn counter(name: &str, help: &str, labels: &[&str]) -> CounterVec {
    let opts = Opts::new(format!("{METRICS_NAMESPACE}_{name}"), help);
    registered(CounterVec::new(opts, labels).expect("valid counter options"))
}

fn histogram(name: &str, help: &str, labels: &[&str], buckets: &[f64]) -> HistogramVec {
    let opts =
        HistogramOpts::new(format!("{METRICS_NAMESPACE}_{name}"), help).buckets(buckets.to_vec());
    registered(HistogramVec::new(opts, labels).expect("valid histogram options"))
}

fn gauge(name: &str, help: &str) -> Gauge {
    let gauge = Gauge::new(format!("{METRICS_NAMESPACE}_{name}"), help);
    registered(gauge.expect("valid gauge options"))
}

/// Total number of Ingress reconciliations by outcome
///
/// Labels:
/// - `status`: `ready`, `provisioning`, `deleted`, `error`
pub static RECONCILIATION_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    counter(
        "reconciliations_total",
        "Total number of Ingress reconciliations by outcome",
        &["status"],
    )
});

/// Duration of Ingress reconciliations in seconds
pub static RECONCILIATION_DURATION_SECONDS: LazyLock<HistogramVec> = LazyLock::new(|| {
    histogram(
        "reconciliation_duration_seconds",
        "Duration of Ingress reconciliations in seconds",
        &["status"],
        &[0.01, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0, 120.0],
    )
});

/// Total number of requeues by reason
///
/// Labels:
/// - `reason`: `drift_check`, `provisioning`, `transient`, `retries_exhausted`, `deleted` or an error class
pub static REQUEUE_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    counter(
        "requeues_total",
        "Total number of requeue decisions by reason",
        &["reason"],
    )
});

/// Total number of reconcile failures by error class
pub static ERRORS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    counter(
        "errors_total",
        "Total number of reconcile failures by error class",
        &["error_class"],
    )
});

/// Total number of load balancer API calls
///
/// Labels:
/// - `operation`: `find`, `get`, `create`, `delete`, `work_request` or a change kind
/// - `outcome`: `success` or an error class
pub static LB_API_CALLS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    counter(
        "lb_api_calls_total",
        "Total number of load balancer API calls by operation and outcome",
        &["operation", "outcome"],
    )
});

/// Latency of load balancer API calls in seconds
pub static LB_API_CALL_DURATION_SECONDS: LazyLock<HistogramVec> = LazyLock::new(|| {
    histogram(
        "lb_api_call_duration_seconds",
        "Latency of load balancer API calls in seconds by operation",
        &["operation"],
        &[0.05, 0.1, 0.25, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0],
    )
});

/// Load balancer lifecycle events
///
/// Labels:
/// - `event`: `created`, `updated`, `deleted`
pub static LOAD_BALANCER_EVENTS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    counter(
        "load_balancer_events_total",
        "Total number of load balancer lifecycle events",
        &["event"],
    )
});

/// Ingresses that currently own a load balancer
pub static MANAGED_INGRESSES: LazyLock<Gauge> = LazyLock::new(|| {
    gauge(
        "managed_ingresses",
        "Number of Ingresses currently managed by this controller",
    )
});

/// Nodes eligible as load balancer backends
pub static ROUTABLE_NODES: LazyLock<Gauge> = LazyLock::new(|| {
    gauge(
        "routable_nodes",
        "Number of schedulable, ready nodes with an internal address",
    )
});

fn record_reconciliation(status: &str, duration: Duration) {
    RECONCILIATION_TOTAL.with_label_values(&[status]).inc();
    RECONCILIATION_DURATION_SECONDS
        .with_label_values(&[status])
        .observe(duration.as_secs_f64());
}

/// Record a reconciliation that left the load balancer active
pub fn record_reconciliation_success(duration: Duration) {
    record_reconciliation("ready", duration);
}

/// Record a reconciliation still waiting on provisioning
pub fn record_reconciliation_provisioning(duration: Duration) {
    record_reconciliation("provisioning", duration);
}

/// Record a reconciliation that finished a deletion
pub fn record_reconciliation_deleted(duration: Duration) {
    record_reconciliation("deleted", duration);
}

/// Record a failed reconciliation
///
/// # Arguments
/// * `error_class` - Class label of the failure (e.g., `transient`)
/// * `duration` - Duration of the reconciliation before failure
pub fn record_reconciliation_error(error_class: &str, duration: Duration) {
    record_reconciliation("error", duration);
    ERRORS_TOTAL.with_label_values(&[error_class]).inc();
}

/// Record a requeue decision
pub fn record_requeue(reason: &str) {
    REQUEUE_TOTAL.with_label_values(&[reason]).inc();
}

/// Record one load balancer API call
///
/// # Arguments
/// * `operation` - API operation name
/// * `outcome` - `success` or the error class label
/// * `duration` - Call latency
pub fn record_api_call(operation: &str, outcome: &str, duration: Duration) {
    LB_API_CALLS_TOTAL
        .with_label_values(&[operation, outcome])
        .inc();
    LB_API_CALL_DURATION_SECONDS
        .with_label_values(&[operation])
        .observe(duration.as_secs_f64());
}

/// Record a load balancer lifecycle event (`created`, `updated`, `deleted`)
pub fn record_load_balancer_event(event: &str) {
    LOAD_BALANCER_EVENTS_TOTAL.with_label_values(&[event]).inc();
}

/// Set the number of managed Ingresses
#[allow(clippy::cast_precision_loss)]
pub fn set_managed_ingresses(count: usize) {
    MANAGED_INGRESSES.set(count as f64);
}

/// Set the number of routable nodes
#[allow(clippy::cast_precision_loss)]
pub fn set_routable_nodes(count: usize) {
    ROUTABLE_NODES.set(count as f64);
}

/// Gather and encode all metrics in Prometheus text format
///
/// # Errors
/// Returns error if encoding fails
pub fn gather_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = METRICS_REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(format!("UTF-8 error: {e}")))
}
