// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

use anyhow::{Context as _, Result};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use clap::Parser;
use oci_ingress::{
    cluster::KubeCluster,
    config::ControllerConfig,
    constants::{CONTROLLER_NAME, DEFAULT_CONFIG_PATH, DEFAULT_METRICS_ADDR, TOKIO_WORKER_THREADS},
    context::{Context, ManagedIngresses},
    ingress_controller::{run_ingress_controller, run_node_watcher},
    loadbalancer::{oci::OciLoadBalancerClient, AdapterSettings, LoadBalancerAdapter},
    metrics,
    node_index::NodeIndex,
    reconcilers::IngressReconciler,
};
use kube::Client;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Kubernetes Ingress controller for OCI Load Balancing
#[derive(Debug, Parser)]
#[command(name = "oci-ingress-controller", version, about)]
struct Args {
    /// Path to the controller configuration file
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Only watch Ingresses in this namespace (default: all namespaces)
    #[arg(long)]
    namespace: Option<String>,

    /// Bind address for the metrics and health endpoints
    #[arg(long, default_value = DEFAULT_METRICS_ADDR)]
    metrics_addr: SocketAddr,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Build Tokio runtime with custom thread names
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(TOKIO_WORKER_THREADS)
        .thread_name("oci-ingress-controller")
        .enable_all()
        .build()?;

    runtime.block_on(async_main(args))
}

async fn async_main(args: Args) -> Result<()> {
    // Respects RUST_LOG if set, otherwise defaults to INFO level.
    // RUST_LOG_FORMAT=json switches to JSON output.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let log_format = std::env::var("RUST_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    match log_format.to_lowercase().as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .json()
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .with_ansi(true)
                .compact()
                .init();
        }
    }

    info!(controller = CONTROLLER_NAME, "Starting OCI Ingress Controller");

    let config = ControllerConfig::load(&args.config)
        .with_context(|| format!("loading configuration from {}", args.config.display()))?;
    info!(
        cluster = %config.cluster_name,
        ingress_class = %config.ingress_class.name,
        compartment = %config.load_balancer.compartment,
        "Configuration loaded"
    );
    let config = Arc::new(config);

    debug!("Initializing Kubernetes client");
    let client = Client::try_default().await?;
    debug!("Kubernetes client initialized successfully");

    let api = Arc::new(OciLoadBalancerClient::new(&config.api)?);
    let settings = AdapterSettings::from(&config.api)
        .with_home_compartment(config.load_balancer.compartment.clone());
    let adapter = LoadBalancerAdapter::new(api, settings);

    let nodes = Arc::new(NodeIndex::new());
    let managed = Arc::new(ManagedIngresses::new());
    let reconciler = Arc::new(IngressReconciler::new(
        config.clone(),
        Arc::new(KubeCluster::new(client.clone())),
        nodes.clone(),
        adapter,
        managed.clone(),
    ));
    let ctx = Arc::new(Context {
        reconciler,
        nodes,
        managed,
    });

    let (trigger_tx, trigger_rx) = tokio::sync::mpsc::unbounded_channel();

    info!("Starting controllers");

    // Tasks should never exit - if one does, log it and exit the main process
    tokio::select! {
        result = run_ingress_controller(
            client.clone(),
            ctx.clone(),
            args.namespace.clone(),
            trigger_rx,
        ) => {
            error!("CRITICAL: Ingress controller exited unexpectedly: {:?}", result);
            result?;
            anyhow::bail!("Ingress controller exited unexpectedly without error")
        }
        result = run_node_watcher(client.clone(), ctx.clone(), trigger_tx) => {
            error!("CRITICAL: Node watcher exited unexpectedly: {:?}", result);
            result?;
            anyhow::bail!("Node watcher exited unexpectedly without error")
        }
        result = serve_metrics(args.metrics_addr) => {
            error!("CRITICAL: Metrics server exited unexpectedly: {:?}", result);
            result?;
            anyhow::bail!("Metrics server exited unexpectedly without error")
        }
    }
}

/// Serve `/metrics` and `/healthz`.
async fn serve_metrics(addr: SocketAddr) -> Result<()> {
    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(health_handler));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding metrics server to {addr}"))?;
    info!(%addr, "Serving metrics");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn health_handler() -> StatusCode {
    StatusCode::OK
}

async fn metrics_handler() -> Response {
    match metrics::gather_metrics() {
        Ok(body) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}
