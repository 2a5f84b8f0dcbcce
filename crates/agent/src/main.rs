//! Node inventory agent
//!
//! Long-lived agent that periodically polls the cluster API for node
//! metadata and fans the derived record sets out to their downstream
//! destinations.

use agent_lib::{
    collector::{CollectionLoop, Collector, JsonLineRouter},
    health::{components, HealthRegistry},
    kube::InClusterNodesClient,
    observability::{CollectorMetrics, StructuredLogger},
    telemetry::LogTelemetrySink,
};
use anyhow::Result;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;

const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting inventory-agent");

    // Load configuration
    let agent_config = config::AgentConfig::load()?;
    let collector_config = agent_config.collector_config();
    info!(
        cluster = %collector_config.cluster.cluster_name,
        interval_secs = collector_config.run_interval.as_secs(),
        "Agent configured"
    );

    // Initialize health registry
    let health_registry = HealthRegistry::new();
    health_registry.register(components::COLLECTOR).await;
    health_registry.register(components::API_CLIENT).await;
    health_registry.register(components::ROUTER).await;

    // Initialize metrics
    let _metrics = CollectorMetrics::new();

    // Initialize structured logger
    let logger = StructuredLogger::new(&collector_config.cluster.cluster_name);
    logger.log_startup(AGENT_VERSION, &collector_config.inventory_tag);

    // Wire the collection pipeline
    let client = Arc::new(InClusterNodesClient::in_cluster()?);
    let router = Arc::new(JsonLineRouter);
    let sink = Arc::new(LogTelemetrySink);
    let collector = Collector::new(client, router, sink, collector_config);

    // Start the collection loop
    let handle = CollectionLoop::new(collector, health_registry.clone()).start();

    // Mark agent as ready once the loop is running
    health_registry.set_ready(true).await;

    // Start health and metrics server
    let app_state = Arc::new(api::AppState::new(health_registry.clone()));
    let _api_handle = tokio::spawn(api::serve(agent_config.api_port, app_state));

    // Wait for shutdown signal; the in-flight cycle finishes before exit
    tokio::signal::ctrl_c().await?;
    logger.log_shutdown("SIGINT received");
    handle.stop().await;
    info!("Shutdown complete");

    Ok(())
}
