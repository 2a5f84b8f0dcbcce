//! Observability infrastructure for the inventory agent
//!
//! Provides:
//! - Prometheus metrics for the collection pipeline (cycle latency, page and
//!   record counters, error counters)
//! - Structured lifecycle logging with tracing

use prometheus::{register_histogram, register_int_counter, register_int_gauge, Histogram, IntCounter, IntGauge};
use std::sync::OnceLock;
use tracing::info;

/// Histogram buckets for cycle duration (in seconds). Cycles are dominated
/// by API round-trips, so the range is wide.
const CYCLE_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<CollectorMetricsInner> = OnceLock::new();

/// Inner metrics structure that holds the actual Prometheus metrics
struct CollectorMetricsInner {
    cycle_duration_seconds: Histogram,
    cycles_total: IntCounter,
    cycle_errors_total: IntCounter,
    pages_fetched_total: IntCounter,
    transform_errors_total: IntCounter,
    records_emitted_total: IntCounter,
    nodes_collected: IntGauge,
}

impl CollectorMetricsInner {
    fn new() -> Self {
        Self {
            cycle_duration_seconds: register_histogram!(
                "node_inventory_cycle_duration_seconds",
                "Time spent running one node collection cycle",
                CYCLE_BUCKETS.to_vec()
            )
            .expect("Failed to register cycle_duration_seconds"),

            cycles_total: register_int_counter!(
                "node_inventory_cycles_total",
                "Total number of completed collection cycles"
            )
            .expect("Failed to register cycles_total"),

            cycle_errors_total: register_int_counter!(
                "node_inventory_cycle_errors_total",
                "Total number of collection cycles that ended in an error"
            )
            .expect("Failed to register cycle_errors_total"),

            pages_fetched_total: register_int_counter!(
                "node_inventory_pages_fetched_total",
                "Total number of node list pages fetched from the cluster API"
            )
            .expect("Failed to register pages_fetched_total"),

            transform_errors_total: register_int_counter!(
                "node_inventory_transform_errors_total",
                "Total number of nodes skipped because transformation failed"
            )
            .expect("Failed to register transform_errors_total"),

            records_emitted_total: register_int_counter!(
                "node_inventory_records_emitted_total",
                "Total number of records handed to the downstream router"
            )
            .expect("Failed to register records_emitted_total"),

            nodes_collected: register_int_gauge!(
                "node_inventory_nodes_collected",
                "Number of nodes observed in the most recent cycle"
            )
            .expect("Failed to register nodes_collected"),
        }
    }
}

/// Collector metrics for Prometheus exposition.
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct CollectorMetrics {
    _private: (),
}

impl Default for CollectorMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl CollectorMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(CollectorMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &CollectorMetricsInner {
        GLOBAL_METRICS.get().expect("Metrics not initialized")
    }

    /// Record one completed cycle and its duration
    pub fn observe_cycle(&self, duration_secs: f64) {
        self.inner().cycles_total.inc();
        self.inner().cycle_duration_seconds.observe(duration_secs);
    }

    pub fn inc_cycle_errors(&self) {
        self.inner().cycle_errors_total.inc();
    }

    pub fn inc_pages_fetched(&self) {
        self.inner().pages_fetched_total.inc();
    }

    pub fn inc_transform_errors(&self) {
        self.inner().transform_errors_total.inc();
    }

    pub fn add_records_emitted(&self, count: u64) {
        self.inner().records_emitted_total.inc_by(count);
    }

    pub fn set_nodes_collected(&self, count: i64) {
        self.inner().nodes_collected.set(count);
    }
}

/// Structured logger for agent lifecycle events.
#[derive(Clone)]
pub struct StructuredLogger {
    cluster_name: String,
}

impl StructuredLogger {
    pub fn new(cluster_name: impl Into<String>) -> Self {
        Self {
            cluster_name: cluster_name.into(),
        }
    }

    /// Log agent startup
    pub fn log_startup(&self, version: &str, inventory_tag: &str) {
        info!(
            event = "agent_started",
            cluster = %self.cluster_name,
            agent_version = %version,
            inventory_tag = %inventory_tag,
            "Node inventory agent started"
        );
    }

    /// Log agent shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "agent_shutdown",
            cluster = %self.cluster_name,
            reason = %reason,
            "Node inventory agent shutting down"
        );
    }
}
