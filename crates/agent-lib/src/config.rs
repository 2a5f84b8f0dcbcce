//! Collector configuration
//!
//! Everything the collection pipeline needs at construction time: the run
//! interval, destination tags, page size, telemetry throttle, cluster
//! identity, the filesystem marker paths, and the environment-derived
//! scalars that annotate telemetry samples. The environment is read once
//! here; nothing in the pipeline consults it afterwards.

use std::path::PathBuf;
use std::time::Duration;

/// Fixed destination tags for the emission fan-out.
///
/// The primary inventory tag is configurable; these are not.
pub mod tags {
    /// Aggregation-system mirror of the inventory batch.
    pub const INVENTORY_MIRROR: &str = "mdm.kubenodeinventory";
    /// Container runtime inventory destination.
    pub const CONTAINER_RUNTIME: &str = "oms.containerinsights.ContainerNodeInventory";
    /// Capacity/allocatable node metrics destination.
    pub const NODE_PERF: &str = "oms.api.KubePerf";
    /// Accelerator metrics destination.
    pub const INSIGHTS_METRICS: &str = "oms.api.InsightsMetrics";
}

/// Default primary destination for node inventory records.
pub const DEFAULT_INVENTORY_TAG: &str = "oms.containerinsights.KubeNodeInventory";

/// Page size requested from the cluster API.
pub const DEFAULT_PAGE_LIMIT: u32 = 400;

/// Minimum minutes between telemetry samples.
pub const DEFAULT_TELEMETRY_INTERVAL_MINS: i64 = 10;

/// Configuration for the node collector.
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// Interval between collection cycles (default: 60 seconds)
    pub run_interval: Duration,
    /// Primary destination tag for inventory records
    pub inventory_tag: String,
    /// Page size for the node list request
    pub page_limit: u32,
    /// Minutes between telemetry samples
    pub telemetry_interval_mins: i64,
    /// Cluster identity stamped onto every record
    pub cluster: ClusterIdentity,
    /// Existence of this file forces the provider to the stack platform id
    pub platform_marker_path: PathBuf,
    /// Existence gates the event-collection telemetry annotations
    pub data_collection_settings_path: PathBuf,
    /// Existence gates the scrape-settings telemetry annotations
    pub prom_settings_path: PathBuf,
    /// Environment snapshot attached to telemetry samples
    pub telemetry_env: TelemetryEnv,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            run_interval: Duration::from_secs(60),
            inventory_tag: DEFAULT_INVENTORY_TAG.to_string(),
            page_limit: DEFAULT_PAGE_LIMIT,
            telemetry_interval_mins: DEFAULT_TELEMETRY_INTERVAL_MINS,
            cluster: ClusterIdentity::default(),
            platform_marker_path: PathBuf::from("/etc/kubernetes/host/azurestackcloud.json"),
            data_collection_settings_path: PathBuf::from(
                "/etc/config/settings/log-data-collection-settings",
            ),
            prom_settings_path: PathBuf::from(
                "/etc/config/settings/prometheus-data-collection-settings",
            ),
            telemetry_env: TelemetryEnv::default(),
        }
    }
}

/// Identity of the cluster this agent runs in.
#[derive(Debug, Clone, Default)]
pub struct ClusterIdentity {
    pub cluster_name: String,
    pub cluster_id: String,
}

impl ClusterIdentity {
    /// Resolve the identity from the environment.
    ///
    /// A managed-cluster resource id wins; its last path segment is the
    /// cluster name. Falls back to the bare resource-name variable.
    pub fn from_env() -> Self {
        match std::env::var("AKS_RESOURCE_ID") {
            Ok(resource_id) if !resource_id.is_empty() => {
                let cluster_name = resource_id
                    .rsplit('/')
                    .next()
                    .unwrap_or_default()
                    .to_string();
                Self {
                    cluster_name,
                    cluster_id: resource_id,
                }
            }
            _ => {
                let name =
                    std::env::var("ACS_RESOURCE_NAME").unwrap_or_else(|_| "unknown".to_string());
                Self {
                    cluster_id: name.clone(),
                    cluster_name: name,
                }
            }
        }
    }
}

/// Environment-derived scalars that only ever annotate telemetry samples.
///
/// They never affect transformation or scheduling.
#[derive(Debug, Clone, Default)]
pub struct TelemetryEnv {
    pub prom_interval: Option<String>,
    pub prom_fieldpass_count: Option<String>,
    pub prom_fielddrop_count: Option<String>,
    pub prom_service_count: Option<String>,
    pub prom_url_count: Option<String>,
    pub prom_monitor_pods: Option<String>,
    pub prom_monitor_pods_ns_count: Option<String>,
    pub collect_all_events: Option<String>,
}

impl TelemetryEnv {
    pub fn from_env() -> Self {
        Self {
            prom_interval: env_opt("TELEMETRY_RS_PROM_INTERVAL"),
            prom_fieldpass_count: env_opt("TELEMETRY_RS_PROM_FIELDPASS_LENGTH"),
            prom_fielddrop_count: env_opt("TELEMETRY_RS_PROM_FIELDDROP_LENGTH"),
            prom_service_count: env_opt("TELEMETRY_RS_PROM_K8S_SERVICES_LENGTH"),
            prom_url_count: env_opt("TELEMETRY_RS_PROM_URLS_LENGTH"),
            prom_monitor_pods: env_opt("TELEMETRY_RS_PROM_MONITOR_PODS"),
            prom_monitor_pods_ns_count: env_opt("TELEMETRY_RS_PROM_MONITOR_PODS_NS_LENGTH"),
            collect_all_events: env_opt("AZMON_CLUSTER_COLLECT_ALL_KUBE_EVENTS"),
        }
    }
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collector_config_defaults() {
        let config = CollectorConfig::default();
        assert_eq!(config.run_interval, Duration::from_secs(60));
        assert_eq!(config.inventory_tag, DEFAULT_INVENTORY_TAG);
        assert_eq!(config.page_limit, 400);
        assert_eq!(config.telemetry_interval_mins, 10);
    }

    #[test]
    fn cluster_identity_prefers_resource_id() {
        // Serialize env mutation; from_env reads the process environment.
        std::env::set_var(
            "AKS_RESOURCE_ID",
            "/subscriptions/x/resourceGroups/rg/providers/Microsoft.ContainerService/managedClusters/my-cluster",
        );
        let identity = ClusterIdentity::from_env();
        assert_eq!(identity.cluster_name, "my-cluster");
        assert!(identity.cluster_id.starts_with("/subscriptions/"));
        std::env::remove_var("AKS_RESOURCE_ID");
    }
}
