//! Per-node transformation rules
//!
//! Pure derivations from a raw node object to the typed record set. All the
//! optional-field handling of the semi-structured API payload is
//! concentrated here; the rest of the pipeline only sees fully-built records
//! or a per-node `TransformError`.

use crate::config::ClusterIdentity;
use crate::error::TransformError;
use crate::models::{
    AcceleratorMetric, ContainerRuntimeRecord, Node, NodeInventoryRecord, NodePerfMetric,
};
use std::collections::BTreeMap;
use std::path::Path;

/// Provider id reported when the platform marker file is present.
pub const PLATFORM_STACK_PROVIDER: &str = "azurestack";
/// Provider id reported when the node carries no provider at all.
pub const ON_PREM_PROVIDER: &str = "onprem";

pub const METRIC_CPU_ALLOCATABLE: &str = "cpuAllocatableNanoCores";
pub const METRIC_MEMORY_ALLOCATABLE: &str = "memoryAllocatableBytes";
pub const METRIC_CPU_CAPACITY: &str = "cpuCapacityNanoCores";
pub const METRIC_MEMORY_CAPACITY: &str = "memoryCapacityBytes";
pub const METRIC_GPU_ALLOCATABLE: &str = "nodeGpuAllocatable";
pub const METRIC_GPU_CAPACITY: &str = "nodeGpuCapacity";

pub const NVIDIA_GPU_RESOURCE: &str = "nvidia.com/gpu";
pub const AMD_GPU_RESOURCE: &str = "amd.com/gpu";

/// Which side of the resource accounting a metric reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Allocatable,
    Capacity,
}

/// Cycle-constant inputs to the transformation.
#[derive(Debug, Clone)]
pub struct TransformContext<'a> {
    /// Shared collection time for every record of the cycle
    pub batch_time: &'a str,
    pub cluster: &'a ClusterIdentity,
    pub platform_marker: &'a Path,
}

/// Everything derived from one node.
#[derive(Debug, Clone)]
pub struct TransformedNode {
    pub inventory: NodeInventoryRecord,
    pub runtime: ContainerRuntimeRecord,
    pub resources: NodeResources,
}

/// Slim per-node resource snapshot kept for metric derivation.
#[derive(Debug, Clone, Default)]
pub struct NodeResources {
    pub computer: String,
    pub allocatable: BTreeMap<String, String>,
    pub capacity: BTreeMap<String, String>,
}

impl NodeResources {
    fn side(&self, kind: ResourceKind) -> &BTreeMap<String, String> {
        match kind {
            ResourceKind::Allocatable => &self.allocatable,
            ResourceKind::Capacity => &self.capacity,
        }
    }
}

/// Derive the full record set for one node.
///
/// Only a missing node name fails; every other absent field degrades to an
/// empty value. Pure: the same node yields identical records on every call.
pub fn transform_node(node: &Node, ctx: &TransformContext<'_>) -> Result<TransformedNode, TransformError> {
    let computer = node
        .metadata
        .name
        .as_deref()
        .filter(|name| !name.is_empty())
        .ok_or(TransformError::MissingField("metadata.name"))?
        .to_string();

    let (status, last_transition_time_ready) = condition_status(node);
    let node_info = node.status.node_info.as_ref();

    let inventory = NodeInventoryRecord {
        collection_time: ctx.batch_time.to_string(),
        computer: computer.clone(),
        cluster_name: ctx.cluster.cluster_name.clone(),
        cluster_id: ctx.cluster.cluster_id.clone(),
        creation_time_stamp: node
            .metadata
            .creation_timestamp
            .clone()
            .unwrap_or_default(),
        labels: node.metadata.labels.clone(),
        status,
        last_transition_time_ready,
        kubernetes_provider_id: provider_id(
            node.spec.provider_id.as_deref(),
            ctx.platform_marker,
        ),
        kubelet_version: info_field(node_info, |i| i.kubelet_version.as_deref()),
        kube_proxy_version: info_field(node_info, |i| i.kube_proxy_version.as_deref()),
    };

    let runtime = ContainerRuntimeRecord {
        collection_time: ctx.batch_time.to_string(),
        computer: computer.clone(),
        operating_system: info_field(node_info, |i| i.os_image.as_deref()),
        docker_version: runtime_version(&info_field(node_info, |i| {
            i.container_runtime_version.as_deref()
        })),
    };

    let resources = NodeResources {
        computer,
        allocatable: node.status.allocatable.clone(),
        capacity: node.status.capacity.clone(),
    };

    Ok(TransformedNode {
        inventory,
        runtime,
        resources,
    })
}

fn info_field<'a>(
    info: Option<&'a crate::models::NodeSystemInfo>,
    get: impl Fn(&'a crate::models::NodeSystemInfo) -> Option<&'a str>,
) -> String {
    info.and_then(get).unwrap_or_default().to_string()
}

/// Fold the condition list into the derived status string and capture the
/// last ready-state transition.
///
/// The status is the comma-joined `type` of every condition whose status is
/// `"True"`, in API order. The `Ready` transition time is captured whether
/// or not that condition is currently true.
pub fn condition_status(node: &Node) -> (String, Option<String>) {
    let mut all_conditions = String::new();
    let mut ready_transition = None;

    for condition in &node.status.conditions {
        if condition.status.as_deref() == Some("True") {
            if let Some(kind) = condition.condition_type.as_deref() {
                if !all_conditions.is_empty() {
                    all_conditions.push(',');
                }
                all_conditions.push_str(kind);
            }
        }
        if condition.condition_type.as_deref() == Some("Ready") {
            if let Some(transition) = condition.last_transition_time.as_deref() {
                ready_transition = Some(transition.to_string());
            }
        }
    }

    (all_conditions, ready_transition)
}

/// Derive the provider identifier from `spec.providerID`.
///
/// Downstream queries filter on the segment left of the first `:`, so the
/// same split happens here. The platform marker file overrides everything;
/// a node without a provider is on-premises.
pub fn provider_id(raw: Option<&str>, platform_marker: &Path) -> String {
    match raw.filter(|p| !p.is_empty()) {
        Some(provider) => {
            if platform_marker.is_file() {
                return PLATFORM_STACK_PROVIDER.to_string();
            }
            match provider.split(':').next() {
                Some(prefix) if !prefix.is_empty() => prefix.to_string(),
                _ => provider.to_string(),
            }
        }
        None => ON_PREM_PROVIDER.to_string(),
    }
}

/// Derive the reported runtime version.
///
/// Docker runtimes report the bare version; any other runtime string is
/// passed through unchanged.
pub fn runtime_version(container_runtime_version: &str) -> String {
    if container_runtime_version
        .to_lowercase()
        .starts_with("docker://")
    {
        container_runtime_version
            .split("//")
            .nth(1)
            .unwrap_or(container_runtime_version)
            .to_string()
    } else {
        container_runtime_version.to_string()
    }
}

/// One core-resource metric per node on which the field is present.
pub fn perf_metrics(
    nodes: &[NodeResources],
    kind: ResourceKind,
    resource: &str,
    metric_name: &str,
    batch_time: &str,
    cluster_id: &str,
) -> Vec<NodePerfMetric> {
    nodes
        .iter()
        .filter_map(|node| {
            let raw = node.side(kind).get(resource)?;
            let value = parse_quantity(resource, raw)?;
            Some(NodePerfMetric {
                collection_time: batch_time.to_string(),
                computer: node.computer.clone(),
                metric_name: metric_name.to_string(),
                value,
                cluster_id: cluster_id.to_string(),
            })
        })
        .collect()
}

/// One accelerator metric per node on which the vendor resource is present.
pub fn accelerator_metrics(
    nodes: &[NodeResources],
    kind: ResourceKind,
    vendor: &str,
    metric_name: &str,
    batch_time: &str,
    cluster_id: &str,
) -> Vec<AcceleratorMetric> {
    nodes
        .iter()
        .filter_map(|node| {
            let raw = node.side(kind).get(vendor)?;
            let value = parse_quantity(vendor, raw)?;
            Some(AcceleratorMetric {
                collection_time: batch_time.to_string(),
                computer: node.computer.clone(),
                metric_name: metric_name.to_string(),
                value,
                cluster_id: cluster_id.to_string(),
                vendor: vendor.to_string(),
            })
        })
        .collect()
}

/// Parse a quantity string into the unit the metric reports.
///
/// CPU becomes nanocores, memory becomes bytes, anything else (accelerator
/// counts) parses as a plain number. Unparseable values yield `None` and
/// therefore no record.
pub fn parse_quantity(resource: &str, value: &str) -> Option<f64> {
    match resource {
        "cpu" => parse_cpu_nanocores(value),
        "memory" => parse_memory_bytes(value),
        _ => value.trim().parse::<f64>().ok(),
    }
}

/// `"500m"` → 5e8 nanocores, `"4"` → 4e9 nanocores.
fn parse_cpu_nanocores(value: &str) -> Option<f64> {
    let value = value.trim();
    if let Some(millis) = value.strip_suffix('m') {
        millis.parse::<f64>().ok().map(|m| m * 1_000_000.0)
    } else {
        value.parse::<f64>().ok().map(|cores| cores * 1_000_000_000.0)
    }
}

/// Binary suffixes scale by powers of 1024, decimal suffixes by powers of
/// 1000; a bare number is already bytes.
fn parse_memory_bytes(value: &str) -> Option<f64> {
    const BINARY: [(&str, f64); 6] = [
        ("Ki", 1024.0),
        ("Mi", 1024.0 * 1024.0),
        ("Gi", 1024.0 * 1024.0 * 1024.0),
        ("Ti", 1024.0 * 1024.0 * 1024.0 * 1024.0),
        ("Pi", 1024.0 * 1024.0 * 1024.0 * 1024.0 * 1024.0),
        ("Ei", 1024.0 * 1024.0 * 1024.0 * 1024.0 * 1024.0 * 1024.0),
    ];
    const DECIMAL: [(&str, f64); 6] = [
        ("k", 1e3),
        ("K", 1e3),
        ("M", 1e6),
        ("G", 1e9),
        ("T", 1e12),
        ("P", 1e15),
    ];

    let value = value.trim();
    for (suffix, scale) in BINARY {
        if let Some(number) = value.strip_suffix(suffix) {
            return number.parse::<f64>().ok().map(|n| n * scale);
        }
    }
    for (suffix, scale) in DECIMAL {
        if let Some(number) = value.strip_suffix(suffix) {
            return number.parse::<f64>().ok().map(|n| n * scale);
        }
    }
    value.parse::<f64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NodeCondition, NodeMetadata, NodeSpec, NodeStatus, NodeSystemInfo};
    use std::path::PathBuf;

    fn condition(kind: &str, status: &str, transition: Option<&str>) -> NodeCondition {
        NodeCondition {
            condition_type: Some(kind.to_string()),
            status: Some(status.to_string()),
            last_transition_time: transition.map(str::to_string),
        }
    }

    fn named_node(name: &str) -> Node {
        Node {
            metadata: NodeMetadata {
                name: Some(name.to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn test_context<'a>(cluster: &'a ClusterIdentity, marker: &'a Path) -> TransformContext<'a> {
        TransformContext {
            batch_time: "2024-01-01T00:00:00Z",
            cluster,
            platform_marker: marker,
        }
    }

    #[test]
    fn status_joins_true_conditions_in_order() {
        let mut node = named_node("node-1");
        node.status.conditions = vec![
            condition("Ready", "True", None),
            condition("OutOfDisk", "True", None),
            condition("MemoryPressure", "False", None),
        ];

        let (status, _) = condition_status(&node);
        assert_eq!(status, "Ready,OutOfDisk");
    }

    #[test]
    fn ready_transition_captured_even_when_not_ready() {
        let mut node = named_node("node-1");
        node.status.conditions = vec![condition("Ready", "False", Some("T1"))];

        let (status, transition) = condition_status(&node);
        assert_eq!(status, "");
        assert_eq!(transition.as_deref(), Some("T1"));
    }

    #[test]
    fn status_empty_without_conditions() {
        let node = named_node("node-1");
        let (status, transition) = condition_status(&node);
        assert_eq!(status, "");
        assert!(transition.is_none());
    }

    #[test]
    fn provider_takes_first_colon_segment() {
        let marker = PathBuf::from("/nonexistent/marker");
        assert_eq!(
            provider_id(Some("azure:///subscriptions/x"), &marker),
            "azure"
        );
    }

    #[test]
    fn provider_falls_back_to_raw_when_prefix_empty() {
        let marker = PathBuf::from("/nonexistent/marker");
        assert_eq!(provider_id(Some(":///weird"), &marker), ":///weird");
    }

    #[test]
    fn provider_defaults_to_on_prem() {
        let marker = PathBuf::from("/nonexistent/marker");
        assert_eq!(provider_id(None, &marker), ON_PREM_PROVIDER);
        assert_eq!(provider_id(Some(""), &marker), ON_PREM_PROVIDER);
    }

    #[test]
    fn provider_forced_by_platform_marker() {
        let marker = tempfile::NamedTempFile::new().unwrap();
        assert_eq!(
            provider_id(Some("azure:///subscriptions/x"), marker.path()),
            PLATFORM_STACK_PROVIDER
        );
        // The marker only matters when a provider is set at all
        assert_eq!(provider_id(None, marker.path()), ON_PREM_PROVIDER);
    }

    #[test]
    fn docker_runtime_version_is_stripped() {
        assert_eq!(runtime_version("docker://20.10.7"), "20.10.7");
        assert_eq!(runtime_version("Docker://19.3.1"), "19.3.1");
    }

    #[test]
    fn non_docker_runtime_passes_through() {
        assert_eq!(runtime_version("containerd://1.5.2"), "containerd://1.5.2");
        assert_eq!(runtime_version(""), "");
    }

    #[test]
    fn cpu_quantities_become_nanocores() {
        assert_eq!(parse_quantity("cpu", "4"), Some(4_000_000_000.0));
        assert_eq!(parse_quantity("cpu", "500m"), Some(500_000_000.0));
        assert_eq!(parse_quantity("cpu", "bogus"), None);
    }

    #[test]
    fn memory_quantities_become_bytes() {
        assert_eq!(parse_quantity("memory", "1Ki"), Some(1024.0));
        assert_eq!(parse_quantity("memory", "16Gi"), Some(16.0 * 1024.0 * 1024.0 * 1024.0));
        assert_eq!(parse_quantity("memory", "2K"), Some(2000.0));
        assert_eq!(parse_quantity("memory", "128974848"), Some(128974848.0));
        assert_eq!(parse_quantity("memory", ""), None);
    }

    #[test]
    fn accelerator_counts_parse_as_numbers() {
        assert_eq!(parse_quantity("nvidia.com/gpu", "2"), Some(2.0));
    }

    #[test]
    fn transform_requires_node_name() {
        let cluster = ClusterIdentity::default();
        let marker = PathBuf::from("/nonexistent/marker");
        let ctx = test_context(&cluster, &marker);

        let err = transform_node(&Node::default(), &ctx).unwrap_err();
        assert_eq!(err, TransformError::MissingField("metadata.name"));
    }

    #[test]
    fn transform_builds_full_record_set() {
        let cluster = ClusterIdentity {
            cluster_name: "test-cluster".into(),
            cluster_id: "cluster-id".into(),
        };
        let marker = PathBuf::from("/nonexistent/marker");
        let ctx = test_context(&cluster, &marker);

        let mut node = named_node("node-1");
        node.metadata.creation_timestamp = Some("2023-12-31T00:00:00Z".into());
        node.spec = NodeSpec {
            provider_id: Some("aws:///us-east-1a/i-0abc".into()),
        };
        node.status = NodeStatus {
            conditions: vec![condition("Ready", "True", Some("T1"))],
            node_info: Some(NodeSystemInfo {
                kubelet_version: Some("v1.28.0".into()),
                kube_proxy_version: Some("v1.28.0".into()),
                os_image: Some("Ubuntu 22.04.3 LTS".into()),
                operating_system: Some("linux".into()),
                kernel_version: Some("5.15.0".into()),
                container_runtime_version: Some("docker://20.10.7".into()),
            }),
            ..Default::default()
        };

        let transformed = transform_node(&node, &ctx).unwrap();
        assert_eq!(transformed.inventory.computer, "node-1");
        assert_eq!(transformed.inventory.status, "Ready");
        assert_eq!(
            transformed.inventory.last_transition_time_ready.as_deref(),
            Some("T1")
        );
        assert_eq!(transformed.inventory.kubernetes_provider_id, "aws");
        assert_eq!(transformed.runtime.operating_system, "Ubuntu 22.04.3 LTS");
        assert_eq!(transformed.runtime.docker_version, "20.10.7");
    }

    #[test]
    fn transform_is_pure() {
        let cluster = ClusterIdentity::default();
        let marker = PathBuf::from("/nonexistent/marker");
        let ctx = test_context(&cluster, &marker);

        let mut node = named_node("node-1");
        node.status.capacity.insert("cpu".into(), "4".into());

        let first = transform_node(&node, &ctx).unwrap();
        let second = transform_node(&node, &ctx).unwrap();
        assert_eq!(first.inventory, second.inventory);
        assert_eq!(first.runtime, second.runtime);
    }

    #[test]
    fn perf_metrics_skip_missing_fields() {
        let nodes = vec![
            NodeResources {
                computer: "node-1".into(),
                allocatable: BTreeMap::from([("cpu".into(), "2".into())]),
                capacity: BTreeMap::new(),
            },
            NodeResources {
                computer: "node-2".into(),
                allocatable: BTreeMap::new(),
                capacity: BTreeMap::new(),
            },
        ];

        let metrics = perf_metrics(
            &nodes,
            ResourceKind::Allocatable,
            "cpu",
            METRIC_CPU_ALLOCATABLE,
            "T0",
            "cluster-id",
        );
        assert_eq!(metrics.len(), 1);
        assert_eq!(metrics[0].computer, "node-1");
        assert_eq!(metrics[0].value, 2_000_000_000.0);

        // Nothing on the capacity side of either node
        assert!(perf_metrics(
            &nodes,
            ResourceKind::Capacity,
            "cpu",
            METRIC_CPU_CAPACITY,
            "T0",
            "cluster-id",
        )
        .is_empty());
    }

    #[test]
    fn accelerator_metrics_carry_the_vendor() {
        let nodes = vec![NodeResources {
            computer: "gpu-node".into(),
            allocatable: BTreeMap::from([(NVIDIA_GPU_RESOURCE.to_string(), "2".to_string())]),
            capacity: BTreeMap::from([(NVIDIA_GPU_RESOURCE.to_string(), "2".to_string())]),
        }];

        let metrics = accelerator_metrics(
            &nodes,
            ResourceKind::Capacity,
            NVIDIA_GPU_RESOURCE,
            METRIC_GPU_CAPACITY,
            "T0",
            "cluster-id",
        );
        assert_eq!(metrics.len(), 1);
        assert_eq!(metrics[0].vendor, NVIDIA_GPU_RESOURCE);
        assert_eq!(metrics[0].value, 2.0);

        assert!(accelerator_metrics(
            &nodes,
            ResourceKind::Capacity,
            AMD_GPU_RESOURCE,
            METRIC_GPU_CAPACITY,
            "T0",
            "cluster-id",
        )
        .is_empty());
    }
}
