//! Data models for the node inventory agent
//!
//! Two families live here: the permissive deserialization models for pages
//! returned by the cluster API (every nested field may be absent), and the
//! typed records this agent emits downstream (serialized with the upstream
//! PascalCase field names).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One page of the cluster API node list response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NodeList {
    #[serde(default)]
    pub items: Vec<Node>,
    #[serde(default)]
    pub metadata: ListMeta,
}

/// List-level metadata; `continue` carries the pagination cursor.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListMeta {
    #[serde(rename = "continue")]
    pub continue_token: Option<String>,
}

/// A raw node object as returned by the cluster API.
///
/// Absence of any nested field is not an error; the transformation layer
/// decides which fields are required.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Node {
    #[serde(default)]
    pub metadata: NodeMetadata,
    #[serde(default)]
    pub spec: NodeSpec,
    #[serde(default)]
    pub status: NodeStatus,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeMetadata {
    pub name: Option<String>,
    pub creation_timestamp: Option<String>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NodeSpec {
    #[serde(rename = "providerID")]
    pub provider_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeStatus {
    #[serde(default)]
    pub conditions: Vec<NodeCondition>,
    pub node_info: Option<NodeSystemInfo>,
    /// Total hardware resources, as quantity strings keyed by resource name.
    #[serde(default)]
    pub capacity: BTreeMap<String, String>,
    /// The schedulable portion of capacity.
    #[serde(default)]
    pub allocatable: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeCondition {
    #[serde(rename = "type")]
    pub condition_type: Option<String>,
    pub status: Option<String>,
    pub last_transition_time: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeSystemInfo {
    pub kubelet_version: Option<String>,
    pub kube_proxy_version: Option<String>,
    pub os_image: Option<String>,
    pub operating_system: Option<String>,
    pub kernel_version: Option<String>,
    pub container_runtime_version: Option<String>,
}

/// One fetched page, as the collector consumes it.
///
/// `continue_token` is `None` once pagination is exhausted; an empty token
/// from the API is normalized to `None`.
#[derive(Debug, Clone, Default)]
pub struct NodePage {
    pub items: Vec<Node>,
    pub continue_token: Option<String>,
}

impl From<NodeList> for NodePage {
    fn from(list: NodeList) -> Self {
        Self {
            items: list.items,
            continue_token: list
                .metadata
                .continue_token
                .filter(|token| !token.is_empty()),
        }
    }
}

/// Node inventory record, one per node per collection cycle.
///
/// Immutable after construction; consumed by exactly one emission (to the
/// primary inventory destination and its aggregation mirror).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct NodeInventoryRecord {
    pub collection_time: String,
    pub computer: String,
    pub cluster_name: String,
    pub cluster_id: String,
    pub creation_time_stamp: String,
    pub labels: BTreeMap<String, String>,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_transition_time_ready: Option<String>,
    #[serde(rename = "KubernetesProviderID")]
    pub kubernetes_provider_id: String,
    pub kubelet_version: String,
    pub kube_proxy_version: String,
}

/// Container runtime inventory record, one per node per cycle.
///
/// `docker_version` holds the bare version for docker runtimes and the raw
/// `<runtime>://<version>` string for everything else.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerRuntimeRecord {
    pub collection_time: String,
    pub computer: String,
    pub operating_system: String,
    pub docker_version: String,
}

/// Capacity/allocatable metric for a core node resource.
///
/// One per (node, cpu|memory, allocatable|capacity) combination present on
/// the node. CPU values are nanocores, memory values are bytes.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct NodePerfMetric {
    pub collection_time: String,
    pub computer: String,
    pub metric_name: String,
    pub value: f64,
    pub cluster_id: String,
}

/// Accelerator (GPU-class) resource metric.
///
/// One per (node, vendor resource, allocatable|capacity) combination present.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct AcceleratorMetric {
    pub collection_time: String,
    pub computer: String,
    pub metric_name: String,
    pub value: f64,
    pub cluster_id: String,
    pub vendor: String,
}

/// An ordered batch of records bound for one destination.
///
/// All records of a cycle share the emission timestamp captured when the
/// cycle started.
#[derive(Debug, Clone)]
pub struct RecordBatch {
    pub emit_time: DateTime<Utc>,
    pub records: Vec<serde_json::Value>,
}

impl RecordBatch {
    pub fn new(emit_time: DateTime<Utc>) -> Self {
        Self {
            emit_time,
            records: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
