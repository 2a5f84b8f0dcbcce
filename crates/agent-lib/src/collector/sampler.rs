//! Throttled node telemetry sampling
//!
//! Every collection cycle walks all nodes, but operational telemetry is only
//! wanted every few minutes. The sampler owns the last-sample timestamp and
//! decides, per node, whether a sample fires now.
//!
//! The timestamp resets once per page, after the node loop, and only when at
//! least one sample fired on that page. Several nodes of the same page can
//! therefore each emit a sample inside a single threshold window; that
//! at-least-once-per-window behavior is intentional and relied upon by the
//! upstream ingestion side.

use super::transform::{runtime_version, AMD_GPU_RESOURCE, NVIDIA_GPU_RESOURCE};
use crate::config::CollectorConfig;
use crate::models::Node;
use crate::telemetry::TelemetrySink;
use std::collections::BTreeMap;

/// Stateful sampling policy for node telemetry.
#[derive(Debug)]
pub struct TelemetrySampler {
    last_sample_unix: i64,
    interval_mins: i64,
}

impl TelemetrySampler {
    pub fn new(interval_mins: i64, now_unix: i64) -> Self {
        Self {
            last_sample_unix: now_unix,
            interval_mins,
        }
    }

    /// Re-anchor the sampling window; called when the collection loop starts.
    pub fn reset(&mut self, now_unix: i64) {
        self.last_sample_unix = now_unix;
    }

    /// Emit one sample for this node if the window has elapsed.
    ///
    /// Returns whether a sample fired. Does not advance the window; the
    /// caller commits once per page via [`TelemetrySampler::commit`].
    pub fn maybe_sample(
        &self,
        now_unix: i64,
        node: &Node,
        provider: &str,
        config: &CollectorConfig,
        sink: &dyn TelemetrySink,
    ) -> bool {
        let elapsed_mins = (now_unix - self.last_sample_unix).abs() / 60;
        if elapsed_mins < self.interval_mins {
            return false;
        }

        let properties = sample_properties(node, provider, config);
        let capacity = &node.status.capacity;
        let memory = capacity.get("memory").map(String::as_str).unwrap_or_default();
        let cpu = capacity.get("cpu").map(String::as_str).unwrap_or_default();

        sink.emit_metric("NodeMemory", memory, &properties);
        sink.emit_metric("NodeCoreCapacity", cpu, &properties);
        true
    }

    /// Advance the window after a page on which at least one sample fired.
    pub fn commit(&mut self, now_unix: i64) {
        self.last_sample_unix = now_unix;
    }
}

/// Build the property map attached to both metrics of a sample.
fn sample_properties(
    node: &Node,
    provider: &str,
    config: &CollectorConfig,
) -> BTreeMap<String, String> {
    let mut properties = BTreeMap::new();
    let info = node.status.node_info.as_ref();
    let field = |get: fn(&crate::models::NodeSystemInfo) -> Option<&String>| {
        info.and_then(get).cloned().unwrap_or_default()
    };

    properties.insert(
        "Computer".into(),
        node.metadata.name.clone().unwrap_or_default(),
    );
    properties.insert("KubeletVersion".into(), field(|i| i.kubelet_version.as_ref()));
    properties.insert(
        "OperatingSystem".into(),
        field(|i| i.operating_system.as_ref()),
    );
    properties.insert(
        "DockerVersion".into(),
        runtime_version(&field(|i| i.container_runtime_version.as_ref())),
    );
    properties.insert("KubernetesProviderID".into(), provider.to_string());
    properties.insert("KernelVersion".into(), field(|i| i.kernel_version.as_ref()));
    properties.insert("OSImage".into(), field(|i| i.os_image.as_ref()));

    for (resource, key) in [(NVIDIA_GPU_RESOURCE, "nvigpus"), (AMD_GPU_RESOURCE, "amdgpus")] {
        if let Some(count) = node.status.capacity.get(resource) {
            if !count.is_empty() {
                properties.insert(key.into(), count.clone());
            }
        }
    }

    let env = &config.telemetry_env;
    if config.data_collection_settings_path.is_file() {
        if let Some(value) = &env.collect_all_events {
            properties.insert("collectAllKubeEvents".into(), value.clone());
        }
    }

    if config.prom_settings_path.is_file() {
        let scrape_settings = [
            ("rsPromInt", &env.prom_interval),
            ("rsPromFPC", &env.prom_fieldpass_count),
            ("rsPromFDC", &env.prom_fielddrop_count),
            ("rsPromServ", &env.prom_service_count),
            ("rsPromUrl", &env.prom_url_count),
            ("rsPromMonPods", &env.prom_monitor_pods),
            ("rsPromMonPodsNs", &env.prom_monitor_pods_ns_count),
        ];
        for (key, value) in scrape_settings {
            if let Some(value) = value {
                properties.insert(key.into(), value.clone());
            }
        }
    }

    properties
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NodeMetadata, NodeSystemInfo};
    use crate::telemetry::test_support::RecordingSink;

    const MINS_10: i64 = 10 * 60;

    fn gpu_node() -> Node {
        let mut node = Node {
            metadata: NodeMetadata {
                name: Some("node-1".into()),
                ..Default::default()
            },
            ..Default::default()
        };
        node.status.node_info = Some(NodeSystemInfo {
            kubelet_version: Some("v1.28.0".into()),
            operating_system: Some("linux".into()),
            kernel_version: Some("5.15.0".into()),
            os_image: Some("Ubuntu 22.04".into()),
            container_runtime_version: Some("docker://20.10.7".into()),
            ..Default::default()
        });
        node.status.capacity.insert("cpu".into(), "4".into());
        node.status.capacity.insert("memory".into(), "16Gi".into());
        node.status
            .capacity
            .insert(NVIDIA_GPU_RESOURCE.into(), "2".into());
        node
    }

    #[test]
    fn no_sample_inside_window() {
        let sampler = TelemetrySampler::new(10, 1_000_000);
        let sink = RecordingSink::default();
        let config = CollectorConfig::default();

        let fired = sampler.maybe_sample(1_000_000 + 60, &gpu_node(), "azure", &config, &sink);
        assert!(!fired);
        assert!(sink.metrics.lock().unwrap().is_empty());
    }

    #[test]
    fn sample_fires_after_window_with_both_metrics() {
        let sampler = TelemetrySampler::new(10, 1_000_000);
        let sink = RecordingSink::default();
        let config = CollectorConfig::default();

        let fired =
            sampler.maybe_sample(1_000_000 + MINS_10, &gpu_node(), "azure", &config, &sink);
        assert!(fired);

        let metrics = sink.metrics.lock().unwrap();
        assert_eq!(metrics.len(), 2);
        assert_eq!(metrics[0].0, "NodeMemory");
        assert_eq!(metrics[0].1, "16Gi");
        assert_eq!(metrics[1].0, "NodeCoreCapacity");
        assert_eq!(metrics[1].1, "4");

        let properties = &metrics[0].2;
        assert_eq!(properties["Computer"], "node-1");
        assert_eq!(properties["DockerVersion"], "20.10.7");
        assert_eq!(properties["KubernetesProviderID"], "azure");
        assert_eq!(properties["nvigpus"], "2");
        assert!(!properties.contains_key("amdgpus"));
        // Settings files absent, so no environment annotations
        assert!(!properties.contains_key("rsPromInt"));
    }

    #[test]
    fn every_due_node_samples_until_commit() {
        // The window only advances at the page boundary, so two nodes checked
        // before the commit both fire.
        let mut sampler = TelemetrySampler::new(10, 1_000_000);
        let sink = RecordingSink::default();
        let config = CollectorConfig::default();
        let now = 1_000_000 + MINS_10;

        assert!(sampler.maybe_sample(now, &gpu_node(), "azure", &config, &sink));
        assert!(sampler.maybe_sample(now, &gpu_node(), "azure", &config, &sink));
        assert_eq!(sink.metrics.lock().unwrap().len(), 4);

        sampler.commit(now);
        assert!(!sampler.maybe_sample(now + 60, &gpu_node(), "azure", &config, &sink));
    }

    #[test]
    fn settings_markers_gate_environment_annotations() {
        let settings = tempfile::NamedTempFile::new().unwrap();
        let mut config = CollectorConfig::default();
        config.prom_settings_path = settings.path().to_path_buf();
        config.telemetry_env.prom_interval = Some("30s".into());
        config.telemetry_env.prom_url_count = Some("3".into());
        // Not gated in: the data-collection settings file does not exist
        config.telemetry_env.collect_all_events = Some("true".into());

        let sampler = TelemetrySampler::new(10, 0);
        let sink = RecordingSink::default();
        assert!(sampler.maybe_sample(MINS_10, &gpu_node(), "azure", &config, &sink));

        let metrics = sink.metrics.lock().unwrap();
        let properties = &metrics[0].2;
        assert_eq!(properties["rsPromInt"], "30s");
        assert_eq!(properties["rsPromUrl"], "3");
        assert!(!properties.contains_key("collectAllKubeEvents"));
    }
}
