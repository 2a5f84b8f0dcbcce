//! Node inventory collection
//!
//! The collector polls the cluster API for the full node list one page at a
//! time, derives the typed record sets from each node, samples operational
//! telemetry under a time threshold, and fans the batches out to their
//! destinations. Scheduling, transformation, sampling, and emission live in
//! their own submodules; this module owns the per-cycle orchestration.

mod emit;
mod sampler;
mod scheduler;
pub mod transform;


pub use emit::{BatchEmitter, JsonLineRouter, RecordRouter};
pub use sampler::TelemetrySampler;
pub use scheduler::{CollectionHandle, CollectionLoop, PeriodicTimer, Tick};
pub use transform::{NodeResources, ResourceKind, TransformContext, TransformedNode};

use crate::config::CollectorConfig;
use crate::error::CollectError;
use crate::kube::NodesApiClient;
use crate::models::Node;
use crate::observability::CollectorMetrics;
use crate::telemetry::TelemetrySink;
use chrono::{SecondsFormat, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use transform::{
    AMD_GPU_RESOURCE, METRIC_CPU_ALLOCATABLE, METRIC_CPU_CAPACITY, METRIC_GPU_ALLOCATABLE,
    METRIC_GPU_CAPACITY, METRIC_MEMORY_ALLOCATABLE, METRIC_MEMORY_CAPACITY, NVIDIA_GPU_RESOURCE,
};

/// Counters from one collection cycle.
#[derive(Debug, Clone, Copy, Default)]
pub struct CycleSummary {
    pub pages: u64,
    pub nodes: u64,
    pub records: u64,
    pub transform_errors: u64,
}

/// Orchestrates one collection cycle per scheduler tick.
pub struct Collector {
    client: Arc<dyn NodesApiClient>,
    router: Arc<dyn RecordRouter>,
    sink: Arc<dyn TelemetrySink>,
    config: CollectorConfig,
    sampler: TelemetrySampler,
    metrics: CollectorMetrics,
}

impl Collector {
    pub fn new(
        client: Arc<dyn NodesApiClient>,
        router: Arc<dyn RecordRouter>,
        sink: Arc<dyn TelemetrySink>,
        config: CollectorConfig,
    ) -> Self {
        let sampler =
            TelemetrySampler::new(config.telemetry_interval_mins, Utc::now().timestamp());
        Self {
            client,
            router,
            sink,
            config,
            sampler,
            metrics: CollectorMetrics::new(),
        }
    }

    pub fn run_interval(&self) -> Duration {
        self.config.run_interval
    }

    pub(crate) fn reset_sampler(&mut self, now_unix: i64) {
        self.sampler.reset(now_unix);
    }

    /// Report a cycle-ending error to the telemetry sink.
    pub(crate) fn report_exception(&self, error: &CollectError) {
        self.metrics.inc_cycle_errors();
        self.sink.emit_exception(error);
    }

    /// Run one full collection cycle.
    ///
    /// Every record of the cycle carries the batch time captured here, no
    /// matter how many pages the node list spans. A fetch or emit failure
    /// aborts the cycle; per-node and metric-derivation problems do not.
    pub async fn enumerate(&mut self) -> Result<CycleSummary, CollectError> {
        let cycle_start = std::time::Instant::now();
        let emit_time = Utc::now();
        let batch_time = emit_time.to_rfc3339_opts(SecondsFormat::Secs, true);

        let mut summary = CycleSummary::default();
        let mut emitter =
            BatchEmitter::new(self.router.clone(), &self.config.inventory_tag, emit_time);
        let mut snapshot: Vec<NodeResources> = Vec::new();

        let locator = format!("nodes?limit={}", self.config.page_limit);
        info!(locator = %locator, "Requesting node inventory from the cluster API");

        let mut page = self
            .client
            .fetch_page(&locator)
            .await
            .map_err(CollectError::Fetch)?;

        loop {
            summary.pages += 1;
            self.metrics.inc_pages_fetched();

            if page.items.is_empty() {
                warn!("Received an empty node page");
            } else {
                self.process_page(&page.items, &batch_time, &mut emitter, &mut snapshot, &mut summary)
                    .await?;
            }

            match page.continue_token.take().filter(|token| !token.is_empty()) {
                Some(token) => {
                    page = self
                        .client
                        .fetch_page(&format!("{}&continue={}", locator, token))
                        .await
                        .map_err(CollectError::Fetch)?;
                }
                None => break,
            }
        }

        // Capacity/allocatable metrics need the whole node set, so they are
        // derived once from the cycle snapshot after pagination is done.
        self.derive_perf_metrics(&snapshot, &batch_time, &mut emitter);
        summary.records += emitter.flush_cycle().await? as u64;

        self.metrics
            .observe_cycle(cycle_start.elapsed().as_secs_f64());
        self.metrics.set_nodes_collected(summary.nodes as i64);
        self.metrics.add_records_emitted(summary.records);
        Ok(summary)
    }

    /// Transform, sample, and flush one page of nodes.
    async fn process_page(
        &mut self,
        items: &[Node],
        batch_time: &str,
        emitter: &mut BatchEmitter,
        snapshot: &mut Vec<NodeResources>,
        summary: &mut CycleSummary,
    ) -> Result<(), CollectError> {
        let ctx = TransformContext {
            batch_time,
            cluster: &self.config.cluster,
            platform_marker: &self.config.platform_marker_path,
        };

        let mut page_resources: Vec<NodeResources> = Vec::with_capacity(items.len());
        let mut sampled = false;

        for node in items {
            // One malformed node never discards the rest of the page
            let transformed = match transform::transform_node(node, &ctx) {
                Ok(transformed) => transformed,
                Err(error) => {
                    summary.transform_errors += 1;
                    self.metrics.inc_transform_errors();
                    warn!(error = %error, "Skipping malformed node");
                    continue;
                }
            };

            sampled |= self.sampler.maybe_sample(
                Utc::now().timestamp(),
                node,
                &transformed.inventory.kubernetes_provider_id,
                &self.config,
                self.sink.as_ref(),
            );

            emitter.add_inventory(&transformed.inventory);
            emitter.add_runtime(&transformed.runtime);
            page_resources.push(transformed.resources);
            summary.nodes += 1;
        }

        self.derive_accelerator_metrics(&page_resources, batch_time, emitter);

        if sampled {
            self.sampler.commit(Utc::now().timestamp());
        }

        snapshot.extend(page_resources);
        summary.records += emitter.flush_page().await? as u64;
        Ok(())
    }

    /// Accelerator metrics for one page, grouped by (kind, vendor).
    fn derive_accelerator_metrics(
        &self,
        nodes: &[NodeResources],
        batch_time: &str,
        emitter: &mut BatchEmitter,
    ) {
        let groups = [
            (ResourceKind::Allocatable, NVIDIA_GPU_RESOURCE, METRIC_GPU_ALLOCATABLE),
            (ResourceKind::Capacity, NVIDIA_GPU_RESOURCE, METRIC_GPU_CAPACITY),
            (ResourceKind::Allocatable, AMD_GPU_RESOURCE, METRIC_GPU_ALLOCATABLE),
            (ResourceKind::Capacity, AMD_GPU_RESOURCE, METRIC_GPU_CAPACITY),
        ];

        for (kind, vendor, metric_name) in groups {
            let metrics = transform::accelerator_metrics(
                nodes,
                kind,
                vendor,
                metric_name,
                batch_time,
                &self.config.cluster.cluster_id,
            );
            for metric in &metrics {
                emitter.add_accelerator(metric);
            }
        }
    }

    /// Core-resource metrics for the whole cycle, grouped by (kind, resource).
    fn derive_perf_metrics(
        &self,
        nodes: &[NodeResources],
        batch_time: &str,
        emitter: &mut BatchEmitter,
    ) {
        let groups = [
            (ResourceKind::Allocatable, "cpu", METRIC_CPU_ALLOCATABLE),
            (ResourceKind::Allocatable, "memory", METRIC_MEMORY_ALLOCATABLE),
            (ResourceKind::Capacity, "cpu", METRIC_CPU_CAPACITY),
            (ResourceKind::Capacity, "memory", METRIC_MEMORY_CAPACITY),
        ];

        for (kind, resource, metric_name) in groups {
            let metrics = transform::perf_metrics(
                nodes,
                kind,
                resource,
                metric_name,
                batch_time,
                &self.config.cluster.cluster_id,
            );
            debug!(metric = metric_name, count = metrics.len(), "Derived node metrics");
            for metric in &metrics {
                emitter.add_perf(metric);
            }
        }
    }
}
