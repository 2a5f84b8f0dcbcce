//! Batch accumulation and multi-destination fan-out
//!
//! Inventory, runtime, and accelerator batches live for one page; the
//! capacity/allocatable metrics batch lives for the whole cycle. A batch
//! with zero records never reaches the router.

use crate::config::tags;
use crate::error::CollectError;
use crate::models::{
    AcceleratorMetric, ContainerRuntimeRecord, NodeInventoryRecord, NodePerfMetric, RecordBatch,
};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

/// Downstream record router boundary.
#[async_trait]
pub trait RecordRouter: Send + Sync {
    /// Deliver one tagged batch. Ordering within the batch is preserved.
    async fn emit(&self, tag: &str, batch: RecordBatch) -> Result<()>;
}

/// Accumulates typed records and flushes them as tagged batches.
pub struct BatchEmitter {
    router: Arc<dyn RecordRouter>,
    inventory_tag: String,
    emit_time: DateTime<Utc>,
    inventory: RecordBatch,
    runtime: RecordBatch,
    accelerator: RecordBatch,
    perf: RecordBatch,
}

impl BatchEmitter {
    pub fn new(router: Arc<dyn RecordRouter>, inventory_tag: &str, emit_time: DateTime<Utc>) -> Self {
        Self {
            router,
            inventory_tag: inventory_tag.to_string(),
            emit_time,
            inventory: RecordBatch::new(emit_time),
            runtime: RecordBatch::new(emit_time),
            accelerator: RecordBatch::new(emit_time),
            perf: RecordBatch::new(emit_time),
        }
    }

    pub fn add_inventory(&mut self, record: &NodeInventoryRecord) {
        push_record(&mut self.inventory, record);
    }

    pub fn add_runtime(&mut self, record: &ContainerRuntimeRecord) {
        push_record(&mut self.runtime, record);
    }

    pub fn add_accelerator(&mut self, record: &AcceleratorMetric) {
        push_record(&mut self.accelerator, record);
    }

    pub fn add_perf(&mut self, record: &NodePerfMetric) {
        push_record(&mut self.perf, record);
    }

    /// Flush the page-scoped batches and start fresh ones.
    ///
    /// The inventory batch goes to the primary destination and, with
    /// identical content, to the aggregation mirror.
    pub async fn flush_page(&mut self) -> Result<usize, CollectError> {
        let inventory = std::mem::replace(&mut self.inventory, RecordBatch::new(self.emit_time));
        let runtime = std::mem::replace(&mut self.runtime, RecordBatch::new(self.emit_time));
        let accelerator =
            std::mem::replace(&mut self.accelerator, RecordBatch::new(self.emit_time));

        let mut emitted = 0;
        let inventory_tag = self.inventory_tag.clone();
        emitted += self.send(&inventory_tag, inventory.clone()).await?;
        emitted += self.send(tags::INVENTORY_MIRROR, inventory).await?;
        emitted += self.send(tags::CONTAINER_RUNTIME, runtime).await?;
        emitted += self.send(tags::INSIGHTS_METRICS, accelerator).await?;
        Ok(emitted)
    }

    /// Flush the cycle-scoped metrics batch.
    pub async fn flush_cycle(&mut self) -> Result<usize, CollectError> {
        let perf = std::mem::replace(&mut self.perf, RecordBatch::new(self.emit_time));
        self.send(tags::NODE_PERF, perf).await
    }

    async fn send(&self, tag: &str, batch: RecordBatch) -> Result<usize, CollectError> {
        if batch.is_empty() {
            return Ok(0);
        }
        let count = batch.len();
        debug!(tag = %tag, records = count, "Flushing batch");
        self.router
            .emit(tag, batch)
            .await
            .map_err(|source| CollectError::Emit {
                tag: tag.to_string(),
                source,
            })?;
        Ok(count)
    }
}

fn push_record<T: Serialize>(batch: &mut RecordBatch, record: &T) {
    match serde_json::to_value(record) {
        Ok(value) => batch.records.push(value),
        Err(error) => warn!(error = %error, "Dropping unserializable record"),
    }
}

/// Router stand-in that writes tagged NDJSON lines to stdout.
#[derive(Debug, Clone, Default)]
pub struct JsonLineRouter;

#[async_trait]
impl RecordRouter for JsonLineRouter {
    async fn emit(&self, tag: &str, batch: RecordBatch) -> Result<()> {
        use std::io::Write;

        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        for record in &batch.records {
            let line = serde_json::json!({
                "tag": tag,
                "time": batch.emit_time.to_rfc3339(),
                "record": record,
            });
            writeln!(out, "{}", line)?;
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use tokio::sync::Mutex;

    /// Captures every emission; optionally fails on a chosen tag.
    #[derive(Default)]
    pub struct RecordingRouter {
        pub emissions: Mutex<Vec<(String, RecordBatch)>>,
        pub fail_tag: Option<String>,
    }

    impl RecordingRouter {
        pub fn failing_on(tag: &str) -> Self {
            Self {
                emissions: Mutex::new(Vec::new()),
                fail_tag: Some(tag.to_string()),
            }
        }

        pub async fn tags(&self) -> Vec<String> {
            self.emissions
                .lock()
                .await
                .iter()
                .map(|(tag, _)| tag.clone())
                .collect()
        }
    }

    #[async_trait]
    impl RecordRouter for RecordingRouter {
        async fn emit(&self, tag: &str, batch: RecordBatch) -> Result<()> {
            if self.fail_tag.as_deref() == Some(tag) {
                anyhow::bail!("injected emit failure for {}", tag);
            }
            self.emissions.lock().await.push((tag.to_string(), batch));
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::RecordingRouter;
    use super::*;
    use crate::config::DEFAULT_INVENTORY_TAG;
    use std::collections::BTreeMap;

    fn inventory_record(computer: &str) -> NodeInventoryRecord {
        NodeInventoryRecord {
            collection_time: "T0".into(),
            computer: computer.into(),
            cluster_name: "c".into(),
            cluster_id: "id".into(),
            creation_time_stamp: String::new(),
            labels: BTreeMap::new(),
            status: "Ready".into(),
            last_transition_time_ready: None,
            kubernetes_provider_id: "azure".into(),
            kubelet_version: String::new(),
            kube_proxy_version: String::new(),
        }
    }

    #[tokio::test]
    async fn empty_batches_are_skipped() {
        let router = Arc::new(RecordingRouter::default());
        let mut emitter = BatchEmitter::new(router.clone(), DEFAULT_INVENTORY_TAG, Utc::now());

        let emitted = emitter.flush_page().await.unwrap();
        assert_eq!(emitted, 0);
        assert_eq!(emitter.flush_cycle().await.unwrap(), 0);
        assert!(router.tags().await.is_empty());
    }

    #[tokio::test]
    async fn inventory_is_mirrored_with_identical_content() {
        let router = Arc::new(RecordingRouter::default());
        let mut emitter = BatchEmitter::new(router.clone(), DEFAULT_INVENTORY_TAG, Utc::now());

        emitter.add_inventory(&inventory_record("node-1"));
        emitter.add_inventory(&inventory_record("node-2"));
        emitter.flush_page().await.unwrap();

        let emissions = router.emissions.lock().await;
        assert_eq!(emissions.len(), 2);
        assert_eq!(emissions[0].0, DEFAULT_INVENTORY_TAG);
        assert_eq!(emissions[1].0, tags::INVENTORY_MIRROR);
        assert_eq!(emissions[0].1.records, emissions[1].1.records);
    }

    #[tokio::test]
    async fn page_flush_resets_page_batches_but_not_perf() {
        let router = Arc::new(RecordingRouter::default());
        let mut emitter = BatchEmitter::new(router.clone(), DEFAULT_INVENTORY_TAG, Utc::now());

        emitter.add_inventory(&inventory_record("node-1"));
        emitter.add_perf(&NodePerfMetric {
            collection_time: "T0".into(),
            computer: "node-1".into(),
            metric_name: "cpuCapacityNanoCores".into(),
            value: 1.0,
            cluster_id: "id".into(),
        });

        emitter.flush_page().await.unwrap();
        // Second page flush has nothing left to send
        assert_eq!(emitter.flush_page().await.unwrap(), 0);
        // The perf batch survives until the cycle flush
        assert_eq!(emitter.flush_cycle().await.unwrap(), 1);

        let tags_seen = router.tags().await;
        assert_eq!(
            tags_seen,
            vec![
                DEFAULT_INVENTORY_TAG.to_string(),
                tags::INVENTORY_MIRROR.to_string(),
                tags::NODE_PERF.to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn emit_failure_names_the_destination() {
        let router = Arc::new(RecordingRouter::failing_on(tags::INVENTORY_MIRROR));
        let mut emitter = BatchEmitter::new(router, DEFAULT_INVENTORY_TAG, Utc::now());

        emitter.add_inventory(&inventory_record("node-1"));
        let err = emitter.flush_page().await.unwrap_err();
        match err {
            CollectError::Emit { tag, .. } => assert_eq!(tag, tags::INVENTORY_MIRROR),
            other => panic!("unexpected error: {other}"),
        }
    }
}
