//! Operational telemetry sink boundary
//!
//! The sink accepts named metric samples and exception reports. By contract
//! it never fails and never panics; implementations swallow their own
//! errors. The default implementation forwards everything to structured
//! tracing events.

use crate::error::CollectError;
use std::collections::BTreeMap;

/// Destination for low-frequency operational telemetry.
pub trait TelemetrySink: Send + Sync {
    /// Emit one named metric with its property map. Values are forwarded as
    /// the raw quantity strings the API reported.
    fn emit_metric(&self, name: &str, value: &str, properties: &BTreeMap<String, String>);

    /// Report an error from the collection pipeline.
    fn emit_exception(&self, error: &CollectError);
}

/// Sink that forwards telemetry to tracing events.
#[derive(Debug, Clone, Default)]
pub struct LogTelemetrySink;

impl TelemetrySink for LogTelemetrySink {
    fn emit_metric(&self, name: &str, value: &str, properties: &BTreeMap<String, String>) {
        tracing::info!(
            event = "telemetry_metric",
            metric = %name,
            value = %value,
            properties = ?properties,
            "Telemetry sample"
        );
    }

    fn emit_exception(&self, error: &CollectError) {
        tracing::warn!(
            event = "telemetry_exception",
            error = %error,
            "Collection error reported"
        );
    }
}
