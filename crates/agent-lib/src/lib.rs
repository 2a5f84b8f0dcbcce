//! Agent library for node inventory collection
//!
//! This crate provides the core functionality for:
//! - Periodic, cancellable collection scheduling
//! - Paginated node retrieval from the cluster API
//! - Per-node transformation into inventory, runtime, and metric records
//! - Throttled operational telemetry sampling
//! - Multi-destination batch emission
//! - Health checks and observability

pub mod collector;
pub mod config;
pub mod error;
pub mod health;
pub mod kube;
pub mod models;
pub mod observability;
pub mod telemetry;

pub use collector::{CollectionHandle, CollectionLoop, Collector, JsonLineRouter, RecordRouter};
pub use config::{ClusterIdentity, CollectorConfig, TelemetryEnv};
pub use error::{CollectError, TransformError};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use kube::{InClusterNodesClient, NodesApiClient};
pub use models::*;
pub use observability::{CollectorMetrics, StructuredLogger};
pub use telemetry::{LogTelemetrySink, TelemetrySink};
