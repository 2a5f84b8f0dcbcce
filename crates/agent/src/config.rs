//! Agent configuration

use agent_lib::config::{
    ClusterIdentity, CollectorConfig, TelemetryEnv, DEFAULT_INVENTORY_TAG, DEFAULT_PAGE_LIMIT,
    DEFAULT_TELEMETRY_INTERVAL_MINS,
};
use anyhow::Result;
use serde::Deserialize;
use std::time::Duration;

/// Agent configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// API server port for health/metrics
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Seconds between collection cycles
    #[serde(default = "default_run_interval")]
    pub run_interval_secs: u64,

    /// Primary destination tag for node inventory records
    #[serde(default = "default_inventory_tag")]
    pub inventory_tag: String,

    /// Page size for node list requests
    #[serde(default = "default_page_limit")]
    pub page_limit: u32,

    /// Minutes between node telemetry samples
    #[serde(default = "default_telemetry_interval")]
    pub telemetry_interval_mins: i64,
}

fn default_api_port() -> u16 {
    8080
}

fn default_run_interval() -> u64 {
    60
}

fn default_inventory_tag() -> String {
    DEFAULT_INVENTORY_TAG.to_string()
}

fn default_page_limit() -> u32 {
    DEFAULT_PAGE_LIMIT
}

fn default_telemetry_interval() -> i64 {
    DEFAULT_TELEMETRY_INTERVAL_MINS
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            api_port: default_api_port(),
            run_interval_secs: default_run_interval(),
            inventory_tag: default_inventory_tag(),
            page_limit: default_page_limit(),
            telemetry_interval_mins: default_telemetry_interval(),
        }
    }
}

impl AgentConfig {
    /// Load configuration from the environment
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("AGENT"))
            .build()?;

        Ok(config.try_deserialize().unwrap_or_default())
    }

    /// Build the collector configuration, resolving cluster identity and the
    /// telemetry environment snapshot.
    pub fn collector_config(&self) -> CollectorConfig {
        CollectorConfig {
            run_interval: Duration::from_secs(self.run_interval_secs),
            inventory_tag: self.inventory_tag.clone(),
            page_limit: self.page_limit,
            telemetry_interval_mins: self.telemetry_interval_mins,
            cluster: ClusterIdentity::from_env(),
            telemetry_env: TelemetryEnv::from_env(),
            ..Default::default()
        }
    }
}
