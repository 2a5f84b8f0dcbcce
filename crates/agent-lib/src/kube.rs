//! Cluster API client boundary
//!
//! The collector only ever sees `NodesApiClient`: one call, one page, one
//! optional continuation token. The production implementation resolves the
//! in-cluster endpoint from the standard service environment and
//! authenticates with the mounted service-account credentials.

use crate::models::{NodeList, NodePage};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

/// Trait for fetching pages of the cluster node list.
#[async_trait]
pub trait NodesApiClient: Send + Sync {
    /// Fetch one page of nodes for the given resource locator
    /// (e.g. `nodes?limit=400` or `nodes?limit=400&continue=<token>`).
    async fn fetch_page(&self, locator: &str) -> Result<NodePage>;
}

/// Configuration for the in-cluster API client.
#[derive(Debug, Clone)]
pub struct ApiClientConfig {
    /// API server base URL
    pub endpoint: String,
    /// Service account token path
    pub token_path: PathBuf,
    /// Cluster CA certificate path
    pub ca_cert_path: PathBuf,
    /// Per-request timeout
    pub request_timeout: Duration,
}

impl Default for ApiClientConfig {
    fn default() -> Self {
        Self {
            endpoint: in_cluster_endpoint(),
            token_path: PathBuf::from("/var/run/secrets/kubernetes.io/serviceaccount/token"),
            ca_cert_path: PathBuf::from("/var/run/secrets/kubernetes.io/serviceaccount/ca.crt"),
            request_timeout: Duration::from_secs(40),
        }
    }
}

/// Resolve the API server endpoint from the in-cluster service environment.
fn in_cluster_endpoint() -> String {
    std::env::var("KUBERNETES_SERVICE_HOST")
        .map(|host| {
            let port = std::env::var("KUBERNETES_SERVICE_PORT").unwrap_or_else(|_| "443".into());
            format!("https://{}:{}", host, port)
        })
        .unwrap_or_else(|_| "https://kubernetes.default.svc".into())
}

/// Node list client for the cluster API server.
pub struct InClusterNodesClient {
    config: ApiClientConfig,
    http: reqwest::Client,
}

impl InClusterNodesClient {
    /// Create a client with in-cluster configuration.
    pub fn in_cluster() -> Result<Self> {
        Self::with_config(ApiClientConfig::default())
    }

    /// Create a client with explicit configuration (used by tests and
    /// out-of-cluster runs).
    pub fn with_config(config: ApiClientConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder().timeout(config.request_timeout);

        if config.ca_cert_path.exists() {
            let ca_pem = std::fs::read(&config.ca_cert_path).with_context(|| {
                format!("failed to read CA certificate from {:?}", config.ca_cert_path)
            })?;
            let ca = reqwest::Certificate::from_pem(&ca_pem)
                .context("cluster CA certificate is not valid PEM")?;
            builder = builder.add_root_certificate(ca);
        }

        let http = builder.build().context("failed to build HTTP client")?;
        Ok(Self { config, http })
    }

    fn bearer_token(&self) -> Option<String> {
        std::fs::read_to_string(&self.config.token_path)
            .ok()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
    }
}

#[async_trait]
impl NodesApiClient for InClusterNodesClient {
    async fn fetch_page(&self, locator: &str) -> Result<NodePage> {
        let url = format!("{}/api/v1/{}", self.config.endpoint, locator);
        debug!(url = %url, "Requesting node page");

        let mut request = self.http.get(&url);
        if let Some(token) = self.bearer_token() {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("node list request to {} failed", url))?
            .error_for_status()
            .context("node list request returned an error status")?;

        let list: NodeList = response
            .json()
            .await
            .context("failed to decode node list page")?;

        Ok(NodePage::from(list))
    }
}
