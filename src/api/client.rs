use super::types::{
    AllSystemInfo, CpuUsage, HealthStatus, MemoryUsage, NetworkConnections, ProcessesResponse,
    StorageUsage, TopProcesses,
};
use super::{
    FetchError, MetricsSource, PATH_ALL_SYSTEM, PATH_CPU_USAGE, PATH_HEALTH,
    PATH_MEMORY_USAGE, PATH_NETWORK_CONNECTIONS, PATH_SEARCH_PROCESSES, PATH_STORAGE_USAGE,
    PATH_TOP_PROCESSES,
};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

/// HTTP transport for the metrics API: GET, status check, JSON decode.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = Client::builder()
            .user_agent(concat!("hostdash/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, FetchError> {
        let url = format!("{}{}", self.base_url, path);
        let network = |source| FetchError::Network {
            endpoint: path.to_string(),
            source,
        };

        let resp = self
            .http
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(network)?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Http {
                endpoint: path.to_string(),
                status: status.as_u16(),
            });
        }

        let body = resp.bytes().await.map_err(network)?;
        debug!(endpoint = path, bytes = body.len(), "ответ API получен");
        serde_json::from_slice(&body).map_err(|source| FetchError::Parse {
            endpoint: path.to_string(),
            source,
        })
    }
}

#[async_trait]
impl MetricsSource for ApiClient {
    async fn all_system_info(&self) -> Result<AllSystemInfo, FetchError> {
        self.get_json(PATH_ALL_SYSTEM, &[]).await
    }

    async fn top_processes(&self, limit: u32) -> Result<TopProcesses, FetchError> {
        self.get_json(PATH_TOP_PROCESSES, &[("limit", limit.to_string())])
            .await
    }

    async fn network_connections(&self) -> Result<NetworkConnections, FetchError> {
        self.get_json(PATH_NETWORK_CONNECTIONS, &[]).await
    }

    async fn health(&self) -> Result<HealthStatus, FetchError> {
        self.get_json(PATH_HEALTH, &[]).await
    }

    async fn cpu_usage(&self) -> Result<CpuUsage, FetchError> {
        self.get_json(PATH_CPU_USAGE, &[]).await
    }

    async fn memory_usage(&self) -> Result<MemoryUsage, FetchError> {
        self.get_json(PATH_MEMORY_USAGE, &[]).await
    }

    async fn storage_usage(&self) -> Result<StorageUsage, FetchError> {
        self.get_json(PATH_STORAGE_USAGE, &[]).await
    }

    async fn search_processes(&self, query: &str) -> Result<ProcessesResponse, FetchError> {
        self.get_json(PATH_SEARCH_PROCESSES, &[("q", query.to_string())])
            .await
    }
}
