pub mod client;
#[cfg(test)]
pub mod fake;
pub mod types;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use types::{
    AllSystemInfo, CpuUsage, HealthStatus, MemoryUsage, NetworkConnections, ProcessesResponse,
    StorageUsage, TopProcesses,
};

pub const PATH_ALL_SYSTEM: &str = "/api/system/";
pub const PATH_TOP_PROCESSES: &str = "/api/processes/top";
pub const PATH_SEARCH_PROCESSES: &str = "/api/processes/search";
pub const PATH_NETWORK_CONNECTIONS: &str = "/api/network/connections";
pub const PATH_HEALTH: &str = "/api/health";
pub const PATH_CPU_USAGE: &str = "/api/system/cpu/usage";
pub const PATH_MEMORY_USAGE: &str = "/api/system/memory/usage";
pub const PATH_STORAGE_USAGE: &str = "/api/storage/usage";

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("запрос {endpoint} не выполнен: {source}")]
    Network {
        endpoint: String,
        source: reqwest::Error,
    },
    #[error("{endpoint} ответил HTTP {status}")]
    Http { endpoint: String, status: u16 },
    #[error("некорректный JSON от {endpoint}: {source}")]
    Parse {
        endpoint: String,
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Network,
    Http,
    Parse,
}

impl FetchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FetchError::Network { .. } => ErrorKind::Network,
            FetchError::Http { .. } => ErrorKind::Http,
            FetchError::Parse { .. } => ErrorKind::Parse,
        }
    }

    pub fn endpoint(&self) -> &str {
        match self {
            FetchError::Network { endpoint, .. }
            | FetchError::Http { endpoint, .. }
            | FetchError::Parse { endpoint, .. } => endpoint,
        }
    }
}

/// Read side of the remote metrics API.
///
/// One method per endpoint the synchronization core needs. Implementations
/// do no retrying or caching; every failure is reported as a [`FetchError`].
#[async_trait]
pub trait MetricsSource: Send + Sync {
    async fn all_system_info(&self) -> Result<AllSystemInfo, FetchError>;
    async fn top_processes(&self, limit: u32) -> Result<TopProcesses, FetchError>;
    async fn network_connections(&self) -> Result<NetworkConnections, FetchError>;
    async fn health(&self) -> Result<HealthStatus, FetchError>;
    async fn cpu_usage(&self) -> Result<CpuUsage, FetchError>;
    async fn memory_usage(&self) -> Result<MemoryUsage, FetchError>;
    async fn storage_usage(&self) -> Result<StorageUsage, FetchError>;
    async fn search_processes(&self, query: &str) -> Result<ProcessesResponse, FetchError>;
}
