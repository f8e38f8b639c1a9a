//! Scripted in-memory [`MetricsSource`] for tests.

use super::types::{
    AllSystemInfo, CpuUsage, HealthStatus, MemoryUsage, NetworkConnections, ProcessInfo,
    ProcessesResponse, StorageUsage, SystemInfo, TopProcesses,
};
use super::{
    FetchError, MetricsSource, PATH_ALL_SYSTEM, PATH_CPU_USAGE, PATH_HEALTH, PATH_MEMORY_USAGE,
    PATH_NETWORK_CONNECTIONS, PATH_SEARCH_PROCESSES, PATH_STORAGE_USAGE, PATH_TOP_PROCESSES,
};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct FakeData {
    pub host: String,
    pub cpu_percent: f64,
    pub memory_used: u64,
    pub storage_used: u64,
    pub processes_tag: String,
    pub connection_count: u32,
}

impl Default for FakeData {
    fn default() -> Self {
        Self {
            host: "node-1".to_string(),
            cpu_percent: 10.0,
            memory_used: 1024,
            storage_used: 4096,
            processes_tag: "p0".to_string(),
            connection_count: 1,
        }
    }
}

#[derive(Default)]
pub struct FakeSource {
    data: Mutex<FakeData>,
    calls: Mutex<HashMap<&'static str, usize>>,
    failing: Mutex<HashMap<&'static str, u16>>,
    delays: Mutex<HashMap<&'static str, Duration>>,
    panicking: Mutex<HashSet<&'static str>>,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&self, edit: impl FnOnce(&mut FakeData)) {
        edit(&mut self.data.lock().unwrap());
    }

    pub fn fail(&self, path: &'static str, status: u16) {
        self.failing.lock().unwrap().insert(path, status);
    }

    pub fn recover(&self, path: &'static str) {
        self.failing.lock().unwrap().remove(path);
    }

    pub fn delay(&self, path: &'static str, delay: Duration) {
        self.delays.lock().unwrap().insert(path, delay);
    }

    pub fn undelay(&self, path: &'static str) {
        self.delays.lock().unwrap().remove(path);
    }

    pub fn panic_on(&self, path: &'static str) {
        self.panicking.lock().unwrap().insert(path);
    }

    pub fn calm(&self, path: &'static str) {
        self.panicking.lock().unwrap().remove(path);
    }

    pub fn calls(&self, path: &'static str) -> usize {
        self.calls.lock().unwrap().get(path).copied().unwrap_or(0)
    }

    async fn enter(&self, path: &'static str) -> Result<FakeData, FetchError> {
        *self.calls.lock().unwrap().entry(path).or_default() += 1;
        // values are read when the request arrives, as a server would
        let data = self.data.lock().unwrap().clone();
        let delay = self.delays.lock().unwrap().get(path).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let should_panic = self.panicking.lock().unwrap().contains(path);
        if should_panic {
            panic!("scripted panic in {path}");
        }
        let status = self.failing.lock().unwrap().get(path).copied();
        if let Some(status) = status {
            return Err(FetchError::Http {
                endpoint: path.to_string(),
                status,
            });
        }
        Ok(data)
    }
}

#[async_trait]
impl MetricsSource for FakeSource {
    async fn all_system_info(&self) -> Result<AllSystemInfo, FetchError> {
        let data = self.enter(PATH_ALL_SYSTEM).await?;
        Ok(AllSystemInfo {
            system: SystemInfo {
                hostname: data.host,
                ..SystemInfo::default()
            },
            ..AllSystemInfo::default()
        })
    }

    async fn top_processes(&self, limit: u32) -> Result<TopProcesses, FetchError> {
        let data = self.enter(PATH_TOP_PROCESSES).await?;
        let top_cpu = (0..limit.min(3))
            .map(|pid| ProcessInfo {
                pid,
                ..ProcessInfo::default()
            })
            .collect();
        Ok(TopProcesses {
            top_cpu,
            top_memory: Vec::new(),
            timestamp: data.processes_tag,
        })
    }

    async fn network_connections(&self) -> Result<NetworkConnections, FetchError> {
        let data = self.enter(PATH_NETWORK_CONNECTIONS).await?;
        Ok(NetworkConnections {
            count: data.connection_count,
            ..NetworkConnections::default()
        })
    }

    async fn health(&self) -> Result<HealthStatus, FetchError> {
        self.enter(PATH_HEALTH).await?;
        Ok(HealthStatus {
            status: "healthy".to_string(),
            message: "ok".to_string(),
        })
    }

    async fn cpu_usage(&self) -> Result<CpuUsage, FetchError> {
        let data = self.enter(PATH_CPU_USAGE).await?;
        Ok(CpuUsage {
            cpu_usage_percent: data.cpu_percent,
            ..CpuUsage::default()
        })
    }

    async fn memory_usage(&self) -> Result<MemoryUsage, FetchError> {
        let data = self.enter(PATH_MEMORY_USAGE).await?;
        Ok(MemoryUsage {
            used: data.memory_used,
            ..MemoryUsage::default()
        })
    }

    async fn storage_usage(&self) -> Result<StorageUsage, FetchError> {
        let data = self.enter(PATH_STORAGE_USAGE).await?;
        Ok(StorageUsage {
            used_space: data.storage_used,
            ..StorageUsage::default()
        })
    }

    async fn search_processes(&self, query: &str) -> Result<ProcessesResponse, FetchError> {
        self.enter(PATH_SEARCH_PROCESSES).await?;
        Ok(ProcessesResponse {
            processes: vec![ProcessInfo {
                pid: 42,
                name: query.to_string(),
                ..ProcessInfo::default()
            }],
            count: 1,
            timestamp: String::new(),
        })
    }
}
