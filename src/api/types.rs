//! Payloads of the remote metrics API.
//!
//! Every struct is lenient: missing keys and `null` values fall back to
//! defaults and unknown keys are ignored, so drift in the remote schema
//! only ever surfaces as a [`FetchError::Parse`](super::FetchError::Parse)
//! when the body is not JSON of the expected overall shape.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// psutil reports unavailable readings (frequency on VMs, GPU sensors) as
/// `null`; those decode as the field's default.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SystemInfo {
    #[serde(deserialize_with = "null_as_default")]
    pub platform: String,
    #[serde(deserialize_with = "null_as_default")]
    pub platform_release: String,
    #[serde(deserialize_with = "null_as_default")]
    pub platform_version: String,
    #[serde(deserialize_with = "null_as_default")]
    pub architecture: String,
    #[serde(deserialize_with = "null_as_default")]
    pub processor: String,
    #[serde(deserialize_with = "null_as_default")]
    pub hostname: String,
    #[serde(deserialize_with = "null_as_default")]
    pub python_version: String,
    #[serde(deserialize_with = "null_as_default")]
    pub boot_time: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub uptime: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CpuInfo {
    #[serde(deserialize_with = "null_as_default")]
    pub physical_cores: u32,
    #[serde(deserialize_with = "null_as_default")]
    pub total_cores: u32,
    #[serde(deserialize_with = "null_as_default")]
    pub max_frequency: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub current_frequency: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub min_frequency: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub cpu_usage_percent: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub cpu_usage_per_core: Vec<f64>,
    pub temperature: Option<f64>,
    #[serde(deserialize_with = "null_as_default")]
    pub cpu_times: CpuTimes,
    #[serde(deserialize_with = "null_as_default")]
    pub cpu_stats: CpuStats,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CpuTimes {
    #[serde(deserialize_with = "null_as_default")]
    pub user: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub system: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub idle: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub nice: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub iowait: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub irq: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub softirq: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub steal: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub guest: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub guest_nice: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CpuStats {
    #[serde(deserialize_with = "null_as_default")]
    pub ctx_switches: u64,
    #[serde(deserialize_with = "null_as_default")]
    pub interrupts: u64,
    #[serde(deserialize_with = "null_as_default")]
    pub soft_interrupts: u64,
    #[serde(deserialize_with = "null_as_default")]
    pub syscalls: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct MemoryInfo {
    #[serde(deserialize_with = "null_as_default")]
    pub total: u64,
    #[serde(deserialize_with = "null_as_default")]
    pub available: u64,
    #[serde(deserialize_with = "null_as_default")]
    pub used: u64,
    #[serde(deserialize_with = "null_as_default")]
    pub free: u64,
    #[serde(deserialize_with = "null_as_default")]
    pub percent: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub swap: SwapInfo,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SwapInfo {
    #[serde(deserialize_with = "null_as_default")]
    pub total: u64,
    #[serde(deserialize_with = "null_as_default")]
    pub used: u64,
    #[serde(deserialize_with = "null_as_default")]
    pub free: u64,
    #[serde(deserialize_with = "null_as_default")]
    pub percent: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DiskPartition {
    #[serde(deserialize_with = "null_as_default")]
    pub mountpoint: String,
    #[serde(deserialize_with = "null_as_default")]
    pub filesystem: String,
    #[serde(deserialize_with = "null_as_default")]
    pub total: u64,
    #[serde(deserialize_with = "null_as_default")]
    pub used: u64,
    #[serde(deserialize_with = "null_as_default")]
    pub free: u64,
    #[serde(deserialize_with = "null_as_default")]
    pub percent: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageInfo {
    #[serde(deserialize_with = "null_as_default")]
    pub partitions: BTreeMap<String, DiskPartition>,
    #[serde(deserialize_with = "null_as_default")]
    pub io_counters: DiskIoCounters,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DiskIoCounters {
    #[serde(deserialize_with = "null_as_default")]
    pub read_count: u64,
    #[serde(deserialize_with = "null_as_default")]
    pub write_count: u64,
    #[serde(deserialize_with = "null_as_default")]
    pub read_bytes: u64,
    #[serde(deserialize_with = "null_as_default")]
    pub write_bytes: u64,
    #[serde(deserialize_with = "null_as_default")]
    pub read_time: u64,
    #[serde(deserialize_with = "null_as_default")]
    pub write_time: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct NetworkInfo {
    #[serde(deserialize_with = "null_as_default")]
    pub interfaces: BTreeMap<String, NetworkInterface>,
    #[serde(deserialize_with = "null_as_default")]
    pub io_counters: NetIoCounters,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct NetworkInterface {
    #[serde(deserialize_with = "null_as_default")]
    pub addresses: Vec<InterfaceAddress>,
    #[serde(deserialize_with = "null_as_default")]
    pub stats: InterfaceStats,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct InterfaceAddress {
    #[serde(deserialize_with = "null_as_default")]
    pub family: String,
    #[serde(deserialize_with = "null_as_default")]
    pub address: String,
    pub netmask: Option<String>,
    pub broadcast: Option<String>,
    pub ptp: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct InterfaceStats {
    #[serde(deserialize_with = "null_as_default")]
    pub isup: bool,
    #[serde(deserialize_with = "null_as_default")]
    pub duplex: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub speed: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub mtu: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct NetIoCounters {
    #[serde(deserialize_with = "null_as_default")]
    pub bytes_sent: u64,
    #[serde(deserialize_with = "null_as_default")]
    pub bytes_recv: u64,
    #[serde(deserialize_with = "null_as_default")]
    pub packets_sent: u64,
    #[serde(deserialize_with = "null_as_default")]
    pub packets_recv: u64,
    #[serde(deserialize_with = "null_as_default")]
    pub errin: u64,
    #[serde(deserialize_with = "null_as_default")]
    pub errout: u64,
    #[serde(deserialize_with = "null_as_default")]
    pub dropin: u64,
    #[serde(deserialize_with = "null_as_default")]
    pub dropout: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct GpuInfo {
    #[serde(deserialize_with = "null_as_default")]
    pub nvidia: Vec<DiscreteGpu>,
    #[serde(deserialize_with = "null_as_default")]
    pub amd: Vec<DiscreteGpu>,
    #[serde(deserialize_with = "null_as_default")]
    pub integrated: Vec<IntegratedGpu>,
    #[serde(deserialize_with = "null_as_default")]
    pub raspberry_pi: RaspberryPiGpu,
    pub general: serde_json::Value,
    #[serde(deserialize_with = "null_as_default")]
    pub opengl: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DiscreteGpu {
    pub id: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub memory_total: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub memory_used: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub memory_free: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub temperature: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub utilization: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct IntegratedGpu {
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(rename = "type", deserialize_with = "null_as_default")]
    pub kind: String,
    #[serde(deserialize_with = "null_as_default")]
    pub usage_percent: String,
    #[serde(deserialize_with = "null_as_default")]
    pub source: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RaspberryPiGpu {
    #[serde(deserialize_with = "null_as_default")]
    pub available: bool,
    #[serde(deserialize_with = "null_as_default")]
    pub gpu_memory: String,
    #[serde(rename = "type", deserialize_with = "null_as_default")]
    pub kind: String,
    #[serde(deserialize_with = "null_as_default")]
    pub temperature: String,
    #[serde(deserialize_with = "null_as_default")]
    pub frequency: String,
}

/// Aggregate returned by `/api/system/`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct AllSystemInfo {
    #[serde(deserialize_with = "null_as_default")]
    pub timestamp: String,
    #[serde(deserialize_with = "null_as_default")]
    pub system: SystemInfo,
    #[serde(deserialize_with = "null_as_default")]
    pub cpu: CpuInfo,
    #[serde(deserialize_with = "null_as_default")]
    pub memory: MemoryInfo,
    #[serde(deserialize_with = "null_as_default")]
    pub disk: StorageInfo,
    #[serde(deserialize_with = "null_as_default")]
    pub network: NetworkInfo,
    #[serde(deserialize_with = "null_as_default")]
    pub gpu: GpuInfo,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthStatus {
    #[serde(deserialize_with = "null_as_default")]
    pub status: String,
    #[serde(deserialize_with = "null_as_default")]
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CpuUsage {
    #[serde(deserialize_with = "null_as_default")]
    pub cpu_usage_percent: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub cpu_usage_per_core: Vec<f64>,
    #[serde(deserialize_with = "null_as_default")]
    pub timestamp: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct MemoryUsage {
    #[serde(deserialize_with = "null_as_default")]
    pub total: u64,
    #[serde(deserialize_with = "null_as_default")]
    pub used: u64,
    #[serde(deserialize_with = "null_as_default")]
    pub free: u64,
    #[serde(deserialize_with = "null_as_default")]
    pub percent: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub timestamp: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageUsage {
    #[serde(deserialize_with = "null_as_default")]
    pub total_space: u64,
    #[serde(deserialize_with = "null_as_default")]
    pub used_space: u64,
    #[serde(deserialize_with = "null_as_default")]
    pub free_space: u64,
    #[serde(deserialize_with = "null_as_default")]
    pub usage_percent: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub partitions_count: u32,
    #[serde(deserialize_with = "null_as_default")]
    pub timestamp: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ProcessInfo {
    #[serde(deserialize_with = "null_as_default")]
    pub pid: u32,
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
    pub username: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub cpu_percent: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub memory_percent: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub status: String,
    #[serde(deserialize_with = "null_as_default")]
    pub create_time: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub memory_info: ProcessMemory,
    #[serde(deserialize_with = "null_as_default")]
    pub cpu_info: ProcessCpu,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ProcessMemory {
    #[serde(deserialize_with = "null_as_default")]
    pub rss: u64,
    #[serde(deserialize_with = "null_as_default")]
    pub vms: u64,
    #[serde(deserialize_with = "null_as_default")]
    pub percent: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ProcessCpu {
    #[serde(deserialize_with = "null_as_default")]
    pub percent: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub num_threads: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ProcessesResponse {
    #[serde(deserialize_with = "null_as_default")]
    pub processes: Vec<ProcessInfo>,
    #[serde(deserialize_with = "null_as_default")]
    pub count: u32,
    #[serde(deserialize_with = "null_as_default")]
    pub timestamp: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TopProcesses {
    #[serde(deserialize_with = "null_as_default")]
    pub top_cpu: Vec<ProcessInfo>,
    #[serde(deserialize_with = "null_as_default")]
    pub top_memory: Vec<ProcessInfo>,
    #[serde(deserialize_with = "null_as_default")]
    pub timestamp: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct NetworkConnection {
    #[serde(deserialize_with = "null_as_default")]
    pub fd: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub family: String,
    #[serde(rename = "type", deserialize_with = "null_as_default")]
    pub kind: String,
    #[serde(deserialize_with = "null_as_default")]
    pub laddr: String,
    pub raddr: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub status: String,
    pub pid: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct NetworkConnections {
    #[serde(deserialize_with = "null_as_default")]
    pub connections: Vec<NetworkConnection>,
    #[serde(deserialize_with = "null_as_default")]
    pub count: u32,
    #[serde(deserialize_with = "null_as_default")]
    pub timestamp: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregate_tolerates_missing_sections() {
        let body = r#"{
            "timestamp": "2024-05-01T10:00:00",
            "system": {"hostname": "pi", "uptime": 3600.5},
            "cpu": {"total_cores": 4, "temperature": null},
            "gpu": {"general": {"driver": "vc4"}, "opengl": "3.1"}
        }"#;
        let parsed: AllSystemInfo = serde_json::from_str(body).expect("разбор агрегата");
        assert_eq!(parsed.system.hostname, "pi");
        assert_eq!(parsed.cpu.total_cores, 4);
        assert!(parsed.cpu.temperature.is_none());
        assert!(parsed.disk.partitions.is_empty());
        assert_eq!(parsed.gpu.general["driver"], "vc4");
    }

    #[test]
    fn nulls_decode_as_defaults() {
        let body = r#"{
            "system": {"hostname": "vm", "boot_time": null},
            "cpu": {"total_cores": 2, "max_frequency": null, "current_frequency": null,
                    "min_frequency": null, "cpu_times": null},
            "disk": {"partitions": null},
            "gpu": {"nvidia": [{"name": "T4", "temperature": null, "utilization": null}],
                    "raspberry_pi": null, "opengl": null}
        }"#;
        let parsed: AllSystemInfo = serde_json::from_str(body).expect("разбор агрегата");
        assert_eq!(parsed.system.hostname, "vm");
        assert_eq!(parsed.cpu.total_cores, 2);
        assert_eq!(parsed.cpu.max_frequency, 0.0);
        assert_eq!(parsed.cpu.cpu_times, CpuTimes::default());
        assert!(parsed.disk.partitions.is_empty());
        assert_eq!(parsed.gpu.nvidia[0].name, "T4");
        assert_eq!(parsed.gpu.nvidia[0].temperature, 0.0);
        assert_eq!(parsed.gpu.opengl, "");

        let body = r#"{"top_cpu":[{"pid":1,"name":"init","username":null,"status":null,
            "memory_info":null,"cpu_info":{"percent":null,"num_threads":1}}],
            "top_memory":null,"timestamp":"t"}"#;
        let parsed: TopProcesses = serde_json::from_str(body).expect("разбор процессов");
        assert_eq!(parsed.top_cpu[0].name, "init");
        assert_eq!(parsed.top_cpu[0].memory_info, ProcessMemory::default());
        assert_eq!(parsed.top_cpu[0].cpu_info.num_threads, 1);
        assert!(parsed.top_memory.is_empty());
    }

    #[test]
    fn connection_type_field_is_renamed() {
        let body = r#"{"connections":[{"fd":3,"family":"AF_INET","type":"SOCK_STREAM",
            "laddr":"127.0.0.1:22","status":"LISTEN"}],"count":1,"timestamp":"t"}"#;
        let parsed: NetworkConnections = serde_json::from_str(body).expect("разбор соединений");
        assert_eq!(parsed.count, 1);
        assert_eq!(parsed.connections[0].kind, "SOCK_STREAM");
        assert!(parsed.connections[0].raddr.is_none());
    }
}
