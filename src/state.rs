use crate::api::types::{
    AllSystemInfo, CpuInfo, CpuUsage, GpuInfo, HealthStatus, MemoryInfo, MemoryUsage,
    NetworkConnections, NetworkInfo, StorageInfo, StorageUsage, SystemInfo, TopProcesses,
};
use crate::api::{ErrorKind, FetchError};
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tokio::sync::watch;

/// Latest known telemetry plus connectivity metadata.
///
/// Every data field stays `None` until the first successful fetch that owns
/// it and is only ever replaced as a whole.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Snapshot {
    pub system: Option<SystemInfo>,
    pub cpu_static: Option<CpuInfo>,
    pub memory_static: Option<MemoryInfo>,
    pub storage_static: Option<StorageInfo>,
    pub network_static: Option<NetworkInfo>,
    pub gpu_static: Option<GpuInfo>,
    pub health: Option<HealthStatus>,
    pub cpu_usage: Option<CpuUsage>,
    pub memory_usage: Option<MemoryUsage>,
    pub storage_usage: Option<StorageUsage>,
    pub top_processes: Option<TopProcesses>,
    pub network_connections: Option<NetworkConnections>,
    pub connected: bool,
    pub last_error: Option<LastError>,
    pub last_update_unix_ms: Option<i64>,
    pub revision: u64,
    #[serde(skip)]
    pub(crate) stamps: FieldStamps,
}

/// Tickets of the fetches that last wrote the fields both the full and the
/// standard tier replace.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct FieldStamps {
    top_processes: Ticket,
    network_connections: Ticket,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Full,
    Quick,
    Standard,
}

impl Tier {
    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Full => "full",
            Tier::Quick => "quick",
            Tier::Standard => "standard",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("уровень {tier}: {cause}")]
pub struct FetchFailure {
    pub tier: Tier,
    pub cause: FetchError,
}

/// Cloneable form of a [`FetchFailure`] kept in the snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LastError {
    pub tier: Tier,
    pub kind: ErrorKind,
    pub endpoint: String,
    pub message: String,
}

impl From<&FetchFailure> for LastError {
    fn from(value: &FetchFailure) -> Self {
        Self {
            tier: value.tier,
            kind: value.cause.kind(),
            endpoint: value.cause.endpoint().to_string(),
            message: value.cause.to_string(),
        }
    }
}

/// Everything one successful full-tier fetch produces.
#[derive(Debug, Clone)]
pub struct FullUpdate {
    pub issued: Ticket,
    pub all: AllSystemInfo,
    pub top_processes: TopProcesses,
    pub network_connections: NetworkConnections,
    pub health: HealthStatus,
}

/// Fields that can be replaced outside of a full-tier commit.
#[derive(Debug, Clone)]
pub enum SnapshotField {
    CpuUsage(CpuUsage),
    MemoryUsage(MemoryUsage),
    StorageUsage(StorageUsage),
    TopProcesses(TopProcesses),
    NetworkConnections(NetworkConnections),
}

#[derive(Debug, Clone, Default)]
pub enum TierStatus {
    #[default]
    Unchanged,
    Connected,
    Failed(LastError),
}

#[derive(Debug, Clone, Default)]
pub struct PartialUpdate {
    issued: Ticket,
    fields: Vec<SnapshotField>,
    status: TierStatus,
}

impl PartialUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(field: SnapshotField) -> Self {
        Self::new().with(field)
    }

    /// Ticket of the fetch that produced the fields. Untagged updates rank
    /// below every issued ticket.
    pub fn issued(mut self, ticket: Ticket) -> Self {
        self.issued = ticket;
        self
    }

    pub fn with(mut self, field: SnapshotField) -> Self {
        self.fields.push(field);
        self
    }

    pub fn connected(mut self) -> Self {
        self.status = TierStatus::Connected;
        self
    }

    pub fn failed(mut self, failure: &FetchFailure) -> Self {
        self.status = TierStatus::Failed(LastError::from(failure));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && matches!(self.status, TierStatus::Unchanged)
    }
}

/// Token for one scheduler run. Commits made with a token that is no longer
/// current are dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Generation(u64);

impl Generation {
    pub fn id(self) -> u64 {
        self.0
    }
}

/// Start order of a fetch. A field shared between tiers is only replaced by
/// a result whose fetch started no earlier than the one that last wrote it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Ticket(u64);

/// Single-writer holder of the [`Snapshot`].
///
/// Readers get a `watch::Receiver` or a clone. The generation check runs
/// inside the channel's write lock, so a commit racing with
/// [`Store::retire_generation`] either lands before it or not at all.
pub struct Store {
    tx: watch::Sender<Snapshot>,
    generation: AtomicU64,
    tickets: AtomicU64,
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Snapshot::default());
        Self {
            tx,
            generation: AtomicU64::new(0),
            tickets: AtomicU64::new(0),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> Snapshot {
        self.tx.borrow().clone()
    }

    pub fn is_current(&self, generation: Generation) -> bool {
        self.generation.load(Ordering::SeqCst) == generation.0
    }

    /// Taken right before a fetch issues its requests.
    pub fn issue_ticket(&self) -> Ticket {
        Ticket(self.tickets.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Installs an empty snapshot and returns the token of the new run.
    pub fn begin_generation(&self) -> Generation {
        let mut issued = Generation(0);
        self.tx.send_modify(|snap| {
            issued = Generation(self.generation.fetch_add(1, Ordering::SeqCst) + 1);
            let revision = snap.revision + 1;
            *snap = Snapshot::default();
            snap.revision = revision;
        });
        issued
    }

    pub fn retire_generation(&self) {
        self.tx.send_if_modified(|_| {
            self.generation.fetch_add(1, Ordering::SeqCst);
            false
        });
    }

    pub fn apply_full(&self, generation: Generation, update: FullUpdate) -> bool {
        self.commit(generation, |snap| {
            let FullUpdate {
                issued,
                all,
                top_processes,
                network_connections,
                health,
            } = update;
            snap.system = Some(all.system);
            snap.cpu_static = Some(all.cpu);
            snap.memory_static = Some(all.memory);
            snap.storage_static = Some(all.disk);
            snap.network_static = Some(all.network);
            snap.gpu_static = Some(all.gpu);
            replace_if_newer(
                &mut snap.top_processes,
                &mut snap.stamps.top_processes,
                top_processes,
                issued,
            );
            replace_if_newer(
                &mut snap.network_connections,
                &mut snap.stamps.network_connections,
                network_connections,
                issued,
            );
            snap.health = Some(health);
            snap.connected = true;
            snap.last_error = None;
            snap.last_update_unix_ms = Some(now_unix_ms());
            true
        })
    }

    pub fn apply_partial(&self, generation: Generation, update: PartialUpdate) -> bool {
        if update.is_empty() {
            return self.is_current(generation);
        }
        self.commit(generation, |snap| {
            let PartialUpdate {
                issued,
                fields,
                status,
            } = update;
            let mut written = 0;
            for field in fields {
                let replaced = match field {
                    SnapshotField::CpuUsage(v) => {
                        snap.cpu_usage = Some(v);
                        true
                    }
                    SnapshotField::MemoryUsage(v) => {
                        snap.memory_usage = Some(v);
                        true
                    }
                    SnapshotField::StorageUsage(v) => {
                        snap.storage_usage = Some(v);
                        true
                    }
                    SnapshotField::TopProcesses(v) => replace_if_newer(
                        &mut snap.top_processes,
                        &mut snap.stamps.top_processes,
                        v,
                        issued,
                    ),
                    SnapshotField::NetworkConnections(v) => replace_if_newer(
                        &mut snap.network_connections,
                        &mut snap.stamps.network_connections,
                        v,
                        issued,
                    ),
                };
                if replaced {
                    written += 1;
                }
            }
            if written > 0 {
                snap.last_update_unix_ms = Some(now_unix_ms());
            }
            match status {
                TierStatus::Unchanged => written > 0,
                TierStatus::Connected => {
                    snap.connected = true;
                    snap.last_error = None;
                    true
                }
                TierStatus::Failed(err) => {
                    snap.connected = false;
                    snap.last_error = Some(err);
                    true
                }
            }
        })
    }

    pub fn report_error(&self, generation: Generation, failure: &FetchFailure) -> bool {
        let err = LastError::from(failure);
        self.commit(generation, |snap| {
            snap.connected = false;
            snap.last_error = Some(err);
            true
        })
    }

    pub fn clear_error(&self, generation: Generation) -> bool {
        self.commit(generation, |snap| snap.last_error.take().is_some())
    }

    fn commit(&self, generation: Generation, apply: impl FnOnce(&mut Snapshot) -> bool) -> bool {
        let mut live = false;
        self.tx.send_if_modified(|snap| {
            if self.generation.load(Ordering::SeqCst) != generation.0 {
                return false;
            }
            live = true;
            let changed = apply(snap);
            if changed {
                snap.revision += 1;
            }
            changed
        });
        live
    }
}

fn replace_if_newer<T>(
    slot: &mut Option<T>,
    stamp: &mut Ticket,
    value: T,
    issued: Ticket,
) -> bool {
    if issued < *stamp {
        return false;
    }
    *slot = Some(value);
    *stamp = issued;
    true
}

fn now_unix_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
