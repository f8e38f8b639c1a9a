use crate::api::types::ProcessInfo;
use crate::api::{FetchError, MetricsSource};
use crate::metrics::Metrics;
use crate::state::{
    FetchFailure, FullUpdate, Generation, PartialUpdate, SnapshotField, Store, Tier,
};
use std::sync::Arc;
use tracing::{debug, warn};

/// Turns "fetch tier X" into API calls and commits the outcome to the
/// [`Store`]. Nothing here returns an error: every failure ends up in the
/// snapshot or in the log.
pub struct Orchestrator {
    source: Arc<dyn MetricsSource>,
    store: Arc<Store>,
    metrics: Arc<Metrics>,
    top_limit: u32,
}

impl Orchestrator {
    pub fn new(
        source: Arc<dyn MetricsSource>,
        store: Arc<Store>,
        metrics: Arc<Metrics>,
        top_limit: u32,
    ) -> Self {
        Self {
            source,
            store,
            metrics,
            top_limit,
        }
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// Full tier. All four results are committed together or not at all.
    pub async fn fetch_all(&self, generation: Generation) {
        if !self.is_live(Tier::Full, generation) {
            return;
        }
        self.store.clear_error(generation);
        let issued = self.store.issue_ticket();

        let result = tokio::try_join!(
            self.source.all_system_info(),
            self.source.top_processes(self.top_limit),
            self.source.network_connections(),
            self.source.health(),
        );

        match result {
            Ok((all, top_processes, network_connections, health)) => {
                let committed = self.store.apply_full(
                    generation,
                    FullUpdate {
                        issued,
                        all,
                        top_processes,
                        network_connections,
                        health,
                    },
                );
                self.after_commit(Tier::Full, committed, true);
            }
            Err(cause) => {
                let failure = FetchFailure {
                    tier: Tier::Full,
                    cause,
                };
                warn!(
                    tier = %failure.tier,
                    endpoint = failure.cause.endpoint(),
                    error = %failure.cause,
                    "полный опрос не удался, данные не применены"
                );
                let committed = self.store.report_error(generation, &failure);
                self.after_commit(Tier::Full, committed, false);
            }
        }
    }

    /// Quick tier. Gauges that arrived are kept even when a sibling failed.
    pub async fn fetch_overview(&self, generation: Generation) {
        if !self.is_live(Tier::Quick, generation) {
            return;
        }

        let (cpu, memory, storage) = tokio::join!(
            self.source.cpu_usage(),
            self.source.memory_usage(),
            self.source.storage_usage(),
        );

        let mut update = PartialUpdate::new();
        let mut failures: Vec<FetchError> = Vec::new();
        match cpu {
            Ok(v) => update = update.with(SnapshotField::CpuUsage(v)),
            Err(err) => failures.push(err),
        }
        match memory {
            Ok(v) => update = update.with(SnapshotField::MemoryUsage(v)),
            Err(err) => failures.push(err),
        }
        match storage {
            Ok(v) => update = update.with(SnapshotField::StorageUsage(v)),
            Err(err) => failures.push(err),
        }

        for err in &failures {
            warn!(tier = %Tier::Quick, endpoint = err.endpoint(), error = %err, "датчик не получен");
        }
        let succeeded = failures.is_empty();
        let update = match failures.into_iter().next() {
            Some(cause) => update.failed(&FetchFailure {
                tier: Tier::Quick,
                cause,
            }),
            None => update.connected(),
        };

        let committed = self.store.apply_partial(generation, update);
        self.after_commit(Tier::Quick, committed, succeeded);
    }

    /// Standard tier. Two independent refreshes; failures are only logged.
    pub async fn fetch_dynamic(&self, generation: Generation) {
        if !self.is_live(Tier::Standard, generation) {
            return;
        }

        tokio::join!(
            self.refresh_top_processes(generation),
            self.refresh_network_connections(generation),
        );
    }

    async fn refresh_top_processes(&self, generation: Generation) {
        let issued = self.store.issue_ticket();
        match self.source.top_processes(self.top_limit).await {
            Ok(top) => {
                let committed = self.store.apply_partial(
                    generation,
                    PartialUpdate::field(SnapshotField::TopProcesses(top)).issued(issued),
                );
                self.after_commit(Tier::Standard, committed, true);
            }
            Err(err) => self.log_standard_failure(&err),
        }
    }

    async fn refresh_network_connections(&self, generation: Generation) {
        let issued = self.store.issue_ticket();
        match self.source.network_connections().await {
            Ok(conns) => {
                let committed = self.store.apply_partial(
                    generation,
                    PartialUpdate::field(SnapshotField::NetworkConnections(conns)).issued(issued),
                );
                self.after_commit(Tier::Standard, committed, true);
            }
            Err(err) => self.log_standard_failure(&err),
        }
    }

    /// One-shot process lookup. Never touches the snapshot.
    pub async fn search_processes(&self, query: &str) -> Vec<ProcessInfo> {
        match self.source.search_processes(query).await {
            Ok(found) => found.processes,
            Err(err) => {
                warn!(query, error = %err, "поиск процессов не удался");
                Vec::new()
            }
        }
    }

    fn is_live(&self, tier: Tier, generation: Generation) -> bool {
        let live = self.store.is_current(generation);
        if !live {
            debug!(%tier, generation = generation.id(), "опрос остановлен, запросы не отправляются");
        }
        live
    }

    fn log_standard_failure(&self, err: &FetchError) {
        self.metrics.inc_failure(Tier::Standard);
        warn!(tier = %Tier::Standard, endpoint = err.endpoint(), error = %err, "обновление не удалось");
    }

    fn after_commit(&self, tier: Tier, committed: bool, succeeded: bool) {
        if !committed {
            self.metrics.inc_stale_discard();
            debug!(%tier, "результат устаревшего опроса отброшен");
            return;
        }
        if succeeded {
            self.metrics.inc_commit(tier);
        } else {
            self.metrics.inc_failure(tier);
        }
    }
}
