use crate::state::{Snapshot, Tier};
use prometheus::core::Collector;
use prometheus::{opts, Counter, CounterVec, Encoder, Gauge, Registry, TextEncoder};
use std::sync::Arc;

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub hostdash_tier_commits_total: CounterVec,
    pub hostdash_tier_failures_total: CounterVec,
    pub hostdash_stale_discards_total: Counter,
    pub hostdash_connected: Gauge,
    pub hostdash_snapshot_revision: Gauge,
    pub hostdash_last_update_timestamp_seconds: Gauge,
    pub hostdash_scheduler_running: Gauge,
    pub hostdash_scrape_count_total: Counter,
}

impl Metrics {
    pub fn new() -> Result<Arc<Self>, prometheus::Error> {
        let registry = Registry::new();

        let hostdash_tier_commits_total = CounterVec::new(
            opts!(
                "hostdash_tier_commits_total",
                "Successful tier commits into the snapshot"
            ),
            &["tier"],
        )?;
        let hostdash_tier_failures_total = CounterVec::new(
            opts!(
                "hostdash_tier_failures_total",
                "Failed fetches by tier (standard tier counts each request)"
            ),
            &["tier"],
        )?;
        let hostdash_stale_discards_total = Counter::with_opts(opts!(
            "hostdash_stale_discards_total",
            "Fetch results dropped because their scheduler run had ended"
        ))?;
        let hostdash_connected = Gauge::with_opts(opts!(
            "hostdash_connected",
            "1 if the last completed tier reached the metrics API"
        ))?;
        let hostdash_snapshot_revision = Gauge::with_opts(opts!(
            "hostdash_snapshot_revision",
            "Revision counter of the published snapshot"
        ))?;
        let hostdash_last_update_timestamp_seconds = Gauge::with_opts(opts!(
            "hostdash_last_update_timestamp_seconds",
            "Unix timestamp of the last snapshot data update"
        ))?;
        let hostdash_scheduler_running = Gauge::with_opts(opts!(
            "hostdash_scheduler_running",
            "1 while the polling scheduler is running"
        ))?;
        let hostdash_scrape_count_total = Counter::with_opts(opts!(
            "hostdash_scrape_count_total",
            "Number of /metrics scrapes"
        ))?;

        register(&registry, &hostdash_tier_commits_total)?;
        register(&registry, &hostdash_tier_failures_total)?;
        register(&registry, &hostdash_stale_discards_total)?;
        register(&registry, &hostdash_connected)?;
        register(&registry, &hostdash_snapshot_revision)?;
        register(&registry, &hostdash_last_update_timestamp_seconds)?;
        register(&registry, &hostdash_scheduler_running)?;
        register(&registry, &hostdash_scrape_count_total)?;

        Ok(Arc::new(Self {
            registry,
            hostdash_tier_commits_total,
            hostdash_tier_failures_total,
            hostdash_stale_discards_total,
            hostdash_connected,
            hostdash_snapshot_revision,
            hostdash_last_update_timestamp_seconds,
            hostdash_scheduler_running,
            hostdash_scrape_count_total,
        }))
    }

    pub fn update_from_snapshot(&self, snap: &Snapshot) {
        self.hostdash_connected
            .set(if snap.connected { 1.0 } else { 0.0 });
        self.hostdash_snapshot_revision.set(snap.revision as f64);
        if let Some(ms) = snap.last_update_unix_ms {
            self.hostdash_last_update_timestamp_seconds
                .set(ms as f64 / 1000.0);
        }
    }

    pub fn set_scheduler_running(&self, running: bool) {
        self.hostdash_scheduler_running
            .set(if running { 1.0 } else { 0.0 });
    }

    pub fn inc_commit(&self, tier: Tier) {
        self.hostdash_tier_commits_total
            .with_label_values(&[tier.as_str()])
            .inc();
    }

    pub fn inc_failure(&self, tier: Tier) {
        self.hostdash_tier_failures_total
            .with_label_values(&[tier.as_str()])
            .inc();
    }

    pub fn inc_stale_discard(&self) {
        self.hostdash_stale_discards_total.inc();
    }

    pub fn inc_scrape_count(&self) {
        self.hostdash_scrape_count_total.inc();
    }

    pub fn encode_metrics(&self) -> Result<Vec<u8>, prometheus::Error> {
        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        let mf = self.registry.gather();
        encoder.encode(&mf, &mut buf)?;
        Ok(buf)
    }
}

fn register<T: Collector + Clone + 'static>(
    registry: &Registry,
    collector: &T,
) -> Result<(), prometheus::Error> {
    registry.register(Box::new(collector.clone()))
}
