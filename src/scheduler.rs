use crate::config::PollPeriods;
use crate::metrics::Metrics;
use crate::orchestrator::Orchestrator;
use crate::state::{Generation, Tier};
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Stopped,
    Starting,
    Running,
}

/// A repeating timer that runs `action` once per period, first after
/// `delay`. Each firing runs in its own task and the timer waits for it, so
/// firings of one task never overlap. Ticks missed meanwhile are skipped.
pub struct PeriodicTask {
    name: &'static str,
    handle: Option<JoinHandle<()>>,
}

impl PeriodicTask {
    pub fn spawn<F, Fut>(
        name: &'static str,
        delay: Duration,
        period: Duration,
        mut action: F,
    ) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + delay, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                // Aborting this loop detaches the firing instead of dropping it.
                let _ = tokio::spawn(run_guarded(name, action())).await;
            }
        });
        Self {
            name,
            handle: Some(handle),
        }
    }

    pub fn is_armed(&self) -> bool {
        self.handle.is_some()
    }

    pub fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            debug!(task = self.name, "таймер снят");
        }
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Runs `fut` to completion. A panic inside it is logged and goes no further.
async fn run_guarded<Fut>(name: &'static str, fut: Fut)
where
    Fut: Future<Output = ()> + Send + 'static,
{
    if AssertUnwindSafe(fut).catch_unwind().await.is_err() {
        error!(task = name, "опрос завершился паникой, таймер продолжает работу");
    }
}

async fn run_tier(orchestrator: Arc<Orchestrator>, tier: Tier, generation: Generation) {
    match tier {
        Tier::Full => orchestrator.fetch_all(generation).await,
        Tier::Quick => orchestrator.fetch_overview(generation).await,
        Tier::Standard => orchestrator.fetch_dynamic(generation).await,
    }
}

/// Owns the three polling cadences and their lifecycle.
///
/// `start` and `stop` never block. Each `start` opens a new store
/// generation, so work launched by an earlier run cannot commit once
/// `stop` has returned.
pub struct PollingScheduler {
    orchestrator: Arc<Orchestrator>,
    metrics: Arc<Metrics>,
    periods: PollPeriods,
    state: SchedulerState,
    generation: Option<Generation>,
    tasks: Vec<PeriodicTask>,
}

impl PollingScheduler {
    pub fn new(orchestrator: Arc<Orchestrator>, metrics: Arc<Metrics>, periods: PollPeriods) -> Self {
        Self {
            orchestrator,
            metrics,
            periods,
            state: SchedulerState::Stopped,
            generation: None,
            tasks: Vec::new(),
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn generation(&self) -> Option<Generation> {
        self.generation
    }

    pub fn armed_timers(&self) -> usize {
        self.tasks.iter().filter(|t| t.is_armed()).count()
    }

    pub fn start(&mut self) {
        if self.state == SchedulerState::Running {
            debug!("опрос уже запущен");
            return;
        }
        self.state = SchedulerState::Starting;

        let generation = self.orchestrator.store().begin_generation();
        info!(
            generation = generation.id(),
            quick = ?self.periods.quick,
            standard = ?self.periods.standard,
            slow = ?self.periods.slow,
            "запуск опроса"
        );

        // The slow task fires at once: that is the initial full fetch.
        self.tasks = vec![
            self.arm("quick", self.periods.quick, self.periods.quick, Tier::Quick, generation),
            self.arm(
                "standard",
                self.periods.standard,
                self.periods.standard,
                Tier::Standard,
                generation,
            ),
            self.arm("slow", Duration::ZERO, self.periods.slow, Tier::Full, generation),
        ];

        self.generation = Some(generation);
        self.state = SchedulerState::Running;
        self.metrics.set_scheduler_running(true);
    }

    pub fn stop(&mut self) {
        for task in &mut self.tasks {
            task.cancel();
        }
        self.tasks.clear();
        if self.state == SchedulerState::Stopped {
            return;
        }

        self.orchestrator.store().retire_generation();
        self.generation = None;
        self.state = SchedulerState::Stopped;
        self.metrics.set_scheduler_running(false);
        info!("опрос остановлен");
    }

    fn arm(
        &self,
        name: &'static str,
        delay: Duration,
        period: Duration,
        tier: Tier,
        generation: Generation,
    ) -> PeriodicTask {
        let orchestrator = self.orchestrator.clone();
        PeriodicTask::spawn(name, delay, period, move || {
            run_tier(orchestrator.clone(), tier, generation)
        })
    }
}

impl Drop for PollingScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::fake::FakeSource;
    use crate::api::{
        PATH_ALL_SYSTEM, PATH_CPU_USAGE, PATH_HEALTH, PATH_NETWORK_CONNECTIONS,
        PATH_TOP_PROCESSES,
    };
    use crate::state::Store;

    struct Harness {
        fake: Arc<FakeSource>,
        store: Arc<Store>,
        scheduler: PollingScheduler,
    }

    fn harness() -> Harness {
        let fake = Arc::new(FakeSource::new());
        let store = Arc::new(Store::new());
        let metrics = Metrics::new().expect("инициализация метрик");
        let orchestrator = Arc::new(Orchestrator::new(
            fake.clone(),
            store.clone(),
            metrics.clone(),
            10,
        ));
        let scheduler = PollingScheduler::new(orchestrator, metrics, PollPeriods::default());
        Harness {
            fake,
            store,
            scheduler,
        }
    }

    async fn settle() {
        for _ in 0..32 {
            tokio::task::yield_now().await;
        }
    }

    async fn advance_secs(secs: u64) {
        for _ in 0..secs {
            tokio::time::advance(Duration::from_secs(1)).await;
            settle().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn start_fetches_immediately_then_on_each_cadence() {
        let mut h = harness();
        h.scheduler.start();
        settle().await;

        assert_eq!(h.scheduler.state(), SchedulerState::Running);
        assert_eq!(h.fake.calls(PATH_ALL_SYSTEM), 1);
        assert_eq!(h.fake.calls(PATH_CPU_USAGE), 0);
        assert!(h.store.current().connected);

        advance_secs(10).await;
        assert_eq!(h.fake.calls(PATH_CPU_USAGE), 5);
        assert_eq!(h.fake.calls(PATH_ALL_SYSTEM), 2);
        assert_eq!(h.fake.calls(PATH_HEALTH), 2);
        // two full-tier fetches plus two standard ticks
        assert_eq!(h.fake.calls(PATH_NETWORK_CONNECTIONS), 4);
        assert_eq!(h.fake.calls(PATH_TOP_PROCESSES), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn second_start_while_running_is_a_no_op() {
        let mut h = harness();
        h.scheduler.start();
        let first = h.scheduler.generation();
        h.scheduler.start();
        settle().await;

        assert_eq!(h.scheduler.generation(), first);
        assert_eq!(h.scheduler.armed_timers(), 3);
        assert_eq!(h.fake.calls(PATH_ALL_SYSTEM), 1);

        advance_secs(2).await;
        assert_eq!(h.fake.calls(PATH_CPU_USAGE), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn double_start_then_stop_leaves_no_timers() {
        let mut h = harness();
        h.scheduler.start();
        h.scheduler.start();
        settle().await;
        h.scheduler.stop();

        assert_eq!(h.scheduler.state(), SchedulerState::Stopped);
        assert_eq!(h.scheduler.armed_timers(), 0);
        let full = h.fake.calls(PATH_ALL_SYSTEM);
        let cpu = h.fake.calls(PATH_CPU_USAGE);
        let conns = h.fake.calls(PATH_NETWORK_CONNECTIONS);

        advance_secs(30).await;
        assert_eq!(h.fake.calls(PATH_ALL_SYSTEM), full);
        assert_eq!(h.fake.calls(PATH_CPU_USAGE), cpu);
        assert_eq!(h.fake.calls(PATH_NETWORK_CONNECTIONS), conns);
    }

    #[tokio::test(start_paused = true)]
    async fn response_arriving_after_stop_is_not_committed() {
        let mut h = harness();
        h.fake.delay(PATH_ALL_SYSTEM, Duration::from_secs(3));
        h.scheduler.start();
        settle().await;
        assert_eq!(h.fake.calls(PATH_ALL_SYSTEM), 1);

        h.scheduler.stop();
        let mut rx = h.store.subscribe();
        let before = rx.borrow_and_update().clone();

        advance_secs(5).await;
        assert!(!rx.has_changed().unwrap());
        let after = h.store.current();
        assert_eq!(after.revision, before.revision);
        assert!(after.system.is_none());
        assert!(!after.connected);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_tick_is_never_overtaken_by_the_next_one() {
        let mut h = harness();
        h.fake.update(|d| d.cpu_percent = 1.0);
        h.fake.delay(PATH_CPU_USAGE, Duration::from_secs(3));
        h.scheduler.start();
        settle().await;

        advance_secs(2).await;
        assert_eq!(h.fake.calls(PATH_CPU_USAGE), 1);
        h.fake.update(|d| d.cpu_percent = 2.0);
        h.fake.undelay(PATH_CPU_USAGE);

        advance_secs(2).await;
        assert_eq!(h.fake.calls(PATH_CPU_USAGE), 1);
        assert!(h.store.current().cpu_usage.is_none());

        // the slow reading lands first, then the missed tick fires at once
        advance_secs(1).await;
        assert_eq!(h.fake.calls(PATH_CPU_USAGE), 2);
        assert_eq!(h.store.current().cpu_usage.unwrap().cpu_usage_percent, 2.0);

        h.fake.update(|d| d.cpu_percent = 3.0);
        advance_secs(4).await;
        assert_eq!(h.store.current().cpu_usage.unwrap().cpu_usage_percent, 3.0);
    }

    #[tokio::test(start_paused = true)]
    async fn restart_behaves_like_first_start() {
        let mut h = harness();
        h.scheduler.start();
        settle().await;
        let first = h.scheduler.generation().unwrap();
        h.scheduler.stop();

        h.fake.update(|d| d.host = "node-restarted".to_string());
        h.scheduler.start();
        settle().await;

        let second = h.scheduler.generation().unwrap();
        assert_ne!(first, second);
        assert_eq!(h.scheduler.armed_timers(), 3);
        assert_eq!(h.fake.calls(PATH_ALL_SYSTEM), 2);
        assert_eq!(
            h.store.current().system.unwrap().hostname,
            "node-restarted"
        );

        advance_secs(2).await;
        assert_eq!(h.fake.calls(PATH_CPU_USAGE), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failing_tier_does_not_stop_its_timer() {
        let mut h = harness();
        h.fake.fail(PATH_CPU_USAGE, 500);
        h.scheduler.start();
        settle().await;

        advance_secs(4).await;
        assert_eq!(h.fake.calls(PATH_CPU_USAGE), 2);
        let snap = h.store.current();
        assert!(!snap.connected);
        assert_eq!(snap.last_error.unwrap().endpoint, PATH_CPU_USAGE);

        h.fake.recover(PATH_CPU_USAGE);
        advance_secs(2).await;
        let snap = h.store.current();
        assert!(snap.connected);
        assert!(snap.cpu_usage.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_fetch_does_not_kill_the_timer() {
        let mut h = harness();
        h.fake.panic_on(PATH_CPU_USAGE);
        h.scheduler.start();
        settle().await;

        advance_secs(2).await;
        assert_eq!(h.fake.calls(PATH_CPU_USAGE), 1);
        assert!(h.store.current().cpu_usage.is_none());

        h.fake.calm(PATH_CPU_USAGE);
        advance_secs(2).await;
        assert_eq!(h.fake.calls(PATH_CPU_USAGE), 2);
        assert!(h.store.current().cpu_usage.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_scheduler_silences_timers() {
        let h = harness();
        let Harness {
            fake,
            store,
            mut scheduler,
        } = h;
        scheduler.start();
        settle().await;
        drop(scheduler);

        let cpu = fake.calls(PATH_CPU_USAGE);
        advance_secs(10).await;
        assert_eq!(fake.calls(PATH_CPU_USAGE), cpu);
        assert!(store.current().system.is_some());
    }

    #[test]
    fn stop_without_start_is_harmless() {
        let mut h = harness();
        h.scheduler.stop();
        assert_eq!(h.scheduler.state(), SchedulerState::Stopped);
        assert!(h.scheduler.generation().is_none());
    }
}
