use std::collections::HashMap;
use std::sync::{ Arc, Mutex, MutexGuard, PoisonError };

use chrono::{ DateTime, Utc };
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{ debug, error, info, warn };
use uuid::Uuid;

use crate::clock::Clock;
use crate::db::{ investment_plan, PlanStore };
use crate::enums::Frequency;
use crate::error::{ AppError, Result };
use crate::executor::{ PlanExecutor, TickOutcome };

struct ScheduledTimer {
    frequency: Frequency,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Owns one recurring timer per active plan.
///
/// Each timer is a tokio task that sleeps until the next period boundary of
/// its plan's frequency and then runs one tick through the executor. A tick
/// is awaited before the next sleep, so a timer never overlaps itself.
pub struct PlanScheduler {
    executor: Arc<PlanExecutor>,
    clock: Arc<dyn Clock>,
    timers: Mutex<HashMap<Uuid, ScheduledTimer>>,
    shutdown: CancellationToken,
}

impl PlanScheduler {
    pub fn new(executor: Arc<PlanExecutor>, clock: Arc<dyn Clock>) -> Self {
        Self {
            executor,
            clock,
            timers: Mutex::new(HashMap::new()),
            shutdown: CancellationToken::new(),
        }
    }

    fn timers(&self) -> MutexGuard<'_, HashMap<Uuid, ScheduledTimer>> {
        self.timers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start (or restart) the timer for `plan`.
    ///
    /// An existing timer for the same id is cancelled; a tick it already
    /// started runs to completion.
    pub fn schedule_plan(&self, plan: &investment_plan::Model) -> Result<()> {
        if !plan.is_active {
            return Err(AppError::validation(format!("Plan {} is not active", plan.id)));
        }

        let frequency: Frequency = plan.frequency.parse()?;
        let cancel = self.shutdown.child_token();

        let handle = tokio::spawn(
            run_timer(
                self.executor.clone(),
                self.clock.clone(),
                plan.id,
                frequency,
                cancel.clone()
            )
        );

        let previous = self.timers().insert(plan.id, ScheduledTimer { frequency, cancel, handle });

        if let Some(previous) = previous {
            previous.cancel.cancel();
            debug!(plan_id = %plan.id, "Replaced existing timer");
        }

        info!(
            plan_id = %plan.id,
            frequency = %frequency,
            cron = frequency.cron_expression(),
            "Plan scheduled"
        );

        Ok(())
    }

    /// Cancel the timer for `plan_id`. Returns whether one was registered.
    pub fn unschedule_plan(&self, plan_id: Uuid) -> bool {
        match self.timers().remove(&plan_id) {
            Some(timer) => {
                timer.cancel.cancel();
                info!(%plan_id, frequency = %timer.frequency, "Plan unscheduled");
                true
            }
            None => false,
        }
    }

    /// Schedule every active plan in `store`. Returns the number of timers started.
    ///
    /// A store failure is logged and leaves the scheduler empty.
    pub async fn initialize_from_store(&self, store: &dyn PlanStore) -> usize {
        let plans = match store.find_active_plans().await {
            Ok(plans) => plans,
            Err(e) => {
                error!("Failed to load active plans, starting with none scheduled: {}", e);
                return 0;
            }
        };

        let mut started = 0;
        for plan in &plans {
            match self.schedule_plan(plan) {
                Ok(()) => {
                    started += 1;
                }
                Err(e) => warn!(plan_id = %plan.id, "Skipping plan on startup: {}", e),
            }
        }

        info!("Initialized {} of {} active plans", started, plans.len());
        started
    }

    pub fn is_scheduled(&self, plan_id: Uuid) -> bool {
        self.timers().contains_key(&plan_id)
    }

    pub fn scheduled_count(&self) -> usize {
        self.timers().len()
    }

    /// Cancel every timer and wait for in-flight ticks to finish.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();

        let timers: Vec<ScheduledTimer> = self
            .timers()
            .drain()
            .map(|(_, timer)| timer)
            .collect();

        info!("Stopping {} plan timers", timers.len());

        for timer in timers {
            if let Err(e) = timer.handle.await {
                warn!("Plan timer ended abnormally: {}", e);
            }
        }
    }
}

async fn run_timer(
    executor: Arc<PlanExecutor>,
    clock: Arc<dyn Clock>,
    plan_id: Uuid,
    frequency: Frequency,
    cancel: CancellationToken
) {
    let mut last_target: Option<DateTime<Utc>> = None;

    loop {
        let now = clock.now();
        // never aim at or before the previous target, so an early wake cannot fire twice
        let from = match last_target {
            Some(target) if target > now => target,
            _ => now,
        };
        let target = frequency.next_fire_after(from);
        let delay = (target - now).to_std().unwrap_or_default();

        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }

        last_target = Some(target);

        match executor.execute(plan_id).await {
            Ok(TickOutcome::Executed(report)) =>
                debug!(
                    %plan_id,
                    tx_hash = %report.tx_hash,
                    execution_count = report.execution_count,
                    "Scheduled tick executed"
                ),
            Ok(TickOutcome::Skipped { reason, .. }) =>
                debug!(%plan_id, ?reason, "Scheduled tick skipped"),
            Err(e) => error!(%plan_id, "Scheduled tick failed: {}", e),
        }
    }

    debug!(%plan_id, "Plan timer stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use rust_decimal::Decimal;

    use crate::clock::TokioClock;
    use crate::db::MemoryPlanStore;
    use crate::testing::{ self, FakeOracle, FakeTransactor, FlakyStore };

    /// Offsets from the test start in virtual seconds; the wall clock starts at `testing::origin()`.
    struct Timeline {
        start: tokio::time::Instant,
    }

    impl Timeline {
        fn start() -> Self {
            Self { start: tokio::time::Instant::now() }
        }

        async fn at(&self, secs: u64) {
            tokio::time::sleep_until(self.start + Duration::from_secs(secs)).await;
        }
    }

    fn scheduler(executor: Arc<PlanExecutor>) -> PlanScheduler {
        PlanScheduler::new(executor, Arc::new(TokioClock::starting_at(testing::origin())))
    }

    #[tokio::test(start_paused = true)]
    async fn test_minute_plan_runs_adjusted_ticks_until_stopped() {
        let timeline = Timeline::start();
        let store = Arc::new(MemoryPlanStore::new());
        let transactor = FakeTransactor::new();
        let oracle = FakeOracle::new(0.5);
        let scheduler = scheduler(testing::executor(store.clone(), transactor.clone(), oracle));
        let (user, plan) = testing::seed_plan(&*store, 10, "minute", "addrX").await;

        scheduler.schedule_plan(&plan).unwrap();

        timeline.at(29).await;
        assert!(transactor.sent().is_empty());

        timeline.at(31).await;
        assert_eq!(transactor.sent_to("addrX"), vec![Decimal::from(10)]);

        timeline.at(91).await;
        assert_eq!(transactor.sent_to("addrX"), vec![Decimal::from(10), Decimal::from(5)]);

        let stored = store.find_plan(plan.id).await.unwrap().unwrap();
        assert_eq!(stored.execution_count, 2);
        assert_eq!(stored.total_invested, Decimal::from(15));
        assert_eq!(stored.amount, Decimal::from(5));
        let executed_at = stored.last_execution_time.unwrap();
        assert!(executed_at >= testing::origin() + chrono::Duration::seconds(90));
        assert!(executed_at < testing::origin() + chrono::Duration::seconds(91));
        assert_eq!(store.sum_user_investment(user.id).await.unwrap(), Decimal::from(15));

        store.stop_plan(plan.id).await.unwrap();
        assert!(scheduler.unschedule_plan(plan.id));
        assert!(!scheduler.unschedule_plan(plan.id));

        timeline.at(400).await;
        assert_eq!(transactor.sent().len(), 2);
        assert_eq!(store.find_plan(plan.id).await.unwrap().unwrap().execution_count, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_plan_does_not_affect_others() {
        let timeline = Timeline::start();
        let store = Arc::new(MemoryPlanStore::new());
        let transactor = FakeTransactor::new();
        transactor.fail_for("addrBad");
        let scheduler = scheduler(
            testing::executor(store.clone(), transactor.clone(), FakeOracle::new(1.0))
        );
        let (_, good) = testing::seed_plan(&*store, 10, "minute", "addrGood").await;
        let (_, bad) = testing::seed_plan(&*store, 7, "minute", "addrBad").await;

        scheduler.schedule_plan(&good).unwrap();
        scheduler.schedule_plan(&bad).unwrap();

        timeline.at(91).await;

        assert_eq!(transactor.sent_to("addrGood").len(), 2);
        assert!(transactor.sent_to("addrBad").is_empty());
        assert_eq!(store.find_plan(bad.id).await.unwrap().unwrap(), bad);
        assert!(scheduler.is_scheduled(bad.id));

        // retried at its next natural tick
        transactor.recover("addrBad");
        timeline.at(151).await;

        assert_eq!(transactor.sent_to("addrBad"), vec![Decimal::from(7)]);
        assert_eq!(store.find_plan(bad.id).await.unwrap().unwrap().execution_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rescheduling_replaces_timer() {
        let timeline = Timeline::start();
        let store = Arc::new(MemoryPlanStore::new());
        let transactor = FakeTransactor::new();
        let scheduler = scheduler(
            testing::executor(store.clone(), transactor.clone(), FakeOracle::new(1.0))
        );
        let (_, plan) = testing::seed_plan(&*store, 10, "minute", "addrX").await;

        scheduler.schedule_plan(&plan).unwrap();
        scheduler.schedule_plan(&plan).unwrap();
        assert_eq!(scheduler.scheduled_count(), 1);

        timeline.at(31).await;

        assert_eq!(transactor.sent().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hour_plan_fires_on_the_hour() {
        let timeline = Timeline::start();
        let store = Arc::new(MemoryPlanStore::new());
        let transactor = FakeTransactor::new();
        let scheduler = scheduler(
            testing::executor(store.clone(), transactor.clone(), FakeOracle::new(1.0))
        );
        let (_, plan) = testing::seed_plan(&*store, 10, "hour", "addrX").await;

        scheduler.schedule_plan(&plan).unwrap();

        timeline.at(3_500).await;
        assert!(transactor.sent().is_empty());

        // 00:00:30 + 3570s = 01:00:00
        timeline.at(3_571).await;
        assert_eq!(transactor.sent().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unschedule_lets_in_flight_tick_commit() {
        let timeline = Timeline::start();
        let store = Arc::new(MemoryPlanStore::new());
        let transactor = FakeTransactor::new();
        transactor.set_delay(Duration::from_secs(3));
        let scheduler = scheduler(
            testing::executor(store.clone(), transactor.clone(), FakeOracle::new(1.0))
        );
        let (_, plan) = testing::seed_plan(&*store, 10, "minute", "addrX").await;

        scheduler.schedule_plan(&plan).unwrap();

        timeline.at(31).await;
        assert!(scheduler.unschedule_plan(plan.id));

        timeline.at(200).await;

        assert_eq!(transactor.sent().len(), 1);
        assert_eq!(store.find_plan(plan.id).await.unwrap().unwrap().execution_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_schedule_rejects_inactive_or_unknown_frequency() {
        let store = Arc::new(MemoryPlanStore::new());
        let scheduler = scheduler(
            testing::executor(store.clone(), FakeTransactor::new(), FakeOracle::new(1.0))
        );
        let (_, plan) = testing::seed_plan(&*store, 10, "minute", "addrX").await;

        let mut weekly = plan.clone();
        weekly.frequency = "weekly".to_string();
        assert!(matches!(scheduler.schedule_plan(&weekly), Err(AppError::Validation { .. })));

        let stopped = store.stop_plan(plan.id).await.unwrap().unwrap();
        assert!(matches!(scheduler.schedule_plan(&stopped), Err(AppError::Validation { .. })));

        assert_eq!(scheduler.scheduled_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_initialize_from_store_schedules_active_plans() {
        let store = Arc::new(MemoryPlanStore::new());
        let scheduler = scheduler(
            testing::executor(store.clone(), FakeTransactor::new(), FakeOracle::new(1.0))
        );
        let (_, a) = testing::seed_plan(&*store, 10, "minute", "addrA").await;
        let (_, b) = testing::seed_plan(&*store, 10, "day", "addrB").await;
        let (_, c) = testing::seed_plan(&*store, 10, "hour", "addrC").await;
        store.stop_plan(c.id).await.unwrap();

        assert_eq!(scheduler.initialize_from_store(&*store).await, 2);
        assert!(scheduler.is_scheduled(a.id));
        assert!(scheduler.is_scheduled(b.id));
        assert!(!scheduler.is_scheduled(c.id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_initialize_survives_store_failure() {
        let store = FlakyStore::new();
        let scheduler = scheduler(
            testing::executor(store.clone(), FakeTransactor::new(), FakeOracle::new(1.0))
        );
        testing::seed_plan(&*store, 10, "minute", "addrA").await;
        store.fail_reads(true);

        assert_eq!(scheduler.initialize_from_store(&*store).await, 0);
        assert_eq!(scheduler.scheduled_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_all_timers() {
        let timeline = Timeline::start();
        let store = Arc::new(MemoryPlanStore::new());
        let transactor = FakeTransactor::new();
        let scheduler = scheduler(
            testing::executor(store.clone(), transactor.clone(), FakeOracle::new(1.0))
        );
        let (_, plan) = testing::seed_plan(&*store, 10, "minute", "addrX").await;
        scheduler.schedule_plan(&plan).unwrap();

        timeline.at(31).await;
        scheduler.shutdown().await;
        timeline.at(300).await;

        assert_eq!(scheduler.scheduled_count(), 0);
        assert_eq!(transactor.sent().len(), 1);
    }
}
