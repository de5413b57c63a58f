//! Fakes shared by unit tests.

use std::collections::HashSet;
use std::sync::atomic::{ AtomicU32, AtomicUsize, Ordering };
use std::sync::{ Arc, Mutex };
use std::time::Duration;

use async_trait::async_trait;
use chrono::{ DateTime, TimeZone, Utc };
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::clock::TokioClock;
use crate::db::{ investment_plan, user, ExecutionUpdate, MemoryPlanStore, NewPlan, PlanStore };
use crate::enums::AssetKind;
use crate::error::{ AppError, Result };
use crate::executor::PlanExecutor;
use crate::providers::{ ChainTransactor, PriceOracle };

/// 30 seconds past a minute boundary: minute plans tick at +30s, +90s, ...
pub fn origin() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 30).unwrap()
}

#[derive(Debug, Clone, PartialEq)]
pub struct SentTransfer {
    pub amount: Decimal,
    pub from_address: String,
    pub to_address: String,
}

/// Records every send; fails for destinations in `failing`.
///
/// Like the real backends it refuses amounts finer than its scale
/// (18 decimals unless built with [`FakeTransactor::with_scale`]).
#[derive(Default)]
pub struct FakeTransactor {
    sent: Mutex<Vec<SentTransfer>>,
    failing: Mutex<HashSet<String>>,
    delay: Mutex<Option<Duration>>,
    scale: AtomicU32,
}

impl FakeTransactor {
    pub fn new() -> Arc<Self> {
        Self::with_scale(18)
    }

    pub fn with_scale(scale: u32) -> Arc<Self> {
        Arc::new(Self {
            scale: AtomicU32::new(scale),
            ..Self::default()
        })
    }

    pub fn fail_for(&self, to_address: &str) {
        self.failing.lock().unwrap().insert(to_address.to_string());
    }

    pub fn recover(&self, to_address: &str) {
        self.failing.lock().unwrap().remove(to_address);
    }

    /// Make every send take `delay` of (virtual) time.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn sent(&self) -> Vec<SentTransfer> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self, to_address: &str) -> Vec<Decimal> {
        self.sent()
            .into_iter()
            .filter(|t| t.to_address == to_address)
            .map(|t| t.amount)
            .collect()
    }
}

#[async_trait]
impl ChainTransactor for FakeTransactor {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn amount_scale(&self) -> u32 {
        self.scale.load(Ordering::SeqCst)
    }

    async fn send_transaction(
        &self,
        amount: Decimal,
        from_address: &str,
        to_address: &str
    ) -> Result<String> {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let rejected = self.failing.lock().unwrap().contains(to_address);
        if rejected {
            return Err(AppError::Transactor(format!("rejected transfer to {}", to_address)));
        }
        if amount <= Decimal::ZERO || amount.normalize().scale() > self.amount_scale() {
            return Err(AppError::Transactor(format!("untransferable amount {}", amount)));
        }

        let count = {
            let mut sent = self.sent.lock().unwrap();
            sent.push(SentTransfer {
                amount,
                from_address: from_address.to_string(),
                to_address: to_address.to_string(),
            });
            sent.len()
        };

        Ok(format!("tx-{}", count))
    }

    async fn get_balance(&self, _address: &str, asset: AssetKind) -> Decimal {
        match asset {
            AssetKind::Native => Decimal::from(3),
            AssetKind::Stable => Decimal::from(250),
        }
    }

    fn validate_address(&self, address: &str) -> bool {
        address.starts_with("addr")
    }
}

/// Oracle with a settable reading; can also stall forever.
pub struct FakeOracle {
    factor: Mutex<f64>,
    hang: Mutex<bool>,
    calls: AtomicUsize,
}

impl FakeOracle {
    pub fn new(factor: f64) -> Arc<Self> {
        Arc::new(Self {
            factor: Mutex::new(factor),
            hang: Mutex::new(false),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn set_factor(&self, factor: f64) {
        *self.factor.lock().unwrap() = factor;
    }

    pub fn set_hang(&self, hang: bool) {
        *self.hang.lock().unwrap() = hang;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PriceOracle for FakeOracle {
    async fn get_price_factor(&self, _asset_id: &str) -> f64 {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let hang = *self.hang.lock().unwrap();
        if hang {
            std::future::pending::<()>().await;
        }

        *self.factor.lock().unwrap()
    }
}

/// Memory store whose execution writes can be made to fail.
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryPlanStore,
    fail_updates: Mutex<bool>,
    fail_reads: Mutex<bool>,
}

impl FlakyStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_updates(&self, fail: bool) {
        *self.fail_updates.lock().unwrap() = fail;
    }

    pub fn fail_reads(&self, fail: bool) {
        *self.fail_reads.lock().unwrap() = fail;
    }

    fn read_guard(&self) -> Result<()> {
        if *self.fail_reads.lock().unwrap() {
            return Err(AppError::Database(sea_orm::DbErr::Custom("store offline".to_string())));
        }
        Ok(())
    }
}

#[async_trait]
impl PlanStore for FlakyStore {
    async fn find_or_create_user(&self, address: &str) -> Result<user::Model> {
        self.inner.find_or_create_user(address).await
    }

    async fn find_user(&self, id: Uuid) -> Result<Option<user::Model>> {
        self.inner.find_user(id).await
    }

    async fn find_user_by_address(&self, address: &str) -> Result<Option<user::Model>> {
        self.inner.find_user_by_address(address).await
    }

    async fn create_plan(&self, user_id: Uuid, plan: NewPlan) -> Result<investment_plan::Model> {
        self.inner.create_plan(user_id, plan).await
    }

    async fn find_plan(&self, id: Uuid) -> Result<Option<investment_plan::Model>> {
        self.inner.find_plan(id).await
    }

    async fn stop_plan(&self, id: Uuid) -> Result<Option<investment_plan::Model>> {
        self.inner.stop_plan(id).await
    }

    async fn find_active_plans(&self) -> Result<Vec<investment_plan::Model>> {
        self.read_guard()?;
        self.inner.find_active_plans().await
    }

    async fn find_user_plans(&self, user_id: Uuid) -> Result<Vec<investment_plan::Model>> {
        self.inner.find_user_plans(user_id).await
    }

    async fn sum_user_investment(&self, user_id: Uuid) -> Result<Decimal> {
        self.inner.sum_user_investment(user_id).await
    }

    async fn update_execution_result(
        &self,
        plan_id: Uuid,
        update: ExecutionUpdate
    ) -> Result<investment_plan::Model> {
        let fail = *self.fail_updates.lock().unwrap();
        if fail {
            return Err(AppError::Persistence("write rejected".to_string()));
        }
        self.inner.update_execution_result(plan_id, update).await
    }
}

/// Executor wired to fakes with short timeouts and a virtual clock.
pub fn executor(
    store: Arc<dyn PlanStore>,
    transactor: Arc<FakeTransactor>,
    oracle: Arc<FakeOracle>
) -> Arc<PlanExecutor> {
    Arc::new(
        PlanExecutor::new(
            store,
            transactor,
            oracle,
            Arc::new(TokioClock::starting_at(origin())),
            "test-asset"
        ).with_timeouts(Duration::from_secs(5), Duration::from_secs(2))
    )
}

/// User `addrU` with one fresh plan.
pub async fn seed_plan(
    store: &dyn PlanStore,
    amount: i64,
    frequency: &str,
    to_address: &str
) -> (user::Model, investment_plan::Model) {
    let user = store.find_or_create_user("addrU").await.unwrap();
    let plan = store
        .create_plan(user.id, NewPlan {
            amount: Decimal::from(amount),
            frequency: frequency.to_string(),
            to_address: to_address.to_string(),
        }).await
        .unwrap();

    (user, plan)
}
