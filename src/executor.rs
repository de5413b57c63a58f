//! One execution tick of an investment plan.

use std::collections::HashMap;
use std::sync::{ Arc, Mutex, PoisonError };
use std::time::Duration;

use chrono::{ DateTime, Utc };
use rust_decimal::{ Decimal, RoundingStrategy };
use serde::Serialize;
use tracing::{ debug, error, info, warn };
use uuid::Uuid;

use crate::clock::Clock;
use crate::db::{ investment_plan, ExecutionUpdate, PlanStore };
use crate::error::{ AppError, Result };
use crate::providers::{ sanitize_factor, ChainTransactor, PriceOracle, NEUTRAL_FACTOR };

const DEFAULT_TRANSACTOR_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_ORACLE_TIMEOUT: Duration = Duration::from_secs(20);

/// Stored amounts carry at most this many decimal places.
const AMOUNT_SCALE: u32 = 18;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SkipReason {
    Inactive,
    ZeroAmount,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionReport {
    pub plan_id: Uuid,
    pub tx_hash: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub factor: f64,
    pub execution_count: i32,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_invested: Decimal,
    pub executed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum TickOutcome {
    Executed(ExecutionReport),
    Skipped {
        #[serde(rename = "planId")]
        plan_id: Uuid,
        reason: SkipReason,
    },
}

/// Runs ticks: price factor, on-chain transfer, then the store update.
///
/// Ticks for the same plan are serialized; different plans run concurrently.
pub struct PlanExecutor {
    store: Arc<dyn PlanStore>,
    transactor: Arc<dyn ChainTransactor>,
    oracle: Arc<dyn PriceOracle>,
    clock: Arc<dyn Clock>,
    asset_id: String,
    transactor_timeout: Duration,
    oracle_timeout: Duration,
    locks: Mutex<HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>>,
}

impl PlanExecutor {
    pub fn new(
        store: Arc<dyn PlanStore>,
        transactor: Arc<dyn ChainTransactor>,
        oracle: Arc<dyn PriceOracle>,
        clock: Arc<dyn Clock>,
        asset_id: impl Into<String>
    ) -> Self {
        Self {
            store,
            transactor,
            oracle,
            clock,
            asset_id: asset_id.into(),
            transactor_timeout: DEFAULT_TRANSACTOR_TIMEOUT,
            oracle_timeout: DEFAULT_ORACLE_TIMEOUT,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_timeouts(mut self, transactor_timeout: Duration, oracle_timeout: Duration) -> Self {
        self.transactor_timeout = transactor_timeout;
        self.oracle_timeout = oracle_timeout;
        self
    }

    fn plan_lock(&self, plan_id: Uuid) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(plan_id).or_default().clone()
    }

    /// Drop the plan's lock entry unless another tick holds or awaits it.
    fn release_lock(&self, plan_id: Uuid, lock: Arc<tokio::sync::Mutex<()>>) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // one reference in the map, one in `lock`
        if Arc::strong_count(&lock) == 2 {
            locks.remove(&plan_id);
        }
    }

    #[cfg(test)]
    fn tracked_locks(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Execute one tick for `plan_id`.
    ///
    /// Failures before the transfer leave the plan untouched. A failed store
    /// write after a successful transfer is reported as
    /// [`AppError::Persistence`] and is not reversed.
    pub async fn execute(&self, plan_id: Uuid) -> Result<TickOutcome> {
        let lock = self.plan_lock(plan_id);
        let outcome = {
            let _guard = lock.lock().await;
            self.run_tick(plan_id).await
        };
        self.release_lock(plan_id, lock);

        outcome
    }

    async fn run_tick(&self, plan_id: Uuid) -> Result<TickOutcome> {
        let plan = self.store
            .find_plan(plan_id).await?
            .ok_or_else(|| AppError::NotFound(format!("Plan {}", plan_id)))?;

        if !plan.is_active {
            debug!(%plan_id, "Plan inactive, skipping tick");
            return Ok(TickOutcome::Skipped { plan_id, reason: SkipReason::Inactive });
        }

        let user = self.store
            .find_user(plan.user_id).await?
            .ok_or_else(|| AppError::NotFound(format!("User {}", plan.user_id)))?;

        let (amount, factor) = self.execution_amount(&plan).await?;

        if amount.is_zero() {
            info!(%plan_id, factor, "Adjusted amount is zero, skipping tick");
            return Ok(TickOutcome::Skipped { plan_id, reason: SkipReason::ZeroAmount });
        }

        let tx_hash = self.send(amount, &user.address, &plan.to_address).await.map_err(|e| {
            warn!(%plan_id, %amount, "Transfer failed: {}", e);
            e
        })?;

        let executed_at = self.clock.now();
        let update = ExecutionUpdate {
            last_execution_time: executed_at,
            delta_invested: amount,
            tx_hash: tx_hash.clone(),
            expected_execution_count: plan.execution_count,
        };

        let updated = match self.store.update_execution_result(plan_id, update).await {
            Ok(updated) => updated,
            Err(e) => {
                error!(
                    %plan_id,
                    tx_hash = %tx_hash,
                    %amount,
                    "Funds moved but plan record was not updated: {}",
                    e
                );
                return Err(match e {
                    AppError::Persistence(_) => e,
                    other =>
                        AppError::Persistence(
                            format!("transfer {} recorded no state: {}", tx_hash, other)
                        ),
                });
            }
        };

        info!(
            %plan_id,
            tx_hash = %tx_hash,
            %amount,
            factor,
            execution_count = updated.execution_count,
            "Plan executed"
        );

        Ok(
            TickOutcome::Executed(ExecutionReport {
                plan_id,
                tx_hash,
                amount,
                factor,
                execution_count: updated.execution_count,
                total_invested: updated.total_invested,
                executed_at,
            })
        )
    }

    /// First execution sends the plan amount as is; later ones scale the initial amount.
    ///
    /// The result is truncated to what the chain can transfer, so the amount
    /// recorded is exactly the amount sent.
    async fn execution_amount(&self, plan: &investment_plan::Model) -> Result<(Decimal, f64)> {
        if plan.execution_count == 0 {
            return Ok((self.transferable(plan.amount), NEUTRAL_FACTOR));
        }

        let factor = self.price_factor().await;
        let multiplier = Decimal::try_from(factor).unwrap_or(Decimal::ONE);

        let amount = plan.initial_amount
            .checked_mul(multiplier)
            .ok_or_else(|| AppError::Internal(format!("amount overflow on plan {}", plan.id)))?;

        Ok((self.transferable(amount), factor))
    }

    fn transferable(&self, amount: Decimal) -> Decimal {
        let scale = self.transactor.amount_scale().min(AMOUNT_SCALE);
        amount.round_dp_with_strategy(scale, RoundingStrategy::ToZero).normalize()
    }

    async fn price_factor(&self) -> f64 {
        let reading = tokio::time::timeout(
            self.oracle_timeout,
            self.oracle.get_price_factor(&self.asset_id)
        ).await;

        match reading {
            Ok(raw) => {
                let factor = sanitize_factor(raw);
                if factor != raw {
                    warn!(asset_id = %self.asset_id, raw, factor, "Price factor out of range");
                }
                factor
            }
            Err(_) => {
                warn!(
                    asset_id = %self.asset_id,
                    "Price oracle timed out after {:?}, using neutral factor",
                    self.oracle_timeout
                );
                NEUTRAL_FACTOR
            }
        }
    }

    async fn send(&self, amount: Decimal, from_address: &str, to_address: &str) -> Result<String> {
        let sent = tokio::time::timeout(
            self.transactor_timeout,
            self.transactor.send_transaction(amount, from_address, to_address)
        ).await;

        match sent {
            Ok(Ok(tx_hash)) => Ok(tx_hash),
            Ok(Err(e @ AppError::Transactor(_))) => Err(e),
            Ok(Err(other)) => Err(AppError::Transactor(other.to_string())),
            Err(_) =>
                Err(
                    AppError::Transactor(
                        format!(
                            "{} transfer timed out after {:?}",
                            self.transactor.name(),
                            self.transactor_timeout
                        )
                    )
                ),
        }
    }
}
