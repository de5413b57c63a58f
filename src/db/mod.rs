use async_trait::async_trait;
use chrono::{ DateTime, Utc };
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::enums::Frequency;
use crate::error::{ AppError, Result };

pub mod entity;
pub use entity::*;

mod plan_repository;
pub use plan_repository::PlanRepository;

pub mod memory;
pub use memory::MemoryPlanStore;

/// Input for creating an investment plan.
#[derive(Debug, Clone)]
pub struct NewPlan {
    pub amount: Decimal,
    pub frequency: String,
    pub to_address: String,
}

impl NewPlan {
    /// Check the plan-creation invariants and return the parsed frequency.
    pub fn validate(&self) -> Result<Frequency> {
        if self.amount <= Decimal::ZERO {
            return Err(AppError::invalid_field("amount", "amount must be greater than zero"));
        }

        if self.to_address.trim().is_empty() {
            return Err(AppError::invalid_field("toAddress", "toAddress must not be empty"));
        }

        self.frequency.parse()
    }
}

/// State committed after a successful on-chain execution.
#[derive(Debug, Clone)]
pub struct ExecutionUpdate {
    pub last_execution_time: DateTime<Utc>,
    /// Added to `total_invested`; also becomes the plan's current `amount`.
    pub delta_invested: Decimal,
    pub tx_hash: String,
    /// `execution_count` the tick observed; the write only applies while it still holds.
    pub expected_execution_count: i32,
}

/// Durable registry of users and investment plans.
#[async_trait]
pub trait PlanStore: Send + Sync {
    async fn find_or_create_user(&self, address: &str) -> Result<user::Model>;

    async fn find_user(&self, id: Uuid) -> Result<Option<user::Model>>;

    async fn find_user_by_address(&self, address: &str) -> Result<Option<user::Model>>;

    async fn create_plan(&self, user_id: Uuid, plan: NewPlan) -> Result<investment_plan::Model>;

    async fn find_plan(&self, id: Uuid) -> Result<Option<investment_plan::Model>>;

    /// Deactivate a plan. `None` when the id is unknown; an already stopped
    /// plan is returned unchanged.
    async fn stop_plan(&self, id: Uuid) -> Result<Option<investment_plan::Model>>;

    async fn find_active_plans(&self) -> Result<Vec<investment_plan::Model>>;

    async fn find_user_plans(&self, user_id: Uuid) -> Result<Vec<investment_plan::Model>>;

    async fn sum_user_investment(&self, user_id: Uuid) -> Result<Decimal>;

    /// Atomically bump `execution_count` by one and `total_invested` by the delta.
    async fn update_execution_result(
        &self,
        plan_id: Uuid,
        update: ExecutionUpdate
    ) -> Result<investment_plan::Model>;
}
