//! In-process [`PlanStore`] used by tests.
//!
//! Every mutation happens under one write lock, so a plan record is never
//! observed half-updated and increments cannot be lost.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::db::entity::{ investment_plan, user };
use crate::db::{ ExecutionUpdate, NewPlan, PlanStore };
use crate::error::{ AppError, Result };

#[derive(Default)]
struct State {
    users: HashMap<Uuid, user::Model>,
    plans: HashMap<Uuid, investment_plan::Model>,
}

#[derive(Default)]
pub struct MemoryPlanStore {
    state: RwLock<State>,
}

impl MemoryPlanStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn sorted(mut plans: Vec<investment_plan::Model>) -> Vec<investment_plan::Model> {
    plans.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
    plans
}

#[async_trait]
impl PlanStore for MemoryPlanStore {
    async fn find_or_create_user(&self, address: &str) -> Result<user::Model> {
        let address = address.trim();
        if address.is_empty() {
            return Err(AppError::invalid_field("address", "address must not be empty"));
        }

        let mut state = self.state.write().await;

        if let Some(existing) = state.users.values().find(|u| u.address == address) {
            return Ok(existing.clone());
        }

        let now = Utc::now();
        let user = user::Model {
            id: Uuid::new_v4(),
            address: address.to_string(),
            created_at: now,
            updated_at: now,
        };
        state.users.insert(user.id, user.clone());

        Ok(user)
    }

    async fn find_user(&self, id: Uuid) -> Result<Option<user::Model>> {
        Ok(self.state.read().await.users.get(&id).cloned())
    }

    async fn find_user_by_address(&self, address: &str) -> Result<Option<user::Model>> {
        let address = address.trim();
        let state = self.state.read().await;

        Ok(state.users.values().find(|u| u.address == address).cloned())
    }

    async fn create_plan(&self, user_id: Uuid, plan: NewPlan) -> Result<investment_plan::Model> {
        let frequency = plan.validate()?;
        let now = Utc::now();

        let plan = investment_plan::Model {
            id: Uuid::new_v4(),
            user_id,
            amount: plan.amount,
            initial_amount: plan.amount,
            frequency: frequency.to_string(),
            to_address: plan.to_address.trim().to_string(),
            is_active: true,
            last_execution_time: None,
            last_tx_hash: None,
            total_invested: Decimal::ZERO,
            execution_count: 0,
            created_at: now,
            updated_at: now,
        };

        self.state.write().await.plans.insert(plan.id, plan.clone());

        Ok(plan)
    }

    async fn find_plan(&self, id: Uuid) -> Result<Option<investment_plan::Model>> {
        Ok(self.state.read().await.plans.get(&id).cloned())
    }

    async fn stop_plan(&self, id: Uuid) -> Result<Option<investment_plan::Model>> {
        let mut state = self.state.write().await;

        let Some(plan) = state.plans.get_mut(&id) else {
            return Ok(None);
        };

        if plan.is_active {
            plan.is_active = false;
            plan.updated_at = Utc::now();
        }

        Ok(Some(plan.clone()))
    }

    async fn find_active_plans(&self) -> Result<Vec<investment_plan::Model>> {
        let state = self.state.read().await;
        let plans = state.plans
            .values()
            .filter(|p| p.is_active)
            .cloned()
            .collect();

        Ok(sorted(plans))
    }

    async fn find_user_plans(&self, user_id: Uuid) -> Result<Vec<investment_plan::Model>> {
        let state = self.state.read().await;
        let plans = state.plans
            .values()
            .filter(|p| p.user_id == user_id)
            .cloned()
            .collect();

        Ok(sorted(plans))
    }

    async fn sum_user_investment(&self, user_id: Uuid) -> Result<Decimal> {
        let state = self.state.read().await;

        Ok(
            state.plans
                .values()
                .filter(|p| p.user_id == user_id)
                .map(|p| p.total_invested)
                .sum()
        )
    }

    async fn update_execution_result(
        &self,
        plan_id: Uuid,
        update: ExecutionUpdate
    ) -> Result<investment_plan::Model> {
        let mut state = self.state.write().await;

        let plan = state.plans
            .get_mut(&plan_id)
            .ok_or_else(|| AppError::NotFound(format!("Plan {}", plan_id)))?;

        if plan.execution_count != update.expected_execution_count {
            return Err(
                AppError::Persistence(
                    format!(
                        "execution count conflict on plan {}: expected {}, found {}",
                        plan_id,
                        update.expected_execution_count,
                        plan.execution_count
                    )
                )
            );
        }

        plan.execution_count += 1;
        plan.total_invested += update.delta_invested;
        plan.amount = update.delta_invested;
        plan.last_execution_time = Some(update.last_execution_time);
        plan.last_tx_hash = Some(update.tx_hash);
        plan.updated_at = Utc::now();

        Ok(plan.clone())
    }
}
