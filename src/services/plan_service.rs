use std::sync::Arc;

use rust_decimal::Decimal;
use uuid::Uuid;

use crate::db::{ investment_plan, user, NewPlan, PlanStore };
use crate::enums::AssetKind;
use crate::error::{ AppError, Result };
use crate::executor::{ PlanExecutor, TickOutcome };
use crate::providers::ChainTransactor;
use crate::scheduler::PlanScheduler;

pub struct PlanService {
    store: Arc<dyn PlanStore>,
    transactor: Arc<dyn ChainTransactor>,
    executor: Arc<PlanExecutor>,
    scheduler: Arc<PlanScheduler>,
}

impl PlanService {
    pub fn new(
        store: Arc<dyn PlanStore>,
        transactor: Arc<dyn ChainTransactor>,
        executor: Arc<PlanExecutor>,
        scheduler: Arc<PlanScheduler>
    ) -> Self {
        Self {
            store,
            transactor,
            executor,
            scheduler,
        }
    }

    /// Find or create the user owning `address`.
    pub async fn register_user(&self, address: &str) -> Result<user::Model> {
        let address = address.trim();
        if !self.transactor.validate_address(address) {
            return Err(AppError::invalid_field("address", format!("Invalid address: {}", address)));
        }

        let user = self.store.find_or_create_user(address).await?;
        tracing::info!("User {} connected with address {}", user.id, user.address);

        Ok(user)
    }

    pub async fn find_user_by_address(&self, address: &str) -> Result<user::Model> {
        self.store
            .find_user_by_address(address).await?
            .ok_or_else(|| AppError::NotFound(format!("User with address {}", address)))
    }

    /// Persist a new plan for an existing user and start its timer.
    pub async fn create_plan(&self, user_id: Uuid, plan: NewPlan) -> Result<investment_plan::Model> {
        plan.validate()?;

        if self.store.find_user(user_id).await?.is_none() {
            return Err(AppError::NotFound(format!("User {}", user_id)));
        }

        let scale = self.transactor.amount_scale();
        if plan.amount.normalize().scale() > scale {
            return Err(
                AppError::invalid_field(
                    "amount",
                    format!("{} supports at most {} decimal places", self.transactor.name(), scale)
                )
            );
        }

        if !self.transactor.validate_address(plan.to_address.trim()) {
            return Err(
                AppError::invalid_field(
                    "toAddress",
                    format!("Invalid {} address: {}", self.transactor.name(), plan.to_address)
                )
            );
        }

        let plan = self.store.create_plan(user_id, plan).await?;

        if let Err(e) = self.scheduler.schedule_plan(&plan) {
            // a plan without a timer must not stay active
            self.store.stop_plan(plan.id).await?;
            return Err(e);
        }

        tracing::info!(
            plan_id = %plan.id,
            %user_id,
            amount = %plan.amount,
            frequency = %plan.frequency,
            "Investment plan created"
        );

        Ok(plan)
    }

    /// Deactivate a plan and cancel its timer. Stopping twice returns the same record.
    pub async fn stop_plan(&self, plan_id: Uuid) -> Result<investment_plan::Model> {
        let plan = self.store
            .stop_plan(plan_id).await?
            .ok_or_else(|| AppError::NotFound(format!("Plan {}", plan_id)))?;

        if self.scheduler.unschedule_plan(plan_id) {
            tracing::info!(%plan_id, "Investment plan stopped");
        }

        Ok(plan)
    }

    pub async fn get_plan(&self, plan_id: Uuid) -> Result<investment_plan::Model> {
        self.store
            .find_plan(plan_id).await?
            .ok_or_else(|| AppError::NotFound(format!("Plan {}", plan_id)))
    }

    pub async fn user_plans(&self, user_id: Uuid) -> Result<Vec<investment_plan::Model>> {
        self.store.find_user_plans(user_id).await
    }

    pub async fn total_investment(&self, user_id: Uuid) -> Result<Decimal> {
        self.store.sum_user_investment(user_id).await
    }

    /// Run one tick right away, outside the plan's schedule.
    pub async fn execute_now(&self, plan_id: Uuid) -> Result<TickOutcome> {
        let plan = self.get_plan(plan_id).await?;
        if !plan.is_active {
            return Err(AppError::validation(format!("Plan {} is not active", plan_id)));
        }

        tracing::info!(%plan_id, "Manual execution requested");
        self.executor.execute(plan_id).await
    }

    pub async fn balance(&self, address: &str, asset: AssetKind) -> Result<Decimal> {
        let address = address.trim();
        if !self.transactor.validate_address(address) {
            return Err(AppError::invalid_field("address", format!("Invalid address: {}", address)));
        }

        Ok(self.transactor.get_balance(address, asset).await)
    }
}
