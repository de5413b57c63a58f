use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr,
    ActiveModelTrait,
    ColumnTrait,
    DatabaseConnection,
    EntityTrait,
    QueryFilter,
    QueryOrder,
    QuerySelect,
    Set,
};
use uuid::Uuid;

use crate::db::entity::{ investment_plan, user, InvestmentPlan, User };
use crate::db::{ ExecutionUpdate, NewPlan, PlanStore };
use crate::error::{ AppError, Result };

/// Postgres-backed [`PlanStore`].
pub struct PlanRepository {
    db: DatabaseConnection,
}

impl PlanRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl PlanStore for PlanRepository {
    async fn find_or_create_user(&self, address: &str) -> Result<user::Model> {
        let address = address.trim();
        if address.is_empty() {
            return Err(AppError::invalid_field("address", "address must not be empty"));
        }

        if let Some(existing) = self.find_user_by_address(address).await? {
            return Ok(existing);
        }

        let now = Utc::now();
        let user = user::ActiveModel {
            id: Set(Uuid::new_v4()),
            address: Set(address.to_string()),
            created_at: Set(now),
            updated_at: Set(now),
        };

        match user.insert(&self.db).await {
            Ok(user) => Ok(user),
            Err(e) => {
                // lost a race on the unique address index
                match self.find_user_by_address(address).await? {
                    Some(existing) => Ok(existing),
                    None => Err(AppError::Database(e)),
                }
            }
        }
    }

    async fn find_user(&self, id: Uuid) -> Result<Option<user::Model>> {
        let user = User::find_by_id(id).one(&self.db).await?;
        Ok(user)
    }

    async fn find_user_by_address(&self, address: &str) -> Result<Option<user::Model>> {
        let user = User::find()
            .filter(user::Column::Address.eq(address.trim()))
            .one(&self.db).await?;

        Ok(user)
    }

    async fn create_plan(&self, user_id: Uuid, plan: NewPlan) -> Result<investment_plan::Model> {
        let frequency = plan.validate()?;
        let now = Utc::now();

        let plan = investment_plan::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            amount: Set(plan.amount),
            initial_amount: Set(plan.amount),
            frequency: Set(frequency.to_string()),
            to_address: Set(plan.to_address.trim().to_string()),
            is_active: Set(true),
            last_execution_time: Set(None),
            last_tx_hash: Set(None),
            total_invested: Set(Decimal::ZERO),
            execution_count: Set(0),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let plan = plan.insert(&self.db).await?;
        Ok(plan)
    }

    async fn find_plan(&self, id: Uuid) -> Result<Option<investment_plan::Model>> {
        let plan = InvestmentPlan::find_by_id(id).one(&self.db).await?;
        Ok(plan)
    }

    async fn stop_plan(&self, id: Uuid) -> Result<Option<investment_plan::Model>> {
        let plan = match InvestmentPlan::find_by_id(id).one(&self.db).await? {
            Some(plan) => plan,
            None => {
                return Ok(None);
            }
        };

        if !plan.is_active {
            return Ok(Some(plan));
        }

        let mut active: investment_plan::ActiveModel = plan.into();
        active.is_active = Set(false);
        active.updated_at = Set(Utc::now());

        let plan = active.update(&self.db).await?;
        Ok(Some(plan))
    }

    async fn find_active_plans(&self) -> Result<Vec<investment_plan::Model>> {
        let plans = InvestmentPlan::find()
            .filter(investment_plan::Column::IsActive.eq(true))
            .order_by_asc(investment_plan::Column::CreatedAt)
            .all(&self.db).await?;

        Ok(plans)
    }

    async fn find_user_plans(&self, user_id: Uuid) -> Result<Vec<investment_plan::Model>> {
        let plans = InvestmentPlan::find()
            .filter(investment_plan::Column::UserId.eq(user_id))
            .order_by_asc(investment_plan::Column::CreatedAt)
            .all(&self.db).await?;

        Ok(plans)
    }

    async fn sum_user_investment(&self, user_id: Uuid) -> Result<Decimal> {
        let total: Option<Option<Decimal>> = InvestmentPlan::find()
            .select_only()
            .column_as(investment_plan::Column::TotalInvested.sum(), "total")
            .filter(investment_plan::Column::UserId.eq(user_id))
            .into_tuple()
            .one(&self.db).await?;

        Ok(total.flatten().unwrap_or(Decimal::ZERO))
    }

    async fn update_execution_result(
        &self,
        plan_id: Uuid,
        update: ExecutionUpdate
    ) -> Result<investment_plan::Model> {
        let result = InvestmentPlan::update_many()
            .col_expr(
                investment_plan::Column::TotalInvested,
                Expr::col(investment_plan::Column::TotalInvested).add(update.delta_invested)
            )
            .col_expr(
                investment_plan::Column::ExecutionCount,
                Expr::col(investment_plan::Column::ExecutionCount).add(1)
            )
            .col_expr(investment_plan::Column::Amount, Expr::value(update.delta_invested))
            .col_expr(
                investment_plan::Column::LastExecutionTime,
                Expr::value(Some(update.last_execution_time))
            )
            .col_expr(investment_plan::Column::LastTxHash, Expr::value(Some(update.tx_hash.clone())))
            .col_expr(investment_plan::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(investment_plan::Column::Id.eq(plan_id))
            .filter(investment_plan::Column::ExecutionCount.eq(update.expected_execution_count))
            .exec(&self.db).await?;

        let plan = InvestmentPlan::find_by_id(plan_id).one(&self.db).await?;

        match plan {
            None => Err(AppError::NotFound(format!("Plan {}", plan_id))),
            Some(plan) if result.rows_affected == 0 =>
                Err(
                    AppError::Persistence(
                        format!(
                            "execution count conflict on plan {}: expected {}, found {}",
                            plan_id,
                            update.expected_execution_count,
                            plan.execution_count
                        )
                    )
                ),
            Some(plan) => Ok(plan),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use sea_orm::{ DatabaseBackend, MockDatabase, MockExecResult };

    fn plan_model(execution_count: i32) -> investment_plan::Model {
        let now = Utc::now();
        investment_plan::Model {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            amount: Decimal::from(10),
            initial_amount: Decimal::from(10),
            frequency: "minute".to_string(),
            to_address: "addrX".to_string(),
            is_active: true,
            last_execution_time: None,
            last_tx_hash: None,
            total_invested: Decimal::ZERO,
            execution_count,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_create_plan_rejects_invalid_input_without_touching_db() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
        let repository = PlanRepository::new(db);

        let err = repository
            .create_plan(Uuid::new_v4(), NewPlan {
                amount: Decimal::from(10),
                frequency: "weekly".to_string(),
                to_address: "addrX".to_string(),
            }).await
            .unwrap_err();

        assert!(matches!(err, AppError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_create_plan_inserts_row() {
        let stored = plan_model(0);
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![stored.clone()]])
            .into_connection();
        let repository = PlanRepository::new(db);

        let plan = repository
            .create_plan(stored.user_id, NewPlan {
                amount: Decimal::from(10),
                frequency: "minute".to_string(),
                to_address: "addrX".to_string(),
            }).await
            .unwrap();

        assert_eq!(plan, stored);
    }

    #[tokio::test]
    async fn test_stop_plan_unknown_id_returns_none() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<investment_plan::Model>::new()])
            .into_connection();
        let repository = PlanRepository::new(db);

        assert!(repository.stop_plan(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_stop_plan_already_stopped_issues_no_update() {
        let mut stopped = plan_model(3);
        stopped.is_active = false;

        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![stopped.clone()]])
            .into_connection();
        let repository = PlanRepository::new(db);

        let plan = repository.stop_plan(stopped.id).await.unwrap().unwrap();
        assert_eq!(plan, stopped);
    }

    #[tokio::test]
    async fn test_update_execution_result_reports_count_conflict() {
        let current = plan_model(2);

        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([
                MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 0,
                },
            ])
            .append_query_results([vec![current.clone()]])
            .into_connection();
        let repository = PlanRepository::new(db);

        let err = repository
            .update_execution_result(current.id, ExecutionUpdate {
                last_execution_time: Utc::now(),
                delta_invested: Decimal::from(10),
                tx_hash: "0xabc".to_string(),
                expected_execution_count: 1,
            }).await
            .unwrap_err();

        assert!(matches!(err, AppError::Persistence(_)));
    }

    #[tokio::test]
    async fn test_update_execution_result_returns_updated_row() {
        let mut updated = plan_model(1);
        updated.total_invested = Decimal::from(10);

        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([
                MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 1,
                },
            ])
            .append_query_results([vec![updated.clone()]])
            .into_connection();
        let repository = PlanRepository::new(db);

        let plan = repository
            .update_execution_result(updated.id, ExecutionUpdate {
                last_execution_time: Utc::now(),
                delta_invested: Decimal::from(10),
                tx_hash: "0xabc".to_string(),
                expected_execution_count: 0,
            }).await
            .unwrap();

        assert_eq!(plan.execution_count, 1);
        assert_eq!(plan.total_invested, Decimal::from(10));
    }
}
