use axum::{
    extract::{ rejection::{ JsonRejection, PathRejection }, Path, State },
    Json,
};
use rust_decimal::Decimal;
use serde::{ Deserialize, Serialize };
use uuid::Uuid;

use crate::db::{ investment_plan, NewPlan };
use crate::error::{ AppError, Result };
use crate::executor::TickOutcome;

use super::{ json_body, path_param, AppState };

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePlanRequest {
    pub user_id: Option<Uuid>,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub amount: Option<Decimal>,
    pub frequency: Option<String>,
    pub to_address: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TotalInvestmentResponse {
    #[serde(with = "rust_decimal::serde::float")]
    pub total_investment: Decimal,
}

fn required<T>(value: Option<T>, field: &str) -> Result<T> {
    value.ok_or_else(|| AppError::invalid_field(field, format!("{} is required", field)))
}

pub async fn create_plan(
    State(state): State<AppState>,
    payload: std::result::Result<Json<CreatePlanRequest>, JsonRejection>
) -> Result<Json<investment_plan::Model>> {
    let request = json_body(payload)?;

    let user_id = required(request.user_id, "userId")?;
    let plan = NewPlan {
        amount: required(request.amount, "amount")?,
        frequency: required(request.frequency, "frequency")?,
        to_address: required(request.to_address, "toAddress")?,
    };

    let plan = state.plan_service.create_plan(user_id, plan).await?;

    Ok(Json(plan))
}

pub async fn get_plan(
    State(state): State<AppState>,
    plan_id: std::result::Result<Path<Uuid>, PathRejection>
) -> Result<Json<investment_plan::Model>> {
    let plan_id = path_param(plan_id, "planId")?;
    let plan = state.plan_service.get_plan(plan_id).await?;

    Ok(Json(plan))
}

pub async fn stop_plan(
    State(state): State<AppState>,
    plan_id: std::result::Result<Path<Uuid>, PathRejection>
) -> Result<Json<investment_plan::Model>> {
    let plan_id = path_param(plan_id, "planId")?;
    let plan = state.plan_service.stop_plan(plan_id).await?;

    Ok(Json(plan))
}

/// Manual tick, outside the plan's schedule.
pub async fn execute_plan(
    State(state): State<AppState>,
    plan_id: std::result::Result<Path<Uuid>, PathRejection>
) -> Result<Json<TickOutcome>> {
    let plan_id = path_param(plan_id, "planId")?;
    let outcome = state.plan_service.execute_now(plan_id).await?;

    Ok(Json(outcome))
}

pub async fn user_plans(
    State(state): State<AppState>,
    user_id: std::result::Result<Path<Uuid>, PathRejection>
) -> Result<Json<Vec<investment_plan::Model>>> {
    let user_id = path_param(user_id, "userId")?;
    let plans = state.plan_service.user_plans(user_id).await?;

    Ok(Json(plans))
}

pub async fn total_investment(
    State(state): State<AppState>,
    user_id: std::result::Result<Path<Uuid>, PathRejection>
) -> Result<Json<TotalInvestmentResponse>> {
    let user_id = path_param(user_id, "userId")?;
    let total_investment = state.plan_service.total_investment(user_id).await?;

    Ok(Json(TotalInvestmentResponse { total_investment }))
}
