use std::sync::Arc;

use axum::{
    extract::rejection::{ JsonRejection, PathRejection },
    extract::Path,
    routing::{ get, post },
    Json,
    Router,
};
use tower_http::{ cors::CorsLayer, trace::TraceLayer };

use crate::error::{ AppError, Result };
use crate::services::{ PlanService, PriceAnalysisService };

pub mod analysis;
pub mod plans;
pub mod users;
pub mod wallet;

#[derive(Clone)]
pub struct AppState {
    pub plan_service: Arc<PlanService>,
    pub price_analysis: Arc<PriceAnalysisService>,
}

impl AppState {
    pub fn new(plan_service: Arc<PlanService>, price_analysis: Arc<PriceAnalysisService>) -> Self {
        Self {
            plan_service,
            price_analysis,
        }
    }
}

/// Full application router: `/health` plus the DCA API under `/api/dca`.
pub fn router(state: AppState) -> Router {
    let dca = Router::new()
        .route("/plans", post(plans::create_plan))
        .route("/plans/{plan_id}", get(plans::get_plan))
        .route("/plans/{plan_id}/stop", post(plans::stop_plan))
        .route("/plans/{plan_id}/execute", post(plans::execute_plan))
        .route("/users", post(users::register_user))
        .route("/users/{user}", get(users::get_user_by_address))
        .route("/users/{user}/plans", get(plans::user_plans))
        .route("/users/{user}/total-investment", get(plans::total_investment))
        .route("/wallets/{address}/balance", get(wallet::get_balance))
        .route("/analysis/{asset_id}", get(analysis::get_analysis));

    Router::new()
        .route("/health", get(health_check))
        .nest("/api/dca", dca)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

async fn health_check() -> &'static str {
    "OK"
}

/// Unwrap a JSON body, reporting malformed input as a validation error.
pub(crate) fn json_body<T>(payload: std::result::Result<Json<T>, JsonRejection>) -> Result<T> {
    payload.map(|Json(body)| body).map_err(|e| AppError::validation(e.body_text()))
}

/// Unwrap a path parameter, reporting malformed input as a validation error.
pub(crate) fn path_param<T>(
    param: std::result::Result<Path<T>, PathRejection>,
    field: &str
) -> Result<T> {
    param.map(|Path(value)| value).map_err(|e| AppError::invalid_field(field, e.body_text()))
}
