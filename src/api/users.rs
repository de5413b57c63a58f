use axum::{ extract::{ rejection::JsonRejection, Path, State }, Json };
use serde::Deserialize;

use crate::db::user;
use crate::error::{ AppError, Result };

use super::{ json_body, AppState };

#[derive(Deserialize)]
pub struct RegisterUserRequest {
    pub address: Option<String>,
}

/// Find-or-create the user for a connected wallet.
pub async fn register_user(
    State(state): State<AppState>,
    payload: std::result::Result<Json<RegisterUserRequest>, JsonRejection>
) -> Result<Json<user::Model>> {
    let request = json_body(payload)?;
    let address = request.address.ok_or_else(||
        AppError::invalid_field("address", "address is required")
    )?;

    let user = state.plan_service.register_user(&address).await?;

    Ok(Json(user))
}

pub async fn get_user_by_address(
    State(state): State<AppState>,
    Path(address): Path<String>
) -> Result<Json<user::Model>> {
    let user = state.plan_service.find_user_by_address(&address).await?;

    Ok(Json(user))
}
