use axum::{ extract::{ Path, Query, State }, Json };
use rust_decimal::Decimal;
use serde::{ Deserialize, Serialize };

use crate::enums::AssetKind;
use crate::error::Result;

use super::AppState;

#[derive(Deserialize)]
pub struct BalanceQuery {
    #[serde(default)]
    pub asset: Option<String>,
}

#[derive(Serialize)]
pub struct BalanceResponse {
    pub address: String,
    pub asset: AssetKind,
    #[serde(with = "rust_decimal::serde::float")]
    pub balance: Decimal,
}

pub async fn get_balance(
    State(state): State<AppState>,
    Path(address): Path<String>,
    Query(query): Query<BalanceQuery>
) -> Result<Json<BalanceResponse>> {
    let asset = match query.asset {
        Some(asset) => asset.parse()?,
        None => AssetKind::Native,
    };

    let balance = state.plan_service.balance(&address, asset).await?;

    Ok(Json(BalanceResponse { address, asset, balance }))
}
