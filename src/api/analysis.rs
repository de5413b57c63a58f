use axum::{ extract::{ Path, State }, Json };

use crate::error::{ AppError, Result };
use crate::services::TrendAnalysis;

use super::AppState;

pub async fn get_analysis(
    State(state): State<AppState>,
    Path(asset_id): Path<String>
) -> Result<Json<TrendAnalysis>> {
    let analysis = state.price_analysis
        .analyze(&asset_id).await
        .map_err(|e| AppError::Oracle(format!("{:#}", e)))?;

    Ok(Json(analysis))
}
