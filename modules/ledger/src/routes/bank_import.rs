//! Bank statement import route

use axum::{extract::State, Json};

use super::{repository_error, ApiError, AppState};
use crate::contracts::norma43_import_v1::{Norma43ImportRequest, Norma43ImportResult};
use crate::services::bank_import_service::import_norma43;

/// Handler for POST /api/bank/norma43/import
///
/// A file that is not Norma 43 still answers 200 with `success: false`.
pub async fn import_norma43_handler(
    State(state): State<AppState>,
    Json(request): Json<Norma43ImportRequest>,
) -> Result<Json<Norma43ImportResult>, ApiError> {
    let result = import_norma43(&state.repos, &request)
        .await
        .map_err(|e| repository_error(&e))?;
    Ok(Json(result))
}
