//! Journal entry API routes
//!
//! Entry creation and the draft lifecycle, trial balance queries and fiscal
//! year registration.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use super::{repository_error, ApiError, AppState};
use crate::contracts::journal_entry_v1::{
    CreateEntryRequest, EntryResponse, OpenFiscalYearRequest, TrialBalanceQuery,
    UpdateDraftLinesRequest,
};
use crate::repos::period_repo::FiscalYear;
use crate::services::fiscal_year_service::{open_fiscal_year, FiscalYearError};
use crate::services::journal_service::{
    create_draft_entry, create_entry, delete_draft_entry, post_draft_entry, update_draft_lines,
    JournalError,
};
use crate::services::trial_balance_service::{get_trial_balance, TrialBalance};

/// Map journal errors to HTTP status codes
pub(crate) fn map_error(error: JournalError) -> ApiError {
    match &error {
        JournalError::Validation(_) => ApiError::new(StatusCode::BAD_REQUEST, error.to_string()),
        JournalError::Unbalanced { .. } => {
            ApiError::new(StatusCode::UNPROCESSABLE_ENTITY, error.to_string())
        }
        JournalError::EntryNotFound(_) => ApiError::new(StatusCode::NOT_FOUND, error.to_string()),
        JournalError::InvalidState(_) | JournalError::PeriodClosed(_) => {
            ApiError::new(StatusCode::CONFLICT, error.to_string())
        }
        JournalError::Repository(e) => repository_error(e),
    }
}

fn map_fiscal_year_error(error: FiscalYearError) -> ApiError {
    match &error {
        FiscalYearError::InvalidRange(_) => ApiError::new(StatusCode::BAD_REQUEST, error.to_string()),
        FiscalYearError::AlreadyExists(_) | FiscalYearError::Overlap(_) => {
            ApiError::new(StatusCode::CONFLICT, error.to_string())
        }
        FiscalYearError::Repository(e) => repository_error(e),
    }
}

/// Handler for POST /api/ledger/entries
pub async fn create_entry_handler(
    State(state): State<AppState>,
    Json(request): Json<CreateEntryRequest>,
) -> Result<(StatusCode, Json<EntryResponse>), ApiError> {
    let entry = create_entry(&state.repos, &request).await.map_err(map_error)?;
    Ok((StatusCode::CREATED, Json(EntryResponse::from(&entry))))
}

/// Handler for POST /api/ledger/entries/drafts
pub async fn create_draft_handler(
    State(state): State<AppState>,
    Json(request): Json<CreateEntryRequest>,
) -> Result<(StatusCode, Json<EntryResponse>), ApiError> {
    let entry = create_draft_entry(&state.repos, &request)
        .await
        .map_err(map_error)?;
    Ok((StatusCode::CREATED, Json(EntryResponse::from(&entry))))
}

/// Handler for PUT /api/ledger/entries/{entry_id}/lines
pub async fn update_draft_lines_handler(
    State(state): State<AppState>,
    Path(entry_id): Path<Uuid>,
    Json(request): Json<UpdateDraftLinesRequest>,
) -> Result<Json<EntryResponse>, ApiError> {
    let entry = update_draft_lines(&state.repos, entry_id, &request.lines)
        .await
        .map_err(map_error)?;
    Ok(Json(EntryResponse::from(&entry)))
}

/// Handler for POST /api/ledger/entries/{entry_id}/post
pub async fn post_draft_handler(
    State(state): State<AppState>,
    Path(entry_id): Path<Uuid>,
) -> Result<Json<EntryResponse>, ApiError> {
    let entry = post_draft_entry(&state.repos, entry_id)
        .await
        .map_err(map_error)?;
    Ok(Json(EntryResponse::from(&entry)))
}

/// Handler for DELETE /api/ledger/entries/{entry_id}
///
/// Only drafts can be deleted.
pub async fn delete_draft_handler(
    State(state): State<AppState>,
    Path(entry_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    delete_draft_entry(&state.repos, entry_id)
        .await
        .map_err(map_error)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Handler for GET /api/ledger/trial-balance
pub async fn trial_balance_handler(
    State(state): State<AppState>,
    Query(params): Query<TrialBalanceQuery>,
) -> Result<Json<TrialBalance>, ApiError> {
    if params.from > params.to {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            format!("Rango de fechas no válido: {} es posterior a {}", params.from, params.to),
        ));
    }
    let balance = get_trial_balance(&state.repos, &params.centro_code, params.from, params.to)
        .await
        .map_err(|e| repository_error(&e))?;
    Ok(Json(balance))
}

/// Handler for POST /api/ledger/fiscal-years
pub async fn open_fiscal_year_handler(
    State(state): State<AppState>,
    Json(request): Json<OpenFiscalYearRequest>,
) -> Result<(StatusCode, Json<FiscalYear>), ApiError> {
    let fiscal_year = open_fiscal_year(&state.repos, &request)
        .await
        .map_err(map_fiscal_year_error)?;
    Ok((StatusCode::CREATED, Json(fiscal_year)))
}
