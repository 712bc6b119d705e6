//! Period Close API Routes
//!
//! - Validate Close: pre-flight check, never modifies state
//! - Close: seal a monthly or annual period, generating the year-end entries

use axum::{extract::State, http::StatusCode, Json};

use super::{journal, repository_error, ApiError, AppState};
use crate::contracts::period_close_v1::{
    ClosePeriodRequest, ClosePeriodResponse, ValidateCloseRequest, ValidateCloseResponse,
};
use crate::services::period_close_service::{
    close_period, has_blocking_errors, validate_period_can_close, ClosingError,
};

/// Map service errors to HTTP status codes
fn map_error(error: ClosingError) -> ApiError {
    match error {
        ClosingError::InvalidPeriod(_) => ApiError::new(StatusCode::BAD_REQUEST, error.to_string()),
        ClosingError::FiscalYearNotFound(_) => {
            ApiError::new(StatusCode::NOT_FOUND, error.to_string())
        }
        ClosingError::PeriodNotReady(_) | ClosingError::AlreadyClosed(_) => {
            ApiError::new(StatusCode::CONFLICT, error.to_string())
        }
        ClosingError::UnknownAccount(_) => {
            ApiError::new(StatusCode::UNPROCESSABLE_ENTITY, error.to_string())
        }
        ClosingError::Journal(inner) => journal::map_error(inner),
        ClosingError::Money(_) => {
            tracing::error!(error = %error, "Amount overflow while closing");
            ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "Error de cálculo de importes")
        }
        ClosingError::Repository(ref e) => repository_error(e),
    }
}

/// Handler for POST /api/ledger/periods/validate-close
///
/// Returns the validation report; a report with errors is still a 200.
pub async fn validate_close(
    State(state): State<AppState>,
    Json(request): Json<ValidateCloseRequest>,
) -> Result<Json<ValidateCloseResponse>, ApiError> {
    let validation_report = validate_period_can_close(&state.repos, &state.rules, &request)
        .await
        .map_err(map_error)?;

    let can_close = !has_blocking_errors(&validation_report);

    Ok(Json(ValidateCloseResponse {
        centro_code: request.centro_code,
        year: request.year,
        month: request.month,
        can_close,
        validation_report,
        validated_at: chrono::Utc::now(),
    }))
}

/// Handler for POST /api/ledger/periods/close
pub async fn close_period_handler(
    State(state): State<AppState>,
    Json(request): Json<ClosePeriodRequest>,
) -> Result<Json<ClosePeriodResponse>, ApiError> {
    let response = close_period(&state.repos, &state.rules, &request)
        .await
        .map_err(map_error)?;
    Ok(Json(response))
}
