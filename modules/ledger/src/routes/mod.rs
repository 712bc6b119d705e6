//! HTTP surface
//!
//! Every handler shares [`AppState`]; each route module maps its service
//! error onto [`ApiError`] in its own `map_error`.

pub mod bank_import;
pub mod invoices;
pub mod journal;
pub mod period_close;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Json, Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::config::BusinessRules;
use crate::health::health;
use crate::repos::{RepoError, Repositories};

#[derive(Clone)]
pub struct AppState {
    pub repos: Repositories,
    pub rules: Arc<BusinessRules>,
}

impl AppState {
    pub fn new(repos: Repositories, rules: BusinessRules) -> Self {
        Self {
            repos,
            rules: Arc::new(rules),
        }
    }
}

/// Error response wrapper
#[derive(Debug, serde::Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorResponse {
            error: self.message,
        });
        (self.status, body).into_response()
    }
}

/// Storage failures are logged in full but never leaked to the caller
pub(crate) fn repository_error(error: &RepoError) -> ApiError {
    match error {
        RepoError::NotFound(_) => ApiError::new(StatusCode::NOT_FOUND, error.to_string()),
        RepoError::Conflict(_) | RepoError::AlreadyClosed(_) | RepoError::PeriodClosed(_) => {
            ApiError::new(StatusCode::CONFLICT, error.to_string())
        }
        _ => {
            tracing::error!(error = %error, "Storage failure");
            ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "Error interno de almacenamiento")
        }
    }
}

/// Build the application router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/ledger/entries", post(journal::create_entry_handler))
        .route("/api/ledger/entries/drafts", post(journal::create_draft_handler))
        .route("/api/ledger/entries/{entry_id}/post", post(journal::post_draft_handler))
        .route("/api/ledger/entries/{entry_id}/lines", put(journal::update_draft_lines_handler))
        .route("/api/ledger/entries/{entry_id}", delete(journal::delete_draft_handler))
        .route("/api/ledger/trial-balance", get(journal::trial_balance_handler))
        .route("/api/ledger/fiscal-years", post(journal::open_fiscal_year_handler))
        .route("/api/ledger/periods/validate-close", post(period_close::validate_close))
        .route("/api/ledger/periods/close", post(period_close::close_period_handler))
        .route("/api/invoices/received", post(invoices::create_invoice_handler))
        .route("/api/invoices/received/{invoice_id}", get(invoices::get_invoice_handler))
        .route("/api/invoices/received/{invoice_id}/approve", post(invoices::approve_invoice_handler))
        .route("/api/invoices/received/{invoice_id}/reject", post(invoices::reject_invoice_handler))
        .route("/api/invoices/received/{invoice_id}/post", post(invoices::post_invoice_handler))
        .route("/api/bank/norma43/import", post(bank_import::import_norma43_handler))
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}
