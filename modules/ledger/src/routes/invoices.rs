//! Received invoice API routes

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use uuid::Uuid;

use super::{journal, repository_error, ApiError, AppState};
use crate::contracts::invoice_v1::{
    ApproveInvoiceRequest, CreateInvoiceRequest, PostInvoiceRequest, RejectInvoiceRequest,
};
use crate::contracts::journal_entry_v1::EntryResponse;
use crate::repos::invoice_repo::InvoiceReceived;
use crate::services::invoice_service::{
    approve_invoice, create_invoice_received, post_invoice_to_ledger, reject_invoice,
    InvoiceError,
};

#[derive(Debug, Serialize)]
pub struct PostInvoiceResponse {
    pub invoice: InvoiceReceived,
    pub entry: EntryResponse,
}

fn map_error(error: InvoiceError) -> ApiError {
    match error {
        InvoiceError::Validation(_) => ApiError::new(StatusCode::BAD_REQUEST, error.to_string()),
        InvoiceError::NotFound(_) => ApiError::new(StatusCode::NOT_FOUND, error.to_string()),
        InvoiceError::InvalidState(_) => ApiError::new(StatusCode::CONFLICT, error.to_string()),
        InvoiceError::Journal(inner) => journal::map_error(inner),
        InvoiceError::Repository(ref e) => repository_error(e),
    }
}

/// Handler for POST /api/invoices/received
pub async fn create_invoice_handler(
    State(state): State<AppState>,
    Json(request): Json<CreateInvoiceRequest>,
) -> Result<(StatusCode, Json<InvoiceReceived>), ApiError> {
    let invoice = create_invoice_received(&state.repos, &state.rules, &request)
        .await
        .map_err(map_error)?;
    Ok((StatusCode::CREATED, Json(invoice)))
}

/// Handler for GET /api/invoices/received/{invoice_id}
pub async fn get_invoice_handler(
    State(state): State<AppState>,
    Path(invoice_id): Path<Uuid>,
) -> Result<Json<InvoiceReceived>, ApiError> {
    state
        .repos
        .invoices
        .find_invoice(invoice_id)
        .await
        .map_err(|e| repository_error(&e))?
        .map(Json)
        .ok_or_else(|| map_error(InvoiceError::NotFound(invoice_id)))
}

/// Handler for POST /api/invoices/received/{invoice_id}/approve
pub async fn approve_invoice_handler(
    State(state): State<AppState>,
    Path(invoice_id): Path<Uuid>,
    Json(request): Json<ApproveInvoiceRequest>,
) -> Result<Json<InvoiceReceived>, ApiError> {
    let invoice = approve_invoice(&state.repos, invoice_id, &request)
        .await
        .map_err(map_error)?;
    Ok(Json(invoice))
}

/// Handler for POST /api/invoices/received/{invoice_id}/reject
pub async fn reject_invoice_handler(
    State(state): State<AppState>,
    Path(invoice_id): Path<Uuid>,
    Json(request): Json<RejectInvoiceRequest>,
) -> Result<Json<InvoiceReceived>, ApiError> {
    let invoice = reject_invoice(&state.repos, invoice_id, &request)
        .await
        .map_err(map_error)?;
    Ok(Json(invoice))
}

/// Handler for POST /api/invoices/received/{invoice_id}/post
pub async fn post_invoice_handler(
    State(state): State<AppState>,
    Path(invoice_id): Path<Uuid>,
    Json(request): Json<PostInvoiceRequest>,
) -> Result<Json<PostInvoiceResponse>, ApiError> {
    let (invoice, entry) = post_invoice_to_ledger(&state.repos, &state.rules, invoice_id, &request)
        .await
        .map_err(map_error)?;
    Ok(Json(PostInvoiceResponse {
        entry: EntryResponse::from(&entry),
        invoice,
    }))
}
