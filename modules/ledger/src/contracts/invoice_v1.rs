//! Received-invoice request bodies

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::repos::invoice_repo::ApprovalLevel;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InvoiceLineInput {
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    #[serde(default)]
    pub discount_percentage: Decimal,
    #[serde(default)]
    pub discount_amount: Decimal,
    pub tax_rate: Decimal,
    /// Expense account debited when the invoice is posted
    pub account_code: String,
}

/// Body of `POST /api/invoices/received`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CreateInvoiceRequest {
    pub supplier_id: String,
    pub centro_code: String,
    pub invoice_number: String,
    pub invoice_date: NaiveDate,
    pub lines: Vec<InvoiceLineInput>,
    pub created_by: String,
}

/// Body of `POST /api/invoices/received/{id}/approve`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApproveInvoiceRequest {
    /// Role the approver signs as
    pub level: ApprovalLevel,
    pub actor_id: String,
    #[serde(default)]
    pub comment: Option<String>,
}

/// Body of `POST /api/invoices/received/{id}/reject`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RejectInvoiceRequest {
    pub actor_id: String,
    #[serde(default)]
    pub comment: Option<String>,
}

/// Body of `POST /api/invoices/received/{id}/post`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PostInvoiceRequest {
    pub actor_id: String,
}
