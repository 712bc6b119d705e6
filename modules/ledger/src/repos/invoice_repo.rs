use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::journal_repo::EntryWithLines;
use super::RepoError;

/// Approval state of a received invoice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    PendingManager,
    PendingAccounting,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalStatus::PendingManager => "pending_manager",
            ApprovalStatus::PendingAccounting => "pending_accounting",
            ApprovalStatus::Approved => "approved",
            ApprovalStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending_manager" => Some(ApprovalStatus::PendingManager),
            "pending_accounting" => Some(ApprovalStatus::PendingAccounting),
            "approved" => Some(ApprovalStatus::Approved),
            "rejected" => Some(ApprovalStatus::Rejected),
            _ => None,
        }
    }
}

/// Who signs off at a given approval step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalLevel {
    Manager,
    Accounting,
}

impl ApprovalLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalLevel::Manager => "manager",
            ApprovalLevel::Accounting => "accounting",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "manager" => Some(ApprovalLevel::Manager),
            "accounting" => Some(ApprovalLevel::Accounting),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalAction {
    Approved,
    Rejected,
}

impl ApprovalAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalAction::Approved => "approved",
            ApprovalAction::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "approved" => Some(ApprovalAction::Approved),
            "rejected" => Some(ApprovalAction::Rejected),
            _ => None,
        }
    }
}

/// One step of an invoice's approval history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceApproval {
    pub level: ApprovalLevel,
    pub action: ApprovalAction,
    pub actor_id: String,
    pub comment: Option<String>,
    pub decided_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceLine {
    pub line_number: i32,
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub discount_percentage: Decimal,
    pub discount_amount: Decimal,
    pub subtotal: Decimal,
    pub tax_rate: Decimal,
    pub tax_amount: Decimal,
    pub total: Decimal,
    /// Ledger account debited for this line's expense
    pub account_code: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceReceived {
    pub id: Uuid,
    pub supplier_id: String,
    pub centro_code: String,
    pub invoice_number: String,
    pub invoice_date: NaiveDate,
    pub lines: Vec<InvoiceLine>,
    pub subtotal: Decimal,
    pub tax_total: Decimal,
    pub total: Decimal,
    pub requires_manager_approval: bool,
    pub requires_accounting_approval: bool,
    pub approval_status: ApprovalStatus,
    pub approvals: Vec<InvoiceApproval>,
    /// Set once the invoice has been posted to the ledger
    pub journal_entry_id: Option<Uuid>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Received-invoice persistence
#[async_trait]
pub trait InvoiceRepository: Send + Sync {
    /// Insert or replace the invoice together with its lines and approvals
    async fn save_invoice(&self, invoice: &InvoiceReceived) -> Result<Uuid, RepoError>;

    async fn find_invoice(&self, invoice_id: Uuid) -> Result<Option<InvoiceReceived>, RepoError>;

    /// Write `posted` and link it as the invoice's ledger entry in one step.
    ///
    /// Returns `false`, writing nothing, when the invoice is not approved or
    /// already carries an entry. Fails with `RepoError::PeriodClosed` if the
    /// entry date is sealed.
    async fn post_invoice_entry(
        &self,
        invoice_id: Uuid,
        posted: &EntryWithLines,
    ) -> Result<bool, RepoError>;
}
