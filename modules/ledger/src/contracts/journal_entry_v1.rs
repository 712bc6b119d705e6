//! Journal Entry V1 Contract Types
//!
//! Request/response bodies for the entry endpoints:
//! - Create Entry: validate, number and post a balanced entry
//! - Draft lifecycle: create, replace lines, post, delete
//! - Trial balance and fiscal-year registration

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::repos::journal_repo::{EntryStatus, EntryWithLines, JournalLine, MovementType};

/// One debit or credit line of an entry request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EntryLineInput {
    pub account_code: String,
    pub movement_type: MovementType,
    /// Positive amount with at most two decimals
    pub amount: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl EntryLineInput {
    pub fn debit(account_code: &str, amount: Decimal) -> Self {
        Self {
            account_code: account_code.to_string(),
            movement_type: MovementType::Debit,
            amount,
            description: None,
        }
    }

    pub fn credit(account_code: &str, amount: Decimal) -> Self {
        Self {
            account_code: account_code.to_string(),
            movement_type: MovementType::Credit,
            amount,
            description: None,
        }
    }
}

/// Body of `POST /api/ledger/entries` and `POST /api/ledger/entries/drafts`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CreateEntryRequest {
    pub centro_code: String,
    pub entry_date: NaiveDate,
    pub description: String,
    pub lines: Vec<EntryLineInput>,
    pub created_by: String,
}

/// Body of `PUT /api/ledger/entries/{entry_id}/lines`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UpdateDraftLinesRequest {
    pub lines: Vec<EntryLineInput>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EntryLineResponse {
    pub line_number: i32,
    pub account_code: String,
    pub movement_type: MovementType,
    pub amount: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl From<&JournalLine> for EntryLineResponse {
    fn from(line: &JournalLine) -> Self {
        Self {
            line_number: line.line_number,
            account_code: line.account_code.clone(),
            movement_type: line.movement_type,
            amount: line.amount,
            description: line.description.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EntryResponse {
    pub id: Uuid,
    pub entry_number: i64,
    pub entry_date: NaiveDate,
    pub description: String,
    pub centro_code: String,
    pub fiscal_year_id: Option<Uuid>,
    pub status: EntryStatus,
    pub total_debit: Decimal,
    pub total_credit: Decimal,
    pub created_by: String,
    pub lines: Vec<EntryLineResponse>,
}

impl From<&EntryWithLines> for EntryResponse {
    fn from(e: &EntryWithLines) -> Self {
        Self {
            id: e.entry.id,
            entry_number: e.entry.entry_number,
            entry_date: e.entry.entry_date,
            description: e.entry.description.clone(),
            centro_code: e.entry.centro_code.clone(),
            fiscal_year_id: e.entry.fiscal_year_id,
            status: e.entry.status,
            total_debit: e.entry.total_debit,
            total_credit: e.entry.total_credit,
            created_by: e.entry.created_by.clone(),
            lines: e.lines.iter().map(EntryLineResponse::from).collect(),
        }
    }
}

/// Query string of `GET /api/ledger/trial-balance`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrialBalanceQuery {
    pub centro_code: String,
    pub from: NaiveDate,
    pub to: NaiveDate,
}

/// Body of `POST /api/ledger/fiscal-years`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OpenFiscalYearRequest {
    pub centro_code: String,
    pub year: i32,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}
