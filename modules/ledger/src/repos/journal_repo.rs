use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::RepoError;

/// Lifecycle of a journal entry: `draft → posted → closed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    Draft,
    Posted,
    Closed,
}

impl EntryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryStatus::Draft => "draft",
            EntryStatus::Posted => "posted",
            EntryStatus::Closed => "closed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(EntryStatus::Draft),
            "posted" => Some(EntryStatus::Posted),
            "closed" => Some(EntryStatus::Closed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MovementType {
    Debit,
    Credit,
}

impl MovementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementType::Debit => "debit",
            MovementType::Credit => "credit",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "debit" => Some(MovementType::Debit),
            "credit" => Some(MovementType::Credit),
            _ => None,
        }
    }
}

/// Journal entry header (asiento)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
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
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Journal line; owned by exactly one entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalLine {
    pub entry_id: Uuid,
    pub line_number: i32,
    pub account_code: String,
    pub movement_type: MovementType,
    pub amount: Decimal,
    pub description: Option<String>,
}

/// An entry together with its lines, ordered by `line_number`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryWithLines {
    pub entry: JournalEntry,
    pub lines: Vec<JournalLine>,
}

/// Ledger persistence
#[async_trait]
pub trait LedgerRepository: Send + Sync {
    /// Atomically reserve the next entry number for a centro.
    ///
    /// Numbers are strictly increasing per centro and never handed out twice,
    /// even when the entry that received one is later discarded.
    async fn next_entry_number(&self, centro_code: &str) -> Result<i64, RepoError>;

    /// Insert an entry with its lines, or replace header and lines if it exists.
    ///
    /// Unless the entry is `closed`, fails with `RepoError::PeriodClosed` when
    /// a committed closing covers its date.
    async fn save_entry(
        &self,
        entry: &JournalEntry,
        lines: &[JournalLine],
    ) -> Result<Uuid, RepoError>;

    async fn find_entry(&self, entry_id: Uuid) -> Result<Option<EntryWithLines>, RepoError>;

    /// Delete an entry only if it is still a draft. Returns whether a row was removed.
    /// A draft dated in a sealed period fails with `RepoError::PeriodClosed`.
    async fn delete_draft_entry(&self, entry_id: Uuid) -> Result<bool, RepoError>;

    /// All entries of a centro dated within `[from, to]`, ordered by date then number
    async fn entries_in_period(
        &self,
        centro_code: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<EntryWithLines>, RepoError>;
}
