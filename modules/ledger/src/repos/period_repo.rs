//! Fiscal years and closing periods
//!
//! A `ClosingPeriod` row exists only once a period has been closed or
//! explicitly registered; a missing row means the period is open.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::journal_repo::EntryWithLines;
use super::RepoError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeriodType {
    Monthly,
    Annual,
}

impl PeriodType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PeriodType::Monthly => "monthly",
            PeriodType::Annual => "annual",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "monthly" => Some(PeriodType::Monthly),
            "annual" => Some(PeriodType::Annual),
            _ => None,
        }
    }
}

/// Open/closed state shared by periods and fiscal years
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeriodStatus {
    Open,
    Closed,
}

impl PeriodStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PeriodStatus::Open => "open",
            PeriodStatus::Closed => "closed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "open" => Some(PeriodStatus::Open),
            "closed" => Some(PeriodStatus::Closed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FiscalYear {
    pub id: Uuid,
    pub centro_code: String,
    pub year: i32,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub status: PeriodStatus,
    pub closing_date: Option<NaiveDate>,
}

impl FiscalYear {
    pub fn contains_date(&self, date: NaiveDate) -> bool {
        date >= self.start_date && date <= self.end_date
    }

    pub fn overlaps(&self, start: NaiveDate, end: NaiveDate) -> bool {
        start <= self.end_date && end >= self.start_date
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosingPeriod {
    pub id: Uuid,
    pub centro_code: String,
    pub period_type: PeriodType,
    pub period_year: i32,
    /// `None` for annual periods
    pub period_month: Option<u32>,
    pub status: PeriodStatus,
    pub closing_entry_id: Option<Uuid>,
    pub regularization_entry_id: Option<Uuid>,
    pub closed_by: Option<String>,
    pub closed_at: Option<DateTime<Utc>>,
    /// SHA-256 over the sealed period totals
    pub close_hash: Option<String>,
    pub notes: Option<String>,
}

impl ClosingPeriod {
    pub fn is_closed(&self) -> bool {
        self.status == PeriodStatus::Closed
    }
}

/// Everything a closing writes, applied as one atomic transition
#[derive(Debug, Clone)]
pub struct ClosingCommit {
    /// The period row in its final `closed` state
    pub period: ClosingPeriod,
    /// Regularization / closing entries generated for this period
    pub generated_entries: Vec<EntryWithLines>,
    /// Date range whose `posted` entries move to `closed`
    pub sealed_from: NaiveDate,
    pub sealed_to: NaiveDate,
    /// Drafts the closer explicitly left out of the precondition check
    pub excluded_entry_ids: Vec<Uuid>,
    /// Fiscal year to mark closed (annual closings only)
    pub fiscal_year_id: Option<Uuid>,
}

/// Period and fiscal-year persistence
#[async_trait]
pub trait PeriodRepository: Send + Sync {
    async fn get_period(
        &self,
        centro_code: &str,
        year: i32,
        month: Option<u32>,
    ) -> Result<Option<ClosingPeriod>, RepoError>;

    async fn get_fiscal_year(
        &self,
        centro_code: &str,
        year: i32,
    ) -> Result<Option<FiscalYear>, RepoError>;

    async fn list_fiscal_years(&self, centro_code: &str) -> Result<Vec<FiscalYear>, RepoError>;

    async fn save_fiscal_year(&self, fiscal_year: &FiscalYear) -> Result<(), RepoError>;

    /// Atomically apply a closing.
    ///
    /// Fails with `RepoError::AlreadyClosed` if the period (or the fiscal year,
    /// for annual closings) was closed concurrently, and with
    /// `RepoError::Conflict` if a non-excluded draft appeared in the sealed
    /// range. Nothing is written on failure.
    async fn commit_closing(&self, commit: &ClosingCommit) -> Result<(), RepoError>;

    /// Fiscal year of a centro whose date range contains `date`
    async fn fiscal_year_for_date(
        &self,
        centro_code: &str,
        date: NaiveDate,
    ) -> Result<Option<FiscalYear>, RepoError> {
        Ok(self
            .list_fiscal_years(centro_code)
            .await?
            .into_iter()
            .find(|fy| fy.contains_date(date)))
    }
}
