//! Period Close Workflow V1 Contract Types
//!
//! - Validate Close: read-only pre-flight report for a monthly or annual period
//! - Close Period: seal the period, generating regularization/closing entries
//!   for annual closings
//!
//! A period is addressed by `(centro_code, year, month)`; `month = None`
//! means the annual period of the fiscal year `year`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::journal_entry_v1::EntryResponse;
use crate::repos::period_repo::ClosingPeriod;

// ============================================================
// Validate Close Endpoint: POST /api/ledger/periods/validate-close
// ============================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValidateCloseRequest {
    pub centro_code: String,
    pub year: i32,
    #[serde(default)]
    pub month: Option<u32>,
    /// Draft entries the closer explicitly leaves out of the check
    #[serde(default)]
    pub excluded_entry_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValidateCloseResponse {
    pub centro_code: String,
    pub year: i32,
    pub month: Option<u32>,
    pub can_close: bool,
    pub validation_report: ValidationReport,
    pub validated_at: DateTime<Utc>,
}

// ============================================================
// Close Period Endpoint: POST /api/ledger/periods/close
// ============================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClosePeriodRequest {
    pub centro_code: String,
    pub year: i32,
    #[serde(default)]
    pub month: Option<u32>,
    pub closed_by: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default)]
    pub excluded_entry_ids: Vec<Uuid>,
}

impl ClosePeriodRequest {
    pub fn validate_request(&self) -> ValidateCloseRequest {
        ValidateCloseRequest {
            centro_code: self.centro_code.clone(),
            year: self.year,
            month: self.month,
            excluded_entry_ids: self.excluded_entry_ids.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClosePeriodResponse {
    pub period: ClosingPeriod,
    /// Posted entries moved to `closed` by this closing
    pub entries_sealed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub regularization_entry: Option<EntryResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub closing_entry: Option<EntryResponse>,
    /// Non-fatal findings, e.g. an empty period
    pub warnings: Vec<String>,
}

// ============================================================
// Shared Domain Types
// ============================================================

/// Structured validation report
///
/// Empty when the period can be closed without remarks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ValidationReport {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    pub fn push(&mut self, severity: ValidationSeverity, code: &str, message: String) {
        self.issues.push(ValidationIssue {
            severity,
            code: code.to_string(),
            message,
            metadata: None,
        });
    }

    pub fn push_with_metadata(
        &mut self,
        severity: ValidationSeverity,
        code: &str,
        message: String,
        metadata: serde_json::Value,
    ) {
        self.issues.push(ValidationIssue {
            severity,
            code: code.to_string(),
            message,
            metadata: Some(metadata),
        });
    }

    pub fn errors(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues
            .iter()
            .filter(|i| i.severity == ValidationSeverity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues
            .iter()
            .filter(|i| i.severity == ValidationSeverity::Warning)
    }

    pub fn has_code(&self, code: &str) -> bool {
        self.issues.iter().any(|i| i.code == code)
    }
}

/// Individual validation issue with a stable code for client handling
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValidationIssue {
    pub severity: ValidationSeverity,

    /// One of `PERIOD_ALREADY_CLOSED`, `DRAFT_ENTRIES`, `MONTHS_OPEN`,
    /// `FISCAL_YEAR_NOT_FOUND`, `EMPTY_PERIOD`
    pub code: String,

    /// Human-readable message (Spanish)
    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationSeverity {
    /// Blocks close operation
    Error,

    /// Reported but doesn't block close
    Warning,
}

pub const PERIOD_ALREADY_CLOSED: &str = "PERIOD_ALREADY_CLOSED";
pub const DRAFT_ENTRIES: &str = "DRAFT_ENTRIES";
pub const MONTHS_OPEN: &str = "MONTHS_OPEN";
pub const FISCAL_YEAR_NOT_FOUND: &str = "FISCAL_YEAR_NOT_FOUND";
pub const EMPTY_PERIOD: &str = "EMPTY_PERIOD";
