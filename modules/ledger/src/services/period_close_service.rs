//! Period Close Service
//!
//! Closes monthly and annual periods of a centro:
//! - pre-flight validation producing a structured [`ValidationReport`]
//! - regularization and closing entries for annual closings
//! - a SHA-256 close hash over the sealed totals
//! - one atomic [`ClosingCommit`] that claims the period, stores the
//!   generated entries and moves the period's entries to `closed`

use chrono::{Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use thiserror::Error;
use uuid::Uuid;

use crate::config::BusinessRules;
use crate::contracts::journal_entry_v1::{CreateEntryRequest, EntryLineInput, EntryResponse};
use crate::contracts::period_close_v1::{
    ClosePeriodRequest, ClosePeriodResponse, ValidateCloseRequest, ValidationReport,
    ValidationSeverity, DRAFT_ENTRIES, EMPTY_PERIOD, FISCAL_YEAR_NOT_FOUND, MONTHS_OPEN,
    PERIOD_ALREADY_CLOSED,
};
use crate::money::{to_minor, MoneyError};
use crate::repos::account_repo::AccountType;
use crate::repos::journal_repo::{EntryStatus, EntryWithLines, MovementType};
use crate::repos::period_repo::{
    ClosingCommit, ClosingPeriod, FiscalYear, PeriodStatus, PeriodType,
};
use crate::repos::{RepoError, Repositories};
use crate::services::journal_service::{prepare_closing_entry, JournalError};
use crate::services::trial_balance_service::{accumulate, is_effective, TrialBalanceRow};

/// Errors that can occur during period close operations
#[derive(Debug, Error)]
pub enum ClosingError {
    #[error("Periodo no válido: {0}")]
    InvalidPeriod(String),

    #[error("El periodo no está listo para cerrarse: {0}")]
    PeriodNotReady(String),

    #[error("El periodo ya está cerrado: {0}")]
    AlreadyClosed(String),

    #[error("No existe el ejercicio {0}")]
    FiscalYearNotFound(i32),

    #[error("La cuenta {0} no existe en el plan contable del centro")]
    UnknownAccount(String),

    #[error(transparent)]
    Journal(#[from] JournalError),

    #[error(transparent)]
    Money(#[from] MoneyError),

    #[error("Error de persistencia: {0}")]
    Repository(#[from] RepoError),
}

/// `2024-11` for a monthly period, `2024` for an annual one
pub fn period_label(year: i32, month: Option<u32>) -> String {
    match month {
        Some(m) => format!("{}-{:02}", year, m),
        None => year.to_string(),
    }
}

/// First and last day of a calendar month
pub fn month_bounds(year: i32, month: u32) -> Option<(NaiveDate, NaiveDate)> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    let last = NaiveDate::from_ymd_opt(next_year, next_month, 1)?.pred_opt()?;
    Some((first, last))
}

/// Calendar months touched by `[from, to]`, as `(year, month)` pairs
pub fn months_between(from: NaiveDate, to: NaiveDate) -> Vec<(i32, u32)> {
    let mut months = Vec::new();
    let (mut y, mut m) = (from.year(), from.month());
    while (y, m) <= (to.year(), to.month()) {
        months.push((y, m));
        if m == 12 {
            y += 1;
            m = 1;
        } else {
            m += 1;
        }
    }
    months
}

/// Compute the close hash for tamper detection
///
/// Format: SHA-256(centro_code|period|entry_count|debits_minor|credits_minor)
///
/// # Returns
/// Hex-encoded SHA-256 hash (64 characters)
pub fn compute_close_hash(
    centro_code: &str,
    period: &str,
    entry_count: usize,
    total_debits_minor: i64,
    total_credits_minor: i64,
) -> String {
    let mut hasher = Sha256::new();

    hasher.update(centro_code.as_bytes());
    hasher.update(b"|");
    hasher.update(period.as_bytes());
    hasher.update(b"|");
    hasher.update(entry_count.to_string().as_bytes());
    hasher.update(b"|");
    hasher.update(total_debits_minor.to_string().as_bytes());
    hasher.update(b"|");
    hasher.update(total_credits_minor.to_string().as_bytes());

    format!("{:x}", hasher.finalize())
}

/// Lines that zero every revenue/expense balance into the result account
///
/// An account with a debit balance is credited for it and vice versa; the
/// net of all of them lands on `result_account`. Empty when there is
/// nothing to regularize.
pub fn regularization_lines(
    rows: &[TrialBalanceRow],
    types: &HashMap<String, AccountType>,
    result_account: &str,
) -> Vec<EntryLineInput> {
    let mut lines = Vec::new();
    let mut net_total = Decimal::ZERO;

    for row in rows {
        let income_statement = types
            .get(&row.account_code)
            .is_some_and(|t| t.is_income_statement());
        if !income_statement || row.net.is_zero() {
            continue;
        }
        net_total += row.net;
        lines.push(offsetting_line(&row.account_code, row.net));
    }

    if !lines.is_empty() && !net_total.is_zero() {
        // A positive net is a loss (expenses exceed revenue) and hits the
        // result account on the debit side
        let mut result_line = offsetting_line(result_account, -net_total);
        result_line.description = Some("Resultado del ejercicio".to_string());
        lines.push(result_line);
    }
    lines
}

/// Lines that zero every balance-sheet account (asiento de cierre)
pub fn closing_lines(
    rows: &[TrialBalanceRow],
    types: &HashMap<String, AccountType>,
) -> Vec<EntryLineInput> {
    rows.iter()
        .filter(|row| {
            !row.net.is_zero()
                && types
                    .get(&row.account_code)
                    .is_some_and(|t| !t.is_income_statement())
        })
        .map(|row| offsetting_line(&row.account_code, row.net))
        .collect()
}

/// Line that cancels a `debit - credit` balance of `net`
fn offsetting_line(account_code: &str, net: Decimal) -> EntryLineInput {
    if net > Decimal::ZERO {
        EntryLineInput::credit(account_code, net)
    } else {
        EntryLineInput::debit(account_code, -net)
    }
}

async fn account_types(
    repos: &Repositories,
    centro_code: &str,
    rows: &[TrialBalanceRow],
) -> Result<HashMap<String, AccountType>, ClosingError> {
    let mut types = HashMap::new();
    for row in rows {
        let account = repos
            .accounts
            .resolve_account(centro_code, &row.account_code)
            .await?
            .ok_or_else(|| ClosingError::UnknownAccount(row.account_code.clone()))?;
        types.insert(row.account_code.clone(), account.account_type);
    }
    Ok(types)
}

/// What a period covers once it has been resolved
struct PeriodScope {
    from: NaiveDate,
    to: NaiveDate,
    fiscal_year: Option<FiscalYear>,
    existing: Option<ClosingPeriod>,
    entries: Vec<EntryWithLines>,
}

/// Build the validation report; the scope is `None` when the period could
/// not even be resolved (already closed, missing fiscal year)
async fn assess(
    repos: &Repositories,
    rules: &BusinessRules,
    request: &ValidateCloseRequest,
) -> Result<(ValidationReport, Option<PeriodScope>), ClosingError> {
    let centro = request.centro_code.as_str();
    let label = period_label(request.year, request.month);
    let mut report = ValidationReport::default();

    if centro.trim().is_empty() {
        return Err(ClosingError::InvalidPeriod(
            "el código de centro es obligatorio".to_string(),
        ));
    }

    let existing = repos
        .periods
        .get_period(centro, request.year, request.month)
        .await?;
    if existing.as_ref().is_some_and(|p| p.is_closed()) {
        report.push(
            ValidationSeverity::Error,
            PERIOD_ALREADY_CLOSED,
            format!("El periodo {} ya está cerrado", label),
        );
        return Ok((report, None));
    }

    let (from, to, fiscal_year) = match request.month {
        Some(month) => {
            let (from, to) = month_bounds(request.year, month).ok_or_else(|| {
                ClosingError::InvalidPeriod(format!("mes {} fuera de rango", month))
            })?;
            let containing = repos.periods.fiscal_year_for_date(centro, from).await?;
            if containing.is_some_and(|fy| fy.status == PeriodStatus::Closed) {
                report.push(
                    ValidationSeverity::Error,
                    PERIOD_ALREADY_CLOSED,
                    format!("El ejercicio que contiene {} ya está cerrado", label),
                );
                return Ok((report, None));
            }
            (from, to, None)
        }
        None => {
            let Some(fy) = repos.periods.get_fiscal_year(centro, request.year).await? else {
                report.push(
                    ValidationSeverity::Error,
                    FISCAL_YEAR_NOT_FOUND,
                    format!("No existe el ejercicio {} para el centro {}", request.year, centro),
                );
                return Ok((report, None));
            };
            if fy.status == PeriodStatus::Closed {
                report.push(
                    ValidationSeverity::Error,
                    PERIOD_ALREADY_CLOSED,
                    format!("El ejercicio {} ya está cerrado", fy.year),
                );
                return Ok((report, None));
            }

            if rules.require_monthly_closings_for_annual {
                let mut open_months = Vec::new();
                for (y, m) in months_between(fy.start_date, fy.end_date) {
                    let closed = repos
                        .periods
                        .get_period(centro, y, Some(m))
                        .await?
                        .is_some_and(|p| p.is_closed());
                    if !closed {
                        open_months.push(period_label(y, Some(m)));
                    }
                }
                if !open_months.is_empty() {
                    report.push_with_metadata(
                        ValidationSeverity::Error,
                        MONTHS_OPEN,
                        format!(
                            "Hay {} meses del ejercicio sin cerrar: {}",
                            open_months.len(),
                            open_months.join(", ")
                        ),
                        serde_json::json!({ "open_months": open_months }),
                    );
                }
            }
            (fy.start_date, fy.end_date, Some(fy))
        }
    };

    let entries = repos.ledger.entries_in_period(centro, from, to).await?;

    let drafts: Vec<&EntryWithLines> = entries
        .iter()
        .filter(|e| {
            e.entry.status == EntryStatus::Draft
                && !request.excluded_entry_ids.contains(&e.entry.id)
        })
        .collect();
    if !drafts.is_empty() {
        let numbers: Vec<i64> = drafts.iter().map(|e| e.entry.entry_number).collect();
        let ids: Vec<Uuid> = drafts.iter().map(|e| e.entry.id).collect();
        report.push_with_metadata(
            ValidationSeverity::Error,
            DRAFT_ENTRIES,
            format!(
                "Hay {} asientos en borrador en el periodo {}",
                drafts.len(),
                label
            ),
            serde_json::json!({ "entry_numbers": numbers, "entry_ids": ids }),
        );
    }

    if !entries.iter().any(is_effective) {
        report.push(
            ValidationSeverity::Warning,
            EMPTY_PERIOD,
            format!("El periodo {} no tiene asientos contabilizados", label),
        );
    }

    Ok((
        report,
        Some(PeriodScope {
            from,
            to,
            fiscal_year,
            existing,
            entries,
        }),
    ))
}

/// Whether the report contains issues that block the close
pub fn has_blocking_errors(report: &ValidationReport) -> bool {
    report.errors().next().is_some()
}

/// Pre-flight check; never modifies state
pub async fn validate_period_can_close(
    repos: &Repositories,
    rules: &BusinessRules,
    request: &ValidateCloseRequest,
) -> Result<ValidationReport, ClosingError> {
    let (report, _) = assess(repos, rules, request).await?;
    Ok(report)
}

fn blocking_error(request: &ClosePeriodRequest, report: &ValidationReport) -> Option<ClosingError> {
    let errors: Vec<_> = report.errors().collect();
    let first = errors.first()?;
    Some(match first.code.as_str() {
        PERIOD_ALREADY_CLOSED => ClosingError::AlreadyClosed(first.message.clone()),
        FISCAL_YEAR_NOT_FOUND => ClosingError::FiscalYearNotFound(request.year),
        _ => ClosingError::PeriodNotReady(
            errors
                .iter()
                .map(|i| i.message.as_str())
                .collect::<Vec<_>>()
                .join("; "),
        ),
    })
}

/// Close a monthly (`month = Some`) or annual (`month = None`) period
///
/// Steps:
/// 1. Validate (already closed, drafts, open months, fiscal year)
/// 2. Annual only: generate the regularization entry, then the closing
///    entry when `generate_closing_entry` is set
/// 3. Hash the sealed totals
/// 4. Commit everything atomically; a concurrent closer makes this fail
///    with `AlreadyClosed` and nothing is written
pub async fn close_period(
    repos: &Repositories,
    rules: &BusinessRules,
    request: &ClosePeriodRequest,
) -> Result<ClosePeriodResponse, ClosingError> {
    let centro = request.centro_code.as_str();
    let label = period_label(request.year, request.month);

    let (report, scope) = assess(repos, rules, &request.validate_request()).await?;
    if let Some(err) = blocking_error(request, &report) {
        tracing::warn!(centro_code = %centro, period = %label, error = %err, "Period close rejected");
        return Err(err);
    }
    let scope = scope.ok_or_else(|| ClosingError::PeriodNotReady(label.clone()))?;

    let effective: Vec<&EntryWithLines> = scope.entries.iter().filter(|e| is_effective(e)).collect();
    let mut warnings: Vec<String> = report.warnings().map(|w| w.message.clone()).collect();

    let period_type = if request.month.is_some() { PeriodType::Monthly } else { PeriodType::Annual };
    let mut regularization: Option<EntryWithLines> = None;
    let mut closing: Option<EntryWithLines> = None;

    if period_type == PeriodType::Annual {
        let rows = accumulate(effective.iter().flat_map(|e| e.lines.iter()));
        let types = account_types(repos, centro, &rows).await?;

        let lines = regularization_lines(&rows, &types, &rules.result_account_code);
        if lines.is_empty() {
            warnings.push("No hay saldos de ingresos y gastos que regularizar".to_string());
        } else {
            let entry_request = CreateEntryRequest {
                centro_code: request.centro_code.clone(),
                entry_date: scope.to,
                description: format!("Regularización del ejercicio {}", request.year),
                lines,
                created_by: request.closed_by.clone(),
            };
            regularization = Some(prepare_closing_entry(repos, &entry_request).await?);
        }

        if rules.generate_closing_entry {
            let rows_after = accumulate(
                effective
                    .iter()
                    .flat_map(|e| e.lines.iter())
                    .chain(regularization.iter().flat_map(|e| e.lines.iter())),
            );
            let types_after = account_types(repos, centro, &rows_after).await?;
            let lines = closing_lines(&rows_after, &types_after);
            if !lines.is_empty() {
                let entry_request = CreateEntryRequest {
                    centro_code: request.centro_code.clone(),
                    entry_date: scope.to,
                    description: format!("Asiento de cierre del ejercicio {}", request.year),
                    lines,
                    created_by: request.closed_by.clone(),
                };
                closing = Some(prepare_closing_entry(repos, &entry_request).await?);
            }
        }
    }

    let generated: Vec<EntryWithLines> = regularization.iter().chain(closing.iter()).cloned().collect();

    let (mut debits, mut credits) = (Decimal::ZERO, Decimal::ZERO);
    for line in effective
        .iter()
        .flat_map(|e| e.lines.iter())
        .chain(generated.iter().flat_map(|e| e.lines.iter()))
    {
        match line.movement_type {
            MovementType::Debit => debits += line.amount,
            MovementType::Credit => credits += line.amount,
        }
    }
    let close_hash = compute_close_hash(
        centro,
        &label,
        effective.len() + generated.len(),
        to_minor(debits)?,
        to_minor(credits)?,
    );

    let period = ClosingPeriod {
        id: scope.existing.as_ref().map(|p| p.id).unwrap_or_else(Uuid::new_v4),
        centro_code: request.centro_code.clone(),
        period_type,
        period_year: request.year,
        period_month: request.month,
        status: PeriodStatus::Closed,
        closing_entry_id: closing.as_ref().map(|e| e.entry.id),
        regularization_entry_id: regularization.as_ref().map(|e| e.entry.id),
        closed_by: Some(request.closed_by.clone()),
        closed_at: Some(Utc::now()),
        close_hash: Some(close_hash),
        notes: request.notes.clone(),
    };

    let commit = ClosingCommit {
        period: period.clone(),
        generated_entries: generated,
        sealed_from: scope.from,
        sealed_to: scope.to,
        excluded_entry_ids: request.excluded_entry_ids.clone(),
        fiscal_year_id: scope.fiscal_year.as_ref().map(|fy| fy.id),
    };

    repos
        .periods
        .commit_closing(&commit)
        .await
        .map_err(|e| match e {
            RepoError::AlreadyClosed(m) => ClosingError::AlreadyClosed(m),
            RepoError::Conflict(m) => ClosingError::PeriodNotReady(m),
            other => ClosingError::Repository(other),
        })
        .inspect_err(|e| {
            tracing::warn!(centro_code = %centro, period = %label, error = %e, "Period close commit failed");
        })?;

    let entries_sealed = effective
        .iter()
        .filter(|e| e.entry.status == EntryStatus::Posted)
        .count();

    tracing::info!(
        centro_code = %centro,
        period = %label,
        entries_sealed,
        regularization_entry_id = ?period.regularization_entry_id,
        closing_entry_id = ?period.closing_entry_id,
        closed_by = %request.closed_by,
        "Period closed"
    );

    Ok(ClosePeriodResponse {
        period,
        entries_sealed,
        regularization_entry: regularization.as_ref().map(EntryResponse::from),
        closing_entry: closing.as_ref().map(EntryResponse::from),
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn row(code: &str, debit: &str, credit: &str) -> TrialBalanceRow {
        TrialBalanceRow {
            account_code: code.to_string(),
            debit: d(debit),
            credit: d(credit),
            net: d(debit) - d(credit),
        }
    }

    fn types() -> HashMap<String, AccountType> {
        [
            ("1290000", AccountType::Equity),
            ("4000000", AccountType::Liability),
            ("5720000", AccountType::Asset),
            ("6000000", AccountType::Expense),
            ("7000000", AccountType::Revenue),
        ]
        .into_iter()
        .map(|(c, t)| (c.to_string(), t))
        .collect()
    }

    #[test]
    fn test_compute_close_hash_deterministic() {
        let a = compute_close_hash("C001", "2024-11", 12, 150000, 150000);
        let b = compute_close_hash("C001", "2024-11", 12, 150000, 150000);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_compute_close_hash_different_inputs() {
        let a = compute_close_hash("C001", "2024-11", 12, 150000, 150000);
        assert_ne!(a, compute_close_hash("C002", "2024-11", 12, 150000, 150000));
        assert_ne!(a, compute_close_hash("C001", "2024-12", 12, 150000, 150000));
        assert_ne!(a, compute_close_hash("C001", "2024-11", 13, 150000, 150000));
    }

    #[test]
    fn test_month_bounds() {
        let (from, to) = month_bounds(2024, 2).unwrap();
        assert_eq!(from, NaiveDate::from_ymd_opt(2024, 2, 1).unwrap());
        assert_eq!(to, NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
        let (_, dec_end) = month_bounds(2024, 12).unwrap();
        assert_eq!(dec_end, NaiveDate::from_ymd_opt(2024, 12, 31).unwrap());
        assert!(month_bounds(2024, 13).is_none());
    }

    #[test]
    fn test_months_between_spans_years() {
        let months = months_between(
            NaiveDate::from_ymd_opt(2024, 7, 1).unwrap(),
            NaiveDate::from_ymd_opt(2025, 6, 30).unwrap(),
        );
        assert_eq!(months.len(), 12);
        assert_eq!(months[0], (2024, 7));
        assert_eq!(months[11], (2025, 6));
    }

    #[test]
    fn test_period_label() {
        assert_eq!(period_label(2024, Some(3)), "2024-03");
        assert_eq!(period_label(2024, None), "2024");
    }

    #[test]
    fn test_regularization_of_profit() {
        let rows = vec![
            row("5720000", "1000.00", "400.00"),
            row("6000000", "400.00", "0"),
            row("7000000", "0", "1000.00"),
        ];
        let lines = regularization_lines(&rows, &types(), "1290000");

        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].account_code, "6000000");
        assert_eq!(lines[0].movement_type, MovementType::Credit);
        assert_eq!(lines[0].amount, d("400.00"));
        assert_eq!(lines[1].account_code, "7000000");
        assert_eq!(lines[1].movement_type, MovementType::Debit);
        assert_eq!(lines[1].amount, d("1000.00"));
        assert_eq!(lines[2].account_code, "1290000");
        assert_eq!(lines[2].movement_type, MovementType::Credit);
        assert_eq!(lines[2].amount, d("600.00"));
    }

    #[test]
    fn test_regularization_of_loss_debits_result() {
        let rows = vec![row("6000000", "700.00", "0"), row("7000000", "0", "200.00")];
        let lines = regularization_lines(&rows, &types(), "1290000");
        let result = lines.last().unwrap();
        assert_eq!(result.account_code, "1290000");
        assert_eq!(result.movement_type, MovementType::Debit);
        assert_eq!(result.amount, d("500.00"));
    }

    #[test]
    fn test_regularization_empty_without_income_statement_balances() {
        let rows = vec![row("5720000", "100.00", "0"), row("4000000", "0", "100.00")];
        assert!(regularization_lines(&rows, &types(), "1290000").is_empty());
    }

    #[test]
    fn test_closing_lines_zero_balance_sheet() {
        let rows = vec![
            row("1290000", "0", "600.00"),
            row("5720000", "1000.00", "400.00"),
            row("6000000", "400.00", "400.00"),
        ];
        let lines = closing_lines(&rows, &types());
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].account_code, "1290000");
        assert_eq!(lines[0].movement_type, MovementType::Debit);
        assert_eq!(lines[1].account_code, "5720000");
        assert_eq!(lines[1].movement_type, MovementType::Credit);
        assert_eq!(lines[1].amount, d("600.00"));
    }
}
