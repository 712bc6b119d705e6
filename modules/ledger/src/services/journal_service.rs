//! Journal entry business logic service
//!
//! Every entry admitted into the ledger is validated in full (structure,
//! accounts, balance, period) before a number is reserved or anything is
//! written.

use chrono::{Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::contracts::journal_entry_v1::{CreateEntryRequest, EntryLineInput};
use crate::money::is_balanced;
use crate::repos::journal_repo::{EntryStatus, EntryWithLines, JournalEntry, JournalLine};
use crate::repos::period_repo::PeriodStatus;
use crate::repos::{RepoError, Repositories};
use crate::validation::{entry_totals, validate_entry_input, validate_lines, ValidationError};

/// Errors that can occur during journal entry processing
#[derive(Debug, thiserror::Error)]
pub enum JournalError {
    #[error("Validación fallida: {0}")]
    Validation(#[from] ValidationError),

    #[error("Asiento descuadrado: debe {debit} / haber {credit}")]
    Unbalanced { debit: Decimal, credit: Decimal },

    #[error("Operación no permitida: {0}")]
    InvalidState(String),

    #[error("El periodo que contiene la fecha {0} está cerrado")]
    PeriodClosed(NaiveDate),

    #[error("Asiento no encontrado: {0}")]
    EntryNotFound(Uuid),

    #[error("Error de persistencia: {0}")]
    Repository(RepoError),
}

impl From<RepoError> for JournalError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::PeriodClosed(date) => JournalError::PeriodClosed(date),
            other => JournalError::Repository(other),
        }
    }
}

/// Result type for journal operations
pub type JournalResult<T> = Result<T, JournalError>;

/// Fail with `PeriodClosed` if `date` falls inside a closed period of the centro
///
/// A date is closed when its monthly period is closed, or when the fiscal
/// year containing it (or that year's annual period) is closed.
pub async fn ensure_date_open(
    repos: &Repositories,
    centro_code: &str,
    date: NaiveDate,
) -> JournalResult<()> {
    let monthly = repos
        .periods
        .get_period(centro_code, date.year(), Some(date.month()))
        .await?;
    if monthly.is_some_and(|p| p.is_closed()) {
        return Err(JournalError::PeriodClosed(date));
    }

    if let Some(fy) = repos.periods.fiscal_year_for_date(centro_code, date).await? {
        if fy.status == PeriodStatus::Closed {
            return Err(JournalError::PeriodClosed(date));
        }
        let annual = repos.periods.get_period(centro_code, fy.year, None).await?;
        if annual.is_some_and(|p| p.is_closed()) {
            return Err(JournalError::PeriodClosed(date));
        }
    }

    Ok(())
}

/// Resolve every line's account; each must exist and be active
async fn ensure_accounts_active(
    repos: &Repositories,
    centro_code: &str,
    lines: &[EntryLineInput],
) -> JournalResult<()> {
    for (idx, line) in lines.iter().enumerate() {
        match repos
            .accounts
            .resolve_account(centro_code, &line.account_code)
            .await?
        {
            None => {
                return Err(ValidationError::AccountNotFound(
                    idx + 1,
                    line.account_code.clone(),
                    centro_code.to_string(),
                )
                .into())
            }
            Some(account) if !account.is_active => {
                return Err(ValidationError::AccountInactive(
                    idx + 1,
                    line.account_code.clone(),
                    centro_code.to_string(),
                )
                .into())
            }
            Some(_) => {}
        }
    }
    Ok(())
}

fn ensure_balanced(total_debit: Decimal, total_credit: Decimal) -> JournalResult<()> {
    if !is_balanced(total_debit, total_credit) {
        return Err(JournalError::Unbalanced {
            debit: total_debit,
            credit: total_credit,
        });
    }
    Ok(())
}

fn build_lines(entry_id: Uuid, lines: &[EntryLineInput]) -> Vec<JournalLine> {
    lines
        .iter()
        .enumerate()
        .map(|(idx, line)| JournalLine {
            entry_id,
            line_number: (idx + 1) as i32,
            account_code: line.account_code.trim().to_string(),
            movement_type: line.movement_type,
            amount: line.amount,
            description: line.description.clone(),
        })
        .collect()
}

/// Validate, number and assemble an entry without persisting it
///
/// Balance is enforced unless `status` is `Draft`. The entry number is
/// reserved only after every check has passed.
pub async fn prepare_entry(
    repos: &Repositories,
    request: &CreateEntryRequest,
    status: EntryStatus,
) -> JournalResult<EntryWithLines> {
    validate_entry_input(&request.centro_code, &request.description, &request.lines)?;
    ensure_date_open(repos, &request.centro_code, request.entry_date).await?;
    assemble_entry(repos, request, status).await
}

/// Prepare an entry generated by a period closing
///
/// Same checks as [`prepare_entry`] except the closed-date guard: these
/// entries are dated inside the period being sealed, whose months are
/// already closed. They are born `closed`.
pub async fn prepare_closing_entry(
    repos: &Repositories,
    request: &CreateEntryRequest,
) -> JournalResult<EntryWithLines> {
    validate_entry_input(&request.centro_code, &request.description, &request.lines)?;
    assemble_entry(repos, request, EntryStatus::Closed).await
}

async fn assemble_entry(
    repos: &Repositories,
    request: &CreateEntryRequest,
    status: EntryStatus,
) -> JournalResult<EntryWithLines> {
    let (total_debit, total_credit) = entry_totals(&request.lines);
    if status != EntryStatus::Draft {
        ensure_balanced(total_debit, total_credit)?;
    }

    ensure_accounts_active(repos, &request.centro_code, &request.lines).await?;

    let fiscal_year_id = repos
        .periods
        .fiscal_year_for_date(&request.centro_code, request.entry_date)
        .await?
        .map(|fy| fy.id);

    let entry_number = repos.ledger.next_entry_number(&request.centro_code).await?;

    let id = Uuid::new_v4();
    let now = Utc::now();
    Ok(EntryWithLines {
        entry: JournalEntry {
            id,
            entry_number,
            entry_date: request.entry_date,
            description: request.description.trim().to_string(),
            centro_code: request.centro_code.clone(),
            fiscal_year_id,
            status,
            total_debit,
            total_credit,
            created_by: request.created_by.clone(),
            created_at: now,
            updated_at: now,
        },
        lines: build_lines(id, &request.lines),
    })
}

/// Create a balanced entry directly in `posted` state
pub async fn create_entry(
    repos: &Repositories,
    request: &CreateEntryRequest,
) -> JournalResult<EntryWithLines> {
    let prepared = prepare_entry(repos, request, EntryStatus::Posted)
        .await
        .inspect_err(|e| {
            tracing::warn!(centro_code = %request.centro_code, error = %e, "Entry rejected");
        })?;

    repos.ledger.save_entry(&prepared.entry, &prepared.lines).await?;

    tracing::info!(
        entry_id = %prepared.entry.id,
        entry_number = prepared.entry.entry_number,
        centro_code = %prepared.entry.centro_code,
        total = %prepared.entry.total_debit,
        "Journal entry posted"
    );

    Ok(prepared)
}

/// Create an entry in `draft` state; balance is not required yet
pub async fn create_draft_entry(
    repos: &Repositories,
    request: &CreateEntryRequest,
) -> JournalResult<EntryWithLines> {
    let prepared = prepare_entry(repos, request, EntryStatus::Draft).await?;
    repos.ledger.save_entry(&prepared.entry, &prepared.lines).await?;

    tracing::info!(
        entry_id = %prepared.entry.id,
        entry_number = prepared.entry.entry_number,
        centro_code = %prepared.entry.centro_code,
        "Draft entry created"
    );

    Ok(prepared)
}

async fn load_draft(repos: &Repositories, entry_id: Uuid) -> JournalResult<EntryWithLines> {
    let existing = repos
        .ledger
        .find_entry(entry_id)
        .await?
        .ok_or(JournalError::EntryNotFound(entry_id))?;

    ensure_date_open(repos, &existing.entry.centro_code, existing.entry.entry_date).await?;

    if existing.entry.status != EntryStatus::Draft {
        return Err(JournalError::InvalidState(format!(
            "el asiento {} está en estado '{}' y solo se pueden modificar borradores",
            existing.entry.entry_number,
            existing.entry.status.as_str()
        )));
    }
    Ok(existing)
}

/// Replace the lines of a draft entry
pub async fn update_draft_lines(
    repos: &Repositories,
    entry_id: Uuid,
    lines: &[EntryLineInput],
) -> JournalResult<EntryWithLines> {
    let mut draft = load_draft(repos, entry_id).await?;

    validate_lines(lines)?;
    ensure_accounts_active(repos, &draft.entry.centro_code, lines).await?;

    let (total_debit, total_credit) = entry_totals(lines);
    draft.entry.total_debit = total_debit;
    draft.entry.total_credit = total_credit;
    draft.entry.updated_at = Utc::now();
    draft.lines = build_lines(entry_id, lines);

    repos.ledger.save_entry(&draft.entry, &draft.lines).await?;

    tracing::info!(
        entry_id = %entry_id,
        line_count = draft.lines.len(),
        "Draft entry lines replaced"
    );

    Ok(draft)
}

/// Move a draft to `posted`, enforcing balance
pub async fn post_draft_entry(
    repos: &Repositories,
    entry_id: Uuid,
) -> JournalResult<EntryWithLines> {
    let mut draft = load_draft(repos, entry_id).await?;

    ensure_balanced(draft.entry.total_debit, draft.entry.total_credit)?;

    draft.entry.status = EntryStatus::Posted;
    draft.entry.updated_at = Utc::now();
    repos.ledger.save_entry(&draft.entry, &draft.lines).await?;

    tracing::info!(
        entry_id = %entry_id,
        entry_number = draft.entry.entry_number,
        centro_code = %draft.entry.centro_code,
        "Draft entry posted"
    );

    Ok(draft)
}

/// Delete a draft entry. Its number is not reused.
pub async fn delete_draft_entry(repos: &Repositories, entry_id: Uuid) -> JournalResult<()> {
    let draft = load_draft(repos, entry_id).await?;

    if !repos.ledger.delete_draft_entry(entry_id).await? {
        return Err(JournalError::InvalidState(format!(
            "el asiento {} ya no es un borrador",
            draft.entry.entry_number
        )));
    }

    tracing::info!(
        entry_id = %entry_id,
        entry_number = draft.entry.entry_number,
        centro_code = %draft.entry.centro_code,
        "Draft entry deleted"
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repos::account_repo::default_chart;
    use crate::repos::InMemoryStore;
    use std::sync::Arc;

    fn d(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn repos() -> Repositories {
        Repositories::in_memory(Arc::new(InMemoryStore::with_accounts(default_chart("C001"))))
    }

    fn request(lines: Vec<EntryLineInput>) -> CreateEntryRequest {
        CreateEntryRequest {
            centro_code: "C001".to_string(),
            entry_date: NaiveDate::from_ymd_opt(2024, 3, 15).unwrap(),
            description: "Compra de género".to_string(),
            lines,
            created_by: "ana".to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_entry_posts_and_numbers() {
        let repos = repos();
        let entry = create_entry(
            &repos,
            &request(vec![
                EntryLineInput::debit("6000000", d("100.00")),
                EntryLineInput::debit("4720000", d("21.00")),
                EntryLineInput::credit("4000000", d("121.00")),
            ]),
        )
        .await
        .unwrap();

        assert_eq!(entry.entry.entry_number, 1);
        assert_eq!(entry.entry.status, EntryStatus::Posted);
        assert_eq!(entry.entry.total_debit, d("121.00"));
        assert_eq!(entry.lines.len(), 3);
        assert_eq!(entry.lines[2].line_number, 3);
    }

    #[tokio::test]
    async fn test_tolerance_of_one_cent() {
        let repos = repos();
        let ok = create_entry(
            &repos,
            &request(vec![
                EntryLineInput::debit("6000000", d("100.01")),
                EntryLineInput::credit("4000000", d("100.00")),
            ]),
        )
        .await;
        assert!(ok.is_ok());

        let err = create_entry(
            &repos,
            &request(vec![
                EntryLineInput::debit("6000000", d("100.02")),
                EntryLineInput::credit("4000000", d("100.00")),
            ]),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, JournalError::Unbalanced { .. }));
    }

    #[tokio::test]
    async fn test_unknown_and_inactive_accounts() {
        let store = Arc::new(InMemoryStore::with_accounts(default_chart("C001")));
        let mut inactive = default_chart("C001").remove(0);
        inactive.code = "1010000".to_string();
        inactive.is_active = false;
        store.insert_account(inactive).unwrap();
        let repos = Repositories::in_memory(store);

        let err = create_entry(
            &repos,
            &request(vec![
                EntryLineInput::debit("9999999", d("10.00")),
                EntryLineInput::credit("4000000", d("10.00")),
            ]),
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            JournalError::Validation(ValidationError::AccountNotFound(1, _, _))
        ));

        let err = create_entry(
            &repos,
            &request(vec![
                EntryLineInput::debit("6000000", d("10.00")),
                EntryLineInput::credit("1010000", d("10.00")),
            ]),
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            JournalError::Validation(ValidationError::AccountInactive(2, _, _))
        ));
    }

    #[tokio::test]
    async fn test_draft_lifecycle() {
        let repos = repos();
        let draft = create_draft_entry(
            &repos,
            &request(vec![EntryLineInput::debit("6000000", d("50.00"))]),
        )
        .await
        .unwrap();
        assert_eq!(draft.entry.status, EntryStatus::Draft);

        let err = post_draft_entry(&repos, draft.entry.id).await.unwrap_err();
        assert!(matches!(err, JournalError::Unbalanced { .. }));

        update_draft_lines(
            &repos,
            draft.entry.id,
            &[
                EntryLineInput::debit("6000000", d("50.00")),
                EntryLineInput::credit("5720000", d("50.00")),
            ],
        )
        .await
        .unwrap();

        let posted = post_draft_entry(&repos, draft.entry.id).await.unwrap();
        assert_eq!(posted.entry.status, EntryStatus::Posted);
        assert_eq!(posted.entry.entry_number, draft.entry.entry_number);

        let err = delete_draft_entry(&repos, draft.entry.id).await.unwrap_err();
        assert!(matches!(err, JournalError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_deleted_draft_number_is_not_reused() {
        let repos = repos();
        let lines = vec![
            EntryLineInput::debit("6000000", d("5.00")),
            EntryLineInput::credit("5700000", d("5.00")),
        ];
        let draft = create_draft_entry(&repos, &request(lines.clone())).await.unwrap();
        delete_draft_entry(&repos, draft.entry.id).await.unwrap();
        assert!(repos.ledger.find_entry(draft.entry.id).await.unwrap().is_none());

        let next = create_entry(&repos, &request(lines)).await.unwrap();
        assert_eq!(next.entry.entry_number, draft.entry.entry_number + 1);
    }

    #[tokio::test]
    async fn test_delete_missing_entry() {
        let err = delete_draft_entry(&repos(), Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, JournalError::EntryNotFound(_)));
    }
}
