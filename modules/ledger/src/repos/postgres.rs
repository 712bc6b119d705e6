//! PostgreSQL implementation of the repository traits
//!
//! Rows are read into flat `*Row` structs and converted to domain types by
//! the `*_from_row` mapping functions, which reject unknown status strings.

use async_trait::async_trait;
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use std::collections::HashMap;
use uuid::Uuid;

use super::account_repo::{Account, AccountType, ChartOfAccounts};
use super::bank_repo::{BankTransaction, BankTransactionSink, BankTransactionStatus};
use super::invoice_repo::{
    ApprovalAction, ApprovalLevel, ApprovalStatus, InvoiceApproval, InvoiceLine,
    InvoiceReceived, InvoiceRepository,
};
use super::journal_repo::{
    EntryStatus, EntryWithLines, JournalEntry, JournalLine, LedgerRepository, MovementType,
};
use super::period_repo::{
    ClosingCommit, ClosingPeriod, FiscalYear, PeriodRepository, PeriodStatus, PeriodType,
};
use super::RepoError;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// ============================================================
// Row types and mappers
// ============================================================

#[derive(Debug, Clone, FromRow)]
pub struct AccountRow {
    pub centro_code: String,
    pub code: String,
    pub name: String,
    pub account_type: String,
    pub level: i32,
    pub parent_code: Option<String>,
    pub is_active: bool,
}

#[derive(Debug, Clone, FromRow)]
pub struct JournalEntryRow {
    pub id: Uuid,
    pub entry_number: i64,
    pub entry_date: NaiveDate,
    pub description: String,
    pub centro_code: String,
    pub fiscal_year_id: Option<Uuid>,
    pub status: String,
    pub total_debit: Decimal,
    pub total_credit: Decimal,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct JournalLineRow {
    pub entry_id: Uuid,
    pub line_number: i32,
    pub account_code: String,
    pub movement_type: String,
    pub amount: Decimal,
    pub description: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
pub struct FiscalYearRow {
    pub id: Uuid,
    pub centro_code: String,
    pub year: i32,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub status: String,
    pub closing_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, FromRow)]
pub struct ClosingPeriodRow {
    pub id: Uuid,
    pub centro_code: String,
    pub period_type: String,
    pub period_year: i32,
    pub period_month: i32,
    pub status: String,
    pub closing_entry_id: Option<Uuid>,
    pub regularization_entry_id: Option<Uuid>,
    pub closed_by: Option<String>,
    pub closed_at: Option<DateTime<Utc>>,
    pub close_hash: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
pub struct InvoiceRow {
    pub id: Uuid,
    pub supplier_id: String,
    pub centro_code: String,
    pub invoice_number: String,
    pub invoice_date: NaiveDate,
    pub subtotal: Decimal,
    pub tax_total: Decimal,
    pub total: Decimal,
    pub requires_manager_approval: bool,
    pub requires_accounting_approval: bool,
    pub approval_status: String,
    pub journal_entry_id: Option<Uuid>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct InvoiceLineRow {
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
    pub account_code: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct InvoiceApprovalRow {
    pub level: String,
    pub action: String,
    pub actor_id: String,
    pub comment: Option<String>,
    pub decided_at: DateTime<Utc>,
}

fn corrupt(what: &str, value: &str) -> RepoError {
    RepoError::Corrupt(format!("unknown {} '{}'", what, value))
}

pub fn account_from_row(row: AccountRow) -> Result<Account, RepoError> {
    let account_type = AccountType::parse(&row.account_type)
        .ok_or_else(|| corrupt("account_type", &row.account_type))?;
    Ok(Account {
        centro_code: row.centro_code,
        code: row.code,
        name: row.name,
        account_type,
        level: row.level,
        parent_code: row.parent_code,
        is_active: row.is_active,
    })
}

pub fn entry_from_row(row: JournalEntryRow) -> Result<JournalEntry, RepoError> {
    let status = EntryStatus::parse(&row.status).ok_or_else(|| corrupt("entry status", &row.status))?;
    Ok(JournalEntry {
        id: row.id,
        entry_number: row.entry_number,
        entry_date: row.entry_date,
        description: row.description,
        centro_code: row.centro_code,
        fiscal_year_id: row.fiscal_year_id,
        status,
        total_debit: row.total_debit,
        total_credit: row.total_credit,
        created_by: row.created_by,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

pub fn line_from_row(row: JournalLineRow) -> Result<JournalLine, RepoError> {
    let movement_type = MovementType::parse(&row.movement_type)
        .ok_or_else(|| corrupt("movement_type", &row.movement_type))?;
    Ok(JournalLine {
        entry_id: row.entry_id,
        line_number: row.line_number,
        account_code: row.account_code,
        movement_type,
        amount: row.amount,
        description: row.description,
    })
}

pub fn fiscal_year_from_row(row: FiscalYearRow) -> Result<FiscalYear, RepoError> {
    let status = PeriodStatus::parse(&row.status).ok_or_else(|| corrupt("fiscal year status", &row.status))?;
    Ok(FiscalYear {
        id: row.id,
        centro_code: row.centro_code,
        year: row.year,
        start_date: row.start_date,
        end_date: row.end_date,
        status,
        closing_date: row.closing_date,
    })
}

/// Annual periods are stored with month `0`
pub fn month_to_column(month: Option<u32>) -> i32 {
    month.map(|m| m as i32).unwrap_or(0)
}

pub fn closing_period_from_row(row: ClosingPeriodRow) -> Result<ClosingPeriod, RepoError> {
    let period_type = PeriodType::parse(&row.period_type)
        .ok_or_else(|| corrupt("period_type", &row.period_type))?;
    let status = PeriodStatus::parse(&row.status).ok_or_else(|| corrupt("period status", &row.status))?;
    let period_month = match (period_type, row.period_month) {
        (PeriodType::Annual, 0) => None,
        (PeriodType::Monthly, m @ 1..=12) => Some(m as u32),
        (_, m) => {
            return Err(RepoError::Corrupt(format!(
                "{} period with month {}",
                period_type.as_str(),
                m
            )))
        }
    };
    Ok(ClosingPeriod {
        id: row.id,
        centro_code: row.centro_code,
        period_type,
        period_year: row.period_year,
        period_month,
        status,
        closing_entry_id: row.closing_entry_id,
        regularization_entry_id: row.regularization_entry_id,
        closed_by: row.closed_by,
        closed_at: row.closed_at,
        close_hash: row.close_hash,
        notes: row.notes,
    })
}

pub fn invoice_from_rows(
    row: InvoiceRow,
    lines: Vec<InvoiceLineRow>,
    approvals: Vec<InvoiceApprovalRow>,
) -> Result<InvoiceReceived, RepoError> {
    let approval_status = ApprovalStatus::parse(&row.approval_status)
        .ok_or_else(|| corrupt("approval_status", &row.approval_status))?;

    let approvals = approvals
        .into_iter()
        .map(|a| {
            Ok(InvoiceApproval {
                level: ApprovalLevel::parse(&a.level).ok_or_else(|| corrupt("approval level", &a.level))?,
                action: ApprovalAction::parse(&a.action)
                    .ok_or_else(|| corrupt("approval action", &a.action))?,
                actor_id: a.actor_id,
                comment: a.comment,
                decided_at: a.decided_at,
            })
        })
        .collect::<Result<Vec<_>, RepoError>>()?;

    let lines = lines
        .into_iter()
        .map(|l| InvoiceLine {
            line_number: l.line_number,
            description: l.description,
            quantity: l.quantity,
            unit_price: l.unit_price,
            discount_percentage: l.discount_percentage,
            discount_amount: l.discount_amount,
            subtotal: l.subtotal,
            tax_rate: l.tax_rate,
            tax_amount: l.tax_amount,
            total: l.total,
            account_code: l.account_code,
        })
        .collect();

    Ok(InvoiceReceived {
        id: row.id,
        supplier_id: row.supplier_id,
        centro_code: row.centro_code,
        invoice_number: row.invoice_number,
        invoice_date: row.invoice_date,
        lines,
        subtotal: row.subtotal,
        tax_total: row.tax_total,
        total: row.total,
        requires_manager_approval: row.requires_manager_approval,
        requires_accounting_approval: row.requires_accounting_approval,
        approval_status,
        approvals,
        journal_entry_id: row.journal_entry_id,
        created_by: row.created_by,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

// ============================================================
// Shared transactional writes
// ============================================================

const ENTRY_COLUMNS: &str = "id, entry_number, entry_date, description, centro_code, fiscal_year_id, \
     status, total_debit, total_credit, created_by, created_at, updated_at";

/// Closings hold the centro's lock exclusively, entry writes hold it shared,
/// so a write either commits before a closing starts or sees its result.
async fn lock_centro_tx(
    tx: &mut Transaction<'_, Postgres>,
    centro_code: &str,
    exclusive: bool,
) -> Result<(), RepoError> {
    let sql = if exclusive {
        "SELECT pg_advisory_xact_lock(hashtext('ledger-closing:' || $1))"
    } else {
        "SELECT pg_advisory_xact_lock_shared(hashtext('ledger-closing:' || $1))"
    };
    sqlx::query(sql).bind(centro_code).execute(&mut **tx).await?;
    Ok(())
}

/// Fail with `PeriodClosed` when a committed closing covers `date`
async fn ensure_date_open_tx(
    tx: &mut Transaction<'_, Postgres>,
    centro_code: &str,
    date: NaiveDate,
) -> Result<(), RepoError> {
    lock_centro_tx(tx, centro_code, false).await?;

    let sealed = sqlx::query_scalar::<_, bool>(
        r#"
        SELECT EXISTS (
            SELECT 1 FROM closing_periods
            WHERE centro_code = $1
              AND period_type = 'monthly'
              AND period_year = $2
              AND period_month = $3
              AND status = 'closed'
        ) OR EXISTS (
            SELECT 1 FROM fiscal_years fy
            WHERE fy.centro_code = $1
              AND $4 BETWEEN fy.start_date AND fy.end_date
              AND (fy.status = 'closed' OR EXISTS (
                  SELECT 1 FROM closing_periods cp
                  WHERE cp.centro_code = $1
                    AND cp.period_type = 'annual'
                    AND cp.period_year = fy.year
                    AND cp.status = 'closed'
              ))
        )
        "#,
    )
    .bind(centro_code)
    .bind(date.year())
    .bind(date.month() as i32)
    .bind(date)
    .fetch_one(&mut **tx)
    .await?;

    if sealed {
        return Err(RepoError::PeriodClosed(date));
    }
    Ok(())
}

async fn upsert_entry_tx(
    tx: &mut Transaction<'_, Postgres>,
    entry: &JournalEntry,
    lines: &[JournalLine],
) -> Result<(), RepoError> {
    sqlx::query(
        r#"
        INSERT INTO journal_entries
            (id, entry_number, entry_date, description, centro_code, fiscal_year_id,
             status, total_debit, total_credit, created_by, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        ON CONFLICT (id) DO UPDATE SET
            entry_date = EXCLUDED.entry_date,
            description = EXCLUDED.description,
            fiscal_year_id = EXCLUDED.fiscal_year_id,
            status = EXCLUDED.status,
            total_debit = EXCLUDED.total_debit,
            total_credit = EXCLUDED.total_credit,
            updated_at = EXCLUDED.updated_at
        "#,
    )
    .bind(entry.id)
    .bind(entry.entry_number)
    .bind(entry.entry_date)
    .bind(&entry.description)
    .bind(&entry.centro_code)
    .bind(entry.fiscal_year_id)
    .bind(entry.status.as_str())
    .bind(entry.total_debit)
    .bind(entry.total_credit)
    .bind(&entry.created_by)
    .bind(entry.created_at)
    .bind(entry.updated_at)
    .execute(&mut **tx)
    .await?;

    sqlx::query("DELETE FROM journal_lines WHERE entry_id = $1")
        .bind(entry.id)
        .execute(&mut **tx)
        .await?;

    for line in lines {
        sqlx::query(
            r#"
            INSERT INTO journal_lines
                (entry_id, line_number, account_code, movement_type, amount, description)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(entry.id)
        .bind(line.line_number)
        .bind(&line.account_code)
        .bind(line.movement_type.as_str())
        .bind(line.amount)
        .bind(&line.description)
        .execute(&mut **tx)
        .await?;
    }

    Ok(())
}

// ============================================================
// Trait implementations
// ============================================================

#[async_trait]
impl ChartOfAccounts for PgStore {
    async fn resolve_account(
        &self,
        centro_code: &str,
        code: &str,
    ) -> Result<Option<Account>, RepoError> {
        let row = sqlx::query_as::<_, AccountRow>(
            r#"
            SELECT centro_code, code, name, account_type, level, parent_code, is_active
            FROM accounts
            WHERE centro_code = $1 AND code = $2
            "#,
        )
        .bind(centro_code)
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;

        row.map(account_from_row).transpose()
    }
}

#[async_trait]
impl LedgerRepository for PgStore {
    async fn next_entry_number(&self, centro_code: &str) -> Result<i64, RepoError> {
        // Single-statement increment: concurrent callers serialize on the row lock
        let number = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO entry_sequences (centro_code, last_number)
            VALUES ($1, 1)
            ON CONFLICT (centro_code)
            DO UPDATE SET last_number = entry_sequences.last_number + 1
            RETURNING last_number
            "#,
        )
        .bind(centro_code)
        .fetch_one(&self.pool)
        .await?;

        Ok(number)
    }

    async fn save_entry(
        &self,
        entry: &JournalEntry,
        lines: &[JournalLine],
    ) -> Result<Uuid, RepoError> {
        let mut tx = self.pool.begin().await?;
        if entry.status != EntryStatus::Closed {
            ensure_date_open_tx(&mut tx, &entry.centro_code, entry.entry_date).await?;
        }
        upsert_entry_tx(&mut tx, entry, lines).await?;
        tx.commit().await?;
        Ok(entry.id)
    }

    async fn find_entry(&self, entry_id: Uuid) -> Result<Option<EntryWithLines>, RepoError> {
        let row = sqlx::query_as::<_, JournalEntryRow>(&format!(
            "SELECT {} FROM journal_entries WHERE id = $1",
            ENTRY_COLUMNS
        ))
        .bind(entry_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let lines = sqlx::query_as::<_, JournalLineRow>(
            r#"
            SELECT entry_id, line_number, account_code, movement_type, amount, description
            FROM journal_lines
            WHERE entry_id = $1
            ORDER BY line_number
            "#,
        )
        .bind(entry_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(line_from_row)
        .collect::<Result<Vec<_>, _>>()?;

        Ok(Some(EntryWithLines {
            entry: entry_from_row(row)?,
            lines,
        }))
    }

    async fn delete_draft_entry(&self, entry_id: Uuid) -> Result<bool, RepoError> {
        let mut tx = self.pool.begin().await?;
        let draft = sqlx::query_as::<_, (String, NaiveDate)>(
            "SELECT centro_code, entry_date FROM journal_entries WHERE id = $1 AND status = 'draft'",
        )
        .bind(entry_id)
        .fetch_optional(&mut *tx)
        .await?;
        let Some((centro_code, entry_date)) = draft else {
            return Ok(false);
        };
        ensure_date_open_tx(&mut tx, &centro_code, entry_date).await?;

        let result = sqlx::query("DELETE FROM journal_entries WHERE id = $1 AND status = 'draft'")
            .bind(entry_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(result.rows_affected() == 1)
    }

    async fn entries_in_period(
        &self,
        centro_code: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<EntryWithLines>, RepoError> {
        let rows = sqlx::query_as::<_, JournalEntryRow>(&format!(
            "SELECT {} FROM journal_entries \
             WHERE centro_code = $1 AND entry_date >= $2 AND entry_date <= $3 \
             ORDER BY entry_date, entry_number",
            ENTRY_COLUMNS
        ))
        .bind(centro_code)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let mut lines_by_entry: HashMap<Uuid, Vec<JournalLine>> = HashMap::new();
        let line_rows = sqlx::query_as::<_, JournalLineRow>(
            r#"
            SELECT entry_id, line_number, account_code, movement_type, amount, description
            FROM journal_lines
            WHERE entry_id = ANY($1)
            ORDER BY entry_id, line_number
            "#,
        )
        .bind(ids.as_slice())
        .fetch_all(&self.pool)
        .await?;
        for row in line_rows {
            let line = line_from_row(row)?;
            lines_by_entry.entry(line.entry_id).or_default().push(line);
        }

        rows.into_iter()
            .map(|row| {
                let lines = lines_by_entry.remove(&row.id).unwrap_or_default();
                Ok(EntryWithLines {
                    entry: entry_from_row(row)?,
                    lines,
                })
            })
            .collect()
    }
}

const PERIOD_COLUMNS: &str = "id, centro_code, period_type, period_year, period_month, status, \
     closing_entry_id, regularization_entry_id, closed_by, closed_at, close_hash, notes";

#[async_trait]
impl PeriodRepository for PgStore {
    async fn get_period(
        &self,
        centro_code: &str,
        year: i32,
        month: Option<u32>,
    ) -> Result<Option<ClosingPeriod>, RepoError> {
        let period_type = if month.is_some() { PeriodType::Monthly } else { PeriodType::Annual };
        let row = sqlx::query_as::<_, ClosingPeriodRow>(&format!(
            "SELECT {} FROM closing_periods \
             WHERE centro_code = $1 AND period_type = $2 AND period_year = $3 AND period_month = $4",
            PERIOD_COLUMNS
        ))
        .bind(centro_code)
        .bind(period_type.as_str())
        .bind(year)
        .bind(month_to_column(month))
        .fetch_optional(&self.pool)
        .await?;

        row.map(closing_period_from_row).transpose()
    }

    async fn get_fiscal_year(
        &self,
        centro_code: &str,
        year: i32,
    ) -> Result<Option<FiscalYear>, RepoError> {
        let row = sqlx::query_as::<_, FiscalYearRow>(
            r#"
            SELECT id, centro_code, year, start_date, end_date, status, closing_date
            FROM fiscal_years
            WHERE centro_code = $1 AND year = $2
            "#,
        )
        .bind(centro_code)
        .bind(year)
        .fetch_optional(&self.pool)
        .await?;

        row.map(fiscal_year_from_row).transpose()
    }

    async fn list_fiscal_years(&self, centro_code: &str) -> Result<Vec<FiscalYear>, RepoError> {
        sqlx::query_as::<_, FiscalYearRow>(
            r#"
            SELECT id, centro_code, year, start_date, end_date, status, closing_date
            FROM fiscal_years
            WHERE centro_code = $1
            ORDER BY start_date
            "#,
        )
        .bind(centro_code)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(fiscal_year_from_row)
        .collect()
    }

    async fn save_fiscal_year(&self, fiscal_year: &FiscalYear) -> Result<(), RepoError> {
        let result = sqlx::query(
            r#"
            INSERT INTO fiscal_years (id, centro_code, year, start_date, end_date, status, closing_date)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO UPDATE SET
                start_date = EXCLUDED.start_date,
                end_date = EXCLUDED.end_date,
                status = EXCLUDED.status,
                closing_date = EXCLUDED.closing_date
            "#,
        )
        .bind(fiscal_year.id)
        .bind(&fiscal_year.centro_code)
        .bind(fiscal_year.year)
        .bind(fiscal_year.start_date)
        .bind(fiscal_year.end_date)
        .bind(fiscal_year.status.as_str())
        .bind(fiscal_year.closing_date)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(RepoError::Conflict(format!(
                    "fiscal year {} already exists for centro {}",
                    fiscal_year.year, fiscal_year.centro_code
                )))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn commit_closing(&self, commit: &ClosingCommit) -> Result<(), RepoError> {
        let period = &commit.period;
        let mut tx = self.pool.begin().await?;
        lock_centro_tx(&mut tx, &period.centro_code, true).await?;

        let stray_drafts = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)
            FROM journal_entries
            WHERE centro_code = $1
              AND entry_date >= $2
              AND entry_date <= $3
              AND status = 'draft'
              AND NOT (id = ANY($4))
            "#,
        )
        .bind(&period.centro_code)
        .bind(commit.sealed_from)
        .bind(commit.sealed_to)
        .bind(commit.excluded_entry_ids.as_slice())
        .fetch_one(&mut *tx)
        .await?;
        if stray_drafts > 0 {
            tx.rollback().await?;
            return Err(RepoError::Conflict(
                "draft entry created in the period while closing".to_string(),
            ));
        }

        for generated in &commit.generated_entries {
            upsert_entry_tx(&mut tx, &generated.entry, &generated.lines).await?;
        }

        // Claim the period: only an open (or missing) row may transition to closed
        let claimed = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO closing_periods
                (id, centro_code, period_type, period_year, period_month, status,
                 closing_entry_id, regularization_entry_id, closed_by, closed_at, close_hash, notes)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (centro_code, period_type, period_year, period_month)
            DO UPDATE SET
                status = EXCLUDED.status,
                closing_entry_id = EXCLUDED.closing_entry_id,
                regularization_entry_id = EXCLUDED.regularization_entry_id,
                closed_by = EXCLUDED.closed_by,
                closed_at = EXCLUDED.closed_at,
                close_hash = EXCLUDED.close_hash,
                notes = EXCLUDED.notes
            WHERE closing_periods.status = 'open'
            RETURNING id
            "#,
        )
        .bind(period.id)
        .bind(&period.centro_code)
        .bind(period.period_type.as_str())
        .bind(period.period_year)
        .bind(month_to_column(period.period_month))
        .bind(period.status.as_str())
        .bind(period.closing_entry_id)
        .bind(period.regularization_entry_id)
        .bind(&period.closed_by)
        .bind(period.closed_at)
        .bind(&period.close_hash)
        .bind(&period.notes)
        .fetch_optional(&mut *tx)
        .await?;

        if claimed.is_none() {
            tx.rollback().await?;
            return Err(RepoError::AlreadyClosed(format!(
                "{} {} {:?}",
                period.centro_code, period.period_year, period.period_month
            )));
        }

        sqlx::query(
            r#"
            UPDATE journal_entries
            SET status = 'closed', updated_at = NOW()
            WHERE centro_code = $1
              AND entry_date >= $2
              AND entry_date <= $3
              AND status = 'posted'
            "#,
        )
        .bind(&period.centro_code)
        .bind(commit.sealed_from)
        .bind(commit.sealed_to)
        .execute(&mut *tx)
        .await?;

        if let Some(fy_id) = commit.fiscal_year_id {
            let updated = sqlx::query(
                r#"
                UPDATE fiscal_years
                SET status = 'closed', closing_date = CURRENT_DATE
                WHERE id = $1 AND status = 'open'
                "#,
            )
            .bind(fy_id)
            .execute(&mut *tx)
            .await?;
            if updated.rows_affected() != 1 {
                tx.rollback().await?;
                return Err(RepoError::AlreadyClosed(format!("fiscal year {}", fy_id)));
            }
        }

        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl InvoiceRepository for PgStore {
    async fn save_invoice(&self, invoice: &InvoiceReceived) -> Result<Uuid, RepoError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO invoices_received
                (id, supplier_id, centro_code, invoice_number, invoice_date, subtotal, tax_total,
                 total, requires_manager_approval, requires_accounting_approval, approval_status,
                 journal_entry_id, created_by, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            ON CONFLICT (id) DO UPDATE SET
                approval_status = EXCLUDED.approval_status,
                journal_entry_id = COALESCE(invoices_received.journal_entry_id, EXCLUDED.journal_entry_id),
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(invoice.id)
        .bind(&invoice.supplier_id)
        .bind(&invoice.centro_code)
        .bind(&invoice.invoice_number)
        .bind(invoice.invoice_date)
        .bind(invoice.subtotal)
        .bind(invoice.tax_total)
        .bind(invoice.total)
        .bind(invoice.requires_manager_approval)
        .bind(invoice.requires_accounting_approval)
        .bind(invoice.approval_status.as_str())
        .bind(invoice.journal_entry_id)
        .bind(&invoice.created_by)
        .bind(invoice.created_at)
        .bind(invoice.updated_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM invoice_lines WHERE invoice_id = $1")
            .bind(invoice.id)
            .execute(&mut *tx)
            .await?;
        for line in &invoice.lines {
            sqlx::query(
                r#"
                INSERT INTO invoice_lines
                    (invoice_id, line_number, description, quantity, unit_price,
                     discount_percentage, discount_amount, subtotal, tax_rate, tax_amount,
                     total, account_code)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
                "#,
            )
            .bind(invoice.id)
            .bind(line.line_number)
            .bind(&line.description)
            .bind(line.quantity)
            .bind(line.unit_price)
            .bind(line.discount_percentage)
            .bind(line.discount_amount)
            .bind(line.subtotal)
            .bind(line.tax_rate)
            .bind(line.tax_amount)
            .bind(line.total)
            .bind(&line.account_code)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query("DELETE FROM invoice_approvals WHERE invoice_id = $1")
            .bind(invoice.id)
            .execute(&mut *tx)
            .await?;
        for (seq, approval) in invoice.approvals.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO invoice_approvals
                    (invoice_id, seq, level, action, actor_id, comment, decided_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(invoice.id)
            .bind(seq as i32)
            .bind(approval.level.as_str())
            .bind(approval.action.as_str())
            .bind(&approval.actor_id)
            .bind(&approval.comment)
            .bind(approval.decided_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(invoice.id)
    }

    async fn post_invoice_entry(
        &self,
        invoice_id: Uuid,
        posted: &EntryWithLines,
    ) -> Result<bool, RepoError> {
        let mut tx = self.pool.begin().await?;
        ensure_date_open_tx(&mut tx, &posted.entry.centro_code, posted.entry.entry_date).await?;
        upsert_entry_tx(&mut tx, &posted.entry, &posted.lines).await?;

        let linked = sqlx::query(
            r#"
            UPDATE invoices_received
            SET journal_entry_id = $2, updated_at = NOW()
            WHERE id = $1 AND approval_status = 'approved' AND journal_entry_id IS NULL
            "#,
        )
        .bind(invoice_id)
        .bind(posted.entry.id)
        .execute(&mut *tx)
        .await?;

        if linked.rows_affected() != 1 {
            tx.rollback().await?;
            return Ok(false);
        }
        tx.commit().await?;
        Ok(true)
    }

    async fn find_invoice(&self, invoice_id: Uuid) -> Result<Option<InvoiceReceived>, RepoError> {
        let row = sqlx::query_as::<_, InvoiceRow>(
            r#"
            SELECT id, supplier_id, centro_code, invoice_number, invoice_date, subtotal, tax_total,
                   total, requires_manager_approval, requires_accounting_approval, approval_status,
                   journal_entry_id, created_by, created_at, updated_at
            FROM invoices_received
            WHERE id = $1
            "#,
        )
        .bind(invoice_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let lines = sqlx::query_as::<_, InvoiceLineRow>(
            r#"
            SELECT line_number, description, quantity, unit_price, discount_percentage,
                   discount_amount, subtotal, tax_rate, tax_amount, total, account_code
            FROM invoice_lines
            WHERE invoice_id = $1
            ORDER BY line_number
            "#,
        )
        .bind(invoice_id)
        .fetch_all(&self.pool)
        .await?;

        let approvals = sqlx::query_as::<_, InvoiceApprovalRow>(
            r#"
            SELECT level, action, actor_id, comment, decided_at
            FROM invoice_approvals
            WHERE invoice_id = $1
            ORDER BY seq
            "#,
        )
        .bind(invoice_id)
        .fetch_all(&self.pool)
        .await?;

        invoice_from_rows(row, lines, approvals).map(Some)
    }
}

#[async_trait]
impl BankTransactionSink for PgStore {
    async fn save_transactions(&self, transactions: &[BankTransaction]) -> Result<usize, RepoError> {
        let mut tx = self.pool.begin().await?;
        for t in transactions {
            sqlx::query(
                r#"
                INSERT INTO bank_transactions
                    (id, bank_account_id, centro_code, transaction_date, value_date,
                     description, reference, amount, status, import_batch_id)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                "#,
            )
            .bind(t.id)
            .bind(&t.bank_account_id)
            .bind(&t.centro_code)
            .bind(t.transaction_date)
            .bind(t.value_date)
            .bind(&t.description)
            .bind(&t.reference)
            .bind(t.amount)
            .bind(t.status.as_str())
            .bind(t.import_batch_id)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(transactions.len())
    }
}

/// Map a stored bank transaction status
pub fn bank_status_from_column(status: &str) -> Result<BankTransactionStatus, RepoError> {
    BankTransactionStatus::parse(status).ok_or_else(|| corrupt("bank transaction status", status))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn period_row(period_type: &str, month: i32) -> ClosingPeriodRow {
        ClosingPeriodRow {
            id: Uuid::new_v4(),
            centro_code: "C001".to_string(),
            period_type: period_type.to_string(),
            period_year: 2024,
            period_month: month,
            status: "closed".to_string(),
            closing_entry_id: None,
            regularization_entry_id: None,
            closed_by: Some("ana".to_string()),
            closed_at: Some(Utc::now()),
            close_hash: None,
            notes: None,
        }
    }

    #[test]
    fn test_annual_period_maps_month_zero_to_none() {
        let period = closing_period_from_row(period_row("annual", 0)).unwrap();
        assert_eq!(period.period_type, PeriodType::Annual);
        assert_eq!(period.period_month, None);
        assert_eq!(month_to_column(period.period_month), 0);
    }

    #[test]
    fn test_monthly_period_keeps_month() {
        let period = closing_period_from_row(period_row("monthly", 11)).unwrap();
        assert_eq!(period.period_month, Some(11));
        assert!(period.is_closed());
    }

    #[test]
    fn test_inconsistent_period_row_is_rejected() {
        assert!(matches!(
            closing_period_from_row(period_row("monthly", 0)),
            Err(RepoError::Corrupt(_))
        ));
        assert!(matches!(
            closing_period_from_row(period_row("annual", 3)),
            Err(RepoError::Corrupt(_))
        ));
    }

    #[test]
    fn test_entry_row_with_unknown_status_is_rejected() {
        let row = JournalEntryRow {
            id: Uuid::new_v4(),
            entry_number: 7,
            entry_date: NaiveDate::from_ymd_opt(2024, 5, 2).unwrap(),
            description: "Compra".to_string(),
            centro_code: "C001".to_string(),
            fiscal_year_id: None,
            status: "archived".to_string(),
            total_debit: Decimal::new(100, 0),
            total_credit: Decimal::new(100, 0),
            created_by: "ana".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(matches!(entry_from_row(row), Err(RepoError::Corrupt(_))));
    }

    #[test]
    fn test_line_row_maps_movement_type() {
        let line = line_from_row(JournalLineRow {
            entry_id: Uuid::new_v4(),
            line_number: 1,
            account_code: "6000000".to_string(),
            movement_type: "debit".to_string(),
            amount: Decimal::new(1210, 1),
            description: None,
        })
        .unwrap();
        assert_eq!(line.movement_type, MovementType::Debit);
    }

    #[test]
    fn test_invoice_rows_map_approval_history() {
        let now = Utc::now();
        let row = InvoiceRow {
            id: Uuid::new_v4(),
            supplier_id: "sup-1".to_string(),
            centro_code: "C001".to_string(),
            invoice_number: "F-1".to_string(),
            invoice_date: NaiveDate::from_ymd_opt(2024, 5, 2).unwrap(),
            subtotal: Decimal::new(100, 0),
            tax_total: Decimal::new(21, 0),
            total: Decimal::new(121, 0),
            requires_manager_approval: false,
            requires_accounting_approval: true,
            approval_status: "approved".to_string(),
            journal_entry_id: None,
            created_by: "ana".to_string(),
            created_at: now,
            updated_at: now,
        };
        let approvals = vec![InvoiceApprovalRow {
            level: "accounting".to_string(),
            action: "approved".to_string(),
            actor_id: "luis".to_string(),
            comment: None,
            decided_at: now,
        }];
        let invoice = invoice_from_rows(row, vec![], approvals).unwrap();
        assert_eq!(invoice.approval_status, ApprovalStatus::Approved);
        assert_eq!(invoice.approvals[0].level, ApprovalLevel::Accounting);
    }

    #[test]
    fn test_bank_status_column() {
        assert_eq!(
            bank_status_from_column("pending").unwrap(),
            BankTransactionStatus::Pending
        );
        assert!(bank_status_from_column("PENDING").is_err());
    }

    #[test]
    fn test_account_row_mapping() {
        let account = account_from_row(AccountRow {
            centro_code: "C001".to_string(),
            code: "7000000".to_string(),
            name: "Ventas".to_string(),
            account_type: "revenue".to_string(),
            level: 7,
            parent_code: Some("700".to_string()),
            is_active: true,
        })
        .unwrap();
        assert_eq!(account.account_type, AccountType::Revenue);
    }
}
