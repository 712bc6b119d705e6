//! In-memory implementation of every repository trait
//!
//! One mutex guards the whole state, so each trait call (including
//! `commit_closing`) is a single critical section.

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use super::account_repo::{Account, ChartOfAccounts};
use super::bank_repo::{BankTransaction, BankTransactionSink};
use super::invoice_repo::{ApprovalStatus, InvoiceReceived, InvoiceRepository};
use super::journal_repo::{EntryStatus, EntryWithLines, JournalEntry, JournalLine, LedgerRepository};
use super::period_repo::{ClosingCommit, ClosingPeriod, FiscalYear, PeriodRepository, PeriodStatus};
use super::RepoError;

type PeriodKey = (String, i32, Option<u32>);

#[derive(Default)]
struct StoreState {
    accounts: HashMap<(String, String), Account>,
    entry_counters: HashMap<String, i64>,
    entries: HashMap<Uuid, EntryWithLines>,
    fiscal_years: HashMap<Uuid, FiscalYear>,
    periods: HashMap<PeriodKey, ClosingPeriod>,
    invoices: HashMap<Uuid, InvoiceReceived>,
    bank_transactions: Vec<BankTransaction>,
}

#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<StoreState>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store seeded with a chart of accounts
    pub fn with_accounts(accounts: impl IntoIterator<Item = Account>) -> Self {
        let store = Self::new();
        if let Ok(mut state) = store.state.lock() {
            for account in accounts {
                state
                    .accounts
                    .insert((account.centro_code.clone(), account.code.clone()), account);
            }
        }
        store
    }

    pub fn insert_account(&self, account: Account) -> Result<(), RepoError> {
        let mut state = self.lock()?;
        state
            .accounts
            .insert((account.centro_code.clone(), account.code.clone()), account);
        Ok(())
    }

    /// Snapshot of every bank transaction received so far
    pub fn bank_transactions(&self) -> Result<Vec<BankTransaction>, RepoError> {
        Ok(self.lock()?.bank_transactions.clone())
    }

    fn lock(&self) -> Result<MutexGuard<'_, StoreState>, RepoError> {
        self.state.lock().map_err(|_| RepoError::Poisoned)
    }
}

fn period_key(centro_code: &str, year: i32, month: Option<u32>) -> PeriodKey {
    (centro_code.to_string(), year, month)
}

/// True when a committed closing covers `date` for the centro
fn date_is_sealed(state: &StoreState, centro_code: &str, date: NaiveDate) -> bool {
    let closed = |key: PeriodKey| state.periods.get(&key).is_some_and(|p| p.is_closed());
    if closed(period_key(centro_code, date.year(), Some(date.month()))) {
        return true;
    }
    state
        .fiscal_years
        .values()
        .filter(|fy| fy.centro_code == centro_code && fy.contains_date(date))
        .any(|fy| fy.status == PeriodStatus::Closed || closed(period_key(centro_code, fy.year, None)))
}

/// Insert or replace an entry, enforcing closed periods and number uniqueness
fn write_entry(
    state: &mut StoreState,
    entry: &JournalEntry,
    lines: &[JournalLine],
) -> Result<(), RepoError> {
    if entry.status != EntryStatus::Closed
        && date_is_sealed(state, &entry.centro_code, entry.entry_date)
    {
        return Err(RepoError::PeriodClosed(entry.entry_date));
    }
    let duplicate_number = state.entries.values().any(|e| {
        e.entry.id != entry.id
            && e.entry.centro_code == entry.centro_code
            && e.entry.entry_number == entry.entry_number
    });
    if duplicate_number {
        return Err(RepoError::Conflict(format!(
            "entry number {} already used in centro {}",
            entry.entry_number, entry.centro_code
        )));
    }
    state.entries.insert(
        entry.id,
        EntryWithLines {
            entry: entry.clone(),
            lines: sorted_lines(lines),
        },
    );
    Ok(())
}

fn sorted_lines(lines: &[JournalLine]) -> Vec<JournalLine> {
    let mut lines = lines.to_vec();
    lines.sort_by_key(|l| l.line_number);
    lines
}

#[async_trait]
impl ChartOfAccounts for InMemoryStore {
    async fn resolve_account(
        &self,
        centro_code: &str,
        code: &str,
    ) -> Result<Option<Account>, RepoError> {
        let state = self.lock()?;
        Ok(state
            .accounts
            .get(&(centro_code.to_string(), code.to_string()))
            .cloned())
    }
}

#[async_trait]
impl LedgerRepository for InMemoryStore {
    async fn next_entry_number(&self, centro_code: &str) -> Result<i64, RepoError> {
        let mut state = self.lock()?;
        let counter = state
            .entry_counters
            .entry(centro_code.to_string())
            .or_insert(0);
        *counter += 1;
        Ok(*counter)
    }

    async fn save_entry(
        &self,
        entry: &JournalEntry,
        lines: &[JournalLine],
    ) -> Result<Uuid, RepoError> {
        let mut state = self.lock()?;
        write_entry(&mut state, entry, lines)?;
        Ok(entry.id)
    }

    async fn find_entry(&self, entry_id: Uuid) -> Result<Option<EntryWithLines>, RepoError> {
        Ok(self.lock()?.entries.get(&entry_id).cloned())
    }

    async fn delete_draft_entry(&self, entry_id: Uuid) -> Result<bool, RepoError> {
        let mut state = self.lock()?;
        match state.entries.get(&entry_id) {
            Some(e) if e.entry.status == EntryStatus::Draft => {
                if date_is_sealed(&state, &e.entry.centro_code, e.entry.entry_date) {
                    return Err(RepoError::PeriodClosed(e.entry.entry_date));
                }
                state.entries.remove(&entry_id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn entries_in_period(
        &self,
        centro_code: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<EntryWithLines>, RepoError> {
        let state = self.lock()?;
        let mut entries: Vec<EntryWithLines> = state
            .entries
            .values()
            .filter(|e| {
                e.entry.centro_code == centro_code
                    && e.entry.entry_date >= from
                    && e.entry.entry_date <= to
            })
            .cloned()
            .collect();
        entries.sort_by_key(|e| (e.entry.entry_date, e.entry.entry_number));
        Ok(entries)
    }
}

#[async_trait]
impl PeriodRepository for InMemoryStore {
    async fn get_period(
        &self,
        centro_code: &str,
        year: i32,
        month: Option<u32>,
    ) -> Result<Option<ClosingPeriod>, RepoError> {
        Ok(self
            .lock()?
            .periods
            .get(&period_key(centro_code, year, month))
            .cloned())
    }

    async fn get_fiscal_year(
        &self,
        centro_code: &str,
        year: i32,
    ) -> Result<Option<FiscalYear>, RepoError> {
        let state = self.lock()?;
        Ok(state
            .fiscal_years
            .values()
            .find(|fy| fy.centro_code == centro_code && fy.year == year)
            .cloned())
    }

    async fn list_fiscal_years(&self, centro_code: &str) -> Result<Vec<FiscalYear>, RepoError> {
        let state = self.lock()?;
        let mut years: Vec<FiscalYear> = state
            .fiscal_years
            .values()
            .filter(|fy| fy.centro_code == centro_code)
            .cloned()
            .collect();
        years.sort_by_key(|fy| fy.start_date);
        Ok(years)
    }

    async fn save_fiscal_year(&self, fiscal_year: &FiscalYear) -> Result<(), RepoError> {
        let mut state = self.lock()?;
        let clash = state.fiscal_years.values().any(|fy| {
            fy.id != fiscal_year.id
                && fy.centro_code == fiscal_year.centro_code
                && fy.year == fiscal_year.year
        });
        if clash {
            return Err(RepoError::Conflict(format!(
                "fiscal year {} already exists for centro {}",
                fiscal_year.year, fiscal_year.centro_code
            )));
        }
        state.fiscal_years.insert(fiscal_year.id, fiscal_year.clone());
        Ok(())
    }

    async fn commit_closing(&self, commit: &ClosingCommit) -> Result<(), RepoError> {
        let mut state = self.lock()?;
        let period = &commit.period;
        let key = period_key(&period.centro_code, period.period_year, period.period_month);

        // Validate everything before touching state
        if state.periods.get(&key).is_some_and(|p| p.is_closed()) {
            return Err(RepoError::AlreadyClosed(format!(
                "{} {} {:?}",
                period.centro_code, period.period_year, period.period_month
            )));
        }

        if let Some(fy_id) = commit.fiscal_year_id {
            match state.fiscal_years.get(&fy_id) {
                None => return Err(RepoError::NotFound(format!("fiscal year {}", fy_id))),
                Some(fy) if fy.status == PeriodStatus::Closed => {
                    return Err(RepoError::AlreadyClosed(format!("fiscal year {}", fy.year)))
                }
                Some(_) => {}
            }
        }

        let in_range = |e: &EntryWithLines| {
            e.entry.centro_code == period.centro_code
                && e.entry.entry_date >= commit.sealed_from
                && e.entry.entry_date <= commit.sealed_to
        };

        let stray_draft = state.entries.values().any(|e| {
            in_range(e)
                && e.entry.status == EntryStatus::Draft
                && !commit.excluded_entry_ids.contains(&e.entry.id)
        });
        if stray_draft {
            return Err(RepoError::Conflict(
                "draft entry created in the period while closing".to_string(),
            ));
        }

        let now = Utc::now();
        for generated in &commit.generated_entries {
            state.entries.insert(generated.entry.id, generated.clone());
        }
        for e in state.entries.values_mut() {
            if in_range(e) && e.entry.status == EntryStatus::Posted {
                e.entry.status = EntryStatus::Closed;
                e.entry.updated_at = now;
            }
        }
        if let Some(fy_id) = commit.fiscal_year_id {
            if let Some(fy) = state.fiscal_years.get_mut(&fy_id) {
                fy.status = PeriodStatus::Closed;
                fy.closing_date = Some(now.date_naive());
            }
        }
        state.periods.insert(key, period.clone());

        Ok(())
    }
}

#[async_trait]
impl InvoiceRepository for InMemoryStore {
    async fn save_invoice(&self, invoice: &InvoiceReceived) -> Result<Uuid, RepoError> {
        let mut state = self.lock()?;
        let mut stored = invoice.clone();
        // A stale copy never unlinks a posted entry
        if let Some(existing) = state.invoices.get(&invoice.id) {
            stored.journal_entry_id = existing.journal_entry_id.or(stored.journal_entry_id);
        }
        state.invoices.insert(invoice.id, stored);
        Ok(invoice.id)
    }

    async fn find_invoice(&self, invoice_id: Uuid) -> Result<Option<InvoiceReceived>, RepoError> {
        Ok(self.lock()?.invoices.get(&invoice_id).cloned())
    }

    async fn post_invoice_entry(
        &self,
        invoice_id: Uuid,
        posted: &EntryWithLines,
    ) -> Result<bool, RepoError> {
        let mut state = self.lock()?;
        let postable = state.invoices.get(&invoice_id).is_some_and(|inv| {
            inv.approval_status == ApprovalStatus::Approved && inv.journal_entry_id.is_none()
        });
        if !postable {
            return Ok(false);
        }

        write_entry(&mut state, &posted.entry, &posted.lines)?;
        if let Some(invoice) = state.invoices.get_mut(&invoice_id) {
            invoice.journal_entry_id = Some(posted.entry.id);
            invoice.updated_at = Utc::now();
        }
        Ok(true)
    }
}

#[async_trait]
impl BankTransactionSink for InMemoryStore {
    async fn save_transactions(&self, transactions: &[BankTransaction]) -> Result<usize, RepoError> {
        let mut state = self.lock()?;
        state.bank_transactions.extend_from_slice(transactions);
        Ok(transactions.len())
    }
}
