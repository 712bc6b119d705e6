//! Common test utilities for ledger integration tests
//!
//! Every test builds its own `InMemoryStore` seeded with the base chart of
//! accounts, so tests never share state and can run in parallel.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::NaiveDate;
use franchise_ledger::config::BusinessRules;
use franchise_ledger::contracts::journal_entry_v1::{
    CreateEntryRequest, EntryLineInput, OpenFiscalYearRequest,
};
use franchise_ledger::contracts::period_close_v1::ClosePeriodRequest;
use franchise_ledger::repos::account_repo::default_chart;
use franchise_ledger::repos::journal_repo::{
    EntryWithLines, JournalEntry, JournalLine, LedgerRepository,
};
use franchise_ledger::repos::period_repo::FiscalYear;
use franchise_ledger::repos::{InMemoryStore, RepoError, Repositories};
use franchise_ledger::services::fiscal_year_service::open_fiscal_year;
use franchise_ledger::services::journal_service::create_entry;
use franchise_ledger::services::period_close_service::close_period;
use rust_decimal::Decimal;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

pub const CENTRO: &str = "C001";
pub const OTHER_CENTRO: &str = "C002";

pub fn d(s: &str) -> Decimal {
    s.parse().expect("valid decimal literal")
}

pub fn date(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).expect("valid date")
}

/// Fresh store with the base chart for `C001` and `C002`
pub fn seeded_store() -> (Arc<InMemoryStore>, Repositories) {
    let store = Arc::new(InMemoryStore::with_accounts(
        default_chart(CENTRO)
            .into_iter()
            .chain(default_chart(OTHER_CENTRO)),
    ));
    let repos = Repositories::in_memory(store.clone());
    (store, repos)
}

pub type HookFuture = Pin<Box<dyn Future<Output = ()> + Send>>;
pub type Hook = Box<dyn Fn() -> HookFuture + Send + Sync>;

/// Ledger call after which a [`HookedLedger`] runs its hook
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookPoint {
    /// After a number is reserved, before the caller writes anything
    NextEntryNumber,
    /// Right before the first `save_entry` reaches the store
    SaveEntry,
}

/// Ledger over an `InMemoryStore` that runs `hook` once at `point`, so a
/// test can slip another operation between a service's checks and its write
pub struct HookedLedger {
    inner: Arc<InMemoryStore>,
    point: HookPoint,
    hook: Hook,
    fired: AtomicBool,
}

impl HookedLedger {
    async fn fire(&self, at: HookPoint) {
        if at == self.point && !self.fired.swap(true, Ordering::SeqCst) {
            (self.hook)().await;
        }
    }
}

#[async_trait]
impl LedgerRepository for HookedLedger {
    async fn next_entry_number(&self, centro_code: &str) -> Result<i64, RepoError> {
        let number = self.inner.next_entry_number(centro_code).await?;
        self.fire(HookPoint::NextEntryNumber).await;
        Ok(number)
    }

    async fn save_entry(
        &self,
        entry: &JournalEntry,
        lines: &[JournalLine],
    ) -> Result<Uuid, RepoError> {
        self.fire(HookPoint::SaveEntry).await;
        self.inner.save_entry(entry, lines).await
    }

    async fn find_entry(&self, entry_id: Uuid) -> Result<Option<EntryWithLines>, RepoError> {
        self.inner.find_entry(entry_id).await
    }

    async fn delete_draft_entry(&self, entry_id: Uuid) -> Result<bool, RepoError> {
        self.inner.delete_draft_entry(entry_id).await
    }

    async fn entries_in_period(
        &self,
        centro_code: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<EntryWithLines>, RepoError> {
        self.inner.entries_in_period(centro_code, from, to).await
    }
}

/// Same store as `store`, seen through a ledger that fires `hook` once at `point`
pub fn hooked_repos<F, Fut>(store: Arc<InMemoryStore>, point: HookPoint, hook: F) -> Repositories
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let hook: Hook = Box::new(move || Box::pin(hook()) as HookFuture);
    let mut repos = Repositories::in_memory(store.clone());
    repos.ledger = Arc::new(HookedLedger {
        inner: store,
        point,
        hook,
        fired: AtomicBool::new(false),
    });
    repos
}

pub async fn open_calendar_year(repos: &Repositories, centro: &str, year: i32) -> FiscalYear {
    open_fiscal_year(
        repos,
        &OpenFiscalYearRequest {
            centro_code: centro.to_string(),
            year,
            start_date: date(year, 1, 1),
            end_date: date(year, 12, 31),
        },
    )
    .await
    .expect("fiscal year opens")
}

pub fn entry_request(
    centro: &str,
    entry_date: NaiveDate,
    description: &str,
    lines: Vec<EntryLineInput>,
) -> CreateEntryRequest {
    CreateEntryRequest {
        centro_code: centro.to_string(),
        entry_date,
        description: description.to_string(),
        lines,
        created_by: "gestor@franquicia".to_string(),
    }
}

/// Cash sale: debit bank, credit sales revenue
pub async fn post_sale(
    repos: &Repositories,
    centro: &str,
    entry_date: NaiveDate,
    amount: &str,
) -> EntryWithLines {
    create_entry(
        repos,
        &entry_request(
            centro,
            entry_date,
            "Ventas del día",
            vec![
                EntryLineInput::debit("5720000", d(amount)),
                EntryLineInput::credit("7000000", d(amount)),
            ],
        ),
    )
    .await
    .expect("sale posts")
}

/// Supplier purchase paid from the bank
pub async fn post_purchase(
    repos: &Repositories,
    centro: &str,
    entry_date: NaiveDate,
    amount: &str,
) -> EntryWithLines {
    create_entry(
        repos,
        &entry_request(
            centro,
            entry_date,
            "Compra de mercaderías",
            vec![
                EntryLineInput::debit("6000000", d(amount)),
                EntryLineInput::credit("5720000", d(amount)),
            ],
        ),
    )
    .await
    .expect("purchase posts")
}

pub fn close_request(centro: &str, year: i32, month: Option<u32>) -> ClosePeriodRequest {
    ClosePeriodRequest {
        centro_code: centro.to_string(),
        year,
        month,
        closed_by: "controller@franquicia".to_string(),
        notes: None,
        excluded_entry_ids: Vec::new(),
    }
}

/// Close the monthly periods `1..=last_month` of `year`
pub async fn close_months(
    repos: &Repositories,
    rules: &BusinessRules,
    centro: &str,
    year: i32,
    last_month: u32,
) {
    for month in 1..=last_month {
        close_period(repos, rules, &close_request(centro, year, Some(month)))
            .await
            .unwrap_or_else(|e| panic!("month {} closes: {}", month, e));
    }
}

// ============================================================
// Norma 43 fixed-width record builders
// ============================================================

pub fn n43_header() -> String {
    format!(
        "11{}{}{}{}{}{}{:014}{}{}{:<26}{}",
        "2100", "0418", "0200051332", "240101", "240131", "2", 150000, "978", "3", "FRANQUICIA CENTRO", "   "
    )
}

/// Movement record; `key` is `'1'` for debits and `'2'` for credits
pub fn n43_movement(op_date: &str, key: char, amount_minor: i64, reference: &str) -> String {
    format!(
        "22    0418{}{}12000{}{:014}{:010}{:<12}{:<16}",
        op_date, op_date, key, amount_minor, 0, reference, ""
    )
}

pub fn n43_concept(text: &str) -> String {
    format!("2301{:<38}{:<38}", text, "")
}

pub fn n43_trailer(debits: (u32, i64), credits: (u32, i64)) -> String {
    format!(
        "33210004180200051332{:05}{:014}{:05}{:014}2{:014}978    ",
        debits.0, debits.1, credits.0, credits.1, 0
    )
}

pub fn n43_end(records: u32) -> String {
    format!("88{}{:06}{:<54}", "9".repeat(18), records, "")
}
