//! Persistence collaborators
//!
//! Each entity family gets a typed async trait. `InMemoryStore` and `PgStore`
//! implement all of them; services only ever see the traits.

pub mod account_repo;
pub mod bank_repo;
pub mod invoice_repo;
pub mod journal_repo;
pub mod memory;
pub mod period_repo;
pub mod postgres;

use chrono::NaiveDate;
use std::sync::Arc;
use thiserror::Error;

pub use account_repo::ChartOfAccounts;
pub use bank_repo::BankTransactionSink;
pub use invoice_repo::InvoiceRepository;
pub use journal_repo::LedgerRepository;
pub use memory::InMemoryStore;
pub use period_repo::PeriodRepository;
pub use postgres::PgStore;

/// Errors raised by any repository implementation
#[derive(Debug, Error)]
pub enum RepoError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Write conflict: {0}")]
    Conflict(String),

    #[error("Period already closed: {0}")]
    AlreadyClosed(String),

    /// A write touched a date that a committed closing has sealed
    #[error("Date {0} falls in a closed period")]
    PeriodClosed(NaiveDate),

    #[error("Stored row could not be mapped: {0}")]
    Corrupt(String),

    #[error("In-memory store lock poisoned")]
    Poisoned,
}

/// The set of collaborators every use case draws from
#[derive(Clone)]
pub struct Repositories {
    pub accounts: Arc<dyn ChartOfAccounts>,
    pub ledger: Arc<dyn LedgerRepository>,
    pub periods: Arc<dyn PeriodRepository>,
    pub invoices: Arc<dyn InvoiceRepository>,
    pub bank: Arc<dyn BankTransactionSink>,
}

impl Repositories {
    pub fn in_memory(store: Arc<InMemoryStore>) -> Self {
        Self {
            accounts: store.clone(),
            ledger: store.clone(),
            periods: store.clone(),
            invoices: store.clone(),
            bank: store,
        }
    }

    pub fn postgres(store: PgStore) -> Self {
        let store = Arc::new(store);
        Self {
            accounts: store.clone(),
            ledger: store.clone(),
            periods: store.clone(),
            invoices: store.clone(),
            bank: store,
        }
    }
}
