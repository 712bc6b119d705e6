//! Trial Balance Service
//!
//! Per-account debit/credit sums over posted and closed entries of a centro.
//! Drafts never contribute.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::money::is_balanced;
use crate::repos::journal_repo::{EntryStatus, EntryWithLines, JournalLine, MovementType};
use crate::repos::{RepoError, Repositories};

/// One account of the trial balance; `net = debit - credit`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialBalanceRow {
    pub account_code: String,
    pub debit: Decimal,
    pub credit: Decimal,
    pub net: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialBalance {
    pub centro_code: String,
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub rows: Vec<TrialBalanceRow>,
    pub total_debit: Decimal,
    pub total_credit: Decimal,
    pub is_balanced: bool,
}

/// Whether an entry counts towards balances
pub fn is_effective(entry: &EntryWithLines) -> bool {
    matches!(entry.entry.status, EntryStatus::Posted | EntryStatus::Closed)
}

/// Accumulate lines into per-account rows, ordered by account code
pub fn accumulate<'a>(lines: impl IntoIterator<Item = &'a JournalLine>) -> Vec<TrialBalanceRow> {
    let mut sums: BTreeMap<&str, (Decimal, Decimal)> = BTreeMap::new();
    for line in lines {
        let slot = sums.entry(line.account_code.as_str()).or_default();
        match line.movement_type {
            MovementType::Debit => slot.0 += line.amount,
            MovementType::Credit => slot.1 += line.amount,
        }
    }

    sums.into_iter()
        .map(|(code, (debit, credit))| TrialBalanceRow {
            account_code: code.to_string(),
            debit,
            credit,
            net: debit - credit,
        })
        .collect()
}

/// Trial balance of already-loaded entries
pub fn compute_trial_balance(
    centro_code: &str,
    from: NaiveDate,
    to: NaiveDate,
    entries: &[EntryWithLines],
) -> TrialBalance {
    let rows = accumulate(
        entries
            .iter()
            .filter(|e| is_effective(e))
            .flat_map(|e| e.lines.iter()),
    );
    let total_debit: Decimal = rows.iter().map(|r| r.debit).sum();
    let total_credit: Decimal = rows.iter().map(|r| r.credit).sum();

    TrialBalance {
        centro_code: centro_code.to_string(),
        from,
        to,
        rows,
        total_debit,
        total_credit,
        is_balanced: is_balanced(total_debit, total_credit),
    }
}

/// Load the centro's entries in `[from, to]` and compute their trial balance
pub async fn get_trial_balance(
    repos: &Repositories,
    centro_code: &str,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<TrialBalance, RepoError> {
    let entries = repos.ledger.entries_in_period(centro_code, from, to).await?;
    let balance = compute_trial_balance(centro_code, from, to, &entries);

    tracing::debug!(
        centro_code = %centro_code,
        %from,
        %to,
        accounts = balance.rows.len(),
        "Trial balance computed"
    );

    Ok(balance)
}
