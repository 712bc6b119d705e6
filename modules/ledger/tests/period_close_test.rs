//! Period closing: monthly seals, annual regularization/closing entries and
//! the guarantees around partially closed years

use franchise_ledger::config::BusinessRules;
use franchise_ledger::contracts::journal_entry_v1::EntryLineInput;
use franchise_ledger::contracts::period_close_v1::{
    ValidateCloseRequest, FISCAL_YEAR_NOT_FOUND, MONTHS_OPEN,
};
use franchise_ledger::repos::journal_repo::{EntryStatus, MovementType};
use franchise_ledger::repos::period_repo::{PeriodStatus, PeriodType};
use franchise_ledger::services::journal_service::{create_entry, JournalError};
use franchise_ledger::services::period_close_service::{
    close_period, has_blocking_errors, validate_period_can_close, ClosingError,
};
use franchise_ledger::services::trial_balance_service::get_trial_balance;
use rust_decimal::Decimal;
use std::sync::Arc;

mod common;
use common::*;

/// Year with 1000.00 revenue, 400.00 purchases and 150.00 rent
async fn profitable_year(repos: &franchise_ledger::repos::Repositories) {
    open_calendar_year(repos, CENTRO, 2024).await;
    post_sale(repos, CENTRO, date(2024, 3, 15), "1000.00").await;
    post_purchase(repos, CENTRO, date(2024, 4, 2), "400.00").await;
    create_entry(
        repos,
        &entry_request(
            CENTRO,
            date(2024, 5, 1),
            "Alquiler local",
            vec![
                EntryLineInput::debit("6210000", d("150.00")),
                EntryLineInput::credit("5720000", d("150.00")),
            ],
        ),
    )
    .await
    .unwrap();
}

fn line_amount(
    lines: &[franchise_ledger::contracts::journal_entry_v1::EntryLineResponse],
    account: &str,
    movement: MovementType,
) -> Option<Decimal> {
    lines
        .iter()
        .find(|l| l.account_code == account && l.movement_type == movement)
        .map(|l| l.amount)
}

#[tokio::test]
async fn test_annual_close_regularizes_and_zeroes_the_year() {
    let (_store, repos) = seeded_store();
    let rules = BusinessRules::default();
    profitable_year(&repos).await;
    close_months(&repos, &rules, CENTRO, 2024, 12).await;

    let response = close_period(&repos, &rules, &close_request(CENTRO, 2024, None))
        .await
        .unwrap();

    assert_eq!(response.period.period_type, PeriodType::Annual);
    assert_eq!(response.period.status, PeriodStatus::Closed);
    assert_eq!(response.period.close_hash.as_ref().map(|h| h.len()), Some(64));

    let regularization = response.regularization_entry.expect("regularization entry");
    assert_eq!(regularization.entry_date, date(2024, 12, 31));
    assert_eq!(regularization.status, EntryStatus::Closed);
    assert_eq!(
        line_amount(&regularization.lines, "7000000", MovementType::Debit),
        Some(d("1000.00"))
    );
    assert_eq!(
        line_amount(&regularization.lines, "6000000", MovementType::Credit),
        Some(d("400.00"))
    );
    assert_eq!(
        line_amount(&regularization.lines, "6210000", MovementType::Credit),
        Some(d("150.00"))
    );
    assert_eq!(
        line_amount(&regularization.lines, "1290000", MovementType::Credit),
        Some(d("450.00"))
    );
    assert_eq!(regularization.total_debit, regularization.total_credit);

    let closing = response.closing_entry.expect("closing entry");
    assert_eq!(
        line_amount(&closing.lines, "5720000", MovementType::Credit),
        Some(d("450.00"))
    );
    assert_eq!(
        line_amount(&closing.lines, "1290000", MovementType::Debit),
        Some(d("450.00"))
    );
    assert_eq!(
        response.period.regularization_entry_id,
        Some(regularization.id)
    );
    assert_eq!(response.period.closing_entry_id, Some(closing.id));
    assert!(closing.entry_number > regularization.entry_number);

    let fiscal_year = repos
        .periods
        .get_fiscal_year(CENTRO, 2024)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(fiscal_year.status, PeriodStatus::Closed);
    assert!(fiscal_year.closing_date.is_some());

    let tb = get_trial_balance(&repos, CENTRO, date(2024, 1, 1), date(2024, 12, 31))
        .await
        .unwrap();
    assert!(tb.is_balanced);
    assert!(tb.rows.iter().all(|r| r.net.is_zero()), "{:?}", tb.rows);

    let entries = repos
        .ledger
        .entries_in_period(CENTRO, date(2024, 1, 1), date(2024, 12, 31))
        .await
        .unwrap();
    assert_eq!(entries.len(), 5);
    assert!(entries.iter().all(|e| e.entry.status == EntryStatus::Closed));
}

#[tokio::test]
async fn test_closed_year_rejects_new_entries_and_second_close() {
    let (_store, repos) = seeded_store();
    let rules = BusinessRules::default();
    profitable_year(&repos).await;
    close_months(&repos, &rules, CENTRO, 2024, 12).await;
    close_period(&repos, &rules, &close_request(CENTRO, 2024, None))
        .await
        .unwrap();

    let err = create_entry(
        &repos,
        &entry_request(
            CENTRO,
            date(2024, 12, 31),
            "Ajuste tardío",
            vec![
                EntryLineInput::debit("6280000", d("10.00")),
                EntryLineInput::credit("5720000", d("10.00")),
            ],
        ),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, JournalError::PeriodClosed(_)));

    let again = close_period(&repos, &rules, &close_request(CENTRO, 2024, None))
        .await
        .unwrap_err();
    assert!(matches!(again, ClosingError::AlreadyClosed(_)));

    let month_again = close_period(&repos, &rules, &close_request(CENTRO, 2024, Some(6)))
        .await
        .unwrap_err();
    assert!(matches!(month_again, ClosingError::AlreadyClosed(_)));
}

#[tokio::test]
async fn test_annual_close_with_open_november_changes_nothing() {
    let (_store, repos) = seeded_store();
    let rules = BusinessRules::default();
    profitable_year(&repos).await;
    let november = post_sale(&repos, CENTRO, date(2024, 11, 20), "75.00").await;

    close_months(&repos, &rules, CENTRO, 2024, 10).await;
    close_period(&repos, &rules, &close_request(CENTRO, 2024, Some(12)))
        .await
        .unwrap();

    let report = validate_period_can_close(
        &repos,
        &rules,
        &ValidateCloseRequest {
            centro_code: CENTRO.to_string(),
            year: 2024,
            month: None,
            excluded_entry_ids: Vec::new(),
        },
    )
    .await
    .unwrap();
    assert!(has_blocking_errors(&report));
    assert!(report.has_code(MONTHS_OPEN));

    let err = close_period(&repos, &rules, &close_request(CENTRO, 2024, None))
        .await
        .unwrap_err();
    assert!(matches!(err, ClosingError::PeriodNotReady(_)));
    assert!(err.to_string().contains("2024-11"), "{}", err);

    let fiscal_year = repos
        .periods
        .get_fiscal_year(CENTRO, 2024)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(fiscal_year.status, PeriodStatus::Open);
    assert!(repos
        .periods
        .get_period(CENTRO, 2024, None)
        .await
        .unwrap()
        .is_none());
    assert!(repos
        .periods
        .get_period(CENTRO, 2024, Some(11))
        .await
        .unwrap()
        .is_none());

    let still_posted = repos.ledger.find_entry(november.entry.id).await.unwrap().unwrap();
    assert_eq!(still_posted.entry.status, EntryStatus::Posted);
}

#[tokio::test]
async fn test_annual_close_without_fiscal_year() {
    let (_store, repos) = seeded_store();
    let rules = BusinessRules::default();

    let report = validate_period_can_close(
        &repos,
        &rules,
        &ValidateCloseRequest {
            centro_code: CENTRO.to_string(),
            year: 2030,
            month: None,
            excluded_entry_ids: Vec::new(),
        },
    )
    .await
    .unwrap();
    assert!(report.has_code(FISCAL_YEAR_NOT_FOUND));

    let err = close_period(&repos, &rules, &close_request(CENTRO, 2030, None))
        .await
        .unwrap_err();
    assert!(matches!(err, ClosingError::FiscalYearNotFound(2030)));
}

#[tokio::test]
async fn test_annual_close_without_monthly_requirement_or_closing_entry() {
    let (_store, repos) = seeded_store();
    let rules = BusinessRules {
        require_monthly_closings_for_annual: false,
        generate_closing_entry: false,
        ..BusinessRules::default()
    };
    profitable_year(&repos).await;

    let response = close_period(&repos, &rules, &close_request(CENTRO, 2024, None))
        .await
        .unwrap();
    assert!(response.regularization_entry.is_some());
    assert!(response.closing_entry.is_none());
    assert_eq!(response.entries_sealed, 3);
}

#[tokio::test]
async fn test_loss_goes_to_the_debit_of_the_result_account() {
    let (_store, repos) = seeded_store();
    let rules = BusinessRules {
        require_monthly_closings_for_annual: false,
        ..BusinessRules::default()
    };
    open_calendar_year(&repos, CENTRO, 2024).await;
    post_sale(&repos, CENTRO, date(2024, 2, 1), "100.00").await;
    post_purchase(&repos, CENTRO, date(2024, 2, 2), "250.00").await;

    let response = close_period(&repos, &rules, &close_request(CENTRO, 2024, None))
        .await
        .unwrap();
    let regularization = response.regularization_entry.unwrap();
    assert_eq!(
        line_amount(&regularization.lines, "1290000", MovementType::Debit),
        Some(d("150.00"))
    );
}

#[tokio::test]
async fn test_monthly_close_of_empty_month_warns() {
    let (_store, repos) = seeded_store();
    let rules = BusinessRules::default();

    let response = close_period(&repos, &rules, &close_request(CENTRO, 2024, Some(8)))
        .await
        .unwrap();
    assert_eq!(response.period.period_type, PeriodType::Monthly);
    assert_eq!(response.period.period_month, Some(8));
    assert_eq!(response.entries_sealed, 0);
    assert!(response.regularization_entry.is_none());
    assert_eq!(response.warnings.len(), 1);
}

#[tokio::test]
async fn test_invalid_month_is_rejected() {
    let (_store, repos) = seeded_store();
    let err = close_period(
        &repos,
        &BusinessRules::default(),
        &close_request(CENTRO, 2024, Some(13)),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ClosingError::InvalidPeriod(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_closes_of_the_same_month_succeed_once() {
    let (_store, repos) = seeded_store();
    let rules = Arc::new(BusinessRules::default());
    post_sale(&repos, CENTRO, date(2024, 9, 9), "42.00").await;

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let repos = repos.clone();
            let rules = rules.clone();
            tokio::spawn(async move {
                close_period(&repos, &rules, &close_request(CENTRO, 2024, Some(9))).await
            })
        })
        .collect();

    let mut ok = 0;
    let mut already_closed = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => ok += 1,
            Err(ClosingError::AlreadyClosed(_)) => already_closed += 1,
            Err(other) => panic!("unexpected error: {}", other),
        }
    }
    assert_eq!(ok, 1);
    assert_eq!(already_closed, 1);
}
