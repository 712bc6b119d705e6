pub mod bank_import_service;
pub mod fiscal_year_service;
pub mod invoice_service;
pub mod journal_service;
pub mod period_close_service;
pub mod trial_balance_service;
