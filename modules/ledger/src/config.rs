use rust_decimal::Decimal;
use std::env;

use crate::money::parse_spanish_amount;

/// Backing store selected at startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreType {
    Memory,
    Postgres,
}

/// Application configuration parsed from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub store_type: StoreType,
    pub database_url: Option<String>,
    pub host: String,
    pub port: u16,
    /// Memory store only: centro whose base chart of accounts is loaded at startup
    pub seed_centro_code: Option<String>,
    pub rules: BusinessRules,
}

/// Accounting rules that vary per deployment
///
/// The defaults follow the Spanish chart of accounts (PGC) and the approval
/// threshold currently applied to received invoices.
#[derive(Debug, Clone, PartialEq)]
pub struct BusinessRules {
    /// Invoices at or above this total need manager approval first
    pub manager_approval_threshold: Decimal,
    /// Account receiving the net result in the regularization entry (PGC 129)
    pub result_account_code: String,
    /// Accounts-payable account credited when posting received invoices (PGC 400)
    pub supplier_account_code: String,
    /// Input VAT account debited for invoice tax (PGC 472)
    pub input_vat_account_code: String,
    /// Annual closing requires every monthly period of the year to be closed
    pub require_monthly_closings_for_annual: bool,
    /// Annual closing also zeroes balance-sheet accounts with a closing entry
    pub generate_closing_entry: bool,
}

impl Default for BusinessRules {
    fn default() -> Self {
        Self {
            manager_approval_threshold: Decimal::new(50000, 2),
            result_account_code: "1290000".to_string(),
            supplier_account_code: "4000000".to_string(),
            input_vat_account_code: "4720000".to_string(),
            require_monthly_closings_for_annual: true,
            generate_closing_entry: true,
        }
    }
}

impl BusinessRules {
    pub fn from_env() -> Result<Self, String> {
        let defaults = Self::default();

        let manager_approval_threshold = match env::var("MANAGER_APPROVAL_THRESHOLD") {
            Ok(raw) => parse_threshold(&raw)?,
            Err(_) => defaults.manager_approval_threshold,
        };

        Ok(Self {
            manager_approval_threshold,
            result_account_code: env::var("RESULT_ACCOUNT_CODE")
                .unwrap_or(defaults.result_account_code),
            supplier_account_code: env::var("SUPPLIER_ACCOUNT_CODE")
                .unwrap_or(defaults.supplier_account_code),
            input_vat_account_code: env::var("INPUT_VAT_ACCOUNT_CODE")
                .unwrap_or(defaults.input_vat_account_code),
            require_monthly_closings_for_annual: parse_flag(
                "REQUIRE_MONTHLY_CLOSINGS",
                defaults.require_monthly_closings_for_annual,
            )?,
            generate_closing_entry: parse_flag(
                "GENERATE_CLOSING_ENTRY",
                defaults.generate_closing_entry,
            )?,
        })
    }
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        let store_type = match env::var("STORE_TYPE")
            .unwrap_or_else(|_| "memory".to_string())
            .to_lowercase()
            .as_str()
        {
            "memory" => StoreType::Memory,
            "postgres" => StoreType::Postgres,
            other => {
                return Err(format!(
                    "Invalid STORE_TYPE: {}. Must be 'memory' or 'postgres'",
                    other
                ))
            }
        };

        let database_url = env::var("DATABASE_URL").ok();
        if store_type == StoreType::Postgres && database_url.is_none() {
            return Err("DATABASE_URL must be set when STORE_TYPE=postgres".to_string());
        }

        let host = env::var("HOST")
            .unwrap_or_else(|_| "0.0.0.0".to_string());

        let port: u16 = env::var("PORT")
            .unwrap_or_else(|_| "8091".to_string())
            .parse()
            .map_err(|_| "PORT must be a valid u16".to_string())?;

        Ok(Config {
            store_type,
            database_url,
            host,
            port,
            seed_centro_code: env::var("SEED_CENTRO_CODE").ok().filter(|c| !c.is_empty()),
            rules: BusinessRules::from_env()?,
        })
    }
}

/// Accepts `500.00` as well as the Spanish `1.500,00`; a comma selects the latter
fn parse_threshold(raw: &str) -> Result<Decimal, String> {
    let parsed = if raw.contains(',') {
        parse_spanish_amount(raw).ok()
    } else {
        raw.trim().parse::<Decimal>().ok()
    };
    match parsed {
        Some(value) if value >= Decimal::ZERO => Ok(value),
        _ => Err("MANAGER_APPROVAL_THRESHOLD must be a non-negative amount".to_string()),
    }
}

fn parse_flag(name: &str, default: bool) -> Result<bool, String> {
    match env::var(name) {
        Ok(raw) => match raw.to_lowercase().as_str() {
            "1" | "true" | "yes" => Ok(true),
            "0" | "false" | "no" => Ok(false),
            _ => Err(format!("{} must be true or false", name)),
        },
        Err(_) => Ok(default),
    }
}
