use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::RepoError;

/// Account type of a chart-of-accounts entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    Asset,
    Liability,
    Equity,
    Revenue,
    Expense,
}

/// Side on which an account's balance normally sits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NormalBalance {
    Debit,
    Credit,
}

impl AccountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountType::Asset => "asset",
            AccountType::Liability => "liability",
            AccountType::Equity => "equity",
            AccountType::Revenue => "revenue",
            AccountType::Expense => "expense",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "asset" => Some(AccountType::Asset),
            "liability" => Some(AccountType::Liability),
            "equity" => Some(AccountType::Equity),
            "revenue" => Some(AccountType::Revenue),
            "expense" => Some(AccountType::Expense),
            _ => None,
        }
    }

    pub fn normal_balance(&self) -> NormalBalance {
        match self {
            AccountType::Asset | AccountType::Expense => NormalBalance::Debit,
            AccountType::Liability | AccountType::Equity | AccountType::Revenue => {
                NormalBalance::Credit
            }
        }
    }

    /// Revenue and expense accounts are zeroed by the year-end regularization
    pub fn is_income_statement(&self) -> bool {
        matches!(self, AccountType::Revenue | AccountType::Expense)
    }
}

/// Chart-of-accounts entry, scoped to a centro
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub centro_code: String,
    pub code: String,
    pub name: String,
    pub account_type: AccountType,
    pub level: i32,
    pub parent_code: Option<String>,
    pub is_active: bool,
}

/// Read access to the chart of accounts
#[async_trait]
pub trait ChartOfAccounts: Send + Sync {
    /// Look up an account by code; `None` when the centro has no such account
    async fn resolve_account(
        &self,
        centro_code: &str,
        code: &str,
    ) -> Result<Option<Account>, RepoError>;
}

/// Minimal PGC chart for a new centro: the accounts the posting and closing
/// rules reference plus the usual restaurant income and expense accounts.
pub fn default_chart(centro_code: &str) -> Vec<Account> {
    let rows: [(&str, &str, AccountType); 14] = [
        ("1000000", "Capital social", AccountType::Equity),
        ("1290000", "Resultado del ejercicio", AccountType::Equity),
        ("4000000", "Proveedores", AccountType::Liability),
        ("4300000", "Clientes", AccountType::Asset),
        ("4720000", "Hacienda Pública, IVA soportado", AccountType::Asset),
        ("4770000", "Hacienda Pública, IVA repercutido", AccountType::Liability),
        ("5700000", "Caja, euros", AccountType::Asset),
        ("5720000", "Bancos c/c", AccountType::Asset),
        ("6000000", "Compras de mercaderías", AccountType::Expense),
        ("6210000", "Arrendamientos y cánones", AccountType::Expense),
        ("6280000", "Suministros", AccountType::Expense),
        ("6400000", "Sueldos y salarios", AccountType::Expense),
        ("7000000", "Ventas de mercaderías", AccountType::Revenue),
        ("7050000", "Prestaciones de servicios", AccountType::Revenue),
    ];

    rows.into_iter()
        .map(|(code, name, account_type)| Account {
            centro_code: centro_code.to_string(),
            code: code.to_string(),
            name: name.to_string(),
            account_type,
            level: 7,
            parent_code: Some(code[..3].to_string()),
            is_active: true,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_type_round_trips_through_str() {
        for t in [
            AccountType::Asset,
            AccountType::Liability,
            AccountType::Equity,
            AccountType::Revenue,
            AccountType::Expense,
        ] {
            assert_eq!(AccountType::parse(t.as_str()), Some(t));
        }
        assert_eq!(AccountType::parse("ingreso"), None);
    }

    #[test]
    fn test_normal_balance() {
        assert_eq!(AccountType::Expense.normal_balance(), NormalBalance::Debit);
        assert_eq!(AccountType::Revenue.normal_balance(), NormalBalance::Credit);
        assert!(AccountType::Revenue.is_income_statement());
        assert!(!AccountType::Equity.is_income_statement());
    }

    #[test]
    fn test_default_chart_has_rule_accounts() {
        let chart = default_chart("C001");
        for code in ["1290000", "4000000", "4720000"] {
            assert!(chart.iter().any(|a| a.code == code), "missing {}", code);
        }
        assert!(chart.iter().all(|a| a.centro_code == "C001" && a.is_active));
    }
}
