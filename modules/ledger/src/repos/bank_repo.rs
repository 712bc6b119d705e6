use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::RepoError;

/// Reconciliation state; importers only ever produce `Pending`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BankTransactionStatus {
    Pending,
    Reconciled,
    Ignored,
}

impl BankTransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BankTransactionStatus::Pending => "pending",
            BankTransactionStatus::Reconciled => "reconciled",
            BankTransactionStatus::Ignored => "ignored",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(BankTransactionStatus::Pending),
            "reconciled" => Some(BankTransactionStatus::Reconciled),
            "ignored" => Some(BankTransactionStatus::Ignored),
            _ => None,
        }
    }
}

/// A bank movement ready for reconciliation.
///
/// `amount` is signed: positive for inflows (credits), negative for outflows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BankTransaction {
    pub id: Uuid,
    pub bank_account_id: String,
    pub centro_code: String,
    pub transaction_date: NaiveDate,
    pub value_date: Option<NaiveDate>,
    pub description: String,
    pub reference: Option<String>,
    pub amount: Decimal,
    pub status: BankTransactionStatus,
    pub import_batch_id: Uuid,
}

/// Destination for imported bank transactions
#[async_trait]
pub trait BankTransactionSink: Send + Sync {
    /// Persist a batch, returning how many rows were written
    async fn save_transactions(&self, transactions: &[BankTransaction]) -> Result<usize, RepoError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_serializes_camel_case() {
        let tx = BankTransaction {
            id: Uuid::nil(),
            bank_account_id: "ba-1".to_string(),
            centro_code: "C001".to_string(),
            transaction_date: NaiveDate::from_ymd_opt(2024, 3, 5).unwrap(),
            value_date: None,
            description: "TPV".to_string(),
            reference: None,
            amount: Decimal::new(-5000, 2),
            status: BankTransactionStatus::Pending,
            import_batch_id: Uuid::nil(),
        };
        let json = serde_json::to_value(&tx).unwrap();
        assert_eq!(json["transactionDate"], "2024-03-05");
        assert_eq!(json["status"], "pending");
        assert!(json.get("importBatchId").is_some());
    }
}
