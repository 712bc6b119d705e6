//! Norma 43 import contract
//!
//! The result is the shape the back-office UI consumes, so it is serialized
//! in camelCase.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::repos::bank_repo::BankTransaction;

/// Error reported when a file is not a Norma 43 statement at all
pub const INVALID_FORMAT_MESSAGE: &str = "El archivo no tiene formato Norma 43 válido";

/// Where the imported movements belong
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ImportContext {
    pub bank_account_id: String,
    pub centro_code: String,
    #[serde(default)]
    pub file_name: Option<String>,
}

/// Body of `POST /api/bank/norma43/import`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Norma43ImportRequest {
    /// Raw statement text
    pub content: String,
    #[serde(flatten)]
    pub context: ImportContext,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Norma43ImportResult {
    pub success: bool,
    pub transactions_imported: usize,
    pub transactions: Vec<BankTransaction>,
    pub total_credits: Decimal,
    pub total_debits: Decimal,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub import_batch_id: Uuid,
    pub file_name: Option<String>,
}

impl Norma43ImportResult {
    /// Result for a file that failed the structural check
    pub fn invalid_format(import_batch_id: Uuid, file_name: Option<String>) -> Self {
        Self {
            success: false,
            transactions_imported: 0,
            transactions: Vec::new(),
            total_credits: Decimal::ZERO,
            total_debits: Decimal::ZERO,
            errors: vec![INVALID_FORMAT_MESSAGE.to_string()],
            warnings: Vec::new(),
            import_batch_id,
            file_name,
        }
    }
}
