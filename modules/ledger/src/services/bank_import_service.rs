//! Bank statement import
//!
//! Parses a Norma 43 file and hands the resulting movements to the bank
//! transaction sink. Parsing problems are reported in the result, never as
//! an `Err`; only persistence failures abort the import.

use uuid::Uuid;

use crate::contracts::norma43_import_v1::{Norma43ImportRequest, Norma43ImportResult};
use crate::formats::parse_norma43;
use crate::repos::{RepoError, Repositories};

pub async fn import_norma43(
    repos: &Repositories,
    request: &Norma43ImportRequest,
) -> Result<Norma43ImportResult, RepoError> {
    let import_batch_id = Uuid::new_v4();
    let mut result = parse_norma43(&request.content, &request.context, import_batch_id);

    if !result.success {
        tracing::warn!(
            import_batch_id = %import_batch_id,
            bank_account_id = %request.context.bank_account_id,
            "Rejected file that is not Norma 43"
        );
        return Ok(result);
    }

    if !result.transactions.is_empty() {
        result.transactions_imported = repos.bank.save_transactions(&result.transactions).await?;
    }

    tracing::info!(
        import_batch_id = %import_batch_id,
        bank_account_id = %request.context.bank_account_id,
        centro_code = %request.context.centro_code,
        imported = result.transactions_imported,
        errors = result.errors.len(),
        warnings = result.warnings.len(),
        "Norma 43 statement imported"
    );

    Ok(result)
}
