//! Structural validation of journal entry input
//!
//! These checks need no collaborator and run before any account lookup or
//! write. Balance is checked separately, since drafts may be unbalanced.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::contracts::journal_entry_v1::EntryLineInput;
use crate::money::has_at_most_two_decimals;
use crate::repos::journal_repo::MovementType;

/// Validation errors for journal entry input
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("El código de centro es obligatorio")]
    EmptyCentro,

    #[error("La descripción del asiento es obligatoria")]
    EmptyDescription,

    #[error("El asiento debe tener al menos una línea")]
    NoLines,

    #[error("Línea {0}: la cuenta es obligatoria")]
    EmptyAccountCode(usize),

    #[error("Línea {0}: el importe debe ser mayor que cero, recibido {1}")]
    NonPositiveAmount(usize, Decimal),

    #[error("Línea {0}: el importe admite como máximo dos decimales, recibido {1}")]
    TooManyDecimals(usize, Decimal),

    #[error("Línea {0}: la cuenta '{1}' no existe en el plan contable del centro '{2}'")]
    AccountNotFound(usize, String, String),

    #[error("Línea {0}: la cuenta '{1}' está inactiva en el centro '{2}'")]
    AccountInactive(usize, String, String),
}

/// Validate entry header and lines
///
/// # Validation Rules
///
/// - `centro_code` and `description`: non-empty after trimming
/// - `lines`: at least one
/// - Each line (numbered from 1):
///   - `account_code`: non-empty
///   - `amount`: > 0 with at most two decimals
pub fn validate_entry_input(
    centro_code: &str,
    description: &str,
    lines: &[EntryLineInput],
) -> Result<(), ValidationError> {
    if centro_code.trim().is_empty() {
        return Err(ValidationError::EmptyCentro);
    }
    if description.trim().is_empty() {
        return Err(ValidationError::EmptyDescription);
    }
    validate_lines(lines)
}

pub fn validate_lines(lines: &[EntryLineInput]) -> Result<(), ValidationError> {
    if lines.is_empty() {
        return Err(ValidationError::NoLines);
    }

    for (idx, line) in lines.iter().enumerate() {
        let line_no = idx + 1;
        if line.account_code.trim().is_empty() {
            return Err(ValidationError::EmptyAccountCode(line_no));
        }
        if line.amount <= Decimal::ZERO {
            return Err(ValidationError::NonPositiveAmount(line_no, line.amount));
        }
        if !has_at_most_two_decimals(line.amount) {
            return Err(ValidationError::TooManyDecimals(line_no, line.amount));
        }
        tracing::debug!(line_no, account_code = %line.account_code, "Entry line validated");
    }

    Ok(())
}

/// Sum debit and credit lines separately
pub fn entry_totals(lines: &[EntryLineInput]) -> (Decimal, Decimal) {
    lines
        .iter()
        .fold((Decimal::ZERO, Decimal::ZERO), |(debit, credit), line| {
            match line.movement_type {
                MovementType::Debit => (debit + line.amount, credit),
                MovementType::Credit => (debit, credit + line.amount),
            }
        })
}
