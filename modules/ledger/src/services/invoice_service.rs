//! Received-invoice workflow
//!
//! Totals are computed from the lines, the approval path is picked from the
//! total, and only an approved invoice can be posted to the ledger (once).
//!
//! State machine:
//! `pending_manager → pending_accounting → approved`, and any pending state
//! `→ rejected`. `approved` and `rejected` are terminal.

use chrono::Utc;
use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

use crate::config::BusinessRules;
use crate::contracts::invoice_v1::{
    ApproveInvoiceRequest, CreateInvoiceRequest, InvoiceLineInput, PostInvoiceRequest,
    RejectInvoiceRequest,
};
use crate::contracts::journal_entry_v1::{CreateEntryRequest, EntryLineInput};
use crate::money::round2;
use crate::repos::invoice_repo::{
    ApprovalAction, ApprovalLevel, ApprovalStatus, InvoiceApproval, InvoiceLine, InvoiceReceived,
};
use crate::repos::journal_repo::{EntryStatus, EntryWithLines};
use crate::repos::{RepoError, Repositories};
use crate::services::journal_service::{prepare_entry, JournalError};

#[derive(Debug, Error)]
pub enum InvoiceError {
    #[error("Validación fallida: {0}")]
    Validation(String),

    #[error("Factura no encontrada: {0}")]
    NotFound(Uuid),

    #[error("Operación no permitida: {0}")]
    InvalidState(String),

    #[error(transparent)]
    Journal(#[from] JournalError),

    #[error("Error de persistencia: {0}")]
    Repository(#[from] RepoError),
}

/// Computed amounts of an invoice
#[derive(Debug, Clone, PartialEq)]
pub struct InvoiceTotals {
    pub lines: Vec<InvoiceLine>,
    pub subtotal: Decimal,
    pub tax_total: Decimal,
    pub total: Decimal,
}

/// Approval routing decided from the invoice total
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApprovalRoute {
    pub requires_manager_approval: bool,
    pub requires_accounting_approval: bool,
    pub initial_status: ApprovalStatus,
}

/// `total >= threshold` needs the manager first; accounting always signs
pub fn approval_route(total: Decimal, threshold: Decimal) -> ApprovalRoute {
    if total >= threshold {
        ApprovalRoute {
            requires_manager_approval: true,
            requires_accounting_approval: true,
            initial_status: ApprovalStatus::PendingManager,
        }
    } else {
        ApprovalRoute {
            requires_manager_approval: false,
            requires_accounting_approval: true,
            initial_status: ApprovalStatus::PendingAccounting,
        }
    }
}

fn validate_line(line_no: usize, line: &InvoiceLineInput) -> Result<(), InvoiceError> {
    let fail = |what: &str| Err(InvoiceError::Validation(format!("línea {}: {}", line_no, what)));

    if line.quantity <= Decimal::ZERO {
        return fail("la cantidad debe ser mayor que cero");
    }
    if line.unit_price < Decimal::ZERO {
        return fail("el precio unitario no puede ser negativo");
    }
    if line.tax_rate < Decimal::ZERO {
        return fail("el tipo de IVA no puede ser negativo");
    }
    if line.discount_percentage < Decimal::ZERO || line.discount_percentage > Decimal::ONE_HUNDRED {
        return fail("el descuento debe estar entre 0 y 100");
    }
    if line.discount_amount < Decimal::ZERO {
        return fail("el importe de descuento no puede ser negativo");
    }
    if line.account_code.trim().is_empty() {
        return fail("la cuenta contable es obligatoria");
    }
    Ok(())
}

/// Validate the lines and compute line and invoice amounts
///
/// Line amounts are stored rounded to cents. Invoice aggregates are the
/// exact sums of the unrounded line amounts, rounded once.
pub fn compute_invoice_totals(lines: &[InvoiceLineInput]) -> Result<InvoiceTotals, InvoiceError> {
    if lines.is_empty() {
        return Err(InvoiceError::Validation(
            "la factura debe tener al menos una línea".to_string(),
        ));
    }

    let hundred = Decimal::ONE_HUNDRED;
    let mut computed = Vec::with_capacity(lines.len());
    let (mut subtotal_sum, mut tax_sum, mut total_sum) = (Decimal::ZERO, Decimal::ZERO, Decimal::ZERO);

    for (idx, line) in lines.iter().enumerate() {
        let line_no = idx + 1;
        validate_line(line_no, line)?;

        let subtotal = line.quantity * line.unit_price * (Decimal::ONE - line.discount_percentage / hundred)
            - line.discount_amount;
        if subtotal < Decimal::ZERO {
            return Err(InvoiceError::Validation(format!(
                "línea {}: el descuento supera el importe de la línea",
                line_no
            )));
        }
        let tax_amount = subtotal * line.tax_rate / hundred;
        let total = subtotal + tax_amount;

        subtotal_sum += subtotal;
        tax_sum += tax_amount;
        total_sum += total;

        computed.push(InvoiceLine {
            line_number: line_no as i32,
            description: line.description.clone(),
            quantity: line.quantity,
            unit_price: line.unit_price,
            discount_percentage: line.discount_percentage,
            discount_amount: line.discount_amount,
            subtotal: round2(subtotal),
            tax_rate: line.tax_rate,
            tax_amount: round2(tax_amount),
            total: round2(total),
            account_code: line.account_code.trim().to_string(),
        });
    }

    Ok(InvoiceTotals {
        lines: computed,
        subtotal: round2(subtotal_sum),
        tax_total: round2(tax_sum),
        total: round2(total_sum),
    })
}

/// Validate, compute and persist a received invoice
pub async fn create_invoice_received(
    repos: &Repositories,
    rules: &BusinessRules,
    request: &CreateInvoiceRequest,
) -> Result<InvoiceReceived, InvoiceError> {
    if request.supplier_id.trim().is_empty() {
        return Err(InvoiceError::Validation("el proveedor es obligatorio".to_string()));
    }
    if request.centro_code.trim().is_empty() {
        return Err(InvoiceError::Validation("el código de centro es obligatorio".to_string()));
    }
    if request.invoice_number.trim().is_empty() {
        return Err(InvoiceError::Validation("el número de factura es obligatorio".to_string()));
    }

    let totals = compute_invoice_totals(&request.lines).inspect_err(|e| {
        tracing::warn!(supplier_id = %request.supplier_id, error = %e, "Invoice rejected");
    })?;
    let route = approval_route(totals.total, rules.manager_approval_threshold);

    let now = Utc::now();
    let invoice = InvoiceReceived {
        id: Uuid::new_v4(),
        supplier_id: request.supplier_id.clone(),
        centro_code: request.centro_code.clone(),
        invoice_number: request.invoice_number.trim().to_string(),
        invoice_date: request.invoice_date,
        lines: totals.lines,
        subtotal: totals.subtotal,
        tax_total: totals.tax_total,
        total: totals.total,
        requires_manager_approval: route.requires_manager_approval,
        requires_accounting_approval: route.requires_accounting_approval,
        approval_status: route.initial_status,
        approvals: Vec::new(),
        journal_entry_id: None,
        created_by: request.created_by.clone(),
        created_at: now,
        updated_at: now,
    };

    repos.invoices.save_invoice(&invoice).await?;

    tracing::info!(
        invoice_id = %invoice.id,
        centro_code = %invoice.centro_code,
        total = %invoice.total,
        approval_status = invoice.approval_status.as_str(),
        "Received invoice registered"
    );

    Ok(invoice)
}

async fn load_invoice(repos: &Repositories, invoice_id: Uuid) -> Result<InvoiceReceived, InvoiceError> {
    repos
        .invoices
        .find_invoice(invoice_id)
        .await?
        .ok_or(InvoiceError::NotFound(invoice_id))
}

/// Record an approval at `request.level`
///
/// The level must match the step the invoice is waiting for.
pub async fn approve_invoice(
    repos: &Repositories,
    invoice_id: Uuid,
    request: &ApproveInvoiceRequest,
) -> Result<InvoiceReceived, InvoiceError> {
    let mut invoice = load_invoice(repos, invoice_id).await?;

    let next = match (invoice.approval_status, request.level) {
        (ApprovalStatus::PendingManager, ApprovalLevel::Manager) => ApprovalStatus::PendingAccounting,
        (ApprovalStatus::PendingAccounting, ApprovalLevel::Accounting) => ApprovalStatus::Approved,
        (status, level) => {
            tracing::warn!(
                invoice_id = %invoice_id,
                status = status.as_str(),
                level = level.as_str(),
                "Approval out of sequence"
            );
            return Err(InvoiceError::InvalidState(format!(
                "la factura está en estado '{}' y no admite aprobación de nivel '{}'",
                status.as_str(),
                level.as_str()
            )));
        }
    };

    let now = Utc::now();
    invoice.approvals.push(InvoiceApproval {
        level: request.level,
        action: ApprovalAction::Approved,
        actor_id: request.actor_id.clone(),
        comment: request.comment.clone(),
        decided_at: now,
    });
    invoice.approval_status = next;
    invoice.updated_at = now;
    repos.invoices.save_invoice(&invoice).await?;

    tracing::info!(
        invoice_id = %invoice_id,
        actor_id = %request.actor_id,
        approval_status = next.as_str(),
        "Invoice approved"
    );

    Ok(invoice)
}

/// Reject a pending invoice at whichever step it is waiting for
pub async fn reject_invoice(
    repos: &Repositories,
    invoice_id: Uuid,
    request: &RejectInvoiceRequest,
) -> Result<InvoiceReceived, InvoiceError> {
    let mut invoice = load_invoice(repos, invoice_id).await?;

    let level = match invoice.approval_status {
        ApprovalStatus::PendingManager => ApprovalLevel::Manager,
        ApprovalStatus::PendingAccounting => ApprovalLevel::Accounting,
        status => {
            return Err(InvoiceError::InvalidState(format!(
                "la factura ya está en estado final '{}'",
                status.as_str()
            )))
        }
    };

    let now = Utc::now();
    invoice.approvals.push(InvoiceApproval {
        level,
        action: ApprovalAction::Rejected,
        actor_id: request.actor_id.clone(),
        comment: request.comment.clone(),
        decided_at: now,
    });
    invoice.approval_status = ApprovalStatus::Rejected;
    invoice.updated_at = now;
    repos.invoices.save_invoice(&invoice).await?;

    tracing::info!(invoice_id = %invoice_id, actor_id = %request.actor_id, "Invoice rejected");

    Ok(invoice)
}

/// Ledger lines for an approved invoice
///
/// One debit per line account for its subtotal, input VAT for the rest of
/// the total and one credit to the supplier account. The VAT line absorbs
/// the rounding residue so the entry balances exactly; a negative residue
/// is taken from the largest debits, and a debit it empties is dropped.
pub fn invoice_entry_lines(invoice: &InvoiceReceived, rules: &BusinessRules) -> Vec<EntryLineInput> {
    let mut lines: Vec<EntryLineInput> = invoice
        .lines
        .iter()
        .filter(|l| l.subtotal > Decimal::ZERO)
        .map(|l| {
            let mut line = EntryLineInput::debit(&l.account_code, l.subtotal);
            line.description = Some(l.description.clone());
            line
        })
        .collect();

    let expense_total: Decimal = lines.iter().map(|l| l.amount).sum();
    let vat = invoice.total - expense_total;
    if vat > Decimal::ZERO {
        let mut line = EntryLineInput::debit(&rules.input_vat_account_code, vat);
        line.description = Some("IVA soportado".to_string());
        lines.push(line);
    } else if vat < Decimal::ZERO {
        // Only reachable through rounding on untaxed lines
        let mut residue = -vat;
        let mut by_amount: Vec<usize> = (0..lines.len()).collect();
        by_amount.sort_by(|a, b| lines[*b].amount.cmp(&lines[*a].amount));
        for idx in by_amount {
            if residue.is_zero() {
                break;
            }
            let taken = residue.min(lines[idx].amount);
            lines[idx].amount -= taken;
            residue -= taken;
        }
        lines.retain(|l| l.amount > Decimal::ZERO);
    }

    let mut supplier = EntryLineInput::credit(&rules.supplier_account_code, invoice.total);
    supplier.description = Some(format!("Proveedor {}", invoice.supplier_id));
    lines.push(supplier);
    lines
}

/// Post an approved invoice to the ledger; allowed once
pub async fn post_invoice_to_ledger(
    repos: &Repositories,
    rules: &BusinessRules,
    invoice_id: Uuid,
    request: &PostInvoiceRequest,
) -> Result<(InvoiceReceived, EntryWithLines), InvoiceError> {
    let mut invoice = load_invoice(repos, invoice_id).await?;

    if invoice.approval_status != ApprovalStatus::Approved {
        return Err(InvoiceError::InvalidState(format!(
            "solo se contabilizan facturas aprobadas (estado actual '{}')",
            invoice.approval_status.as_str()
        )));
    }
    if let Some(entry_id) = invoice.journal_entry_id {
        return Err(InvoiceError::InvalidState(format!(
            "la factura ya está contabilizada en el asiento {}",
            entry_id
        )));
    }
    if invoice.total <= Decimal::ZERO {
        return Err(InvoiceError::Validation(
            "una factura sin importe no genera asiento".to_string(),
        ));
    }

    let entry_request = CreateEntryRequest {
        centro_code: invoice.centro_code.clone(),
        entry_date: invoice.invoice_date,
        description: format!("Factura recibida {}", invoice.invoice_number),
        lines: invoice_entry_lines(&invoice, rules),
        created_by: request.actor_id.clone(),
    };
    let entry = prepare_entry(repos, &entry_request, EntryStatus::Posted).await?;

    // The entry write and the link commit together; a concurrent post loses here
    let linked = repos
        .invoices
        .post_invoice_entry(invoice_id, &entry)
        .await
        .map_err(|e| match e {
            RepoError::PeriodClosed(date) => InvoiceError::Journal(JournalError::PeriodClosed(date)),
            other => InvoiceError::Repository(other),
        })?;
    if !linked {
        tracing::warn!(invoice_id = %invoice_id, "Invoice posted concurrently, entry discarded");
        return Err(InvoiceError::InvalidState(
            "la factura ya está contabilizada".to_string(),
        ));
    }

    invoice.journal_entry_id = Some(entry.entry.id);
    invoice.updated_at = Utc::now();

    tracing::info!(
        invoice_id = %invoice_id,
        entry_id = %entry.entry.id,
        entry_number = entry.entry.entry_number,
        "Invoice posted to ledger"
    );

    Ok((invoice, entry))
}
