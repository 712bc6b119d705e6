use thiserror::Error;
use uuid::Uuid;

use crate::contracts::journal_entry_v1::OpenFiscalYearRequest;
use crate::repos::period_repo::{FiscalYear, PeriodStatus};
use crate::repos::{RepoError, Repositories};

#[derive(Debug, Error)]
pub enum FiscalYearError {
    #[error("Rango de fechas no válido: {0}")]
    InvalidRange(String),

    #[error("Ya existe el ejercicio {0} para el centro")]
    AlreadyExists(i32),

    #[error("Las fechas se solapan con el ejercicio {0}")]
    Overlap(i32),

    #[error("Error de persistencia: {0}")]
    Repository(#[from] RepoError),
}

/// Register a new open fiscal year for a centro
pub async fn open_fiscal_year(
    repos: &Repositories,
    request: &OpenFiscalYearRequest,
) -> Result<FiscalYear, FiscalYearError> {
    if request.centro_code.trim().is_empty() {
        return Err(FiscalYearError::InvalidRange(
            "el código de centro es obligatorio".to_string(),
        ));
    }
    if request.start_date >= request.end_date {
        return Err(FiscalYearError::InvalidRange(format!(
            "{} debe ser anterior a {}",
            request.start_date, request.end_date
        )));
    }

    let existing = repos.periods.list_fiscal_years(&request.centro_code).await?;
    if existing.iter().any(|fy| fy.year == request.year) {
        return Err(FiscalYearError::AlreadyExists(request.year));
    }
    if let Some(clash) = existing
        .iter()
        .find(|fy| fy.overlaps(request.start_date, request.end_date))
    {
        return Err(FiscalYearError::Overlap(clash.year));
    }

    let fiscal_year = FiscalYear {
        id: Uuid::new_v4(),
        centro_code: request.centro_code.clone(),
        year: request.year,
        start_date: request.start_date,
        end_date: request.end_date,
        status: PeriodStatus::Open,
        closing_date: None,
    };

    repos
        .periods
        .save_fiscal_year(&fiscal_year)
        .await
        .map_err(|e| match e {
            RepoError::Conflict(_) => FiscalYearError::AlreadyExists(request.year),
            other => FiscalYearError::Repository(other),
        })?;

    tracing::info!(
        fiscal_year_id = %fiscal_year.id,
        centro_code = %fiscal_year.centro_code,
        year = fiscal_year.year,
        "Fiscal year opened"
    );

    Ok(fiscal_year)
}
