use thiserror::Error;

use crate::tax_id;
use crate::types::CompanyRecord;

pub const FANTASY_NAME_MIN: usize = 2;
pub const FANTASY_NAME_MAX: usize = 100;
pub const CORPORATE_NAME_MIN: usize = 5;
pub const CORPORATE_NAME_MAX: usize = 150;

/// Companies at or above this headcount must declare a minimum number of
/// accessible positions.
pub const ACCESSIBLE_QUOTA_THRESHOLD: i64 = 100;

/// First rule a company record broke.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("company id is required")]
    MissingId,
    #[error("tax id is required")]
    TaxIdRequired,
    #[error("tax id is invalid")]
    TaxIdInvalid,
    #[error("fantasy name is required")]
    FantasyNameRequired,
    #[error("fantasy name must have at least 2 characters")]
    FantasyNameTooShort,
    #[error("fantasy name must have at most 100 characters")]
    FantasyNameTooLong,
    #[error("corporate name is required")]
    CorporateNameRequired,
    #[error("corporate name must have at least 5 characters")]
    CorporateNameTooShort,
    #[error("corporate name must have at most 150 characters")]
    CorporateNameTooLong,
    #[error("employee count cannot be negative")]
    NegativeEmployeeCount,
    #[error("minimum accessible employee count cannot be negative")]
    NegativeMinAccessible,
    #[error("minimum accessible employee count cannot exceed the employee count")]
    MinAccessibleExceedsEmployees,
    #[error("minimum accessible employee count is required for companies with 100 or more employees")]
    MinAccessibleRequired,
    #[error("address is required")]
    AddressRequired,
    #[error("employee count is required")]
    EmployeeCountRequired,
}

/// Runs every rule against `record`, stopping at the first failure.
///
/// Rules run in a fixed order: tax id, names, numeric fields, required
/// fields. On success the tax id has been rewritten to its normalized form.
pub fn validate(record: &mut CompanyRecord) -> Result<(), ValidationError> {
    check_tax_id(record)?;
    check_names(record)?;
    check_numbers(record)?;
    check_required(record)
}

fn check_tax_id(record: &mut CompanyRecord) -> Result<(), ValidationError> {
    if record.tax_id.is_empty() {
        return Err(ValidationError::TaxIdRequired);
    }

    let normalized = tax_id::normalize(&record.tax_id);
    if !tax_id::is_valid(&normalized) {
        return Err(ValidationError::TaxIdInvalid);
    }

    record.tax_id = normalized;
    Ok(())
}

fn check_names(record: &CompanyRecord) -> Result<(), ValidationError> {
    check_length(
        &record.fantasy_name,
        FANTASY_NAME_MIN,
        FANTASY_NAME_MAX,
        [
            ValidationError::FantasyNameRequired,
            ValidationError::FantasyNameTooShort,
            ValidationError::FantasyNameTooLong,
        ],
    )?;
    check_length(
        &record.corporate_name,
        CORPORATE_NAME_MIN,
        CORPORATE_NAME_MAX,
        [
            ValidationError::CorporateNameRequired,
            ValidationError::CorporateNameTooShort,
            ValidationError::CorporateNameTooLong,
        ],
    )
}

// Lengths are counted in code points, not bytes.
fn check_length(
    value: &str,
    min: usize,
    max: usize,
    [required, too_short, too_long]: [ValidationError; 3],
) -> Result<(), ValidationError> {
    if value.is_empty() {
        return Err(required);
    }
    let len = value.chars().count();
    if len < min {
        return Err(too_short);
    }
    if len > max {
        return Err(too_long);
    }
    Ok(())
}

fn check_numbers(record: &CompanyRecord) -> Result<(), ValidationError> {
    if record.employee_count < 0 {
        return Err(ValidationError::NegativeEmployeeCount);
    }
    if record.min_accessible_employee_count < 0 {
        return Err(ValidationError::NegativeMinAccessible);
    }
    if record.min_accessible_employee_count > record.employee_count {
        return Err(ValidationError::MinAccessibleExceedsEmployees);
    }
    if record.employee_count >= ACCESSIBLE_QUOTA_THRESHOLD
        && record.min_accessible_employee_count == 0
    {
        return Err(ValidationError::MinAccessibleRequired);
    }
    Ok(())
}

fn check_required(record: &CompanyRecord) -> Result<(), ValidationError> {
    if record.tax_id.is_empty() {
        return Err(ValidationError::TaxIdRequired);
    }
    if record.fantasy_name.is_empty() {
        return Err(ValidationError::FantasyNameRequired);
    }
    if record.corporate_name.is_empty() {
        return Err(ValidationError::CorporateNameRequired);
    }
    if record.address.is_empty() {
        return Err(ValidationError::AddressRequired);
    }
    // Zero headcount passes the numeric rules but cannot be persisted.
    if record.employee_count == 0 {
        return Err(ValidationError::EmployeeCountRequired);
    }
    Ok(())
}
