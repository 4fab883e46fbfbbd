use thiserror::Error;

/// Input rejected before any store is touched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{0} is required")]
    Missing(&'static str),
    #[error("{field} is invalid: {reason}")]
    Invalid { field: &'static str, reason: String },
    #[error("complexity must be between 1 and 5, got {0}")]
    Complexity(u8),
    #[error("passwords do not match")]
    PasswordMismatch,
    #[error("the terms of service must be accepted")]
    TermsNotAccepted,
    #[error("expert accounts must be at least {min} years old")]
    TooYoung { min: i32 },
    #[error("guest sessions cannot submit consultations")]
    GuestRestricted,
}

pub(crate) fn require(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::Missing(field));
    }
    Ok(())
}
