pub mod ledger;
pub mod message;
pub mod session;
pub mod trip;
pub mod user;

use crate::error::AppError;

pub(crate) fn normalize_optional(input: Option<String>) -> Option<String> {
    input.and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

/// Trimmed, non-empty and at most `max_chars` characters long.
pub(crate) fn required_text(
    input: Option<String>,
    field: &str,
    max_chars: usize,
) -> Result<String, AppError> {
    let value =
        normalize_optional(input).ok_or_else(|| AppError::bad_request(format!("{field} is required")))?;
    ensure_max_len(&value, field, max_chars)?;
    Ok(value)
}

pub(crate) fn ensure_max_len(value: &str, field: &str, max_chars: usize) -> Result<(), AppError> {
    if value.chars().count() > max_chars {
        return Err(AppError::bad_request(format!(
            "{field} must be at most {max_chars} characters"
        )));
    }
    Ok(())
}

pub(crate) fn non_negative(value: f64, field: &str) -> Result<f64, AppError> {
    if !value.is_finite() || value < 0.0 {
        return Err(AppError::bad_request(format!(
            "{field} must be a non-negative number"
        )));
    }
    Ok(value)
}
