//! Validation helper functions for configuration types.

use crate::core::errors::{PulseError, Result};

/// Validate that a usize value is greater than zero.
pub fn validate_positive_usize(value: usize, field: &str) -> Result<()> {
    if value == 0 {
        return Err(PulseError::validation(format!(
            "{} must be greater than 0",
            field
        )));
    }
    Ok(())
}

/// Validate that a u64 value is greater than zero.
pub fn validate_positive_u64(value: u64, field: &str) -> Result<()> {
    if value == 0 {
        return Err(PulseError::validation(format!(
            "{} must be greater than 0",
            field
        )));
    }
    Ok(())
}

/// Validate that a usize value is within a bounded range (inclusive).
pub fn validate_bounded_usize(value: usize, min: usize, max: usize, field: &str) -> Result<()> {
    if value < min || value > max {
        return Err(PulseError::validation(format!(
            "{} must be between {} and {}",
            field, min, max
        )));
    }
    Ok(())
}

/// Validate that an optional directory setting is not an empty string.
pub fn validate_optional_path(value: Option<&std::path::Path>, field: &str) -> Result<()> {
    if let Some(path) = value {
        if path.as_os_str().is_empty() {
            return Err(PulseError::validation(format!(
                "{} must not be empty when set",
                field
            )));
        }
    }
    Ok(())
}
