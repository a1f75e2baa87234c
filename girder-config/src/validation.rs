// Configuration validation

use crate::{ConfigError, Result};
use std::fmt::Display;

/// Trait for validating configuration
pub trait Validate {
    fn validate(&self) -> Result<()>;
}

/// Reusable validation rules
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate that a value is not empty
    pub fn not_empty(value: &str, field: &str) -> Result<()> {
        if value.trim().is_empty() {
            return Err(ConfigError::ValidationError(format!("{field} cannot be empty")));
        }
        Ok(())
    }

    /// Validate that a number is within range (inclusive)
    pub fn in_range<T: PartialOrd + Display>(value: T, min: T, max: T, field: &str) -> Result<()> {
        if value < min || value > max {
            return Err(ConfigError::ValidationError(format!(
                "{field} must be between {min} and {max}, got {value}"
            )));
        }
        Ok(())
    }

    /// Validate that a value is in a list of allowed values
    pub fn one_of<T: PartialEq + Display>(value: &T, allowed: &[T], field: &str) -> Result<()> {
        if !allowed.contains(value) {
            let allowed = allowed
                .iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            return Err(ConfigError::ValidationError(format!(
                "{field} must be one of [{allowed}], got {value}"
            )));
        }
        Ok(())
    }
}
