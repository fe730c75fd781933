// crates/config/src/validation.rs
//! Validation for configuration values
//!
//! Every config section implements [`ConfigSection`]; [`Validator`] holds
//! the field checks they share.

pub use crate::error::ValidationError;

/// A named block of the config file that can check and merge itself
pub trait ConfigSection: Default {
    /// Returns every problem found, not just the first
    fn validate(&self) -> Result<(), Vec<ValidationError>>;

    /// Takes values from `other` (defaults < file < env overrides)
    fn merge(&mut self, other: Self);

    fn section_name(&self) -> &'static str;
}

/// Common validators for config values
pub struct Validator;

impl Validator {
    /// Validates that a numeric value is within `[min, max]`
    pub fn in_range<T>(value: T, min: T, max: T, field: &str) -> Result<(), ValidationError>
    where
        T: PartialOrd + std::fmt::Display + Copy,
    {
        if value < min || value > max {
            Err(ValidationError::with_value(
                field,
                format!("must be between {} and {}", min, max),
                value,
            ))
        } else {
            Ok(())
        }
    }

    pub fn not_empty(value: &str, field: &str) -> Result<(), ValidationError> {
        if value.trim().is_empty() {
            Err(ValidationError::new(field, "must not be empty"))
        } else {
            Ok(())
        }
    }

    /// Validates an absolute `http://` or `https://` URL with a host
    pub fn http_url(value: &str, field: &str) -> Result<(), ValidationError> {
        let rest = value
            .strip_prefix("https://")
            .or_else(|| value.strip_prefix("http://"));

        match rest {
            Some(rest) if !rest.is_empty() && !rest.starts_with('/') => Ok(()),
            _ => Err(ValidationError::with_value(
                field,
                "must be an http:// or https:// URL",
                value,
            )),
        }
    }

    /// Validates a server endpoint: an absolute URL or a `/`-rooted path
    pub fn endpoint(value: &str, field: &str) -> Result<(), ValidationError> {
        if value.starts_with('/') && value.len() > 1 {
            return Ok(());
        }
        Self::http_url(value, field).map_err(|_| {
            ValidationError::with_value(field, "must be a URL or start with '/'", value)
        })
    }

    /// Collects multiple validation results into a single result
    pub fn collect_errors(
        results: Vec<Result<(), ValidationError>>,
    ) -> Result<(), Vec<ValidationError>> {
        let errors: Vec<ValidationError> = results.into_iter().filter_map(|r| r.err()).collect();

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
