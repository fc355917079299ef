//! Custom validation functions shared across configuration sections.

use validator::ValidationError;

/// Ring capacities must be powers of two for masked index arithmetic.
pub fn validate_power_of_two(value: usize) -> Result<(), ValidationError> {
    if value.is_power_of_two() {
        Ok(())
    } else {
        Err(ValidationError::new("must_be_power_of_two"))
    }
}

/// Scheduler overflow policy must be one of the known names.
pub fn validate_overflow_policy(policy: &str) -> Result<(), ValidationError> {
    if ["drop", "abort"].contains(&policy.to_lowercase().as_str()) {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_overflow_policy"))
    }
}

/// Association keys are 16 bytes, written as 32 hex characters.
pub fn validate_key_hex(key: &str) -> Result<(), ValidationError> {
    let ok = key.len() == 32 && key.chars().all(|c| c.is_ascii_hexdigit());
    if ok {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_association_key"))
    }
}
