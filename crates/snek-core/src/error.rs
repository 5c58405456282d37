//! Domain-specific error types following panic-free policy.

use thiserror::Error;

/// Errors that can occur in domain operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value could not be interpreted as a snowflake id
    #[error("Invalid snowflake: {value}")]
    InvalidSnowflake { value: String },

    /// A status string did not name a known status
    #[error("`{value}` is not a valid status type")]
    InvalidStatus { value: String },

    /// Invalid field value
    #[error("Invalid {field}: {value} (expected {expected})")]
    InvalidFieldValue {
        field: String,
        value: String,
        expected: String,
    },

    /// Parse error for incoming data
    #[error("Failed to parse {field}: {reason}")]
    ParseError { field: String, reason: String },
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_error_display() {
        let err = DomainError::InvalidSnowflake {
            value: "abc".to_string(),
        };
        assert_eq!(err.to_string(), "Invalid snowflake: abc");

        let err = DomainError::InvalidStatus {
            value: "sleepy".to_string(),
        };
        assert_eq!(err.to_string(), "`sleepy` is not a valid status type");
    }
}
