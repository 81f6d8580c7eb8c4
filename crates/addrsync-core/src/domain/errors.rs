//! Domain error types
//!
//! Validation failures raised while constructing or checking domain values.

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Invalid email address format
    #[error("Invalid email format: {0}")]
    InvalidEmail(String),

    /// Invalid server URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// A source configuration is incomplete or inconsistent
    #[error("Invalid source configuration: {0}")]
    InvalidSourceConfig(String),

    /// Unknown source type string
    #[error("Unknown source type: {0}")]
    UnknownSourceType(String),

    /// Generic validation failure
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    /// ID parsing error
    #[error("Invalid ID format: {0}")]
    InvalidId(String),
}
