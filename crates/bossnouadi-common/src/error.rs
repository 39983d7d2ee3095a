//! Error types for BossNouadi
//!
//! This module defines the error types shared across the BossNouadi crates.
//! All errors are designed to be user-friendly and provide clear context
//! about what went wrong.

use std::io;
use thiserror::Error;

/// BossNouadi error types
#[derive(Debug, Error)]
pub enum NouadiError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// Authentication error
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Resource not found
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Other error
    #[error("Error: {0}")]
    Other(String),
}

/// Result type for BossNouadi operations
pub type Result<T> = std::result::Result<T, NouadiError>;

impl NouadiError {
    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new database error
    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    /// Create a new validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

impl From<serde_json::Error> for NouadiError {
    fn from(err: serde_json::Error) -> Self {
        NouadiError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn test_error_display() {
        let err = NouadiError::Config("test".to_string());
        assert_eq!(err.to_string(), "Configuration error: test");

        let err = NouadiError::Database("test".to_string());
        assert_eq!(err.to_string(), "Database error: test");

        let err = NouadiError::Validation("test".to_string());
        assert_eq!(err.to_string(), "Validation error: test");

        let err = NouadiError::NotFound("test".to_string());
        assert_eq!(err.to_string(), "Resource not found: test");
    }

    #[test]
    fn test_error_conversion_from_io() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "test");
        let err: NouadiError = io_err.into();
        assert!(err.to_string().contains("IO error"));
    }

    #[test]
    fn test_error_conversion_from_serde() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let err: NouadiError = json_err.into();
        assert!(err.to_string().contains("Serialization error"));
    }
}
