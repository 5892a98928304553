//! Error types for Queuerator
//!
//! Module-level failures have their own `thiserror` enums
//! ([`CriteriaError`](crate::criteria::CriteriaError),
//! [`SourceError`](crate::source::SourceError)). This module holds the
//! top-level error raised while loading configuration and starting up.

use thiserror::Error;

/// Main error type for Queuerator startup and configuration
#[derive(Error, Debug)]
pub enum QueueratorError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Protocol detection pattern failed to compile
    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),
}

/// Result type alias for Queuerator operations
///
/// This is a convenience alias that uses `anyhow::Error` as the error type,
/// allowing for rich error context and easy error propagation.
pub type Result<T> = anyhow::Result<T>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let error = QueueratorError::Config("invalid format".to_string());
        assert_eq!(error.to_string(), "Configuration error: invalid format");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let error: QueueratorError = io_error.into();
        assert!(matches!(error, QueueratorError::Io(_)));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_error = serde_json::from_str::<serde_json::Value>("{invalid json}").unwrap_err();
        let error: QueueratorError = json_error.into();
        assert!(matches!(error, QueueratorError::Serialization(_)));
    }

    #[test]
    fn test_regex_error_conversion() {
        let regex_error = regex::Regex::new("(unclosed").unwrap_err();
        let error: QueueratorError = regex_error.into();
        assert!(matches!(error, QueueratorError::Regex(_)));
    }

    #[test]
    fn test_anyhow_result_alias() {
        fn fails() -> Result<()> {
            Err(QueueratorError::Config("bad".to_string()).into())
        }
        let err = fails().unwrap_err();
        assert!(err.downcast_ref::<QueueratorError>().is_some());
    }
}
