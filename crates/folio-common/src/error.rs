//! Error taxonomy for folio
//!
//! Every internal failure surfaces as an [`IndexError`] to the per-record
//! handler, which rolls back the write batch, releases staging resources,
//! and decides file disposition. The two predicates [`IndexError::is_fatal`]
//! and [`IndexError::is_retryable`] drive those decisions:
//!
//! - fatal errors abort the daemon process (identity integrity or backend
//!   schema can no longer be trusted)
//! - retryable errors leave the source file in place for a later scan
//! - everything else routes the source file to the error area

use thiserror::Error;

/// Result type alias for folio operations
pub type Result<T> = std::result::Result<T, IndexError>;

/// Main error type for folio
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Fatal error: {0}")]
    Fatal(String),
}

impl IndexError {
    /// Whether this error must abort the whole daemon process.
    ///
    /// Continuing after a fatal error risks corrupting further records.
    pub fn is_fatal(&self) -> bool {
        matches!(self, IndexError::Fatal(_) | IndexError::Config(_))
    }

    /// Whether the source file should be left in place for a retry on a
    /// later hotfolder scan, rather than moved to the error area.
    pub fn is_retryable(&self) -> bool {
        matches!(self, IndexError::Backend(_) | IndexError::Timeout(_))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(IndexError::Fatal("schema mismatch".into()).is_fatal());
        assert!(IndexError::Config("no repositories".into()).is_fatal());
        assert!(!IndexError::Validation("missing identifier".into()).is_fatal());
        assert!(!IndexError::Backend("503".into()).is_fatal());
    }

    #[test]
    fn test_retryable_classification() {
        assert!(IndexError::Backend("connection refused".into()).is_retryable());
        assert!(IndexError::Timeout("page generation".into()).is_retryable());
        assert!(!IndexError::Parse("bad xml".into()).is_retryable());
        assert!(!IndexError::Validation("empty".into()).is_retryable());
    }
}
