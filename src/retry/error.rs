//! Error types shared by every remote-store operation.
//!
//! Backends report [`RemoteError`]; the retry policy turns whatever the last
//! attempt produced into a [`StoreError`], which is the only error shape the
//! report store surfaces to callers.

use super::classify::ErrorCode;
use thiserror::Error;

/// Alias for `Result<T, StoreError>`.
pub type StoreResult<T> = Result<T, StoreError>;

/// A single failed call against a remote-store backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {message}")]
pub struct RemoteError {
    pub code: ErrorCode,
    pub message: String,
}

impl RemoteError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Normalized failure of a report-store operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{operation} failed with {code} after {attempts} attempt(s): {message}")]
pub struct StoreError {
    pub code: ErrorCode,
    pub operation: String,
    pub attempts: u32,
    /// Diagnostic text of the last underlying failure.
    pub message: String,
}

impl StoreError {
    pub fn from_remote(operation: &str, attempts: u32, error: RemoteError) -> Self {
        Self {
            code: error.code,
            operation: operation.to_string(),
            attempts,
            message: error.message,
        }
    }

    /// A failure detected locally, before any remote call was made.
    pub fn rejected(operation: &str, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            operation: operation.to_string(),
            attempts: 0,
            message: message.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_error_display_names_operation_and_attempts() {
        let err = StoreError::from_remote(
            "append_rows",
            4,
            RemoteError::new(ErrorCode::Unavailable, "backend error"),
        );
        let text = err.to_string();
        assert!(text.contains("append_rows"));
        assert!(text.contains("unavailable"));
        assert!(text.contains("4 attempt"));
        assert!(text.contains("backend error"));
    }

    #[test]
    fn rejected_error_has_no_attempts() {
        let err = StoreError::rejected("save_report", ErrorCode::InvalidArgument, "incomplete");
        assert_eq!(err.attempts, 0);
        assert!(!err.is_retryable());
    }
}
