//! Error codes reported by remote-store backends and the single table that
//! decides which of them are worth another attempt.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Normalized failure category for a remote-store call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Quota or rate limit exceeded (HTTP 429, `rateLimitExceeded`).
    RateLimited,
    /// Backend temporarily unavailable (HTTP 5xx).
    Unavailable,
    /// Connection could not be established or was reset.
    Network,
    /// The call did not complete in time.
    Timeout,
    /// Malformed request or range.
    InvalidArgument,
    /// Spreadsheet or sheet does not exist.
    NotFound,
    /// Credentials rejected or missing access.
    PermissionDenied,
    /// Stored layout does not match the expected columns.
    Schema,
    /// Anything the adapters could not map.
    Unknown,
}

impl ErrorCode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RateLimited => "rate_limited",
            Self::Unavailable => "unavailable",
            Self::Network => "network",
            Self::Timeout => "timeout",
            Self::InvalidArgument => "invalid_argument",
            Self::NotFound => "not_found",
            Self::PermissionDenied => "permission_denied",
            Self::Schema => "schema",
            Self::Unknown => "unknown",
        }
    }

    /// Map an HTTP status code to an error category.
    pub fn from_http_status(status: u16) -> Self {
        match status {
            429 => Self::RateLimited,
            408 => Self::Timeout,
            400 => Self::InvalidArgument,
            401 | 403 => Self::PermissionDenied,
            404 => Self::NotFound,
            500..=599 => Self::Unavailable,
            _ => Self::Unknown,
        }
    }

    pub fn is_retryable(self) -> bool {
        classify(self) == Verdict::Retryable
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of classifying a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Retryable,
    Fatal,
}

/// Decide whether a failure with `code` may succeed on a later attempt.
pub fn classify(code: ErrorCode) -> Verdict {
    match code {
        ErrorCode::RateLimited
        | ErrorCode::Unavailable
        | ErrorCode::Network
        | ErrorCode::Timeout => Verdict::Retryable,
        ErrorCode::InvalidArgument
        | ErrorCode::NotFound
        | ErrorCode::PermissionDenied
        | ErrorCode::Schema
        | ErrorCode::Unknown => Verdict::Fatal,
    }
}
