//! Retry policy for remote-store calls: error classification, bounded
//! exponential backoff with jitter, and the normalized [`StoreError`].

pub mod classify;
pub mod error;
pub mod policy;

pub use classify::{classify, ErrorCode, Verdict};
pub use error::{RemoteError, StoreError, StoreResult};
pub use policy::RetryPolicy;
