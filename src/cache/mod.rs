//! In-process TTL cache in front of the remote store.

pub mod stats;
pub mod ttl;

pub use stats::{CacheSnapshot, CacheStats};
pub use ttl::TtlCache;
