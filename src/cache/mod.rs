//! Single-slot TTL cache for the most recent verdict.

pub mod result_cache;

pub use result_cache::{CacheStats, ResultCache};
