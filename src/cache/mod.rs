//! Memoization of report results keyed by report name and normalized
//! parameters.

mod result_cache;

pub use result_cache::{CacheEntry, CacheKey, ResultCache};
