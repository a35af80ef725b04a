//! Result Cache
//!
//! Memoizes poll results for a few seconds so that bursts of client polling
//! collapse into one upstream round trip.

mod cache;

pub use cache::{CacheConfig, Lookup, ResultCache};
