//! Persistence for generated specifications.
//!
//! - `SpecCache`: namespaced, keyed by image reference

pub mod spec_cache;

pub use spec_cache::{CacheEntry, SpecCache};
