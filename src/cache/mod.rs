//! In-memory content-addressed artifact cache.

pub mod content;

pub use content::{CacheEntry, ContentCache, DEFAULT_CAPACITY};
