//! Bounded content cache
//!
//! A set of named folders under one base directory, reused across install
//! operations and evicted by recency. Population is the caller's job; the
//! cache only hands out paths, refreshes recency, and sweeps.

pub mod store;

pub use store::{format_bytes, key_for_url, CacheEntry, ContentCache};
