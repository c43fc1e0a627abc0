//! Two-tier local cache for offline data access.
//!
//! The [`CacheEngine`] layers an in-memory map over the persistent
//! key-value store. Entries carry timestamp, expiry, and schema-version
//! metadata; expired entries can still be served under the
//! stale-while-revalidate policy while a background refresh runs.
//!
//! The cache is advisory, never authoritative: every operation absorbs
//! its own failures and the app must stay correct if every call here
//! returned `None`.

pub mod engine;
pub mod entry;

pub use engine::{CacheEngine, CACHE_VERSION};
pub use entry::{CacheEntry, CacheStats};
