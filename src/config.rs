//! Engine configuration.
//!
//! Both engines are constructed with plain config structs; the defaults
//! match the shipping app and tests override individual fields.

use chrono::Duration;

/// Default entry time-to-live in hours.
/// Reference data (universities, scholarships, careers) changes on the
/// order of days, so a daily refresh keeps it current without hammering
/// the backend from metered connections.
const DEFAULT_TTL_HOURS: i64 = 24;

/// Ceiling on a single serialized cache entry, in bytes.
/// 10 MiB keeps a runaway dataset from exhausting storage on low-end
/// devices; anything larger is rejected at write time.
const MAX_ENTRY_BYTES: usize = 10 * 1024 * 1024;

/// Failed deliveries allowed before an action is dropped for good.
const MAX_ACTION_RETRIES: u32 = 3;

/// Hours after a successful sync before data counts as stale.
const FRESHNESS_WINDOW_HOURS: i64 = 24;

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// TTL applied when `set` is called without an explicit one.
    pub default_ttl: Duration,
    /// Maximum serialized entry size accepted by `set`.
    pub max_entry_bytes: usize,
    /// When true, expired entries are still served on read and callers
    /// may refresh them in the background.
    pub stale_while_revalidate: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::hours(DEFAULT_TTL_HOURS),
            max_entry_bytes: MAX_ENTRY_BYTES,
            stale_while_revalidate: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Delivery attempts per queued action before it is dropped.
    pub max_action_retries: u32,
    /// Age of the last successful sync beyond which status reports stale.
    pub freshness_window: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_action_retries: MAX_ACTION_RETRIES,
            freshness_window: Duration::hours(FRESHNESS_WINDOW_HOURS),
        }
    }
}
