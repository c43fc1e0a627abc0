use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A typed value wrapped with the metadata the engine needs to judge it.
///
/// Entries are never mutated in place; a new `set` replaces the whole
/// entry, and expiry is judged against `expires_at` at read time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    pub data: T,
    pub timestamp: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub schema_version: u32,
}

impl<T> CacheEntry<T> {
    pub fn new(data: T, ttl: Duration, schema_version: u32) -> Self {
        let now = Utc::now();
        Self {
            data,
            timestamp: now,
            expires_at: now + ttl,
            schema_version,
        }
    }

    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }

    /// True once the entry has been expired for a full extra period of
    /// its own TTL. Until then stale-while-revalidate may still serve it;
    /// past it, cleanup hard-deletes.
    pub fn is_past_grace(&self, now: DateTime<Utc>) -> bool {
        let ttl = self.expires_at - self.timestamp;
        now > self.expires_at + ttl
    }

    pub fn age_minutes(&self) -> i64 {
        (Utc::now() - self.timestamp).num_minutes()
    }

    /// Human-readable age for status bars ("just now", "5m ago", "2h ago").
    pub fn age_display(&self) -> String {
        format_age_minutes(self.age_minutes())
    }
}

/// Shared age formatting for entries and sync status.
pub(crate) fn format_age_minutes(minutes: i64) -> String {
    if minutes < 1 {
        // Also covers clock skew producing negative ages
        "just now".to_string()
    } else if minutes < 60 {
        format!("{}m ago", minutes)
    } else if minutes < 1440 {
        let hours = minutes / 60;
        if minutes % 60 >= 30 {
            format!("{}h ago", hours + 1)
        } else {
            format!("{}h ago", hours)
        }
    } else {
        let days = minutes / 1440;
        if (minutes % 1440) / 60 >= 12 {
            format!("{}d ago", days + 1)
        } else {
            format!("{}d ago", days)
        }
    }
}

/// Hit/miss counters accumulated for the life of the install.
///
/// Persisted after every change so they survive restarts; reset only by
/// a full `clear_all`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub total_entries: u64,
    pub hit_count: u64,
    pub miss_count: u64,
    pub last_cleanup_at: Option<DateTime<Utc>>,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hit_count + self.miss_count;
        if total == 0 {
            0.0
        } else {
            self.hit_count as f64 / total as f64
        }
    }
}
