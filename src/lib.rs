//! Offline-first cache and synchronization core for the Taleem student
//! app.
//!
//! The app is a content browser - universities, scholarships, careers,
//! polls - used heavily on metered and intermittent connections, so
//! everything here assumes the network is optional:
//!
//! - [`cache::CacheEngine`]: two-tier (memory + persistent) cache with
//!   TTL expiry and stale-while-revalidate reads
//! - [`sync::SyncEngine`]: prioritized bulk loading of data modules,
//!   sync status/progress for subscribers, and a persisted offline
//!   action queue with bounded retry
//! - [`vote::VoteManager`]: the local-first mutation pattern used by
//!   poll voting
//!
//! Platform capabilities - key-value storage, reachability detection,
//! the remote backend - are consumed through traits and injected at
//! construction, so every piece runs unchanged against in-memory fakes
//! in tests.

pub mod cache;
pub mod config;
pub mod connectivity;
pub mod models;
pub mod remote;
pub mod store;
pub mod sync;
pub mod vote;

pub use cache::{CacheEngine, CacheEntry, CacheStats};
pub use config::{CacheConfig, SyncConfig};
pub use connectivity::{ConnectivityMonitor, ConnectivityState};
pub use models::{Poll, PollOption, UserIdentity};
pub use remote::{HttpBackend, RemoteBackend, RemoteError};
pub use store::{FileStore, KeyValueStore, MemoryStore, StoreError};
pub use sync::{ActionPayload, DataFreshness, DataModule, OfflineAction, SyncEngine, SyncStatus};
pub use vote::{VoteManager, VoteOutcome};
