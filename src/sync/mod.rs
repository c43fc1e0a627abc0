//! Network-aware synchronization.
//!
//! This module owns everything between the cache and the network:
//!
//! - [`DataModule`]: declarative registration of bulk-syncable datasets
//! - [`SyncEngine`]: prioritized bulk loads, status/progress reporting,
//!   and the persisted offline action queue with bounded retry
//! - [`ActionPayload`] / [`OfflineAction`]: queued user mutations

pub mod action;
pub mod engine;
pub mod module;

pub use action::{ActionPayload, OfflineAction};
pub use engine::{DataFreshness, SyncEngine, SyncListener, SyncStatus};
pub use module::DataModule;
