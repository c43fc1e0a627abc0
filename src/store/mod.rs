//! Key-value persistence capability.
//!
//! The cache and sync engines never touch the filesystem or platform
//! storage directly; everything goes through the [`KeyValueStore`] trait.
//! The backing primitive may be synchronous (MMKV-style) or asynchronous,
//! so the interface is uniformly async and implementations bridge as
//! needed.
//!
//! Two implementations ship with the crate:
//! - [`MemoryStore`]: plain in-memory map, used by tests and previews
//! - [`FileStore`]: a single JSON file under the platform cache directory

pub mod file;
pub mod memory;

use async_trait::async_trait;
use thiserror::Error;

pub use file::FileStore;
pub use memory::MemoryStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization failure: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// String-keyed read/write of serialized values.
///
/// Implementations must tolerate arbitrary keys and treat values as
/// opaque strings; all encoding decisions live with the callers.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get_string(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn set_string(&self, key: &str, value: &str) -> Result<(), StoreError>;

    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Every key currently present, in no particular order.
    async fn get_all_keys(&self) -> Result<Vec<String>, StoreError>;
}
