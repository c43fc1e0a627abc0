//! File-backed store implementation.
//!
//! All keys live in a single JSON document, loaded once at open and
//! rewritten on every mutation. Values are small serialized blobs, so a
//! whole-file rewrite stays cheap and keeps the on-disk format trivially
//! inspectable.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use super::{KeyValueStore, StoreError};

/// Application name used for the default store location
const APP_NAME: &str = "taleem";

/// Store file name
const STORE_FILE: &str = "store.json";

pub struct FileStore {
    path: PathBuf,
    entries: Mutex<HashMap<String, String>>,
}

impl FileStore {
    /// Open a store at the given path, loading any existing contents.
    ///
    /// A missing file is an empty store; a corrupt file is replaced on
    /// the next write rather than failing the open.
    pub fn open(path: PathBuf) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let entries = if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            match serde_json::from_str(&contents) {
                Ok(map) => map,
                Err(e) => {
                    debug!(?path, error = %e, "Store file unreadable, starting empty");
                    HashMap::new()
                }
            }
        } else {
            HashMap::new()
        };

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    /// Open a store at the platform default location
    /// (`<cache_dir>/taleem/store.json`).
    pub fn open_default() -> Result<Self, StoreError> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| StoreError::Unavailable("no cache directory".to_string()))?;
        Self::open(cache_dir.join(APP_NAME).join(STORE_FILE))
    }

    fn flush(&self, entries: &HashMap<String, String>) -> Result<(), StoreError> {
        let contents = serde_json::to_string(entries)?;
        std::fs::write(&self.path, contents)?;
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get_string(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn set_string(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().await;
        entries.insert(key.to_string(), value.to_string());
        self.flush(&entries)
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().await;
        if entries.remove(key).is_some() {
            self.flush(&entries)?;
        }
        Ok(())
    }

    async fn get_all_keys(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.entries.lock().await.keys().cloned().collect())
    }
}
