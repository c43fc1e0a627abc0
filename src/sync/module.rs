//! Bulk-syncable data modules.
//!
//! A data module names one dataset (universities, scholarships, ...)
//! together with the provider that produces a fresh snapshot of it. The
//! sync engine walks the registered list in order, so registration
//! order is the priority order and drives the progress percentage.

use std::fmt;
use std::future::Future;

use chrono::Duration;
use futures::future::BoxFuture;
use serde::Serialize;
use serde_json::Value;

type Provider = Box<dyn Fn() -> BoxFuture<'static, anyhow::Result<Value>> + Send + Sync>;

pub struct DataModule {
    /// Stable identifier used in logs.
    pub key: String,
    /// Human-readable name for progress UI.
    pub display_name: String,
    /// Cache key the snapshot is written under.
    pub cache_key: String,
    pub ttl: Duration,
    /// A critical module failing aborts the whole sync; a non-critical
    /// one is skipped with a logged error.
    pub is_critical: bool,
    provider: Provider,
}

impl DataModule {
    pub fn new<F, Fut, T>(
        key: impl Into<String>,
        display_name: impl Into<String>,
        cache_key: impl Into<String>,
        ttl: Duration,
        provider: F,
    ) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
        T: Serialize,
    {
        Self {
            key: key.into(),
            display_name: display_name.into(),
            cache_key: cache_key.into(),
            ttl,
            is_critical: false,
            provider: Box::new(move || {
                let fut = provider();
                Box::pin(async move {
                    let snapshot = fut.await?;
                    Ok(serde_json::to_value(snapshot)?)
                })
            }),
        }
    }

    pub fn critical(mut self) -> Self {
        self.is_critical = true;
        self
    }

    /// Produce a fresh snapshot of the dataset.
    pub(crate) async fn load(&self) -> anyhow::Result<Value> {
        (self.provider)().await
    }
}

impl fmt::Debug for DataModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataModule")
            .field("key", &self.key)
            .field("display_name", &self.display_name)
            .field("cache_key", &self.cache_key)
            .field("ttl", &self.ttl)
            .field("is_critical", &self.is_critical)
            .finish_non_exhaustive()
    }
}
