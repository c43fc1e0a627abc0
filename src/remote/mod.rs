//! Remote backend capability.
//!
//! One method per user action the app can push upstream. The engines
//! treat every rejection identically (one failed delivery attempt), so
//! implementations are free to map transport detail into [`RemoteError`]
//! however they like.

pub mod error;
pub mod http;

use async_trait::async_trait;
use serde_json::Value;

pub use error::RemoteError;
pub use http::HttpBackend;

#[async_trait]
pub trait RemoteBackend: Send + Sync {
    async fn submit_vote(
        &self,
        poll_id: &str,
        option_id: &str,
        user_id: &str,
    ) -> Result<(), RemoteError>;

    async fn update_follow(&self, payload: &Value) -> Result<(), RemoteError>;

    async fn save_calculation(&self, payload: &Value) -> Result<(), RemoteError>;

    async fn update_favorite(&self, payload: &Value) -> Result<(), RemoteError>;

    async fn submit_feedback(&self, payload: &Value) -> Result<(), RemoteError>;
}
