//! HTTP implementation of the remote backend.
//!
//! Thin JSON-over-REST client for the Taleem backend. Submissions are
//! fire-and-forget from the caller's point of view; the interesting
//! retry behavior lives in the sync engine's action queue, so this
//! client makes exactly one attempt per call and reports the outcome.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::debug;

use super::{RemoteBackend, RemoteError};

/// HTTP request timeout in seconds.
/// 30s tolerates slow mobile links while still failing fast enough that
/// a queued action gets retried on a later flush instead of hanging one.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Remote backend over HTTP.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>) -> Result<Self, RemoteError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            token: None,
        })
    }

    /// Attach a bearer token to every request.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    async fn post_json(&self, path: &str, body: &Value) -> Result<(), RemoteError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(%url, "Submitting to backend");

        let mut request = self.client.post(&url).json(body);
        if let Some(ref token) = self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(RemoteError::from_status(status, &body))
        }
    }
}

#[async_trait]
impl RemoteBackend for HttpBackend {
    async fn submit_vote(
        &self,
        poll_id: &str,
        option_id: &str,
        user_id: &str,
    ) -> Result<(), RemoteError> {
        self.post_json(
            &format!("/polls/{}/votes", poll_id),
            &json!({ "optionId": option_id, "userId": user_id }),
        )
        .await
    }

    async fn update_follow(&self, payload: &Value) -> Result<(), RemoteError> {
        self.post_json("/follows", payload).await
    }

    async fn save_calculation(&self, payload: &Value) -> Result<(), RemoteError> {
        self.post_json("/calculations", payload).await
    }

    async fn update_favorite(&self, payload: &Value) -> Result<(), RemoteError> {
        self.post_json("/favorites", payload).await
    }

    async fn submit_feedback(&self, payload: &Value) -> Result<(), RemoteError> {
        self.post_json("/feedback", payload).await
    }
}
