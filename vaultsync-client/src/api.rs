//! HTTP client for the remote authority.
//!
//! - `GET {base}/accounts/revision-date` returns epoch milliseconds
//! - `GET {base}/sync` returns the full snapshot
//!
//! Both are authorized with a bearer token from an [`AccessTokenProvider`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::Client;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::config::ClientSettings;
use crate::error::{Result, VaultSyncError};
use crate::identity::UserStateStore;
use crate::sync::models::SyncResponse;
use crate::sync::ports::RemoteAuthority;

#[async_trait]
pub trait AccessTokenProvider: Send + Sync {
    async fn access_token(&self) -> Result<Option<String>>;
}

#[async_trait]
impl AccessTokenProvider for UserStateStore {
    async fn access_token(&self) -> Result<Option<String>> {
        self.get_access_token().await
    }
}

pub struct ApiClient {
    client: Client,
    base_url: String,
    tokens: Arc<dyn AccessTokenProvider>,
}

impl ApiClient {
    pub fn new(settings: &ClientSettings, tokens: Arc<dyn AccessTokenProvider>) -> Result<Self> {
        settings.validate()?;

        let client = Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()
            .map_err(|e| VaultSyncError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: settings.server_url.trim_end_matches('/').to_string(),
            tokens,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let token = self
            .tokens
            .access_token()
            .await?
            .ok_or(VaultSyncError::NotAuthenticated)?;

        let url = self.url(path);
        debug!("GET {}", url);

        let response = self
            .client
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| VaultSyncError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| VaultSyncError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(VaultSyncError::Authority {
                status: status.as_u16(),
                message: String::from_utf8_lossy(&body).into_owned(),
            });
        }

        Ok(serde_json::from_slice(&body)?)
    }
}

#[async_trait]
impl RemoteAuthority for ApiClient {
    async fn get_account_revision_date(&self) -> Result<DateTime<Utc>> {
        let millis: i64 = self.get_json("/accounts/revision-date").await?;
        revision_from_millis(millis)
    }

    async fn get_sync(&self) -> Result<SyncResponse> {
        self.get_json("/sync").await
    }
}

fn revision_from_millis(millis: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis).single().ok_or_else(|| VaultSyncError::Authority {
        status: 200,
        message: format!("Revision date out of range: {}", millis),
    })
}
