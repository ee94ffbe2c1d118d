//! Signed-in user state persisted through [`Storage`].

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use crate::error::Result;
use crate::storage::Storage;
use crate::sync::ports::IdentityStore;

const USER_ID_KEY: &str = "userId";
const ACCESS_TOKEN_KEY: &str = "accessToken";
const SECURITY_STAMP_KEY: &str = "securityStamp";

pub struct UserStateStore {
    storage: Arc<dyn Storage>,
}

impl UserStateStore {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Remember a freshly authenticated session.
    pub async fn set_session(&self, user_id: &str, access_token: &str) -> Result<()> {
        self.storage
            .save(USER_ID_KEY, Value::String(user_id.to_string()))
            .await?;
        self.storage
            .save(ACCESS_TOKEN_KEY, Value::String(access_token.to_string()))
            .await?;
        info!("Session established for user {}", user_id);
        Ok(())
    }

    pub async fn get_access_token(&self) -> Result<Option<String>> {
        self.get_string(ACCESS_TOKEN_KEY).await
    }

    /// Forget the session and the remembered security stamp.
    pub async fn clear(&self) -> Result<()> {
        self.storage.remove(USER_ID_KEY).await?;
        self.storage.remove(ACCESS_TOKEN_KEY).await?;
        self.storage.remove(SECURITY_STAMP_KEY).await?;
        info!("Session cleared");
        Ok(())
    }

    async fn get_string(&self, key: &str) -> Result<Option<String>> {
        Ok(self
            .storage
            .get(key)
            .await?
            .and_then(|v| v.as_str().map(str::to_string)))
    }
}

#[async_trait]
impl IdentityStore for UserStateStore {
    async fn is_authenticated(&self) -> Result<bool> {
        Ok(self.get_user_id().await?.is_some() && self.get_access_token().await?.is_some())
    }

    async fn get_user_id(&self) -> Result<Option<String>> {
        self.get_string(USER_ID_KEY).await
    }

    async fn get_security_stamp(&self) -> Result<Option<String>> {
        self.get_string(SECURITY_STAMP_KEY).await
    }

    async fn set_security_stamp(&self, stamp: &str) -> Result<()> {
        self.storage
            .save(SECURITY_STAMP_KEY, Value::String(stamp.to_string()))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    #[tokio::test]
    async fn test_session_lifecycle() {
        let store = UserStateStore::new(Arc::new(MemoryStorage::new()));
        assert!(!store.is_authenticated().await.unwrap());

        store.set_session("user-1", "token-abc").await.unwrap();
        store.set_security_stamp("stamp-1").await.unwrap();
        assert!(store.is_authenticated().await.unwrap());
        assert_eq!(store.get_user_id().await.unwrap().as_deref(), Some("user-1"));
        assert_eq!(
            store.get_security_stamp().await.unwrap().as_deref(),
            Some("stamp-1")
        );

        store.clear().await.unwrap();
        assert!(!store.is_authenticated().await.unwrap());
        assert!(store.get_security_stamp().await.unwrap().is_none());
    }
}
