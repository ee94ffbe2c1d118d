//! Per-user timestamp of the last successful sync.
//!
//! Stored as an ISO-8601 string under `lastSync_<userId>`. Every call reads
//! or writes storage directly.

use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use tracing::{debug, warn};

use super::ports::IdentityStore;
use crate::error::Result;
use crate::storage::Storage;

const LAST_SYNC_PREFIX: &str = "lastSync_";

pub fn last_sync_key(user_id: &str) -> String {
    format!("{}{}", LAST_SYNC_PREFIX, user_id)
}

pub struct SyncClock {
    storage: Arc<dyn Storage>,
    identity: Arc<dyn IdentityStore>,
}

impl SyncClock {
    pub fn new(storage: Arc<dyn Storage>, identity: Arc<dyn IdentityStore>) -> Self {
        Self { storage, identity }
    }

    /// Last sync time for the signed-in user, if any.
    pub async fn get_last_sync(&self) -> Result<Option<DateTime<Utc>>> {
        let Some(user_id) = self.identity.get_user_id().await? else {
            return Ok(None);
        };

        let value = self.storage.get(&last_sync_key(&user_id)).await?;
        Ok(value.as_ref().and_then(parse_timestamp))
    }

    /// Record `at` for the signed-in user. Does nothing without a user.
    pub async fn set_last_sync(&self, at: DateTime<Utc>) -> Result<()> {
        let Some(user_id) = self.identity.get_user_id().await? else {
            debug!("No user identified, not recording last sync");
            return Ok(());
        };

        let stamp = at.to_rfc3339_opts(SecondsFormat::Millis, true);
        self.storage
            .save(&last_sync_key(&user_id), Value::String(stamp))
            .await
    }
}

fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    let text = value.as_str()?;
    match DateTime::parse_from_rfc3339(text) {
        Ok(parsed) => Some(parsed.with_timezone(&Utc)),
        Err(e) => {
            warn!("Ignoring unreadable last sync timestamp {:?}: {}", text, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::UserStateStore;
    use crate::storage::MemoryStorage;
    use chrono::TimeZone;

    async fn clock_for(user: Option<&str>) -> (SyncClock, Arc<MemoryStorage>) {
        let storage = Arc::new(MemoryStorage::new());
        let identity = Arc::new(UserStateStore::new(storage.clone()));
        if let Some(user) = user {
            identity.set_session(user, "token").await.unwrap();
        }
        (SyncClock::new(storage.clone(), identity), storage)
    }

    #[tokio::test]
    async fn test_round_trip_uses_namespaced_iso_key() {
        let (clock, storage) = clock_for(Some("user-1")).await;
        let at = Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap();

        clock.set_last_sync(at).await.unwrap();

        assert_eq!(
            storage.get("lastSync_user-1").await.unwrap(),
            Some(Value::String("2024-05-06T07:08:09.000Z".into()))
        );
        assert_eq!(clock.get_last_sync().await.unwrap(), Some(at));
    }

    #[tokio::test]
    async fn test_absent_without_user() {
        let (clock, storage) = clock_for(None).await;

        clock.set_last_sync(Utc::now()).await.unwrap();
        assert!(clock.get_last_sync().await.unwrap().is_none());
        assert!(storage.get("lastSync_").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_absent_when_never_synced() {
        let (clock, _) = clock_for(Some("user-2")).await;
        assert!(clock.get_last_sync().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_garbage_value_reads_as_absent() {
        let (clock, storage) = clock_for(Some("user-3")).await;
        storage
            .save("lastSync_user-3", Value::String("yesterday".into()))
            .await
            .unwrap();
        assert!(clock.get_last_sync().await.unwrap().is_none());
    }
}
