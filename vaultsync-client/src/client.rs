use std::path::Path;
use std::sync::Arc;

use tracing::info;

use crate::api::ApiClient;
use crate::config::{load_settings, ClientSettings};
use crate::error::{Result, VaultSyncError};
use crate::identity::{MemoryKeyStore, UserStateStore};
use crate::storage::{JsonFileStorage, Storage, StorageKey};
use crate::sync::models::{CipherData, CollectionData, FolderData};
use crate::sync::ports::LogoutCallback;
use crate::sync::{
    BroadcastEventSink, DomainSettingsStore, KeyedStore, SyncDependencies, SyncService, SyncStores,
};

/// Everything a signed-in vault client needs, wired over one local store.
pub struct VaultClient {
    pub settings: ClientSettings,
    pub user_state: Arc<UserStateStore>,
    pub keys: Arc<MemoryKeyStore>,
    pub folders: Arc<KeyedStore<FolderData>>,
    pub collections: Arc<KeyedStore<CollectionData>>,
    pub ciphers: Arc<KeyedStore<CipherData>>,
    pub domains: Arc<DomainSettingsStore>,
    pub events: Arc<BroadcastEventSink>,
    pub sync: SyncService,
}

impl VaultClient {
    /// Open the client rooted at `data_dir`.
    ///
    /// `storage_key` is required when the settings ask for an encrypted store.
    pub fn open(
        data_dir: &Path,
        storage_key: Option<StorageKey>,
        logout: Option<LogoutCallback>,
    ) -> Result<Self> {
        let settings = load_settings(data_dir)?;
        let store_path = settings.store_path(data_dir);

        let storage: Arc<dyn Storage> = match (settings.encrypt_store, storage_key) {
            (true, Some(key)) => Arc::new(JsonFileStorage::encrypted(store_path, key)),
            (true, None) => {
                return Err(VaultSyncError::Config(
                    "encrypt_store is enabled but no storage key was provided".into(),
                ))
            }
            (false, _) => Arc::new(JsonFileStorage::new(store_path)),
        };

        let user_state = Arc::new(UserStateStore::new(storage.clone()));
        let keys = Arc::new(MemoryKeyStore::new());
        let folders = Arc::new(KeyedStore::persistent("folders", storage.clone(), "folders_"));
        let collections = Arc::new(KeyedStore::persistent(
            "collections",
            storage.clone(),
            "collections_",
        ));
        let ciphers = Arc::new(KeyedStore::persistent("ciphers", storage.clone(), "ciphers_"));
        let domains = Arc::new(DomainSettingsStore::persistent(
            storage.clone(),
            "equivalentDomains_",
        ));
        let events = Arc::new(BroadcastEventSink::new(settings.event_channel_capacity));
        let api = Arc::new(ApiClient::new(&settings, user_state.clone())?);

        let sync = SyncService::new(SyncDependencies {
            identity: user_state.clone(),
            api,
            keys: keys.clone(),
            storage,
            stores: SyncStores {
                folders: folders.clone(),
                collections: collections.clone(),
                ciphers: ciphers.clone(),
                settings: domains.clone(),
            },
            events: events.clone(),
            logout,
        });

        info!("Vault client opened at {:?}", data_dir);

        Ok(Self {
            settings,
            user_state,
            keys,
            folders,
            collections,
            ciphers,
            domains,
            events,
            sync,
        })
    }

    /// Reload the persisted snapshots for `user_id` into memory.
    pub async fn load_user(&self, user_id: &str) -> Result<()> {
        self.folders.load(user_id).await?;
        self.collections.load(user_id).await?;
        self.ciphers.load(user_id).await?;
        self.domains.load(user_id).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::save_settings;
    use crate::sync::ports::SnapshotReplacer;
    use crate::sync::SyncEvent;
    use std::collections::HashMap;

    fn folder(id: &str) -> FolderData {
        FolderData {
            id: id.to_string(),
            user_id: "user-1".to_string(),
            name: "2.encrypted".to_string(),
            revision_date: "2024-06-01T12:00:00Z".parse().unwrap(),
        }
    }

    #[test]
    fn test_encrypted_store_needs_key() {
        let dir = tempfile::tempdir().unwrap();
        let result = VaultClient::open(dir.path(), None, None);
        assert!(matches!(result, Err(VaultSyncError::Config(_))));
    }

    #[tokio::test]
    async fn test_signed_out_round_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let client = VaultClient::open(dir.path(), Some(StorageKey::generate()), None).unwrap();
        let mut rx = client.events.subscribe();

        assert!(!client.sync.full_sync(true).await);
        assert!(matches!(rx.recv().await.unwrap(), SyncEvent::Started { .. }));
        assert!(matches!(
            rx.recv().await.unwrap(),
            SyncEvent::Completed {
                successfully: false,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_snapshots_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        save_settings(
            dir.path(),
            &ClientSettings {
                encrypt_store: false,
                ..Default::default()
            },
        )
        .unwrap();

        {
            let client = VaultClient::open(dir.path(), None, None).unwrap();
            let mut snapshot = HashMap::new();
            snapshot.insert("f1".to_string(), folder("f1"));
            client.folders.replace("user-1", snapshot).await.unwrap();
        }

        let client = VaultClient::open(dir.path(), None, None).unwrap();
        assert!(client.folders.is_empty("user-1").await);
        client.load_user("user-1").await.unwrap();
        assert_eq!(client.folders.get("user-1", "f1").await, Some(folder("f1")));
    }
}
