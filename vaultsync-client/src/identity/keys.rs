//! In-memory store for the key material installed by profile sync.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::crypto::KeyMaterial;
use crate::error::Result;
use crate::sync::ports::KeyStore;

#[derive(Default)]
struct InstalledKeys {
    encryption_key: Option<KeyMaterial>,
    private_key: Option<String>,
    organization_keys: HashMap<String, String>,
}

/// Holds the key material installed by the most recent profile sync.
#[derive(Default)]
pub struct MemoryKeyStore {
    keys: RwLock<InstalledKeys>,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The account's symmetric key, once a profile sync installed it.
    pub async fn encryption_key(&self) -> Option<KeyMaterial> {
        self.keys.read().await.encryption_key.clone()
    }

    /// Wrapped private key from the last profile. Never unwrapped here.
    pub async fn private_key(&self) -> Option<String> {
        self.keys.read().await.private_key.clone()
    }

    /// Wrapped key for one organization the account belongs to.
    pub async fn organization_key(&self, organization_id: &str) -> Option<String> {
        self.keys
            .read()
            .await
            .organization_keys
            .get(organization_id)
            .cloned()
    }

    /// Whether an encryption key is installed.
    pub async fn has_key(&self) -> bool {
        self.keys.read().await.encryption_key.is_some()
    }

    /// Drop every installed key. KeyMaterial zeroizes itself on drop.
    pub async fn clear(&self) {
        *self.keys.write().await = InstalledKeys::default();
        debug!("Cleared installed keys");
    }
}

#[async_trait]
impl KeyStore for MemoryKeyStore {
    async fn install_encryption_key(&self, material: KeyMaterial) -> Result<()> {
        debug!(
            "Installing {} encryption key {}",
            material.scheme(),
            material.fingerprint()
        );
        self.keys.write().await.encryption_key = Some(material);
        Ok(())
    }

    async fn install_private_key(&self, wrapped: Option<String>) -> Result<()> {
        self.keys.write().await.private_key = wrapped;
        Ok(())
    }

    async fn install_organization_keys(&self, keys: HashMap<String, String>) -> Result<()> {
        debug!("Installing {} organization keys", keys.len());
        self.keys.write().await.organization_keys = keys;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::derive_key_material;

    #[tokio::test]
    async fn test_install_replaces_previous_keys() {
        let store = MemoryKeyStore::new();
        assert!(!store.has_key().await);

        let first = derive_key_material(&[1u8; 32], None).unwrap();
        let second = derive_key_material(&[2u8; 64], None).unwrap();
        store.install_encryption_key(first).await.unwrap();
        store.install_encryption_key(second.clone()).await.unwrap();
        assert_eq!(store.encryption_key().await, Some(second));

        store
            .install_organization_keys(HashMap::from([("org-1".to_string(), "k1".to_string())]))
            .await
            .unwrap();
        store
            .install_organization_keys(HashMap::from([("org-2".to_string(), "k2".to_string())]))
            .await
            .unwrap();
        assert!(store.organization_key("org-1").await.is_none());
        assert_eq!(store.organization_key("org-2").await.as_deref(), Some("k2"));

        store.clear().await;
        assert!(!store.has_key().await);
        assert!(store.private_key().await.is_none());
    }
}
