//! JSON file storage, optionally encrypted with AES-256-GCM.
//!
//! The whole store is one JSON object. Plain files hold the JSON text;
//! encrypted files are laid out as `[12-byte nonce][ciphertext with 16-byte auth tag]`.
//! Writes go to a temp file that is renamed over the original.
//!
//! Every save rewrites the whole file, so the store is meant to stay small
//! (session state and one vault's records). File and cipher work runs on
//! tokio's blocking pool.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use async_trait::async_trait;
use rand::RngCore;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::debug;
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::Storage;
use crate::error::{Result, VaultSyncError};

/// Nonce size for AES-GCM (96 bits = 12 bytes)
const NONCE_SIZE: usize = 12;

/// A 256-bit storage encryption key, zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct StorageKey {
    key: [u8; 32],
}

impl StorageKey {
    pub fn from_slice(slice: &[u8]) -> Result<Self> {
        let key: [u8; 32] = slice
            .try_into()
            .map_err(|_| VaultSyncError::Encryption("Storage key must be 32 bytes".into()))?;
        Ok(Self { key })
    }

    /// Fresh random key.
    pub fn generate() -> Self {
        let mut key = [0u8; 32];
        rand::rng().fill_bytes(&mut key);
        Self { key }
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.key
    }
}

impl std::fmt::Debug for StorageKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageKey")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

struct StoreFile {
    path: PathBuf,
    key: Option<StorageKey>,
}

impl StoreFile {
    fn read_all(&self) -> Result<HashMap<String, Value>> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }

        let bytes = std::fs::read(&self.path)?;
        let plaintext = match &self.key {
            Some(key) => decrypt(&bytes, key)?,
            None => bytes,
        };

        serde_json::from_slice(&plaintext)
            .map_err(|e| VaultSyncError::Storage(format!("Store file corrupted: {}", e)))
    }

    fn write_all(&self, entries: &HashMap<String, Value>) -> Result<()> {
        let plaintext = serde_json::to_vec(entries)?;
        let output = match &self.key {
            Some(key) => encrypt(&plaintext, key)?,
            None => plaintext,
        };

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let temp_path = self.path.with_extension("tmp");
        std::fs::write(&temp_path, &output)?;
        std::fs::rename(&temp_path, &self.path)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = std::fs::metadata(&self.path)?.permissions();
            perms.set_mode(0o600);
            std::fs::set_permissions(&self.path, perms)?;
        }

        debug!("Wrote {} entries to {:?}", entries.len(), self.path);
        Ok(())
    }
}

pub struct JsonFileStorage {
    file: Arc<StoreFile>,
    // serializes read-modify-write cycles
    write_lock: Mutex<()>,
}

impl JsonFileStorage {
    /// Plain JSON file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::open(path.into(), None)
    }

    /// Encrypted file at `path`.
    pub fn encrypted(path: impl Into<PathBuf>, key: StorageKey) -> Self {
        Self::open(path.into(), Some(key))
    }

    fn open(path: PathBuf, key: Option<StorageKey>) -> Self {
        Self {
            file: Arc::new(StoreFile { path, key }),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.file.path
    }

    /// Run `op` against the store file on the blocking pool.
    async fn with_file<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&StoreFile) -> Result<T> + Send + 'static,
    {
        let file = self.file.clone();
        tokio::task::spawn_blocking(move || op(&file))
            .await
            .map_err(|e| VaultSyncError::Storage(format!("Store task failed: {}", e)))?
    }
}

#[async_trait]
impl Storage for JsonFileStorage {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let key = key.to_string();
        self.with_file(move |file| Ok(file.read_all()?.remove(&key)))
            .await
    }

    async fn save(&self, key: &str, value: Value) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let key = key.to_string();
        self.with_file(move |file| {
            let mut entries = file.read_all()?;
            entries.insert(key, value);
            file.write_all(&entries)
        })
        .await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let key = key.to_string();
        self.with_file(move |file| {
            let mut entries = file.read_all()?;
            if entries.remove(&key).is_some() {
                file.write_all(&entries)?;
            }
            Ok(())
        })
        .await
    }
}

fn encrypt(plaintext: &[u8], key: &StorageKey) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| VaultSyncError::Encryption(format!("Invalid key: {}", e)))?;

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rand::rng().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| VaultSyncError::Encryption(format!("Encryption failed: {}", e)))?;

    let mut output = nonce_bytes.to_vec();
    output.extend(ciphertext);
    Ok(output)
}

fn decrypt(encrypted: &[u8], key: &StorageKey) -> Result<Vec<u8>> {
    if encrypted.len() < NONCE_SIZE {
        return Err(VaultSyncError::Storage("Store file too short".into()));
    }

    let (nonce_bytes, ciphertext) = encrypted.split_at(NONCE_SIZE);
    let nonce = Nonce::from_slice(nonce_bytes);

    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| VaultSyncError::Encryption(format!("Invalid key: {}", e)))?;

    // wrong key or tampered file
    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| VaultSyncError::Encryption("Failed to decrypt store file".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_plain_file_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");

        let storage = JsonFileStorage::new(&path);
        storage.save("lastSync_u1", json!("2024-01-01T00:00:00.000Z")).await.unwrap();
        storage.save("other", json!(5)).await.unwrap();

        let reopened = JsonFileStorage::new(&path);
        assert_eq!(
            reopened.get("lastSync_u1").await.unwrap(),
            Some(json!("2024-01-01T00:00:00.000Z"))
        );

        reopened.remove("other").await.unwrap();
        assert!(storage.get("other").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_missing_file_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonFileStorage::new(dir.path().join("absent.json"));
        assert!(storage.get("anything").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_encrypted_file_is_opaque() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.enc");
        let key = StorageKey::generate();

        let storage = JsonFileStorage::encrypted(&path, key.clone());
        storage.save("securityStamp", json!("stamp-123")).await.unwrap();

        let raw = std::fs::read(&path).unwrap();
        assert!(!String::from_utf8_lossy(&raw).contains("stamp-123"));

        let reopened = JsonFileStorage::encrypted(&path, key);
        assert_eq!(
            reopened.get("securityStamp").await.unwrap(),
            Some(json!("stamp-123"))
        );
    }

    #[tokio::test]
    async fn test_wrong_key_fails_to_decrypt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.enc");

        JsonFileStorage::encrypted(&path, StorageKey::generate())
            .save("k", json!(1))
            .await
            .unwrap();

        let result = JsonFileStorage::encrypted(&path, StorageKey::generate())
            .get("k")
            .await;
        assert!(matches!(result, Err(VaultSyncError::Encryption(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_saves_all_land() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(JsonFileStorage::encrypted(
            dir.path().join("store.enc"),
            StorageKey::generate(),
        ));

        let tasks: Vec<_> = (0..16)
            .map(|i| {
                let storage = storage.clone();
                tokio::spawn(async move { storage.save(&format!("k{}", i), json!(i)).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        for i in 0..16 {
            assert_eq!(storage.get(&format!("k{}", i)).await.unwrap(), Some(json!(i)));
        }
    }

    #[test]
    fn test_storage_key_length_checked() {
        assert!(StorageKey::from_slice(&[0u8; 16]).is_err());
        assert!(StorageKey::from_slice(&[0u8; 32]).is_ok());
    }
}
