//! Local stores that a sync round replaces wholesale.
//!
//! Each user's data lives behind an `Arc` that writers swap in a single
//! step. Readers clone the `Arc`, so they hold either the old complete set or
//! the new one. Writers are serialized and, when persistence is configured,
//! write storage before swapping memory: a failed save leaves both untouched.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use super::models::EquivalentDomains;
use super::ports::SnapshotReplacer;
use crate::error::{Result, VaultSyncError};
use crate::storage::Storage;

struct Persistence {
    storage: Arc<dyn Storage>,
    key_prefix: String,
}

/// Per-user immutable snapshots with atomic swap.
struct SnapshotCell<V> {
    kind: &'static str,
    current: RwLock<HashMap<String, Arc<V>>>,
    write_lock: Mutex<()>,
    persistence: Option<Persistence>,
}

impl<V> SnapshotCell<V>
where
    V: Default + Serialize + DeserializeOwned + Send + Sync,
{
    fn new(kind: &'static str, persistence: Option<Persistence>) -> Self {
        Self {
            kind,
            current: RwLock::new(HashMap::new()),
            write_lock: Mutex::new(()),
            persistence,
        }
    }

    async fn snapshot(&self, user_id: &str) -> Arc<V> {
        self.current
            .read()
            .await
            .get(user_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Build the next value from the current one, persist it, then swap it in.
    async fn update<F>(&self, user_id: &str, next: F) -> Result<Arc<V>>
    where
        F: FnOnce(&V) -> V + Send,
    {
        let _guard = self.write_lock.lock().await;
        let current = self.snapshot(user_id).await;
        let value = Arc::new(next(&current));

        if let Some(p) = &self.persistence {
            let json = serde_json::to_value(value.as_ref())?;
            p.storage
                .save(&format!("{}{}", p.key_prefix, user_id), json)
                .await
                .map_err(|e| VaultSyncError::Replace {
                    kind: self.kind,
                    message: e.to_string(),
                })?;
        }

        self.current
            .write()
            .await
            .insert(user_id.to_string(), value.clone());
        Ok(value)
    }

    async fn load(&self, user_id: &str) -> Result<Arc<V>> {
        let Some(p) = &self.persistence else {
            return Ok(self.snapshot(user_id).await);
        };

        let _guard = self.write_lock.lock().await;
        let stored = p
            .storage
            .get(&format!("{}{}", p.key_prefix, user_id))
            .await?;
        let value: V = match stored {
            Some(json) => serde_json::from_value(json)?,
            None => V::default(),
        };
        let value = Arc::new(value);
        self.current
            .write()
            .await
            .insert(user_id.to_string(), value.clone());
        Ok(value)
    }

    async fn clear(&self, user_id: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        if let Some(p) = &self.persistence {
            p.storage
                .remove(&format!("{}{}", p.key_prefix, user_id))
                .await?;
        }
        self.current.write().await.remove(user_id);
        Ok(())
    }
}

/// Records of one entity kind keyed by id, per user.
pub struct KeyedStore<T> {
    cell: SnapshotCell<HashMap<String, T>>,
}

impl<T> KeyedStore<T>
where
    T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// In-memory store. `kind` names the entity in logs and errors.
    pub fn new(kind: &'static str) -> Self {
        Self {
            cell: SnapshotCell::new(kind, None),
        }
    }

    /// Store that also saves each user's set under `key_prefix + user_id`.
    pub fn persistent(kind: &'static str, storage: Arc<dyn Storage>, key_prefix: &str) -> Self {
        Self {
            cell: SnapshotCell::new(
                kind,
                Some(Persistence {
                    storage,
                    key_prefix: key_prefix.to_string(),
                }),
            ),
        }
    }

    pub fn kind(&self) -> &'static str {
        self.cell.kind
    }

    /// The complete current set for `user_id`.
    pub async fn get_all(&self, user_id: &str) -> Arc<HashMap<String, T>> {
        self.cell.snapshot(user_id).await
    }

    pub async fn get(&self, user_id: &str, id: &str) -> Option<T> {
        self.cell.snapshot(user_id).await.get(id).cloned()
    }

    pub async fn len(&self, user_id: &str) -> usize {
        self.cell.snapshot(user_id).await.len()
    }

    pub async fn is_empty(&self, user_id: &str) -> bool {
        self.len(user_id).await == 0
    }

    /// Insert or overwrite the given records, keeping everything else.
    pub async fn upsert(&self, user_id: &str, records: HashMap<String, T>) -> Result<()> {
        let count = records.len();
        self.cell
            .update(user_id, move |current| {
                let mut next = current.clone();
                next.extend(records);
                next
            })
            .await?;
        debug!("Upserted {} {} for {}", count, self.kind(), user_id);
        Ok(())
    }

    pub async fn delete(&self, user_id: &str, ids: &[String]) -> Result<()> {
        self.cell
            .update(user_id, |current| {
                let mut next = current.clone();
                for id in ids {
                    next.remove(id);
                }
                next
            })
            .await?;
        Ok(())
    }

    pub async fn clear(&self, user_id: &str) -> Result<()> {
        self.cell.clear(user_id).await
    }

    /// Hydrate memory from storage. Without persistence returns what is held.
    pub async fn load(&self, user_id: &str) -> Result<Arc<HashMap<String, T>>> {
        self.cell.load(user_id).await
    }
}

#[async_trait]
impl<T> SnapshotReplacer<HashMap<String, T>> for KeyedStore<T>
where
    T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    async fn replace(&self, user_id: &str, snapshot: HashMap<String, T>) -> Result<()> {
        let count = snapshot.len();
        self.cell.update(user_id, move |_| snapshot).await?;
        info!("Replaced {} with {} records", self.kind(), count);
        Ok(())
    }
}

/// Domain-equivalence settings, per user.
pub struct DomainSettingsStore {
    cell: SnapshotCell<EquivalentDomains>,
}

impl DomainSettingsStore {
    pub fn new() -> Self {
        Self {
            cell: SnapshotCell::new("domain settings", None),
        }
    }

    pub fn persistent(storage: Arc<dyn Storage>, key_prefix: &str) -> Self {
        Self {
            cell: SnapshotCell::new(
                "domain settings",
                Some(Persistence {
                    storage,
                    key_prefix: key_prefix.to_string(),
                }),
            ),
        }
    }

    pub async fn equivalent_domains(&self, user_id: &str) -> Arc<EquivalentDomains> {
        self.cell.snapshot(user_id).await
    }

    /// Every domain grouped with `domain`, including itself, or empty when
    /// it belongs to no group.
    pub async fn equivalents_of(&self, user_id: &str, domain: &str) -> Vec<String> {
        let groups = self.cell.snapshot(user_id).await;
        let mut matches: Vec<String> = groups
            .iter()
            .filter(|group| group.iter().any(|d| d == domain))
            .flatten()
            .cloned()
            .collect();
        matches.sort();
        matches.dedup();
        matches
    }

    pub async fn load(&self, user_id: &str) -> Result<Arc<EquivalentDomains>> {
        self.cell.load(user_id).await
    }

    pub async fn clear(&self, user_id: &str) -> Result<()> {
        self.cell.clear(user_id).await
    }
}

impl Default for DomainSettingsStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SnapshotReplacer<EquivalentDomains> for DomainSettingsStore {
    async fn replace(&self, user_id: &str, snapshot: EquivalentDomains) -> Result<()> {
        let count = snapshot.len();
        self.cell.update(user_id, move |_| snapshot).await?;
        info!("Replaced domain settings with {} groups", count);
        Ok(())
    }
}
