//! Collaborator interfaces the sync service drives.
//!
//! Each one is a trait so hosts can plug in their own implementations and
//! tests can substitute fakes.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::events::SyncEvent;
use super::models::SyncResponse;
use crate::crypto::KeyMaterial;
use crate::error::Result;

/// The authoritative remote store.
#[async_trait]
pub trait RemoteAuthority: Send + Sync {
    /// Timestamp of the most recent change to the account's data.
    async fn get_account_revision_date(&self) -> Result<DateTime<Utc>>;

    /// Full snapshot of the account.
    async fn get_sync(&self) -> Result<SyncResponse>;
}

/// Who is signed in, and the last security stamp we accepted for them.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn is_authenticated(&self) -> Result<bool>;

    async fn get_user_id(&self) -> Result<Option<String>>;

    async fn get_security_stamp(&self) -> Result<Option<String>>;

    async fn set_security_stamp(&self, stamp: &str) -> Result<()>;
}

/// Destination for key material established during profile sync.
#[async_trait]
pub trait KeyStore: Send + Sync {
    async fn install_encryption_key(&self, material: KeyMaterial) -> Result<()>;

    async fn install_private_key(&self, wrapped: Option<String>) -> Result<()>;

    /// Organization id to wrapped organization key.
    async fn install_organization_keys(&self, keys: HashMap<String, String>) -> Result<()>;
}

/// Replaces everything stored for one entity kind with `snapshot`.
///
/// After a successful call the store holds exactly the snapshot for that
/// user; readers see either the previous set or the new one, never a mix.
#[async_trait]
pub trait SnapshotReplacer<S>: Send + Sync
where
    S: Send + 'static,
{
    async fn replace(&self, user_id: &str, snapshot: S) -> Result<()>;
}

/// Lifecycle event sink.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: SyncEvent);
}

/// Ends the current session. Called with `true` when the sync service
/// forces a logout.
pub type LogoutCallback = Arc<dyn Fn(bool) + Send + Sync>;
