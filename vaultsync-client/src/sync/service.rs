//! SyncService - pulls the authoritative snapshot and replaces local state.
//!
//! One round:
//! 1. Publish `syncStarted`
//! 2. Bail out unless a user is signed in
//! 3. Decide whether a sync is needed (forced, or remote revision newer than
//!    our last sync)
//! 4. Fetch the snapshot, validate the security stamp and install keys
//! 5. Replace folders, collections, ciphers and domain settings, in that order
//! 6. Record the sync time and publish `syncCompleted`
//!
//! Rounds for the same user are serialized. Entity kinds are not replaced
//! transactionally: if a later kind fails, earlier kinds stay committed.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use subtle::ConstantTimeEq;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::clock::SyncClock;
use super::events::SyncEvent;
use super::guard::UserSyncGuard;
use super::models::{
    CipherData, CipherResponse, CollectionData, CollectionResponse, DomainsResponse,
    EquivalentDomains, FolderData, FolderResponse, ProfileResponse,
};
use super::ports::{
    EventSink, IdentityStore, KeyStore, LogoutCallback, RemoteAuthority, SnapshotReplacer,
};
use crate::crypto::KeyMaterial;
use crate::error::{Result, VaultSyncError};
use crate::storage::Storage;

/// Outcome of the "do we need to sync" check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncNeed {
    NeedsSync,
    UpToDate,
    /// The revision check itself failed; treated as a skipped round.
    CheckFailed,
}

/// Local stores replaced by each round.
pub struct SyncStores {
    pub folders: Arc<dyn SnapshotReplacer<HashMap<String, FolderData>>>,
    pub collections: Arc<dyn SnapshotReplacer<HashMap<String, CollectionData>>>,
    pub ciphers: Arc<dyn SnapshotReplacer<HashMap<String, CipherData>>>,
    pub settings: Arc<dyn SnapshotReplacer<EquivalentDomains>>,
}

pub struct SyncDependencies {
    pub identity: Arc<dyn IdentityStore>,
    pub api: Arc<dyn RemoteAuthority>,
    pub keys: Arc<dyn KeyStore>,
    pub storage: Arc<dyn Storage>,
    pub stores: SyncStores,
    pub events: Arc<dyn EventSink>,
    /// Invoked with `true` when the account identity no longer matches.
    pub logout: Option<LogoutCallback>,
}

pub struct SyncService {
    identity: Arc<dyn IdentityStore>,
    api: Arc<dyn RemoteAuthority>,
    keys: Arc<dyn KeyStore>,
    stores: SyncStores,
    clock: SyncClock,
    events: Arc<dyn EventSink>,
    logout: Option<LogoutCallback>,
    guard: UserSyncGuard,
    /// Advisory only; exclusion comes from `guard`.
    rounds_in_flight: AtomicUsize,
}

impl SyncService {
    pub fn new(deps: SyncDependencies) -> Self {
        Self {
            clock: SyncClock::new(deps.storage, deps.identity.clone()),
            identity: deps.identity,
            api: deps.api,
            keys: deps.keys,
            stores: deps.stores,
            events: deps.events,
            logout: deps.logout,
            guard: UserSyncGuard::new(),
            rounds_in_flight: AtomicUsize::new(0),
        }
    }

    /// Whether any sync round is currently running.
    pub fn is_syncing(&self) -> bool {
        self.rounds_in_flight.load(Ordering::SeqCst) > 0
    }

    pub async fn get_last_sync(&self) -> Result<Option<DateTime<Utc>>> {
        self.clock.get_last_sync().await
    }

    pub async fn set_last_sync(&self, at: DateTime<Utc>) -> Result<()> {
        self.clock.set_last_sync(at).await
    }

    /// Run one sync round.
    ///
    /// Returns `true` only when a snapshot was fetched and fully committed.
    /// Skips (not signed in, already up to date, revision check failed) and
    /// failures all return `false`; the `syncCompleted` event carries the
    /// same flag.
    pub async fn full_sync(&self, force_sync: bool) -> bool {
        let round_id = Uuid::new_v4();
        self.sync_started(round_id);
        let now = Utc::now();

        let committed = match self.run_round(force_sync, now).await {
            Ok(committed) => committed,
            Err(e) => {
                error!("Sync round {} failed: {}", round_id, e);
                false
            }
        };

        self.sync_completed(round_id, committed);
        committed
    }

    async fn run_round(&self, force_sync: bool, now: DateTime<Utc>) -> Result<bool> {
        if !self.identity.is_authenticated().await? {
            info!("Not authenticated, skipping sync");
            return Ok(false);
        }
        let Some(user_id) = self.identity.get_user_id().await? else {
            return Err(VaultSyncError::NotAuthenticated);
        };

        let _permit = self.guard.acquire(&user_id).await;

        match self.needs_syncing(force_sync).await {
            SyncNeed::CheckFailed => return Ok(false),
            SyncNeed::UpToDate => {
                debug!("Vault is up to date");
                self.clock.set_last_sync(now).await?;
                return Ok(false);
            }
            SyncNeed::NeedsSync => {}
        }

        let response = self.api.get_sync().await?;

        self.sync_profile(&user_id, &response.profile).await?;
        self.sync_folders(&user_id, &response.folders).await?;
        self.sync_collections(&user_id, &response.collections).await?;
        self.sync_ciphers(&user_id, &response.ciphers).await?;
        self.sync_settings(&user_id, response.domains.as_ref()).await?;

        self.clock.set_last_sync(now).await?;
        info!("Sync completed for user {}", user_id);
        Ok(true)
    }

    /// Decide whether this round should fetch a snapshot.
    pub async fn needs_syncing(&self, force_sync: bool) -> SyncNeed {
        if force_sync {
            return SyncNeed::NeedsSync;
        }

        let revision = match self.api.get_account_revision_date().await {
            Ok(revision) => revision,
            Err(e) => {
                warn!("Revision check failed, skipping sync: {}", e);
                return SyncNeed::CheckFailed;
            }
        };

        match self.clock.get_last_sync().await {
            Ok(Some(last_sync)) if revision <= last_sync => SyncNeed::UpToDate,
            Ok(_) => SyncNeed::NeedsSync,
            Err(e) => {
                warn!("Could not read last sync time, skipping sync: {}", e);
                SyncNeed::CheckFailed
            }
        }
    }

    async fn sync_profile(&self, user_id: &str, profile: &ProfileResponse) -> Result<()> {
        let stamp = self.identity.get_security_stamp().await?;
        let stamp_changed = stamp
            .as_deref()
            .is_some_and(|s| !constant_time_eq(s, &profile.security_stamp));
        let foreign_profile = !constant_time_eq(user_id, &profile.id);

        if stamp_changed || foreign_profile {
            warn!("Account identity no longer matches, forcing logout");
            if let Some(logout) = &self.logout {
                logout(true);
            }
            return Err(VaultSyncError::StampMismatch);
        }

        // validate before installing anything
        let material = KeyMaterial::from_base64(&profile.key, None)?;
        debug!("Derived account key {}", material.fingerprint());

        self.keys.install_encryption_key(material).await?;
        self.keys
            .install_private_key(profile.private_key.clone())
            .await?;
        self.keys
            .install_organization_keys(profile.organization_keys())
            .await?;
        self.identity
            .set_security_stamp(&profile.security_stamp)
            .await?;
        Ok(())
    }

    async fn sync_folders(&self, user_id: &str, response: &[FolderResponse]) -> Result<()> {
        let folders = response
            .iter()
            .map(|f| (f.id.clone(), FolderData::new(f, user_id)))
            .collect();
        self.stores.folders.replace(user_id, folders).await
    }

    async fn sync_collections(&self, user_id: &str, response: &[CollectionResponse]) -> Result<()> {
        let collections = response
            .iter()
            .map(|c| (c.id.clone(), CollectionData::from(c)))
            .collect();
        self.stores.collections.replace(user_id, collections).await
    }

    async fn sync_ciphers(&self, user_id: &str, response: &[CipherResponse]) -> Result<()> {
        let ciphers = response
            .iter()
            .map(|c| (c.id.clone(), CipherData::new(c, user_id)))
            .collect();
        self.stores.ciphers.replace(user_id, ciphers).await
    }

    async fn sync_settings(&self, user_id: &str, response: Option<&DomainsResponse>) -> Result<()> {
        let domains = response
            .map(DomainsResponse::merged_equivalent_domains)
            .unwrap_or_default();
        self.stores.settings.replace(user_id, domains).await
    }

    fn sync_started(&self, round_id: Uuid) {
        self.rounds_in_flight.fetch_add(1, Ordering::SeqCst);
        self.events.publish(SyncEvent::Started { round_id });
    }

    fn sync_completed(&self, round_id: Uuid, successfully: bool) {
        self.rounds_in_flight.fetch_sub(1, Ordering::SeqCst);
        self.events.publish(SyncEvent::Completed {
            round_id,
            successfully,
        });
    }
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}
