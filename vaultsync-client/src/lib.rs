//! Client-side synchronization for an encrypted credential vault.
//!
//! The remote authority owns the data. A [`SyncService`] round checks the
//! account revision, pulls the full snapshot, validates the account identity,
//! installs key material and replaces every local entity kind.

pub mod api;
pub mod client;
pub mod config;
pub mod crypto;
pub mod error;
pub mod identity;
pub mod storage;
pub mod sync;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub use api::{AccessTokenProvider, ApiClient};
pub use client::VaultClient;
pub use config::{load_settings, save_settings, ClientSettings};
pub use crypto::{derive_key_material, EncryptionScheme, KeyMaterial, KeyMaterialError};
pub use error::{Result, VaultSyncError};
pub use identity::{MemoryKeyStore, UserStateStore};
pub use storage::{JsonFileStorage, MemoryStorage, Storage, StorageKey};
pub use sync::{
    BroadcastEventSink, DomainSettingsStore, KeyedStore, SyncClock, SyncDependencies, SyncEvent,
    SyncNeed, SyncService, SyncStores,
};

/// Install a `tracing` subscriber. `RUST_LOG` overrides `default_filter`.
///
/// Does nothing if a global subscriber is already set.
pub fn init_tracing(default_filter: &str) {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
