//! Client settings, stored as `settings.json` in the data directory.
//!
//! Missing fields fall back to their defaults so older files keep loading.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Result, VaultSyncError};

const SETTINGS_FILE_NAME: &str = "settings.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    /// Base URL of the remote authority's API.
    pub server_url: String,
    /// Per-request timeout for calls to the remote authority.
    pub request_timeout_secs: u64,
    /// File name of the local store inside the data directory.
    pub store_file_name: String,
    /// Encrypt the local store with AES-256-GCM. Requires a storage key.
    pub encrypt_store: bool,
    /// Buffered lifecycle events per subscriber before the oldest are dropped.
    pub event_channel_capacity: usize,
    /// Fallback `tracing` filter when `RUST_LOG` is unset.
    pub log_filter: String,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            server_url: "https://localhost:8080/api".to_string(),
            request_timeout_secs: 30,
            store_file_name: "store.json".to_string(),
            encrypt_store: true,
            event_channel_capacity: 16,
            log_filter: "vaultsync_client=info".to_string(),
        }
    }
}

impl ClientSettings {
    /// Reject settings the client cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.server_url.trim().is_empty() {
            return Err(VaultSyncError::Config("server_url must not be empty".into()));
        }
        if self.event_channel_capacity == 0 {
            return Err(VaultSyncError::Config(
                "event_channel_capacity must be at least 1".into(),
            ));
        }
        if self.store_file_name.trim().is_empty() {
            return Err(VaultSyncError::Config("store_file_name must not be empty".into()));
        }
        Ok(())
    }

    /// Full path of the local store inside `data_dir`.
    pub fn store_path(&self, data_dir: &Path) -> PathBuf {
        data_dir.join(&self.store_file_name)
    }
}

fn get_settings_path(data_dir: &Path) -> PathBuf {
    data_dir.join(SETTINGS_FILE_NAME)
}

/// Load settings from `data_dir`, or the defaults if no file exists yet.
pub fn load_settings(data_dir: &Path) -> Result<ClientSettings> {
    let path = get_settings_path(data_dir);

    if !path.exists() {
        return Ok(ClientSettings::default());
    }

    let content = std::fs::read_to_string(&path)?;
    let settings: ClientSettings = serde_json::from_str(&content)?;
    settings.validate()?;
    Ok(settings)
}

/// Write settings to `data_dir` as pretty-printed JSON.
pub fn save_settings(data_dir: &Path, settings: &ClientSettings) -> Result<()> {
    settings.validate()?;
    std::fs::create_dir_all(data_dir)?;
    let content = serde_json::to_string_pretty(settings)?;
    std::fs::write(get_settings_path(data_dir), content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let settings = load_settings(dir.path()).unwrap();
        assert_eq!(settings, ClientSettings::default());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let settings = ClientSettings {
            server_url: "https://vault.example.com/api".into(),
            encrypt_store: false,
            ..Default::default()
        };

        save_settings(dir.path(), &settings).unwrap();
        assert_eq!(load_settings(dir.path()).unwrap(), settings);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(SETTINGS_FILE_NAME),
            r#"{ "server_url": "https://other.example/api" }"#,
        )
        .unwrap();

        let settings = load_settings(dir.path()).unwrap();
        assert_eq!(settings.server_url, "https://other.example/api");
        assert_eq!(settings.request_timeout_secs, 30);
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let settings = ClientSettings {
            event_channel_capacity: 0,
            ..Default::default()
        };
        assert!(matches!(settings.validate(), Err(VaultSyncError::Config(_))));
    }
}
