//! Wire types returned by the remote authority and the local records built
//! from them.
//!
//! Names, notes and login payloads stay encrypted strings; decrypting them is
//! somebody else's job.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Complete remote state fetched in one sync round.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResponse {
    pub profile: ProfileResponse,
    #[serde(default)]
    pub folders: Vec<FolderResponse>,
    #[serde(default)]
    pub collections: Vec<CollectionResponse>,
    #[serde(default)]
    pub ciphers: Vec<CipherResponse>,
    #[serde(default)]
    pub domains: Option<DomainsResponse>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileResponse {
    pub id: String,
    pub security_stamp: String,
    /// Base64 raw account secret.
    pub key: String,
    /// Wrapped private key, opaque to this crate.
    #[serde(default)]
    pub private_key: Option<String>,
    #[serde(default)]
    pub organizations: Vec<ProfileOrganizationResponse>,
}

impl ProfileResponse {
    /// Organization id to wrapped organization key.
    pub fn organization_keys(&self) -> HashMap<String, String> {
        self.organizations
            .iter()
            .map(|o| (o.id.clone(), o.key.clone()))
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileOrganizationResponse {
    pub id: String,
    pub key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderResponse {
    pub id: String,
    pub name: String,
    pub revision_date: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionResponse {
    pub id: String,
    pub organization_id: String,
    pub name: String,
    #[serde(default)]
    pub read_only: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CipherResponse {
    pub id: String,
    #[serde(default)]
    pub organization_id: Option<String>,
    #[serde(default)]
    pub folder_id: Option<String>,
    #[serde(rename = "type")]
    pub cipher_type: u8,
    pub name: String,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub favorite: bool,
    #[serde(default)]
    pub login: Option<serde_json::Value>,
    #[serde(default)]
    pub collection_ids: Vec<String>,
    pub revision_date: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainsResponse {
    #[serde(default)]
    pub equivalent_domains: Option<Vec<Vec<String>>>,
    #[serde(default)]
    pub global_equivalent_domains: Option<Vec<GlobalDomainResponse>>,
}

impl DomainsResponse {
    /// The account's own groups followed by every non-empty global group.
    pub fn merged_equivalent_domains(&self) -> Vec<Vec<String>> {
        let mut merged = self.equivalent_domains.clone().unwrap_or_default();

        if let Some(globals) = &self.global_equivalent_domains {
            merged.extend(
                globals
                    .iter()
                    .filter(|g| !g.domains.is_empty())
                    .map(|g| g.domains.clone()),
            );
        }

        merged
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalDomainResponse {
    #[serde(rename = "type")]
    pub domain_type: u32,
    #[serde(default)]
    pub domains: Vec<String>,
    #[serde(default)]
    pub excluded: bool,
}

// ============================================================================
// Local records
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderData {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub revision_date: DateTime<Utc>,
}

impl FolderData {
    pub fn new(response: &FolderResponse, user_id: &str) -> Self {
        Self {
            id: response.id.clone(),
            user_id: user_id.to_string(),
            name: response.name.clone(),
            revision_date: response.revision_date,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionData {
    pub id: String,
    pub organization_id: String,
    pub name: String,
    pub read_only: bool,
}

impl From<&CollectionResponse> for CollectionData {
    fn from(response: &CollectionResponse) -> Self {
        Self {
            id: response.id.clone(),
            organization_id: response.organization_id.clone(),
            name: response.name.clone(),
            read_only: response.read_only,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CipherData {
    pub id: String,
    pub user_id: String,
    pub organization_id: Option<String>,
    pub folder_id: Option<String>,
    pub cipher_type: u8,
    pub name: String,
    pub notes: Option<String>,
    pub favorite: bool,
    pub login: Option<serde_json::Value>,
    pub collection_ids: Vec<String>,
    pub revision_date: DateTime<Utc>,
}

impl CipherData {
    pub fn new(response: &CipherResponse, user_id: &str) -> Self {
        Self {
            id: response.id.clone(),
            user_id: user_id.to_string(),
            organization_id: response.organization_id.clone(),
            folder_id: response.folder_id.clone(),
            cipher_type: response.cipher_type,
            name: response.name.clone(),
            notes: response.notes.clone(),
            favorite: response.favorite,
            login: response.login.clone(),
            collection_ids: response.collection_ids.clone(),
            revision_date: response.revision_date,
        }
    }
}

/// Groups of domains that share credentials.
pub type EquivalentDomains = Vec<Vec<String>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sync_response() {
        let json = r#"{
            "profile": {
                "id": "user-1",
                "securityStamp": "stamp",
                "key": "AAAA",
                "organizations": [{ "id": "org-1", "key": "wrapped" }]
            },
            "folders": [{ "id": "f1", "name": "2.enc", "revisionDate": "2024-03-01T10:00:00Z" }],
            "ciphers": [{
                "id": "c1", "type": 1, "name": "2.enc", "folderId": "f1",
                "revisionDate": "2024-03-01T10:00:00Z"
            }]
        }"#;

        let response: SyncResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.profile.security_stamp, "stamp");
        assert!(response.profile.private_key.is_none());
        assert_eq!(response.profile.organization_keys()["org-1"], "wrapped");
        assert_eq!(response.folders.len(), 1);
        assert!(response.collections.is_empty());
        assert_eq!(response.ciphers[0].folder_id.as_deref(), Some("f1"));
        assert!(response.domains.is_none());
    }

    #[test]
    fn test_merged_equivalent_domains_skips_empty_globals() {
        let domains = DomainsResponse {
            equivalent_domains: Some(vec![vec!["a.com".into(), "b.com".into()]]),
            global_equivalent_domains: Some(vec![
                GlobalDomainResponse {
                    domain_type: 1,
                    domains: vec!["x.com".into(), "y.com".into()],
                    excluded: false,
                },
                GlobalDomainResponse {
                    domain_type: 2,
                    domains: vec![],
                    excluded: false,
                },
            ]),
        };

        assert_eq!(
            domains.merged_equivalent_domains(),
            vec![
                vec!["a.com".to_string(), "b.com".to_string()],
                vec!["x.com".to_string(), "y.com".to_string()],
            ]
        );
        assert!(DomainsResponse::default().merged_equivalent_domains().is_empty());
    }
}
