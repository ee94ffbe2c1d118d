use thiserror::Error;

use crate::crypto::KeyMaterialError;

#[derive(Error, Debug)]
pub enum VaultSyncError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Authority returned {status}: {message}")]
    Authority { status: u16, message: String },

    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Security stamp has changed")]
    StampMismatch,

    #[error("Invalid key material: {0}")]
    InvalidKeyMaterial(#[from] KeyMaterialError),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to replace {kind}: {message}")]
    Replace { kind: &'static str, message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl VaultSyncError {
    /// Short machine-readable code for hosts that forward errors over IPC.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Transport(_) => "TRANSPORT_ERROR",
            Self::Authority { .. } => "AUTHORITY_ERROR",
            Self::NotAuthenticated => "NOT_AUTHENTICATED",
            Self::StampMismatch => "STAMP_MISMATCH",
            Self::InvalidKeyMaterial(_) => "INVALID_KEY_MATERIAL",
            Self::Storage(_) => "STORAGE_ERROR",
            Self::Encryption(_) => "ENCRYPTION_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Replace { .. } => "REPLACE_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Io(_) => "IO_ERROR",
        }
    }

    /// Transport and authority failures leave local state untouched and may
    /// simply be retried by the caller.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Authority { .. })
    }

    /// The session cannot continue without the user signing in again.
    pub fn requires_reauthentication(&self) -> bool {
        matches!(
            self,
            Self::StampMismatch | Self::InvalidKeyMaterial(_) | Self::NotAuthenticated
        )
    }
}

impl serde::Serialize for VaultSyncError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;

        let mut state = serializer.serialize_struct("VaultSyncError", 2)?;
        state.serialize_field("code", self.code())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

pub type Result<T> = std::result::Result<T, VaultSyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_material_error_converts() {
        let err: VaultSyncError = KeyMaterialError::MissingKey.into();
        assert!(matches!(
            err,
            VaultSyncError::InvalidKeyMaterial(KeyMaterialError::MissingKey)
        ));
        assert!(err.requires_reauthentication());
        assert!(!err.is_transport());
    }

    #[test]
    fn test_transport_classification() {
        assert!(VaultSyncError::Transport("timed out".into()).is_transport());
        assert!(VaultSyncError::Authority {
            status: 500,
            message: "boom".into()
        }
        .is_transport());
        assert!(!VaultSyncError::StampMismatch.is_transport());
        assert!(VaultSyncError::StampMismatch.requires_reauthentication());
    }

    #[test]
    fn test_error_serialization() {
        let json = serde_json::to_string(&VaultSyncError::StampMismatch).unwrap();
        assert!(json.contains("STAMP_MISMATCH"));
        assert!(json.contains("Security stamp has changed"));
    }
}
