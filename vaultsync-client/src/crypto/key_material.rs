//! Symmetric key material derived from a raw account secret.
//!
//! A raw secret is partitioned into an encryption sub-key and, for the
//! split schemes, an authentication (MAC) sub-key:
//!
//! | Scheme                     | Length | Encryption | Authentication |
//! |----------------------------|--------|------------|----------------|
//! | `AesCbc256B64`             | 32     | 0..32      | none           |
//! | `AesCbc128HmacSha256B64`   | 32     | 0..16      | 16..32         |
//! | `AesCbc256HmacSha256B64`   | 64     | 0..32      | 32..64         |
//!
//! Cipher and MAC computation live elsewhere; this module only validates and
//! splits the bytes.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::Result;

/// How the bytes of a raw secret are partitioned into sub-keys.
///
/// Serialized as its numeric wire tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum EncryptionScheme {
    /// Whole secret is the encryption key, no authentication key.
    AesCbc256B64,
    /// 16-byte encryption key followed by a 16-byte authentication key.
    AesCbc128HmacSha256B64,
    /// 32-byte encryption key followed by a 32-byte authentication key.
    AesCbc256HmacSha256B64,
}

impl EncryptionScheme {
    /// Total raw secret length this scheme requires.
    pub const fn key_len(self) -> usize {
        match self {
            Self::AesCbc256B64 => 32,
            Self::AesCbc128HmacSha256B64 => 32,
            Self::AesCbc256HmacSha256B64 => 64,
        }
    }

    /// Length of the encryption sub-key. The remainder is the authentication key.
    pub const fn encryption_key_len(self) -> usize {
        match self {
            Self::AesCbc256B64 => 32,
            Self::AesCbc128HmacSha256B64 => 16,
            Self::AesCbc256HmacSha256B64 => 32,
        }
    }

    /// Infer the scheme from a raw secret length.
    ///
    /// Only the unambiguous lengths are accepted: 32 bytes means the
    /// single-key scheme, 64 bytes the 32/32 split.
    pub fn infer(len: usize) -> std::result::Result<Self, KeyMaterialError> {
        match len {
            32 => Ok(Self::AesCbc256B64),
            64 => Ok(Self::AesCbc256HmacSha256B64),
            _ => Err(KeyMaterialError::UndeterminedScheme { len }),
        }
    }

    pub const fn tag(self) -> u8 {
        match self {
            Self::AesCbc256B64 => 0,
            Self::AesCbc128HmacSha256B64 => 1,
            Self::AesCbc256HmacSha256B64 => 2,
        }
    }
}

impl TryFrom<u8> for EncryptionScheme {
    type Error = KeyMaterialError;

    fn try_from(tag: u8) -> std::result::Result<Self, Self::Error> {
        match tag {
            0 => Ok(Self::AesCbc256B64),
            1 => Ok(Self::AesCbc128HmacSha256B64),
            2 => Ok(Self::AesCbc256HmacSha256B64),
            other => Err(KeyMaterialError::UnknownScheme(other)),
        }
    }
}

impl From<EncryptionScheme> for u8 {
    fn from(scheme: EncryptionScheme) -> Self {
        scheme.tag()
    }
}

impl std::fmt::Display for EncryptionScheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AesCbc256B64 => write!(f, "AesCbc256_B64"),
            Self::AesCbc128HmacSha256B64 => write!(f, "AesCbc128_HmacSha256_B64"),
            Self::AesCbc256HmacSha256B64 => write!(f, "AesCbc256_HmacSha256_B64"),
        }
    }
}

/// Reasons a raw secret cannot become key material.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyMaterialError {
    /// The raw secret was empty.
    #[error("Must provide key")]
    MissingKey,

    /// No scheme was given and the length does not identify one.
    #[error("Unable to determine encryption scheme for a {len}-byte key")]
    UndeterminedScheme { len: usize },

    /// The scheme was given but the secret has the wrong length for it.
    #[error("Unsupported scheme/key length: {scheme} requires {expected} bytes, got {actual}")]
    UnsupportedSchemeLength {
        scheme: EncryptionScheme,
        expected: usize,
        actual: usize,
    },

    /// A wire tag that names no known scheme.
    #[error("Unknown encryption scheme tag: {0}")]
    UnknownScheme(u8),

    /// The encoded secret could not be decoded.
    #[error("Malformed key: {0}")]
    Malformed(String),
}

/// Immutable encryption/authentication sub-keys split from a raw secret.
///
/// Construct with [`derive_key_material`] or [`KeyMaterial::from_base64`].
/// All byte buffers are zeroized on drop; nothing else can change them.
#[derive(Clone)]
pub struct KeyMaterial {
    raw: Vec<u8>,
    scheme: EncryptionScheme,
    encryption_key: Vec<u8>,
    authentication_key: Option<Vec<u8>>,
}

/// Split `raw` into sub-keys according to `scheme`, inferring the scheme
/// from the length when none is given.
pub fn derive_key_material(
    raw: &[u8],
    scheme: Option<EncryptionScheme>,
) -> std::result::Result<KeyMaterial, KeyMaterialError> {
    if raw.is_empty() {
        return Err(KeyMaterialError::MissingKey);
    }

    let scheme = match scheme {
        Some(scheme) => scheme,
        None => EncryptionScheme::infer(raw.len())?,
    };

    if raw.len() != scheme.key_len() {
        return Err(KeyMaterialError::UnsupportedSchemeLength {
            scheme,
            expected: scheme.key_len(),
            actual: raw.len(),
        });
    }

    let (enc, mac) = raw.split_at(scheme.encryption_key_len());
    let authentication_key = (!mac.is_empty()).then(|| mac.to_vec());

    Ok(KeyMaterial {
        raw: raw.to_vec(),
        scheme,
        encryption_key: enc.to_vec(),
        authentication_key,
    })
}

impl KeyMaterial {
    /// Decode a base64 raw secret and derive key material from it.
    pub fn from_base64(encoded: &str, scheme: Option<EncryptionScheme>) -> Result<Self> {
        if encoded.is_empty() {
            return Err(KeyMaterialError::MissingKey.into());
        }

        let mut raw = data_encoding::BASE64
            .decode(encoded.as_bytes())
            .map_err(|e| KeyMaterialError::Malformed(format!("invalid base64: {}", e)))?;
        let material = derive_key_material(&raw, scheme);
        raw.zeroize();
        Ok(material?)
    }

    /// Base64 form of the raw secret.
    pub fn to_base64(&self) -> String {
        data_encoding::BASE64.encode(&self.raw)
    }

    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    pub fn scheme(&self) -> EncryptionScheme {
        self.scheme
    }

    pub fn encryption_key(&self) -> &[u8] {
        &self.encryption_key
    }

    pub fn authentication_key(&self) -> Option<&[u8]> {
        self.authentication_key.as_deref()
    }

    /// Short, non-reversible identifier for log lines.
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(&self.raw);
        hex::encode(&digest[..4])
    }
}

impl Drop for KeyMaterial {
    fn drop(&mut self) {
        self.raw.zeroize();
        self.encryption_key.zeroize();
        self.authentication_key.zeroize();
    }
}

impl ZeroizeOnDrop for KeyMaterial {}

impl PartialEq for KeyMaterial {
    fn eq(&self, other: &Self) -> bool {
        // raw determines both sub-keys once the scheme matches
        self.scheme == other.scheme && bool::from(self.raw.ct_eq(&other.raw))
    }
}

impl Eq for KeyMaterial {}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("scheme", &self.scheme)
            .field("fingerprint", &self.fingerprint())
            .field("key", &"[REDACTED]")
            .finish()
    }
}
