//! Encrypted persistence for found keys.
//!
//! - `cipher`: scrypt key derivation and the AES-256-CBC envelope
//! - `keystore`: the prefix to found-key mapping and its JSON form
//! - `vault`: loading and atomically saving the encrypted store file

mod cipher;
mod keystore;
mod vault;

use std::io;
use std::path::PathBuf;

pub use cipher::{decrypt, encrypt, EncryptedBlob, KdfParams, StoreKey, FIXED_SALT};
pub use keystore::{FoundRecord, KeyStore};
pub use vault::{Vault, DEFAULT_STORE_FILE};

/// Errors raised while loading or saving the key store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("no key store found at {}", .0.display())]
    NotFound(PathBuf),

    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("key store file is not a valid encrypted blob: {0}")]
    MalformedFile(#[source] serde_json::Error),

    #[error("wrong password or corrupt key store")]
    WrongPasswordOrCorruptData,

    #[error("decrypted key store is malformed: {0}")]
    MalformedPayload(#[source] serde_json::Error),

    #[error("password cannot be empty")]
    EmptyPassword,

    #[error("key derivation failed: {0}")]
    Kdf(String),

    #[error("failed to serialize key store: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("failed to write {}: {source}", .path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl StoreError {
    /// True when the store exists but could not be decrypted.
    pub fn is_wrong_password(&self) -> bool {
        matches!(self, StoreError::WrongPasswordOrCorruptData)
    }
}
