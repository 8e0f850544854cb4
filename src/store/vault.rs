//! Encrypted key store file.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use super::cipher::{self, EncryptedBlob, KdfParams, StoreKey};
use super::keystore::KeyStore;
use super::StoreError;

/// File name used when no store path is configured.
pub const DEFAULT_STORE_FILE: &str = "pow-keys.enc";

/// A store file together with the key that opens it.
#[derive(Debug)]
pub struct Vault {
    path: PathBuf,
    key: StoreKey,
}

impl Vault {
    /// Opens the vault at `path`, deriving its key with the default scrypt cost.
    pub fn open(path: impl Into<PathBuf>, password: &str) -> Result<Self, StoreError> {
        Self::with_params(path, password, &KdfParams::default())
    }

    /// Opens the vault with explicit key derivation parameters.
    pub fn with_params(
        path: impl Into<PathBuf>,
        password: &str,
        params: &KdfParams,
    ) -> Result<Self, StoreError> {
        if password.is_empty() {
            return Err(StoreError::EmptyPassword);
        }

        Ok(Self {
            path: path.into(),
            key: StoreKey::derive(password, params)?,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Loads the store, returning an empty one if the file does not exist yet.
    pub fn load(&self) -> Result<KeyStore, StoreError> {
        match self.load_existing() {
            Err(StoreError::NotFound(_)) => {
                debug!(path = %self.path.display(), "no key store yet, starting empty");
                Ok(KeyStore::new())
            }
            other => other,
        }
    }

    /// Loads the store, failing with [`StoreError::NotFound`] if it is missing.
    pub fn load_existing(&self) -> Result<KeyStore, StoreError> {
        let contents = fs::read_to_string(&self.path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => StoreError::NotFound(self.path.clone()),
            _ => StoreError::Io {
                path: self.path.clone(),
                source: e,
            },
        })?;

        let blob: EncryptedBlob =
            serde_json::from_str(&contents).map_err(StoreError::MalformedFile)?;
        let plaintext = cipher::decrypt(&blob, &self.key)?;
        let store = KeyStore::from_json(&plaintext).map_err(StoreError::MalformedPayload)?;

        debug!(path = %self.path.display(), records = store.len(), "loaded key store");
        Ok(store)
    }

    /// Encrypts and writes the store.
    ///
    /// The new contents go to a temporary file in the same directory which is
    /// synced and then renamed over the old file, so readers only ever see a
    /// complete store.
    pub fn save(&self, store: &KeyStore) -> Result<(), StoreError> {
        let plaintext = store.to_json().map_err(StoreError::Serialize)?;
        let blob = cipher::encrypt(plaintext.as_bytes(), &self.key);
        let contents = serde_json::to_string_pretty(&blob).map_err(StoreError::Serialize)?;

        self.write_atomic(contents.as_bytes())
            .map_err(|source| StoreError::Persistence {
                path: self.path.clone(),
                source,
            })?;

        debug!(path = %self.path.display(), records = store.len(), "saved key store");
        Ok(())
    }

    fn write_atomic(&self, contents: &[u8]) -> io::Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(contents)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }

    /// Moves an unreadable store out of the way so a fresh one can be written.
    ///
    /// Returns the backup path. An existing backup is never replaced.
    pub fn set_aside(&self) -> Result<PathBuf, StoreError> {
        let stamp = Utc::now().format("%Y%m%d%H%M%S%3f").to_string();
        let mut backup = self.backup_path(&stamp, 0);
        let mut attempt = 1;
        while backup.exists() {
            backup = self.backup_path(&stamp, attempt);
            attempt += 1;
        }

        fs::rename(&self.path, &backup).map_err(|source| StoreError::Persistence {
            path: backup.clone(),
            source,
        })?;

        info!(from = %self.path.display(), to = %backup.display(), "set aside unreadable key store");
        Ok(backup)
    }

    fn backup_path(&self, stamp: &str, attempt: u32) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(format!(".bak-{}", stamp));
        if attempt > 0 {
            name.push(format!("-{}", attempt));
        }
        PathBuf::from(name)
    }
}
