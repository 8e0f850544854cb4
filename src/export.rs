//! Reading found keys back out of the store.
//!
//! This is the only place private keys leave the store, re-encoded as
//! `nsec1…` so they can be pasted into a Nostr client.

use chrono::{DateTime, Utc};
use zeroize::Zeroizing;

use crate::crypto::{encode_nsec, CodecError, Keypair};
use crate::matcher::Prefix;
use crate::store::{FoundRecord, StoreError, Vault};

/// A found key rendered for display.
#[derive(Clone)]
pub struct ExportedKey {
    pub prefix: Prefix,
    pub npub: String,
    pub nsec: Zeroizing<String>,
    pub found_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("cannot encode key for prefix \"{prefix}\": {source}")]
    Codec {
        prefix: Prefix,
        #[source]
        source: CodecError,
    },

    #[error("stored public key for prefix \"{0}\" does not belong to its private key")]
    Mismatch(Prefix),
}

/// Renders one record, checking its public key against the private key.
pub fn export_record(record: &FoundRecord) -> Result<ExportedKey, ExportError> {
    let codec_err = |source| ExportError::Codec {
        prefix: record.prefix().clone(),
        source,
    };

    let keypair = Keypair::from_secret_key(*record.private_key()).map_err(codec_err)?;
    if keypair.public_key_bytes() != record.public_key() {
        return Err(ExportError::Mismatch(record.prefix().clone()));
    }

    let nsec = encode_nsec(record.private_key()).map_err(codec_err)?;

    Ok(ExportedKey {
        prefix: record.prefix().clone(),
        npub: record.npub().to_string(),
        nsec: Zeroizing::new(nsec),
        found_at: record.found_at(),
    })
}

/// Decrypts the store and renders every record.
///
/// Unlike a mining session, a missing store or a wrong password is an error
/// here.
pub fn export_keys(vault: &Vault) -> Result<Vec<ExportedKey>, ExportError> {
    let store = vault.load_existing()?;
    store.iter().map(export_record).collect()
}
