//! In-memory mapping from prefix to the key that first matched it.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use zeroize::Zeroizing;

use crate::crypto::Keypair;
use crate::matcher::Prefix;

/// A key whose npub matched a vanity prefix.
///
/// Created once per prefix, the first time it matches, and never changed.
#[derive(Clone, PartialEq, Eq)]
pub struct FoundRecord {
    prefix: Prefix,
    private_key: Zeroizing<[u8; 32]>,
    public_key: [u8; 32],
    npub: String,
    found_at: DateTime<Utc>,
}

impl FoundRecord {
    pub fn new(
        prefix: Prefix,
        keypair: &Keypair,
        npub: impl Into<String>,
        found_at: DateTime<Utc>,
    ) -> Self {
        Self {
            prefix,
            private_key: Zeroizing::new(*keypair.secret_key_bytes()),
            public_key: *keypair.public_key_bytes(),
            npub: npub.into(),
            found_at,
        }
    }

    pub fn prefix(&self) -> &Prefix {
        &self.prefix
    }

    /// Raw private key bytes. Only the export path should read these.
    pub fn private_key(&self) -> &[u8; 32] {
        &self.private_key
    }

    pub fn public_key(&self) -> &[u8; 32] {
        &self.public_key
    }

    pub fn npub(&self) -> &str {
        &self.npub
    }

    pub fn found_at(&self) -> DateTime<Utc> {
        self.found_at
    }
}

impl fmt::Debug for FoundRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FoundRecord")
            .field("prefix", &self.prefix)
            .field("private_key", &"<redacted>")
            .field("npub", &self.npub)
            .field("found_at", &self.found_at)
            .finish()
    }
}

/// Serialized form of a record; the prefix is the map key.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredRecord {
    #[serde(with = "hex::serde")]
    private_key: [u8; 32],
    #[serde(with = "hex::serde")]
    public_key: [u8; 32],
    npub: String,
    found_at: DateTime<Utc>,
}

impl Drop for StoredRecord {
    fn drop(&mut self) {
        zeroize::Zeroize::zeroize(&mut self.private_key);
    }
}

/// Insertion-ordered mapping from prefix to [`FoundRecord`].
///
/// Serializes to `{ prefix: { privateKey, publicKey, npub, foundAt } }`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyStore {
    records: Vec<FoundRecord>,
}

impl KeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a record unless its prefix is already present.
    ///
    /// Returns false (and keeps the existing record) on a repeat prefix.
    pub fn insert(&mut self, record: FoundRecord) -> bool {
        if self.contains(record.prefix()) {
            return false;
        }
        self.records.push(record);
        true
    }

    pub fn get(&self, prefix: &Prefix) -> Option<&FoundRecord> {
        self.records.iter().find(|r| r.prefix() == prefix)
    }

    pub fn contains(&self, prefix: &Prefix) -> bool {
        self.get(prefix).is_some()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FoundRecord> {
        self.records.iter()
    }

    /// Serializes the store to its canonical pretty-printed JSON.
    pub fn to_json(&self) -> Result<Zeroizing<String>, serde_json::Error> {
        serde_json::to_string_pretty(self).map(Zeroizing::new)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

impl Serialize for KeyStore {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.records.len()))?;
        for record in &self.records {
            let stored = StoredRecord {
                private_key: *record.private_key,
                public_key: record.public_key,
                npub: record.npub.clone(),
                found_at: record.found_at,
            };
            map.serialize_entry(record.prefix.as_str(), &stored)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for KeyStore {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct KeyStoreVisitor;

        impl<'de> Visitor<'de> for KeyStoreVisitor {
            type Value = KeyStore;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map from prefix to found key")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<KeyStore, A::Error> {
                let mut store = KeyStore::new();
                while let Some((prefix, stored)) = access.next_entry::<Prefix, StoredRecord>()? {
                    store.insert(FoundRecord {
                        prefix,
                        private_key: Zeroizing::new(stored.private_key),
                        public_key: stored.public_key,
                        npub: stored.npub.clone(),
                        found_at: stored.found_at,
                    });
                }
                Ok(store)
            }
        }

        deserializer.deserialize_map(KeyStoreVisitor)
    }
}
