//! # nostr_vanity
//!
//! Vanity npub miner for Nostr.
//!
//! ## Architecture
//!
//! - `crypto`: secp256k1 key generation and NIP-19 bech32 encoding
//! - `matcher`: Prefix validation and multi-prefix matching
//! - `store`: Encrypted, atomically saved store of found keys
//! - `worker`: Key sources and the parallel worker pool
//! - `search`: The resumable search loop
//! - `export`: Reading found keys back as `nsec`
//! - `config`: Command line configuration

pub mod config;
pub mod crypto;
pub mod export;
pub mod matcher;
pub mod search;
pub mod store;
pub mod worker;

pub use config::{Cli, Command, ConfigError};
pub use crypto::{CodecError, Keypair};
pub use export::{export_keys, ExportError, ExportedKey};
pub use matcher::{parse_prefixes, Prefix, PrefixError, PrefixSet};
pub use search::{Search, SearchError, SearchEvent, SearchLimits, SearchOutcome, StopReason};
pub use store::{FoundRecord, KdfParams, KeyStore, StoreError, Vault};
pub use worker::{Candidate, KeySource, RandomKeySource, WorkerPool};
