//! Key generation and NIP-19 encoding for Nostr keys.
//!
//! This module provides:
//! - Secure random secp256k1 key generation with x-only public keys
//! - bech32 `npub`/`nsec` encoding and strict decoding

mod keypair;
pub mod nip19;

pub use keypair::Keypair;
pub use nip19::{
    decode_npub, decode_nsec, encode_npub, encode_nsec, CodecError, BECH32_ALPHABET, NPUB_TAG,
};
