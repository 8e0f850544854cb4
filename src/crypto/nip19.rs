//! NIP-19 bech32 encoding for Nostr keys (`npub1…` / `nsec1…`).

use bech32::primitives::decode::{CheckedHrpstring, CheckedHrpstringError};
use bech32::{Bech32, Hrp};

/// The bech32 data alphabet. Every vanity prefix must be drawn from it.
pub const BECH32_ALPHABET: &str = "qpzry9x8gf2tvdw0s3jn54khce6mua7l";

/// Human-readable part for public keys.
pub const NPUB_HRP: Hrp = Hrp::parse_unchecked("npub");

/// Human-readable part for secret keys.
pub const NSEC_HRP: Hrp = Hrp::parse_unchecked("nsec");

/// Fixed leading text of every encoded public key (HRP plus separator).
pub const NPUB_TAG: &str = "npub1";

/// Errors produced while encoding or decoding NIP-19 strings.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("invalid bech32 checksum")]
    InvalidChecksum,

    #[error("invalid bech32 string: {0}")]
    InvalidCharacters(String),

    #[error("expected `{expected}` prefix, found `{found}`")]
    WrongPrefix { expected: String, found: String },

    #[error("expected 32 data bytes, found {0}")]
    InvalidLength(usize),

    #[error("secret key is out of range for secp256k1")]
    InvalidSecretKey,

    #[error("bech32 encoding failed: {0}")]
    Encode(String),
}

/// Encodes a 32-byte x-only public key as `npub1…`.
pub fn encode_npub(public_key: &[u8; 32]) -> Result<String, CodecError> {
    encode(NPUB_HRP, public_key)
}

/// Encodes a 32-byte secret key as `nsec1…`.
pub fn encode_nsec(secret_key: &[u8; 32]) -> Result<String, CodecError> {
    encode(NSEC_HRP, secret_key)
}

/// Decodes an `npub1…` string back to the public key bytes.
pub fn decode_npub(encoded: &str) -> Result<[u8; 32], CodecError> {
    decode(NPUB_HRP, encoded)
}

/// Decodes an `nsec1…` string back to the secret key bytes.
pub fn decode_nsec(encoded: &str) -> Result<[u8; 32], CodecError> {
    decode(NSEC_HRP, encoded)
}

fn encode(hrp: Hrp, data: &[u8; 32]) -> Result<String, CodecError> {
    bech32::encode::<Bech32>(hrp, data).map_err(|e| CodecError::Encode(e.to_string()))
}

fn decode(expected: Hrp, encoded: &str) -> Result<[u8; 32], CodecError> {
    let checked = CheckedHrpstring::new::<Bech32>(encoded).map_err(|e| match e {
        CheckedHrpstringError::Checksum(_) => CodecError::InvalidChecksum,
        other => CodecError::InvalidCharacters(other.to_string()),
    })?;

    if checked.hrp() != expected {
        return Err(CodecError::WrongPrefix {
            expected: expected.to_string(),
            found: checked.hrp().to_string(),
        });
    }

    let bytes: Vec<u8> = checked.byte_iter().collect();
    let len = bytes.len();
    bytes.try_into().map_err(|_| CodecError::InvalidLength(len))
}
