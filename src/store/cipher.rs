//! Password-derived AES-256-CBC envelope for the key store.

use std::fmt;

use aes::Aes256;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use super::StoreError;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// Salt used for every key derivation. Existing stores depend on it.
pub const FIXED_SALT: &[u8] = b"salt";

const KEY_LEN: usize = 32;
const IV_LEN: usize = 16;

const SCRYPT_LOG_N: u8 = 14;
const SCRYPT_R: u32 = 8;
const SCRYPT_P: u32 = 1;

/// scrypt cost parameters.
///
/// The default (N = 2^14, r = 8, p = 1) is what existing store files were
/// written with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    log_n: u8,
    r: u32,
    p: u32,
}

impl KdfParams {
    pub const fn new(log_n: u8, r: u32, p: u32) -> Self {
        Self { log_n, r, p }
    }

    fn to_scrypt(self) -> Result<scrypt::Params, StoreError> {
        scrypt::Params::new(self.log_n, self.r, self.p, KEY_LEN)
            .map_err(|e| StoreError::Kdf(e.to_string()))
    }
}

impl Default for KdfParams {
    fn default() -> Self {
        Self::new(SCRYPT_LOG_N, SCRYPT_R, SCRYPT_P)
    }
}

/// Symmetric key derived from the user's password.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct StoreKey([u8; KEY_LEN]);

impl StoreKey {
    /// Derives the store key from `password` and the fixed salt.
    ///
    /// The same password and parameters always give the same key.
    pub fn derive(password: &str, params: &KdfParams) -> Result<Self, StoreError> {
        let mut key = [0u8; KEY_LEN];
        scrypt::scrypt(password.as_bytes(), FIXED_SALT, &params.to_scrypt()?, &mut key)
            .map_err(|e| StoreError::Kdf(e.to_string()))?;
        Ok(Self(key))
    }
}

impl fmt::Debug for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("StoreKey(<redacted>)")
    }
}

/// The on-disk envelope: `{ "iv": hex, "content": hex }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedBlob {
    #[serde(with = "hex::serde")]
    pub iv: [u8; IV_LEN],
    #[serde(with = "hex::serde")]
    pub content: Vec<u8>,
}

/// Encrypts `plaintext` under a fresh random IV.
pub fn encrypt(plaintext: &[u8], key: &StoreKey) -> EncryptedBlob {
    let mut iv = [0u8; IV_LEN];
    rand::thread_rng().fill_bytes(&mut iv);

    let content =
        Aes256CbcEnc::new(&key.0.into(), &iv.into()).encrypt_padded_vec_mut::<Pkcs7>(plaintext);

    EncryptedBlob { iv, content }
}

/// Decrypts a blob back to its UTF-8 plaintext.
///
/// Bad padding or a non-UTF-8 result both mean the key is wrong or the data
/// was damaged; they are reported as [`StoreError::WrongPasswordOrCorruptData`].
pub fn decrypt(blob: &EncryptedBlob, key: &StoreKey) -> Result<Zeroizing<String>, StoreError> {
    let plaintext = Aes256CbcDec::new(&key.0.into(), &blob.iv.into())
        .decrypt_padded_vec_mut::<Pkcs7>(&blob.content)
        .map_err(|_| StoreError::WrongPasswordOrCorruptData)?;

    String::from_utf8(plaintext)
        .map(Zeroizing::new)
        .map_err(|e| {
            // the rejected bytes are plaintext under some key
            e.into_bytes().zeroize();
            StoreError::WrongPasswordOrCorruptData
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    // keeps the tests fast; production uses the default parameters
    const TEST_PARAMS: KdfParams = KdfParams::new(4, 8, 1);

    fn key(password: &str) -> StoreKey {
        StoreKey::derive(password, &TEST_PARAMS).unwrap()
    }

    #[test]
    fn test_round_trip() {
        let key = key("hunter2");
        let blob = encrypt(b"{\"ace\":{}}", &key);
        assert_eq!(blob.content.len() % 16, 0);
        assert_eq!(decrypt(&blob, &key).unwrap().as_str(), "{\"ace\":{}}");
    }

    #[test]
    fn test_empty_plaintext_round_trip() {
        let key = key("hunter2");
        let blob = encrypt(b"", &key);
        assert_eq!(blob.content.len(), 16);
        assert_eq!(decrypt(&blob, &key).unwrap().as_str(), "");
    }

    #[test]
    fn test_derivation_is_deterministic() {
        assert_eq!(key("correct"), key("correct"));
        assert_ne!(key("correct"), key("wrong"));
    }

    #[test]
    fn test_default_params_deterministic() {
        let params = KdfParams::default();
        let a = StoreKey::derive("correct", &params).unwrap();
        let b = StoreKey::derive("correct", &params).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_fresh_iv_per_call() {
        let key = key("hunter2");
        let a = encrypt(b"same", &key);
        let b = encrypt(b"same", &key);
        assert_ne!(a.iv, b.iv);
        assert_ne!(a.content, b.content);
    }

    #[test]
    fn test_wrong_password() {
        let plaintext = br#"{"ace":{"npub":"npub1ace"}}"#;
        let blob = encrypt(plaintext, &key("correct"));
        for password in ["wrong", "Correct", "correct ", "x"] {
            match decrypt(&blob, &key(password)) {
                Err(StoreError::WrongPasswordOrCorruptData) => {}
                Ok(text) => assert_ne!(text.as_bytes(), plaintext),
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
    }

    #[test]
    fn test_truncated_content() {
        let key = key("hunter2");
        let mut blob = encrypt(b"some longer plaintext to span blocks", &key);
        blob.content.truncate(blob.content.len() - 3);
        assert!(matches!(
            decrypt(&blob, &key),
            Err(StoreError::WrongPasswordOrCorruptData)
        ));
    }

    #[test]
    fn test_blob_json_shape() {
        let blob = EncryptedBlob {
            iv: [0xab; IV_LEN],
            content: vec![0x01, 0xff],
        };
        let json = serde_json::to_value(&blob).unwrap();
        assert_eq!(json["iv"], "abababababababababababababababab");
        assert_eq!(json["content"], "01ff");
        let back: EncryptedBlob = serde_json::from_value(json).unwrap();
        assert_eq!(back, blob);
    }

    #[test]
    fn test_debug_redacts_key() {
        assert_eq!(format!("{:?}", key("a")), "StoreKey(<redacted>)");
    }
}
