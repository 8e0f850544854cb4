//! Nostr keypair generation.

use std::fmt;

use rand::{CryptoRng, Rng};
use secp256k1::{All, PublicKey, Secp256k1, SecretKey};
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::nip19::{self, CodecError};

/// A secp256k1 secret key together with its BIP-340 x-only public key.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Keypair {
    /// The private key bytes (32 bytes)
    secret_key: [u8; 32],
    /// The x-only public key bytes (32 bytes)
    #[zeroize(skip)]
    public_key: [u8; 32],
}

impl Keypair {
    /// Generates a new random keypair.
    ///
    /// Creating a secp256k1 context is expensive; hot loops should hold one
    /// and call [`Keypair::generate_with`] instead.
    pub fn generate() -> Self {
        let secp = Secp256k1::new();
        Self::generate_with(&secp, &mut rand::thread_rng())
    }

    /// Generates a new random keypair using an existing context and RNG.
    #[inline]
    pub fn generate_with<R: Rng + CryptoRng + ?Sized>(secp: &Secp256k1<All>, rng: &mut R) -> Self {
        let (secret_key, public_key) = secp.generate_keypair(rng);
        Self::from_parts(&secret_key, &public_key)
    }

    /// Rebuilds a keypair from existing secret key bytes.
    pub fn from_secret_key(secret_bytes: [u8; 32]) -> Result<Self, CodecError> {
        let secp = Secp256k1::new();
        let secret_key =
            SecretKey::from_slice(&secret_bytes).map_err(|_| CodecError::InvalidSecretKey)?;
        let public_key = PublicKey::from_secret_key(&secp, &secret_key);
        Ok(Self::from_parts(&secret_key, &public_key))
    }

    fn from_parts(secret_key: &SecretKey, public_key: &PublicKey) -> Self {
        let (x_only, _parity) = public_key.x_only_public_key();
        Self {
            secret_key: secret_key.secret_bytes(),
            public_key: x_only.serialize(),
        }
    }

    /// Returns the private key bytes.
    pub fn secret_key_bytes(&self) -> &[u8; 32] {
        &self.secret_key
    }

    /// Returns the x-only public key bytes.
    #[inline]
    pub fn public_key_bytes(&self) -> &[u8; 32] {
        &self.public_key
    }

    /// Returns the public key as lowercase hex.
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public_key)
    }

    /// Encodes the public key as `npub1…`.
    #[inline]
    pub fn npub(&self) -> Result<String, CodecError> {
        nip19::encode_npub(&self.public_key)
    }

    /// Encodes the secret key as `nsec1…`.
    pub fn nsec(&self) -> Result<String, CodecError> {
        nip19::encode_nsec(&self.secret_key)
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keypair")
            .field("secret_key", &"<redacted>")
            .field("public_key", &self.public_key_hex())
            .finish()
    }
}
