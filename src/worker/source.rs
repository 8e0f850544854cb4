//! Sources of encoded candidate keys.

use rand::rngs::ThreadRng;
use secp256k1::{All, Secp256k1};

use crate::crypto::{CodecError, Keypair};

/// A generated keypair together with its npub encoding.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub keypair: Keypair,
    pub npub: String,
}

impl Candidate {
    /// Encodes `keypair` and wraps it as a candidate.
    pub fn from_keypair(keypair: Keypair) -> Result<Self, CodecError> {
        let npub = keypair.npub()?;
        Ok(Self { keypair, npub })
    }
}

/// Produces one candidate per search iteration.
pub trait KeySource {
    fn next_candidate(&mut self) -> Result<Candidate, CodecError>;
}

impl<F> KeySource for F
where
    F: FnMut() -> Result<Candidate, CodecError>,
{
    fn next_candidate(&mut self) -> Result<Candidate, CodecError> {
        self()
    }
}

/// Random keys from the thread-local CSPRNG, encoded as npub.
pub struct RandomKeySource {
    secp: Secp256k1<All>,
    rng: ThreadRng,
}

impl RandomKeySource {
    pub fn new() -> Self {
        Self {
            secp: Secp256k1::new(),
            rng: rand::thread_rng(),
        }
    }
}

impl Default for RandomKeySource {
    fn default() -> Self {
        Self::new()
    }
}

impl KeySource for RandomKeySource {
    #[inline]
    fn next_candidate(&mut self) -> Result<Candidate, CodecError> {
        Candidate::from_keypair(Keypair::generate_with(&self.secp, &mut self.rng))
    }
}
