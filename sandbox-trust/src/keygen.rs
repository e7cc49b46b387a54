//! Key generation capability.
//!
//! The trait is the injection seam for deterministic tests; production
//! code uses [`OsKeyGenerator`] over the operating system RNG.

use ssh_key::rand_core::OsRng;
use ssh_key::{Algorithm, PrivateKey, PublicKey};

use crate::error::{Result, TrustError};

/// Produces fresh asymmetric keypairs.
///
/// Failure means the entropy source is exhausted or unavailable, which is
/// fatal and not retryable.
pub trait KeyGenerator: Send + Sync {
    fn generate(&self) -> Result<PrivateKey>;
}

/// Production generator: Ed25519 keys from OS entropy.
#[derive(Clone, Copy, Debug, Default)]
pub struct OsKeyGenerator;

impl KeyGenerator for OsKeyGenerator {
    fn generate(&self) -> Result<PrivateKey> {
        PrivateKey::random(&mut OsRng, Algorithm::Ed25519)
            .map_err(|e| TrustError::Key(format!("ed25519 generation failed: {e}")))
    }
}

/// Convert a public key to its one-line OpenSSH wire representation.
/// Pure and side-effect free.
pub fn wire_public_key(public: &PublicKey) -> Result<String> {
    public
        .to_openssh()
        .map_err(|e| TrustError::Key(format!("public key encoding failed: {e}")))
}

/// Deterministic generator for hermetic tests: every key is derived from
/// the seeded RNG, so fixtures are reproducible across runs.
#[cfg(any(test, feature = "test-utils"))]
pub struct FixedSeedGenerator(std::sync::Mutex<rand::rngs::StdRng>);

#[cfg(any(test, feature = "test-utils"))]
impl FixedSeedGenerator {
    pub fn new(seed: u64) -> Self {
        use rand::SeedableRng;
        Self(std::sync::Mutex::new(rand::rngs::StdRng::seed_from_u64(
            seed,
        )))
    }
}

#[cfg(any(test, feature = "test-utils"))]
impl KeyGenerator for FixedSeedGenerator {
    fn generate(&self) -> Result<PrivateKey> {
        let mut rng = self.0.lock().unwrap_or_else(|e| e.into_inner());
        PrivateKey::random(&mut *rng, Algorithm::Ed25519)
            .map_err(|e| TrustError::Key(format!("seeded generation failed: {e}")))
    }
}
