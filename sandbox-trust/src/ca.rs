//! Signing authorities and on-disk keypairs.
//!
//! An authority is created lazily on first use and loaded on every run
//! after that. A private key file that exists but fails to parse is a
//! trust-chain break and always fatal — regenerating it would silently
//! orphan every `@cert-authority` line distributed under the old key.
//!
//! There is no lock around check-then-create: two concurrent first runs
//! may both generate a keypair, and the last atomic rename wins. Nothing
//! corrupts, but the loser's in-process keypair is not what ends up on
//! disk. Accepted for a single-user local tool.

use std::path::Path;

use ssh_key::{HashAlg, LineEnding, PrivateKey, PublicKey};
use tracing::{debug, info};

use crate::config::public_key_path;
use crate::error::{Result, TrustError};
use crate::keygen::{KeyGenerator, wire_public_key};
use crate::store::ConfigFileStore;

/// A keypair dedicated to signing certificates. The private half never
/// leaves the managed configuration root.
#[derive(Debug)]
pub struct CertificateAuthority {
    signer: PrivateKey,
}

impl CertificateAuthority {
    /// Load the authority at `path`, or create and persist a new one if
    /// the file is absent. A present-but-unparsable key is fatal.
    pub fn load_or_create(
        store: &dyn ConfigFileStore,
        keygen: &dyn KeyGenerator,
        path: &Path,
        comment: &str,
    ) -> Result<Self> {
        let signer = if store.exists(path) {
            let bytes = store.read_all(path)?;
            let key = PrivateKey::from_openssh(&bytes)
                .map_err(|_| TrustError::CorruptAuthority(path.to_path_buf()))?;
            debug!(
                "loaded CA {} ({})",
                path.display(),
                key.public_key().fingerprint(HashAlg::Sha256)
            );
            key
        } else {
            create_keypair(store, keygen, path, comment)?
        };
        Ok(Self { signer })
    }

    pub fn signer(&self) -> &PrivateKey {
        &self.signer
    }

    pub fn public_key(&self) -> &PublicKey {
        self.signer.public_key()
    }
}

/// Load an identity keypair from `path`, generating and persisting a new
/// one if absent. Unlike an authority, a parse failure names the key
/// rather than declaring a trust-chain break.
pub fn load_or_create_keypair(
    store: &dyn ConfigFileStore,
    keygen: &dyn KeyGenerator,
    path: &Path,
    comment: &str,
) -> Result<PrivateKey> {
    if store.exists(path) {
        let bytes = store.read_all(path)?;
        return PrivateKey::from_openssh(&bytes)
            .map_err(|e| TrustError::Key(format!("parse {}: {e}", path.display())));
    }
    create_keypair(store, keygen, path, comment)
}

fn create_keypair(
    store: &dyn ConfigFileStore,
    keygen: &dyn KeyGenerator,
    path: &Path,
    comment: &str,
) -> Result<PrivateKey> {
    let mut key = keygen.generate()?;
    key.set_comment(comment);

    let encoded = key
        .to_openssh(LineEnding::LF)
        .map_err(|e| TrustError::Key(format!("encode {}: {e}", path.display())))?;
    store.atomic_replace(path, encoded.as_bytes(), 0o600)?;

    let public_line = format!("{}\n", wire_public_key(key.public_key())?);
    store.atomic_replace(&public_key_path(path), public_line.as_bytes(), 0o644)?;

    info!(
        "generated keypair {} ({})",
        path.display(),
        key.public_key().fingerprint(HashAlg::Sha256)
    );
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keygen::FixedSeedGenerator;
    use crate::store::MemoryStore;
    use std::path::PathBuf;

    #[test]
    fn load_or_create_is_idempotent() {
        let store = MemoryStore::default();
        let keygen = FixedSeedGenerator::new(1);
        let path = PathBuf::from("/cfg/host_ca");

        let first = CertificateAuthority::load_or_create(&store, &keygen, &path, "host CA").unwrap();
        let pub_bytes = store.read_all(&public_key_path(&path)).unwrap();

        let second =
            CertificateAuthority::load_or_create(&store, &keygen, &path, "host CA").unwrap();
        assert_eq!(
            first.public_key().to_openssh().unwrap(),
            second.public_key().to_openssh().unwrap()
        );
        // The .pub file is not rewritten on the second call.
        assert_eq!(store.read_all(&public_key_path(&path)).unwrap(), pub_bytes);
    }

    #[test]
    fn corrupt_authority_is_fatal_and_not_regenerated() {
        let store = MemoryStore::default();
        let keygen = FixedSeedGenerator::new(2);
        let path = PathBuf::from("/cfg/user_ca");
        store
            .atomic_replace(&path, b"not a private key", 0o600)
            .unwrap();

        let err = CertificateAuthority::load_or_create(&store, &keygen, &path, "user CA")
            .unwrap_err();
        assert!(matches!(err, TrustError::CorruptAuthority(_)));
        // The corrupt bytes are left untouched for a human to inspect.
        assert_eq!(store.read_all(&path).unwrap(), b"not a private key");
    }

    #[test]
    fn persisted_private_key_round_trips() {
        let store = MemoryStore::default();
        let keygen = FixedSeedGenerator::new(3);
        let path = PathBuf::from("/cfg/user_key");

        let created = load_or_create_keypair(&store, &keygen, &path, "user").unwrap();
        let loaded = load_or_create_keypair(&store, &keygen, &path, "user").unwrap();
        assert_eq!(
            created.public_key().to_openssh().unwrap(),
            loaded.public_key().to_openssh().unwrap()
        );
        assert_eq!(loaded.comment(), "user");
    }

    #[test]
    fn authorities_at_different_paths_are_unrelated() {
        let store = MemoryStore::default();
        let keygen = FixedSeedGenerator::new(4);
        let host =
            CertificateAuthority::load_or_create(&store, &keygen, Path::new("/cfg/host_ca"), "h")
                .unwrap();
        let user =
            CertificateAuthority::load_or_create(&store, &keygen, Path::new("/cfg/user_ca"), "u")
                .unwrap();
        assert_ne!(
            host.public_key().to_openssh().unwrap(),
            user.public_key().to_openssh().unwrap()
        );
    }
}
