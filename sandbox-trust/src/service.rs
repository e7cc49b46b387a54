//! Trust service orchestration.
//!
//! `bootstrap` runs the fail-fast startup sequence that guarantees CA
//! material, the user identity, the user certificate, and client config
//! wiring all exist; `issue_sandbox_identity` then mints one fresh host
//! identity per sandbox. The caller owns the returned bundle — nothing
//! per-sandbox is persisted here.

use std::process::Stdio;

use serde::{Deserialize, Serialize};
use ssh_key::LineEnding;
use tracing::{debug, info, warn};

use crate::SANDBOX_LOGIN_USER;
use crate::ca::{self, CertificateAuthority};
use crate::client_config::{self, IncludeOutcome};
use crate::config::TrustConfig;
use crate::error::{Result, TrustError};
use crate::issuer;
use crate::keygen::{KeyGenerator, wire_public_key};
use crate::known_hosts;
use crate::store::ConfigFileStore;

/// Everything a new sandbox needs mounted before its SSH server starts:
/// its own host key and certificate, plus the user authority's public
/// key to authorize the connecting user's certificate. All fields are
/// standard OpenSSH encodings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KeyBundle {
    pub host_private_key: String,
    pub host_public_key: String,
    pub host_certificate: String,
    pub user_authority_public_key: String,
}

pub struct LocalTrustService {
    config: TrustConfig,
    store: Box<dyn ConfigFileStore>,
    keygen: Box<dyn KeyGenerator>,
    host_ca: CertificateAuthority,
    user_ca: CertificateAuthority,
}

impl std::fmt::Debug for LocalTrustService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalTrustService")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl LocalTrustService {
    /// Run the startup sequence and return the ready service.
    ///
    /// Fails fast on the first error: managed root → user CA → user
    /// identity → fresh user certificate (reissued every run, never
    /// cached as "already issued") → managed snippet → client-config
    /// include → host CA → trust-store line.
    pub fn bootstrap(
        config: TrustConfig,
        store: Box<dyn ConfigFileStore>,
        keygen: Box<dyn KeyGenerator>,
    ) -> Result<Self> {
        store.ensure_dir(&config.root, 0o700)?;

        let user_ca = CertificateAuthority::load_or_create(
            store.as_ref(),
            keygen.as_ref(),
            &config.user_ca_path(),
            "sandbox user CA",
        )?;

        let user_key = ca::load_or_create_keypair(
            store.as_ref(),
            keygen.as_ref(),
            &config.user_key_path(),
            "sandbox user",
        )?;

        let user_cert = issuer::issue_user_certificate(user_ca.signer(), user_key.public_key())?;
        let cert_line = encode_certificate(&user_cert)?;
        store.atomic_replace(&config.user_cert_path(), cert_line.as_bytes(), 0o644)?;

        client_config::write_managed_snippet(store.as_ref(), &config)?;

        // This call site applies the deferred include immediately;
        // interactive callers can run the check themselves first.
        if let IncludeOutcome::Missing(pending) = client_config::check_for_include(
            store.as_ref(),
            &config.client_config_path,
            &config.snippet_path(),
        )? {
            pending.apply(store.as_ref())?;
        }

        let host_ca = CertificateAuthority::load_or_create(
            store.as_ref(),
            keygen.as_ref(),
            &config.host_ca_path(),
            "sandbox host CA",
        )?;

        known_hosts::ensure_ca_trusted(
            store.as_ref(),
            &config.known_hosts_path(),
            &config.host_pattern(),
            host_ca.public_key(),
        )?;

        info!("trust bootstrap complete ({})", config.root.display());
        Ok(Self {
            config,
            store,
            keygen,
            host_ca,
            user_ca,
        })
    }

    pub fn config(&self) -> &TrustConfig {
        &self.config
    }

    /// Mint the identity for one new sandbox: a fresh host keypair, a
    /// host certificate scoped to `hostname`, and the user authority
    /// public key the sandbox must trust. The bundle is exclusively the
    /// caller's; this service keeps no copy of the private key.
    pub fn issue_sandbox_identity(&self, hostname: &str) -> Result<KeyBundle> {
        let hostname = validate_hostname(hostname)?;

        let mut host_key = self.keygen.generate()?;
        host_key.set_comment(&hostname);

        let certificate =
            issuer::issue_host_certificate(self.host_ca.signer(), &hostname, host_key.public_key())?;

        let host_private_key = host_key
            .to_openssh(LineEnding::LF)
            .map_err(|e| TrustError::Key(format!("encode {hostname} host key: {e}")))?
            .to_string();

        debug!("issued sandbox identity for {hostname}");
        Ok(KeyBundle {
            host_private_key,
            host_public_key: format!("{}\n", wire_public_key(host_key.public_key())?),
            host_certificate: encode_certificate(&certificate)?,
            user_authority_public_key: format!("{}\n", wire_public_key(self.user_ca.public_key())?),
        })
    }

    /// Probe SSH reachability of `hostname` without touching the agent
    /// or prompting. On failure the client-config include is re-checked
    /// (and repaired) before the probe error is reported — trust wiring
    /// that was never installed is the most common cause. Callers treat
    /// the error as non-blocking.
    pub async fn check_reachability(&self, hostname: &str) -> Result<()> {
        let hostname = validate_hostname(hostname)?;
        let connect_timeout = self.config.probe_timeout.as_secs().max(1);

        let mut command = tokio::process::Command::new("ssh");
        command
            .arg("-o")
            .arg("BatchMode=yes")
            .arg("-o")
            .arg(format!("ConnectTimeout={connect_timeout}"))
            .arg(format!("{SANDBOX_LOGIN_USER}@{hostname}"))
            .arg("true")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let outcome = tokio::time::timeout(self.config.probe_timeout, command.status()).await;
        let detail = match outcome {
            Ok(Ok(status)) if status.success() => {
                debug!("{hostname} is reachable");
                return Ok(());
            }
            Ok(Ok(status)) => format!("ssh exited with {status}"),
            Ok(Err(err)) => format!("failed to run ssh: {err}"),
            Err(_) => format!("probe timed out after {connect_timeout}s"),
        };

        warn!("cannot reach {hostname}: {detail}; re-checking client config");
        if let IncludeOutcome::Missing(pending) = client_config::check_for_include(
            self.store.as_ref(),
            &self.config.client_config_path,
            &self.config.snippet_path(),
        )? {
            pending.apply(self.store.as_ref())?;
        }

        Err(TrustError::Probe(format!("{hostname}: {detail}")))
    }
}

fn encode_certificate(certificate: &ssh_key::certificate::Certificate) -> Result<String> {
    certificate
        .to_openssh()
        .map(|encoded| format!("{encoded}\n"))
        .map_err(|e| TrustError::Certificate(format!("encode failed: {e}")))
}

/// Reject anything that is not a plain DNS-style hostname before it
/// reaches certificate principals or an ssh command line.
fn validate_hostname(hostname: &str) -> Result<String> {
    let trimmed = hostname.trim();
    if trimmed.is_empty() {
        return Err(TrustError::Validation("hostname is empty".into()));
    }
    if !trimmed
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '.')
    {
        return Err(TrustError::Validation(format!(
            "invalid hostname '{trimmed}'"
        )));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keygen::FixedSeedGenerator;
    use crate::store::MemoryStore;
    use ssh_key::certificate::Certificate;
    use std::path::PathBuf;
    use std::str::FromStr;
    use std::time::Duration;

    fn test_config() -> TrustConfig {
        TrustConfig {
            root: PathBuf::from("/cfg"),
            domain: "test".into(),
            client_config_path: PathBuf::from("/home/u/.ssh/config"),
            probe_timeout: Duration::from_secs(1),
        }
    }

    fn test_service() -> LocalTrustService {
        LocalTrustService::bootstrap(
            test_config(),
            Box::new(MemoryStore::default()),
            Box::new(FixedSeedGenerator::new(31)),
        )
        .unwrap()
    }

    #[test]
    fn bootstrap_creates_all_managed_files() {
        let service = test_service();
        let store = service.store.as_ref();
        for name in [
            "host_ca",
            "host_ca.pub",
            "user_ca",
            "user_ca.pub",
            "user_key",
            "user_key.pub",
            "user_key-cert.pub",
            "known_hosts",
            "ssh_config",
        ] {
            assert!(
                store.exists(&PathBuf::from("/cfg").join(name)),
                "missing {name}"
            );
        }
        assert!(store.exists(&service.config.client_config_path));
    }

    #[test]
    fn bundle_certificate_parses_and_names_the_hostname() {
        let service = test_service();
        let bundle = service.issue_sandbox_identity("abc123.test").unwrap();

        let certificate = Certificate::from_str(bundle.host_certificate.trim()).unwrap();
        assert_eq!(certificate.valid_principals(), &["abc123.test".to_string()]);
        assert!(bundle.host_private_key.contains("OPENSSH PRIVATE KEY"));
        assert!(bundle.host_public_key.starts_with("ssh-ed25519 "));
        assert!(bundle.user_authority_public_key.starts_with("ssh-ed25519 "));
    }

    #[test]
    fn hostname_validation_rejects_injection() {
        let service = test_service();
        assert!(service.issue_sandbox_identity("").is_err());
        assert!(service.issue_sandbox_identity("host;rm -rf /").is_err());
        assert!(service.issue_sandbox_identity("host name").is_err());
        assert!(service.issue_sandbox_identity("abc-123.test").is_ok());
    }

    #[test]
    fn validate_hostname_trims_whitespace() {
        assert_eq!(validate_hostname("  abc.test ").unwrap(), "abc.test");
    }
}
