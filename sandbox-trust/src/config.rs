//! Trust service configuration, resolved once at startup.
//!
//! Every ambient lookup (env vars, home directory) happens here, in
//! [`TrustConfig::load`]. Leaf components receive the resolved config by
//! reference and never re-read the environment themselves.

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Result, TrustError};
use crate::{DEFAULT_PROBE_TIMEOUT_SECS, DEFAULT_SANDBOX_DOMAIN};

/// Resolved paths and parameters for the trust service.
#[derive(Clone, Debug)]
pub struct TrustConfig {
    /// Managed configuration root. All CA material, identities, and
    /// generated snippets live under this directory; nothing outside it
    /// is touched except the user's primary SSH client config.
    pub root: PathBuf,
    /// Sandbox DNS suffix. Host certificates and trust lines are scoped
    /// to `*.<domain>`.
    pub domain: String,
    /// The user's primary SSH client configuration file.
    pub client_config_path: PathBuf,
    /// Upper bound on the reachability probe.
    pub probe_timeout: Duration,
}

impl TrustConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// `SANDBOX_TRUST_DIR` overrides the managed root (default:
    /// `$XDG_CONFIG_HOME/sandbox-trust`, falling back to
    /// `~/.config/sandbox-trust`). `SANDBOX_DOMAIN` overrides the DNS
    /// suffix. `SANDBOX_PROBE_TIMEOUT_SECS` bounds the probe.
    pub fn load() -> Result<Self> {
        let root = match env::var_os("SANDBOX_TRUST_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => default_config_dir()?.join("sandbox-trust"),
        };

        let domain = env::var("SANDBOX_DOMAIN")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_SANDBOX_DOMAIN.to_string());

        let client_config_path = match env::var_os("SANDBOX_SSH_CONFIG") {
            Some(path) => PathBuf::from(path),
            None => home_dir()?.join(".ssh").join("config"),
        };

        let probe_timeout = env::var("SANDBOX_PROBE_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(DEFAULT_PROBE_TIMEOUT_SECS));

        Ok(Self {
            root,
            domain,
            client_config_path,
            probe_timeout,
        })
    }

    /// Hostname pattern covering every sandbox under this domain.
    pub fn host_pattern(&self) -> String {
        format!("*.{}", self.domain)
    }

    pub fn host_ca_path(&self) -> PathBuf {
        self.root.join("host_ca")
    }

    pub fn user_ca_path(&self) -> PathBuf {
        self.root.join("user_ca")
    }

    pub fn user_key_path(&self) -> PathBuf {
        self.root.join("user_key")
    }

    pub fn user_cert_path(&self) -> PathBuf {
        self.root.join("user_key-cert.pub")
    }

    pub fn known_hosts_path(&self) -> PathBuf {
        self.root.join("known_hosts")
    }

    /// The managed snippet referenced by the client config include line.
    pub fn snippet_path(&self) -> PathBuf {
        self.root.join("ssh_config")
    }
}

/// Public-key sibling of an OpenSSH private key path (`<path>.pub`).
pub fn public_key_path(private_key_path: &Path) -> PathBuf {
    let mut name = private_key_path.as_os_str().to_os_string();
    name.push(".pub");
    PathBuf::from(name)
}

fn default_config_dir() -> Result<PathBuf> {
    if let Some(xdg) = env::var_os("XDG_CONFIG_HOME").filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(xdg));
    }
    Ok(home_dir()?.join(".config"))
}

fn home_dir() -> Result<PathBuf> {
    env::var_os("HOME")
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .ok_or_else(|| TrustError::Validation("HOME is not set".into()))
}
