//! Client configuration wiring.
//!
//! Two files are involved: the managed snippet inside the configuration
//! root (fully owned, rewritten on every bootstrap) and the user's
//! primary SSH client config, which is only ever touched by prepending a
//! single `Include` directive. The include insertion is offered as a
//! deferred mutation so call sites can confirm before writing.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::SANDBOX_LOGIN_USER;
use crate::config::TrustConfig;
use crate::error::Result;
use crate::store::ConfigFileStore;

/// Result of checking the primary client config for the managed include.
pub enum IncludeOutcome {
    /// The config file did not exist; it was created with only the
    /// include directive.
    Created,
    /// The directive is already present; the file was not touched.
    AlreadyPresent,
    /// The directive is missing. Apply the deferred mutation to prepend
    /// it, or drop it to leave the file alone.
    Missing(PendingInclude),
}

/// Deferred prepend of the include directive.
pub struct PendingInclude {
    path: PathBuf,
    contents: String,
}

impl PendingInclude {
    /// Write the amended config via atomic replace.
    pub fn apply(&self, store: &dyn ConfigFileStore) -> Result<()> {
        store.atomic_replace(&self.path, self.contents.as_bytes(), 0o600)?;
        info!("prepended managed include to {}", self.path.display());
        Ok(())
    }

    /// The full config content the mutation would write, for
    /// confirm-before-write call sites.
    pub fn preview(&self) -> &str {
        &self.contents
    }
}

/// Check (and if the file is absent, install) the managed include line
/// in the primary client config.
///
/// When the directive is already present anywhere in the file, nothing is
/// mutated; if active directives precede it, a warning is surfaced since
/// earlier rules win in OpenSSH and may shadow the managed snippet.
pub fn check_for_include(
    store: &dyn ConfigFileStore,
    config_path: &Path,
    snippet_path: &Path,
) -> Result<IncludeOutcome> {
    let directive = format!("Include {}", snippet_path.display());

    let Some(bytes) = store.read_if_exists(config_path)? else {
        if let Some(parent) = config_path.parent() {
            store.ensure_dir(parent, 0o700)?;
        }
        store.atomic_replace(config_path, format!("{directive}\n").as_bytes(), 0o600)?;
        info!("created {} with managed include", config_path.display());
        return Ok(IncludeOutcome::Created);
    };

    let content = String::from_utf8_lossy(&bytes).into_owned();
    match include_position(&content, snippet_path) {
        Some(0) => Ok(IncludeOutcome::AlreadyPresent),
        Some(preceding) => {
            warn!(
                "{} active directive(s) precede the managed include in {}; \
                 their rules take priority over the sandbox snippet",
                preceding,
                config_path.display()
            );
            Ok(IncludeOutcome::AlreadyPresent)
        }
        None => Ok(IncludeOutcome::Missing(PendingInclude {
            path: config_path.to_path_buf(),
            contents: format!("{directive}\n{content}"),
        })),
    }
}

/// Number of active (non-comment, non-blank) directives ahead of the
/// managed include, or `None` when the include is absent.
fn include_position(content: &str, snippet_path: &Path) -> Option<usize> {
    let needle = snippet_path.to_string_lossy();
    let mut active_before = 0;
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let mut parts = trimmed.split_whitespace();
        let keyword = parts.next().unwrap_or_default();
        if keyword.eq_ignore_ascii_case("include") && parts.any(|arg| arg == needle.as_ref()) {
            return Some(active_before);
        }
        active_before += 1;
    }
    None
}

/// Write the managed snippet: a host-pattern block wiring the user
/// identity, certificate, and trust store for every sandbox hostname.
///
/// Rewritten unconditionally on every bootstrap — the file is fully owned
/// by this subsystem and cheap to regenerate.
pub fn write_managed_snippet(store: &dyn ConfigFileStore, config: &TrustConfig) -> Result<()> {
    let snippet = render_snippet(config);
    store.atomic_replace(&config.snippet_path(), snippet.as_bytes(), 0o600)
}

fn render_snippet(config: &TrustConfig) -> String {
    let mut snippet = String::new();
    snippet.push_str("# Managed by sandbox-trust; rewritten on every startup. Do not edit.\n");
    snippet.push_str(&format!("Host {}\n", config.host_pattern()));
    snippet.push_str(&format!("  User {SANDBOX_LOGIN_USER}\n"));
    snippet.push_str(&format!("  IdentityFile {}\n", config.user_key_path().display()));
    snippet.push_str(&format!(
        "  CertificateFile {}\n",
        config.user_cert_path().display()
    ));
    snippet.push_str(&format!(
        "  UserKnownHostsFile {}\n",
        config.known_hosts_path().display()
    ));
    snippet.push_str("  IdentitiesOnly yes\n");
    snippet.push_str("  StrictHostKeyChecking yes\n");
    snippet.push_str("  CanonicalizeHostname yes\n");
    snippet.push_str(&format!("  CanonicalDomains {}\n", config.domain));
    snippet
}
