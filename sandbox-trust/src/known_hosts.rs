//! Host trust store maintenance.
//!
//! Instead of pinning individual host keys, the trust store carries one
//! `@cert-authority` line scoping the host authority to the sandbox
//! hostname pattern. Any certificate signed by that authority is then
//! accepted for any matching hostname, so freshly created sandboxes
//! never trigger a trust-on-first-use prompt.

use std::path::Path;

use ssh_key::PublicKey;
use tracing::info;

use crate::error::Result;
use crate::keygen::wire_public_key;
use crate::store::ConfigFileStore;

/// Ensure the trust store at `path` contains exactly one
/// `@cert-authority` line for `pattern`, signed-by `authority_key`.
///
/// Pre-existing lines for the same pattern are dropped before the fresh
/// line is appended, so repeated calls are byte-idempotent from the
/// second call on. Unrelated lines are preserved verbatim.
pub fn ensure_ca_trusted(
    store: &dyn ConfigFileStore,
    path: &Path,
    pattern: &str,
    authority_key: &PublicKey,
) -> Result<()> {
    let existing = store.read_if_exists(path)?.unwrap_or_default();
    let existing = String::from_utf8_lossy(&existing);

    let marker = format!("@cert-authority {pattern} ");
    let line = format!("@cert-authority {pattern} {}", wire_public_key(authority_key)?);

    let mut lines: Vec<&str> = existing
        .lines()
        .filter(|l| !l.starts_with(marker.as_str()))
        .collect();
    lines.push(&line);

    let content = lines.join("\n") + "\n";
    store.atomic_replace(path, content.as_bytes(), 0o644)?;

    info!("trust store {} covers {pattern}", path.display());
    Ok(())
}
