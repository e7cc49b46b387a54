use std::fmt;
use std::path::{Path, PathBuf};

/// Errors returned by trust bootstrapping operations.
#[derive(Debug)]
pub enum TrustError {
    /// Filesystem operation failed. Carries the operation name and the
    /// target path so callers can log an actionable message.
    Io {
        op: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    /// Key generation or encoding failure. Entropy exhaustion lands here
    /// and is not retryable.
    Key(String),
    /// A stored CA private key exists but cannot be parsed. Never
    /// auto-regenerated: a new CA would orphan every trust line signed
    /// under the old one.
    CorruptAuthority(PathBuf),
    /// Certificate build or signing failure.
    Certificate(String),
    /// Invalid input (hostname, pattern, configuration value).
    Validation(String),
    /// Reachability probe failure. Non-blocking for callers.
    Probe(String),
}

impl fmt::Display for TrustError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrustError::Io { op, path, source } => {
                write!(f, "{op} {}: {source}", path.display())
            }
            TrustError::Key(msg) => write!(f, "key error: {msg}"),
            TrustError::CorruptAuthority(path) => write!(
                f,
                "CA private key at {} exists but failed to parse; refusing to \
                 regenerate (remove the file to mint a new authority)",
                path.display()
            ),
            TrustError::Certificate(msg) => write!(f, "certificate error: {msg}"),
            TrustError::Validation(msg) => write!(f, "validation error: {msg}"),
            TrustError::Probe(msg) => write!(f, "probe error: {msg}"),
        }
    }
}

impl std::error::Error for TrustError {}

impl TrustError {
    /// Wrap an I/O error with the failed operation and path.
    pub fn io(op: &'static str, path: &Path) -> impl FnOnce(std::io::Error) -> TrustError {
        let path = path.to_path_buf();
        move |source| TrustError::Io { op, path, source }
    }
}

pub type Result<T> = std::result::Result<T, TrustError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_carries_op_and_path() {
        let err = TrustError::io("read", Path::new("/tmp/host_ca"))(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "denied",
        ));
        let msg = err.to_string();
        assert!(msg.contains("read"));
        assert!(msg.contains("/tmp/host_ca"));
        assert!(msg.contains("denied"));
    }

    #[test]
    fn corrupt_authority_names_the_path() {
        let err = TrustError::CorruptAuthority(PathBuf::from("/cfg/user_ca"));
        let msg = err.to_string();
        assert!(msg.contains("/cfg/user_ca"));
        assert!(msg.contains("refusing to"));
    }
}
