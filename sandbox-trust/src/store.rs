//! Filesystem abstraction for the managed configuration root.
//!
//! Every persisted file goes through [`ConfigFileStore::atomic_replace`]:
//! stage a sibling temp file, fsync, move any existing target to
//! `<target>.bak`, then rename the temp file into place. A crash before
//! the final rename leaves the original (or its backup) intact and
//! readable; partial writes are never observable because they only ever
//! touch the staged file.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::{Result, TrustError};

pub trait ConfigFileStore: Send + Sync {
    fn exists(&self, path: &Path) -> bool;

    fn read_all(&self, path: &Path) -> Result<Vec<u8>>;

    /// Atomically replace `path` with `bytes`, permission bits `mode`.
    fn atomic_replace(&self, path: &Path, bytes: &[u8], mode: u32) -> Result<()>;

    /// Create a directory (and parents) with permission bits `mode`.
    fn ensure_dir(&self, path: &Path, mode: u32) -> Result<()>;

    /// Read a file, treating absence as `None` rather than an error.
    fn read_if_exists(&self, path: &Path) -> Result<Option<Vec<u8>>> {
        match self.read_all(path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(TrustError::Io { source, .. })
                if source.kind() == std::io::ErrorKind::NotFound =>
            {
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }
}

/// Production store over the real filesystem.
#[derive(Clone, Copy, Debug, Default)]
pub struct DiskStore;

impl ConfigFileStore for DiskStore {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn read_all(&self, path: &Path) -> Result<Vec<u8>> {
        fs::read(path).map_err(TrustError::io("read", path))
    }

    fn atomic_replace(&self, path: &Path, bytes: &[u8], mode: u32) -> Result<()> {
        let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).ok_or_else(|| {
            TrustError::Validation(format!("{} has no parent directory", path.display()))
        })?;

        let staged = stage(dir, bytes, mode).map_err(TrustError::io("stage", path))?;

        if path.exists() {
            let backup = backup_path(path);
            fs::rename(path, &backup).map_err(TrustError::io("backup", path))?;
        }

        staged
            .persist(path)
            .map_err(|e| TrustError::Io {
                op: "rename",
                path: path.to_path_buf(),
                source: e.error,
            })?;

        debug!("wrote {} ({} bytes)", path.display(), bytes.len());
        Ok(())
    }

    fn ensure_dir(&self, path: &Path, mode: u32) -> Result<()> {
        fs::create_dir_all(path).map_err(TrustError::io("mkdir", path))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(path, fs::Permissions::from_mode(mode))
                .map_err(TrustError::io("chmod", path))?;
        }
        #[cfg(not(unix))]
        let _ = mode;
        Ok(())
    }
}

/// Write and fsync the replacement content to a temp file in `dir`.
/// The target is untouched until the caller persists the staged file.
fn stage(dir: &Path, bytes: &[u8], mode: u32) -> std::io::Result<NamedTempFile> {
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tmp.as_file()
            .set_permissions(fs::Permissions::from_mode(mode))?;
    }
    #[cfg(not(unix))]
    let _ = mode;
    tmp.as_file().sync_all()?;
    Ok(tmp)
}

/// Backup sibling of a managed file (`<path>.bak`).
fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".bak");
    PathBuf::from(name)
}

/// In-memory store for hermetic tests. `ensure_dir` is a no-op and
/// `atomic_replace` mirrors the backup semantics of [`DiskStore`].
#[cfg(any(test, feature = "test-utils"))]
#[derive(Default)]
pub struct MemoryStore(std::sync::Mutex<std::collections::HashMap<PathBuf, Vec<u8>>>);

#[cfg(any(test, feature = "test-utils"))]
impl ConfigFileStore for MemoryStore {
    fn exists(&self, path: &Path) -> bool {
        self.0
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(path)
    }

    fn read_all(&self, path: &Path) -> Result<Vec<u8>> {
        self.0
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(path)
            .cloned()
            .ok_or_else(|| TrustError::Io {
                op: "read",
                path: path.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
            })
    }

    fn atomic_replace(&self, path: &Path, bytes: &[u8], _mode: u32) -> Result<()> {
        let mut files = self.0.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = files.get(path).cloned() {
            files.insert(backup_path(path), previous);
        }
        files.insert(path.to_path_buf(), bytes.to_vec());
        Ok(())
    }

    fn ensure_dir(&self, _path: &Path, _mode: u32) -> Result<()> {
        Ok(())
    }
}
