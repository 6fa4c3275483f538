//! Owner-only file creation for the ledger's on-disk artifacts.
//!
//! The SQLite database, its WAL/SHM sidecars and the event log all hold
//! ledger contents; on Unix they are created `0o600` inside a `0o700`
//! directory (when we own it).

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Create `dir` (and parents) and tighten its mode when we own it.
pub(crate) fn ensure_private_dir(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::{MetadataExt, PermissionsExt};

        let metadata = std::fs::metadata(dir)
            .with_context(|| format!("Failed to read directory metadata: {}", dir.display()))?;
        let owner_is_us = metadata.uid() == unsafe { libc::getuid() };
        if owner_is_us && metadata.permissions().mode() & 0o077 != 0 {
            std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700))
                .with_context(|| format!("Failed to restrict directory: {}", dir.display()))?;
        }
    }
    Ok(())
}

/// Open `path` for reading and appending, creating it owner-only if missing.
pub(crate) fn open_private_append(path: &Path) -> Result<File> {
    if let Some(parent) = non_empty_parent(path) {
        ensure_private_dir(parent)?;
    }
    let mut options = OpenOptions::new();
    options.create(true).append(true).read(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options
        .open(path)
        .with_context(|| format!("Failed to open {} for append", path.display()))
}

/// Prepare a SQLite database path: private parent dir, private db file,
/// private sidecars if they already exist.
pub(crate) fn prepare_db_file(path: &Path) -> Result<()> {
    drop(open_private_append(path)?);
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            .with_context(|| format!("Failed to restrict database file: {}", path.display()))?;
        for suffix in ["-wal", "-shm"] {
            let sidecar = sidecar_path(path, suffix);
            if sidecar.exists()
                && let Err(e) =
                    std::fs::set_permissions(&sidecar, std::fs::Permissions::from_mode(0o600))
            {
                tracing::debug!(path = %sidecar.display(), "Could not restrict sidecar: {e}");
            }
        }
    }
    Ok(())
}

fn non_empty_parent(path: &Path) -> Option<&Path> {
    path.parent().filter(|p| !p.as_os_str().is_empty())
}

fn sidecar_path(path: &Path, suffix: &str) -> PathBuf {
    match path.file_name() {
        Some(name) => path.with_file_name(format!("{}{suffix}", name.to_string_lossy())),
        None => PathBuf::from(format!("{}{suffix}", path.display())),
    }
}
