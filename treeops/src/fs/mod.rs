//! The `FileSystem` capability trait and its OS-backed implementation
//!
//! Every component consumes syscalls through this narrow trait instead of
//! reaching for `std::fs`/`tokio::fs` directly, so traversal and watching
//! stay testable against alternative backends.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{FsError, Result};

/// Snapshot of one filesystem entry at one instant. Immutable once captured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryStat {
    pub path: PathBuf,
    pub is_dir: bool,
    pub is_symlink: bool,
    pub size: u64,
    pub mtime: SystemTime,
    pub mode: u32,
}

impl EntryStat {
    /// Whether two snapshots of the same path represent a content change.
    pub fn differs_from(&self, other: &EntryStat) -> bool {
        self.mtime != other.mtime || self.size != other.size || self.is_dir != other.is_dir
    }
}

/// Narrow filesystem capability consumed by the walker, batch ops and
/// watcher. `read_dir` returns child names in sorted order so traversal
/// order is deterministic at the source.
#[async_trait]
pub trait FileSystem: Send + Sync {
    /// Stat following symlinks.
    async fn stat(&self, path: &Path) -> Result<EntryStat>;

    /// Stat without following symlinks.
    async fn lstat(&self, path: &Path) -> Result<EntryStat>;

    async fn read_dir(&self, path: &Path) -> Result<Vec<String>>;

    async fn read(&self, path: &Path) -> Result<Vec<u8>>;

    async fn write(&self, path: &Path, data: &[u8]) -> Result<()>;

    /// Copy file bytes and permission bits.
    async fn copy_file(&self, src: &Path, dest: &Path) -> Result<()> {
        let data = self.read(src).await?;
        let stat = self.lstat(src).await?;
        self.write(dest, &data).await?;
        self.set_mode(dest, stat.mode).await
    }

    async fn rename(&self, from: &Path, to: &Path) -> Result<()>;

    async fn unlink(&self, path: &Path) -> Result<()>;

    async fn rmdir(&self, path: &Path) -> Result<()>;

    /// Create a single directory; fails with `AlreadyExists` when present.
    async fn mkdir(&self, path: &Path) -> Result<()>;

    async fn symlink(&self, target: &Path, link: &Path) -> Result<()>;

    async fn read_link(&self, path: &Path) -> Result<PathBuf>;

    async fn set_mode(&self, path: &Path, mode: u32) -> Result<()>;

    async fn set_mtime(&self, path: &Path, mtime: SystemTime) -> Result<()>;
}

/// `FileSystem` backed by the host OS through `tokio::fs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsFileSystem;

impl OsFileSystem {
    pub fn new() -> Self {
        Self
    }
}

fn entry_from_meta(path: PathBuf, meta: &std::fs::Metadata) -> EntryStat {
    EntryStat {
        is_dir: meta.is_dir(),
        is_symlink: meta.file_type().is_symlink(),
        size: meta.len(),
        mtime: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
        mode: mode_of(meta),
        path,
    }
}

#[cfg(unix)]
fn mode_of(meta: &std::fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode()
}

#[cfg(not(unix))]
fn mode_of(_meta: &std::fs::Metadata) -> u32 {
    0
}

#[async_trait]
impl FileSystem for OsFileSystem {
    async fn stat(&self, path: &Path) -> Result<EntryStat> {
        let meta =
            tokio::fs::metadata(path).await.map_err(|e| FsError::from_io(path, e))?;
        Ok(entry_from_meta(path.to_path_buf(), &meta))
    }

    async fn lstat(&self, path: &Path) -> Result<EntryStat> {
        let meta = tokio::fs::symlink_metadata(path)
            .await
            .map_err(|e| FsError::from_io(path, e))?;
        Ok(entry_from_meta(path.to_path_buf(), &meta))
    }

    async fn read_dir(&self, path: &Path) -> Result<Vec<String>> {
        let mut rd =
            tokio::fs::read_dir(path).await.map_err(|e| FsError::from_io(path, e))?;
        let mut names = Vec::new();
        while let Some(entry) =
            rd.next_entry().await.map_err(|e| FsError::from_io(path, e))?
        {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        tokio::fs::read(path).await.map_err(|e| FsError::from_io(path, e))
    }

    async fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        tokio::fs::write(path, data).await.map_err(|e| FsError::from_io(path, e))
    }

    async fn copy_file(&self, src: &Path, dest: &Path) -> Result<()> {
        // tokio::fs::copy preserves permission bits.
        tokio::fs::copy(src, dest)
            .await
            .map(|_| ())
            .map_err(|e| FsError::from_io(dest, e))
    }

    async fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        tokio::fs::rename(from, to).await.map_err(|e| FsError::from_io(from, e))
    }

    async fn unlink(&self, path: &Path) -> Result<()> {
        tokio::fs::remove_file(path).await.map_err(|e| FsError::from_io(path, e))
    }

    async fn rmdir(&self, path: &Path) -> Result<()> {
        tokio::fs::remove_dir(path).await.map_err(|e| FsError::from_io(path, e))
    }

    async fn mkdir(&self, path: &Path) -> Result<()> {
        tokio::fs::create_dir(path).await.map_err(|e| FsError::from_io(path, e))
    }

    async fn symlink(&self, target: &Path, link: &Path) -> Result<()> {
        #[cfg(unix)]
        let res = tokio::fs::symlink(target, link).await;
        #[cfg(windows)]
        let res = tokio::fs::symlink_file(target, link).await;
        res.map_err(|e| FsError::from_io(link, e))
    }

    async fn read_link(&self, path: &Path) -> Result<PathBuf> {
        tokio::fs::read_link(path).await.map_err(|e| FsError::from_io(path, e))
    }

    #[cfg(unix)]
    async fn set_mode(&self, path: &Path, mode: u32) -> Result<()> {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
            .await
            .map_err(|e| FsError::from_io(path, e))
    }

    #[cfg(not(unix))]
    async fn set_mode(&self, _path: &Path, _mode: u32) -> Result<()> {
        Ok(())
    }

    async fn set_mtime(&self, path: &Path, mtime: SystemTime) -> Result<()> {
        let owned = path.to_path_buf();
        let res = tokio::task::spawn_blocking(move || {
            let file = std::fs::OpenOptions::new().write(true).open(&owned)?;
            file.set_modified(mtime)
        })
        .await;
        match res {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(FsError::from_io(path, e)),
            Err(e) => Err(FsError::Runtime(e.to_string())),
        }
    }
}
