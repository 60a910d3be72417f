//! Single-path convenience operations
//!
//! Probes classify instead of erroring: a missing path is `false`, not
//! `NotFound`. Writers create missing parent directories.

use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::trace;

use crate::error::{FsError, Result};
use crate::fs::FileSystem;

/// Whether anything exists at `path` (symlinks count, even broken ones).
pub async fn exists(fs: &dyn FileSystem, path: &Path) -> Result<bool> {
    match fs.lstat(path).await {
        Ok(_) => Ok(true),
        Err(err) if err.is_not_found() => Ok(false),
        Err(err) => Err(err),
    }
}

/// Whether `path` resolves to a regular file.
pub async fn file_exists(fs: &dyn FileSystem, path: &Path) -> Result<bool> {
    match fs.stat(path).await {
        Ok(stat) => Ok(!stat.is_dir),
        Err(err) if err.is_not_found() => Ok(false),
        Err(err) => Err(err),
    }
}

/// Whether `path` resolves to a directory.
pub async fn dir_exists(fs: &dyn FileSystem, path: &Path) -> Result<bool> {
    match fs.stat(path).await {
        Ok(stat) => Ok(stat.is_dir),
        Err(err) if err.is_not_found() => Ok(false),
        Err(err) => Err(err),
    }
}

/// Create `path` and any missing ancestors. Idempotent.
pub async fn mkdirs(fs: &dyn FileSystem, path: &Path) -> Result<()> {
    let mut cur = PathBuf::new();
    for component in path.components() {
        cur.push(component);
        if !matches!(component, Component::Normal(_)) {
            continue;
        }
        match fs.mkdir(&cur).await {
            Ok(()) => trace!(path = %cur.display(), "created directory"),
            Err(FsError::AlreadyExists { .. }) => {}
            Err(err) => return Err(err),
        }
    }
    Ok(())
}

pub(crate) async fn mkdirs_parent(fs: &dyn FileSystem, path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => mkdirs(fs, parent).await,
        _ => Ok(()),
    }
}

/// Create an empty file at `path` unless one already exists. Existing
/// content is left alone; a directory at `path` is an error.
pub async fn ensure_file(fs: &dyn FileSystem, path: &Path) -> Result<()> {
    match fs.lstat(path).await {
        Ok(stat) if stat.is_dir => Err(FsError::IsADirectory { path: path.to_path_buf() }),
        Ok(_) => Ok(()),
        Err(err) if err.is_not_found() => {
            mkdirs_parent(fs, path).await?;
            fs.write(path, &[]).await
        }
        Err(err) => Err(err),
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TouchOptions {
    /// Timestamp to stamp; defaults to the current time.
    pub mtime: Option<SystemTime>,
}

/// Update a file's mtime, creating an empty file first when absent.
pub async fn touch(fs: &dyn FileSystem, path: &Path, opts: &TouchOptions) -> Result<()> {
    ensure_file(fs, path).await?;
    fs.set_mtime(path, opts.mtime.unwrap_or_else(SystemTime::now)).await
}

/// Write `data` to `path`, creating missing parent directories.
pub async fn output_file(fs: &dyn FileSystem, path: &Path, data: &[u8]) -> Result<()> {
    mkdirs_parent(fs, path).await?;
    fs.write(path, data).await
}

/// Serialize `value` as pretty JSON to `path`, creating parents.
pub async fn output_json<T: Serialize>(
    fs: &dyn FileSystem,
    path: &Path,
    value: &T,
) -> Result<()> {
    let mut data = serde_json::to_vec_pretty(value)
        .map_err(|source| FsError::Json { path: path.to_path_buf(), source })?;
    data.push(b'\n');
    output_file(fs, path, &data).await
}

/// Read and deserialize a JSON file.
pub async fn read_json<T: DeserializeOwned>(fs: &dyn FileSystem, path: &Path) -> Result<T> {
    let data = fs.read(path).await?;
    serde_json::from_slice(&data)
        .map_err(|source| FsError::Json { path: path.to_path_buf(), source })
}
