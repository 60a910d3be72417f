//! Copying and moving matched trees
//!
//! The walk is snapshotted before the first write, so a destination inside
//! the source tree never feeds back into the traversal.

use std::path::{Path, PathBuf};

use glob_utils::Matcher;
use tracing::{debug, trace};

use crate::error::{FsError, Result, fail_at};
use crate::fs::{EntryStat, FileSystem};
use crate::ops::remove::{RemoveOptions, remove};
use crate::ops::simple::{mkdirs, mkdirs_parent};
use crate::ops::{matched_entries, source_root};
use crate::walk::{CancelToken, DEFAULT_CONCURRENCY, EntryPredicate, WalkOptions, ensure_live};

#[derive(Clone)]
pub struct CopyOptions {
    pub cwd: PathBuf,
    /// Include dotfiles in wildcard matches.
    pub all: bool,
    pub follow_links: bool,
    pub concurrency: usize,
    /// Excludes an entry from the transfer; recursion is unaffected.
    pub filter: Option<EntryPredicate>,
    pub cancel: Option<CancelToken>,
}

impl Default for CopyOptions {
    fn default() -> Self {
        Self {
            cwd: PathBuf::from("."),
            all: false,
            follow_links: false,
            concurrency: DEFAULT_CONCURRENCY,
            filter: None,
            cancel: None,
        }
    }
}

impl CopyOptions {
    fn walk_options(&self) -> WalkOptions {
        WalkOptions {
            all: self.all,
            follow_links: self.follow_links,
            concurrency: self.concurrency,
            filter: self.filter.clone(),
            cancel: self.cancel.clone(),
            ..Default::default()
        }
    }
}

/// Copy everything the patterns select to `dest`, preserving structure
/// relative to the matched common root. Directories are created, file
/// bytes and permission bits copied, symlinks recreated with their
/// original (possibly relative) target.
pub async fn copy(
    fs: &dyn FileSystem,
    patterns: &[&str],
    dest: &Path,
    opts: &CopyOptions,
) -> Result<()> {
    let matcher = Matcher::compile(patterns)?;
    let entries =
        matched_entries(fs, &matcher, &opts.cwd, opts.all, true, opts.walk_options()).await?;
    let src_root = source_root(&matcher, &opts.cwd);
    debug!(src = %src_root.display(), dest = %dest.display(), entries = entries.len(), "copy");

    let total = entries.len();
    for (idx, entry) in entries.iter().enumerate() {
        ensure_live(&opts.cancel)?;
        // Entries already under the destination are the copy's own output.
        if entry.path.starts_with(dest) && !src_root.starts_with(dest) {
            continue;
        }
        let target = map_dest(&entry.path, &src_root, dest)?;
        if target == entry.path {
            continue;
        }
        transfer_entry(fs, entry, &target)
            .await
            .map_err(|e| fail_at(&entry.path, e, total - idx - 1))?;
    }
    Ok(())
}

/// Move the selection to `dest`. A literal whole-path move attempts one
/// atomic rename; a glob selection, or any rename failure, falls back to
/// copy-then-remove so sources disappear only after the destination is
/// written.
pub async fn mv(
    fs: &dyn FileSystem,
    patterns: &[&str],
    dest: &Path,
    opts: &CopyOptions,
) -> Result<()> {
    let matcher = Matcher::compile(patterns)?;

    if let Some(lit) = matcher.as_literal() {
        let src = crate::ops::join_rel(&opts.cwd, lit);
        if src == dest {
            return Ok(());
        }
        mkdirs_parent(fs, dest).await?;
        match fs.rename(&src, dest).await {
            Ok(()) => return Ok(()),
            Err(err) => {
                trace!(src = %src.display(), %err, "rename failed, copying instead");
            }
        }
    }

    copy(fs, patterns, dest, opts).await?;
    let ropts = RemoveOptions {
        cwd: opts.cwd.clone(),
        all: opts.all,
        filter: opts.filter.clone(),
        concurrency: opts.concurrency,
        cancel: opts.cancel.clone(),
    };
    remove(fs, patterns, &ropts).await
}

fn map_dest(path: &Path, src_root: &Path, dest: &Path) -> Result<PathBuf> {
    let rel = path
        .strip_prefix(src_root)
        .map_err(|_| FsError::Runtime(format!("{} escapes its scope root", path.display())))?;
    Ok(if rel.as_os_str().is_empty() { dest.to_path_buf() } else { dest.join(rel) })
}

async fn transfer_entry(fs: &dyn FileSystem, entry: &EntryStat, target: &Path) -> Result<()> {
    if entry.is_dir {
        return mkdirs(fs, target).await;
    }
    mkdirs_parent(fs, target).await?;
    if entry.is_symlink {
        let link_target = fs.read_link(&entry.path).await?;
        return match fs.symlink(&link_target, target).await {
            Err(FsError::AlreadyExists { .. }) => {
                fs.unlink(target).await?;
                fs.symlink(&link_target, target).await
            }
            res => res,
        };
    }
    fs.copy_file(&entry.path, target).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::OsFileSystem;
    use crate::ops::simple::{dir_exists, exists, file_exists};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn fixture() -> TempDir {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("src/sub")).unwrap();
        std::fs::write(dir.path().join("src/a.txt"), b"alpha").unwrap();
        std::fs::write(dir.path().join("src/sub/b.txt"), b"beta").unwrap();
        std::fs::write(dir.path().join("src/sub/skip.log"), b"log").unwrap();
        dir
    }

    fn opts(dir: &TempDir) -> CopyOptions {
        CopyOptions { cwd: dir.path().to_path_buf(), ..Default::default() }
    }

    #[tokio::test]
    async fn literal_copy_preserves_structure_and_content() {
        let dir = fixture();
        let fs = OsFileSystem::new();
        copy(&fs, &["src"], &dir.path().join("out"), &opts(&dir)).await.unwrap();

        assert_eq!(fs.read(&dir.path().join("out/a.txt")).await.unwrap(), b"alpha");
        assert_eq!(fs.read(&dir.path().join("out/sub/b.txt")).await.unwrap(), b"beta");
        // Source untouched.
        assert_eq!(fs.read(&dir.path().join("src/a.txt")).await.unwrap(), b"alpha");
    }

    #[tokio::test]
    async fn glob_copy_maps_relative_to_common_root() {
        let dir = fixture();
        let fs = OsFileSystem::new();
        copy(&fs, &["src/**/*.txt"], &dir.path().join("out"), &opts(&dir)).await.unwrap();

        assert!(file_exists(&fs, &dir.path().join("out/a.txt")).await.unwrap());
        assert!(file_exists(&fs, &dir.path().join("out/sub/b.txt")).await.unwrap());
        assert!(!exists(&fs, &dir.path().join("out/sub/skip.log")).await.unwrap());
    }

    #[tokio::test]
    async fn copy_filter_excludes_entries() {
        let dir = fixture();
        let fs = OsFileSystem::new();
        let options = CopyOptions {
            filter: Some(Arc::new(|e: &EntryStat| {
                e.path.extension().is_none_or(|ext| ext != "log")
            })),
            ..opts(&dir)
        };
        copy(&fs, &["src"], &dir.path().join("out"), &options).await.unwrap();
        assert!(file_exists(&fs, &dir.path().join("out/sub/b.txt")).await.unwrap());
        assert!(!exists(&fs, &dir.path().join("out/sub/skip.log")).await.unwrap());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn copy_recreates_symlinks() {
        let dir = fixture();
        let fs = OsFileSystem::new();
        fs.symlink(Path::new("a.txt"), &dir.path().join("src/link")).await.unwrap();

        copy(&fs, &["src"], &dir.path().join("out"), &opts(&dir)).await.unwrap();
        let copied = fs.lstat(&dir.path().join("out/link")).await.unwrap();
        assert!(copied.is_symlink);
        assert_eq!(
            fs.read_link(&dir.path().join("out/link")).await.unwrap(),
            PathBuf::from("a.txt")
        );
    }

    #[tokio::test]
    async fn copy_into_own_subtree_terminates() {
        let dir = fixture();
        let fs = OsFileSystem::new();
        copy(&fs, &["src"], &dir.path().join("src/nested"), &opts(&dir)).await.unwrap();
        assert_eq!(fs.read(&dir.path().join("src/nested/a.txt")).await.unwrap(), b"alpha");
        // The snapshot was taken before any write, so nothing doubled up.
        assert!(!exists(&fs, &dir.path().join("src/nested/nested/a.txt")).await.unwrap());
    }

    #[tokio::test]
    async fn mv_relocates_and_removes_source() {
        let dir = fixture();
        let fs = OsFileSystem::new();
        mv(&fs, &["src"], &dir.path().join("moved"), &opts(&dir)).await.unwrap();

        assert!(!exists(&fs, &dir.path().join("src")).await.unwrap());
        assert_eq!(fs.read(&dir.path().join("moved/sub/b.txt")).await.unwrap(), b"beta");
    }

    #[tokio::test]
    async fn mv_glob_subset_leaves_the_rest() {
        let dir = fixture();
        let fs = OsFileSystem::new();
        mv(&fs, &["src/**/*.log"], &dir.path().join("logs"), &opts(&dir)).await.unwrap();

        assert!(file_exists(&fs, &dir.path().join("logs/sub/skip.log")).await.unwrap());
        assert!(!exists(&fs, &dir.path().join("src/sub/skip.log")).await.unwrap());
        assert!(file_exists(&fs, &dir.path().join("src/sub/b.txt")).await.unwrap());
        assert!(dir_exists(&fs, &dir.path().join("src/sub")).await.unwrap());
    }

    #[tokio::test]
    async fn mv_into_missing_parent_creates_it() {
        let dir = fixture();
        let fs = OsFileSystem::new();
        mv(&fs, &["src/a.txt"], &dir.path().join("deep/down/a.txt"), &opts(&dir))
            .await
            .unwrap();
        assert_eq!(fs.read(&dir.path().join("deep/down/a.txt")).await.unwrap(), b"alpha");
    }
}
