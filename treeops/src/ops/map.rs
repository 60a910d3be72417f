//! Structure-preserving tree mapping with optional content transform

use std::future::Future;
use std::path::{Path, PathBuf};

use glob_utils::Matcher;
use tracing::debug;

use crate::error::{Result, fail_at};
use crate::fs::{EntryStat, FileSystem};
use crate::ops::simple::{mkdirs, mkdirs_parent};
use crate::ops::{matched_entries, source_root};
use crate::walk::{CancelToken, DEFAULT_CONCURRENCY, EntryPredicate, WalkOptions, ensure_live};

#[derive(Clone)]
pub struct MapOptions {
    pub cwd: PathBuf,
    /// Include dotfiles in wildcard matches.
    pub all: bool,
    /// Pass file bytes through the iterator before writing. When off the
    /// bytes are copied untouched and the iterator is not consulted.
    pub map_content: bool,
    pub follow_links: bool,
    pub concurrency: usize,
    pub filter: Option<EntryPredicate>,
    pub cancel: Option<CancelToken>,
}

impl Default for MapOptions {
    fn default() -> Self {
        Self {
            cwd: PathBuf::from("."),
            all: false,
            map_content: true,
            follow_links: false,
            concurrency: DEFAULT_CONCURRENCY,
            filter: None,
            cancel: None,
        }
    }
}

/// Mirror the matched tree under `dest`. Directories are recreated; each
/// file's bytes run through `iter` (old content in, new content out)
/// before landing at the mapped destination path.
pub async fn map_dir<F, Fut>(
    fs: &dyn FileSystem,
    patterns: &[&str],
    dest: &Path,
    opts: &MapOptions,
    mut iter: F,
) -> Result<()>
where
    F: FnMut(Vec<u8>, &EntryStat) -> Fut,
    Fut: Future<Output = Result<Vec<u8>>>,
{
    let matcher = Matcher::compile(patterns)?;
    let wopts = WalkOptions {
        all: opts.all,
        follow_links: opts.follow_links,
        concurrency: opts.concurrency,
        filter: opts.filter.clone(),
        cancel: opts.cancel.clone(),
        ..Default::default()
    };
    let entries = matched_entries(fs, &matcher, &opts.cwd, opts.all, true, wopts).await?;
    let src_root = source_root(&matcher, &opts.cwd);
    debug!(src = %src_root.display(), dest = %dest.display(), entries = entries.len(), "map");

    let total = entries.len();
    for (idx, entry) in entries.iter().enumerate() {
        ensure_live(&opts.cancel)?;
        map_entry(fs, entry, &src_root, dest, opts, &mut iter)
            .await
            .map_err(|e| fail_at(&entry.path, e, total - idx - 1))?;
    }
    Ok(())
}

async fn map_entry<F, Fut>(
    fs: &dyn FileSystem,
    entry: &EntryStat,
    src_root: &Path,
    dest: &Path,
    opts: &MapOptions,
    iter: &mut F,
) -> Result<()>
where
    F: FnMut(Vec<u8>, &EntryStat) -> Fut,
    Fut: Future<Output = Result<Vec<u8>>>,
{
    let rel = match entry.path.strip_prefix(src_root) {
        Ok(rel) => rel,
        // Never happens for entries the walk produced under this root.
        Err(_) => return Ok(()),
    };
    let target = if rel.as_os_str().is_empty() { dest.to_path_buf() } else { dest.join(rel) };

    if entry.is_dir {
        return mkdirs(fs, &target).await;
    }
    mkdirs_parent(fs, &target).await?;
    if !opts.map_content {
        return fs.copy_file(&entry.path, &target).await;
    }
    let content = fs.read(&entry.path).await?;
    let mapped = iter(content, entry).await?;
    fs.write(&target, &mapped).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::OsFileSystem;
    use crate::ops::simple::{exists, file_exists};
    use std::future::ready;
    use tempfile::TempDir;

    fn fixture() -> TempDir {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("in/sub")).unwrap();
        std::fs::write(dir.path().join("in/a.txt"), b"hello").unwrap();
        std::fs::write(dir.path().join("in/sub/b.txt"), b"world").unwrap();
        std::fs::write(dir.path().join("in/sub/c.bin"), b"\x00\x01").unwrap();
        dir
    }

    fn opts(dir: &TempDir) -> MapOptions {
        MapOptions { cwd: dir.path().to_path_buf(), ..Default::default() }
    }

    #[tokio::test]
    async fn transforms_content_while_mirroring_structure() {
        let dir = fixture();
        let fs = OsFileSystem::new();
        map_dir(&fs, &["in"], &dir.path().join("out"), &opts(&dir), |content, _| {
            ready(Ok(content.to_ascii_uppercase()))
        })
        .await
        .unwrap();

        assert_eq!(fs.read(&dir.path().join("out/a.txt")).await.unwrap(), b"HELLO");
        assert_eq!(fs.read(&dir.path().join("out/sub/b.txt")).await.unwrap(), b"WORLD");
        // Sources untouched.
        assert_eq!(fs.read(&dir.path().join("in/a.txt")).await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn glob_selection_maps_only_matches() {
        let dir = fixture();
        let fs = OsFileSystem::new();
        map_dir(&fs, &["in/**/*.txt"], &dir.path().join("out"), &opts(&dir), |c, _| {
            ready(Ok(c))
        })
        .await
        .unwrap();

        assert!(file_exists(&fs, &dir.path().join("out/a.txt")).await.unwrap());
        assert!(file_exists(&fs, &dir.path().join("out/sub/b.txt")).await.unwrap());
        assert!(!exists(&fs, &dir.path().join("out/sub/c.bin")).await.unwrap());
    }

    #[tokio::test]
    async fn map_content_off_copies_bytes_untouched() {
        let dir = fixture();
        let fs = OsFileSystem::new();
        let options = MapOptions { map_content: false, ..opts(&dir) };
        map_dir(&fs, &["in"], &dir.path().join("out"), &options, |_, _| {
            ready(Err(crate::FsError::Runtime("iterator must not run".into())))
        })
        .await
        .unwrap();
        assert_eq!(fs.read(&dir.path().join("out/sub/c.bin")).await.unwrap(), b"\x00\x01");
    }

    #[tokio::test]
    async fn cancellation_stops_remaining_writes() {
        let dir = fixture();
        let fs = OsFileSystem::new();
        let token = CancelToken::new();
        let options = MapOptions { cancel: Some(token.clone()), ..opts(&dir) };
        let err = map_dir(&fs, &["in"], &dir.path().join("out"), &options, |c, _| {
            token.cancel();
            ready(Ok(c))
        })
        .await
        .unwrap_err();
        assert!(err.is_cancelled());

        // The in-flight file landed; everything after it was skipped.
        assert!(file_exists(&fs, &dir.path().join("out/a.txt")).await.unwrap());
        assert!(!exists(&fs, &dir.path().join("out/sub")).await.unwrap());
    }

    #[tokio::test]
    async fn iterator_failure_surfaces_as_aggregate() {
        let dir = fixture();
        let fs = OsFileSystem::new();
        let err = map_dir(&fs, &["in"], &dir.path().join("out"), &opts(&dir), |_, e| {
            ready(if e.path.extension().is_some_and(|x| x == "bin") {
                Err(crate::FsError::Runtime("binary".into()))
            } else {
                Ok(Vec::new())
            })
        })
        .await
        .unwrap_err();
        assert!(matches!(err, crate::FsError::Aggregate { .. }));
    }
}
