//! Deterministic recursive tree traversal
//!
//! Children of each directory are visited in lexicographic order, depth
//! first. Stat calls for one directory's children may run concurrently but
//! through an order-preserving buffer, so the materialized result sequence
//! never depends on the concurrency setting.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::future::{BoxFuture, FutureExt};
use futures::stream::{self, StreamExt};
use tracing::trace;

use crate::error::{FsError, Result};
use crate::fs::{EntryStat, FileSystem};

/// Default bound on per-directory stat fan-out. Kept small to avoid file
/// descriptor exhaustion.
pub const DEFAULT_CONCURRENCY: usize = 8;

/// Shared flag for cancelling a traversal or batch operation in flight.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub type EntryPredicate = Arc<dyn Fn(&EntryStat) -> bool + Send + Sync>;

/// Trip `Cancelled` when the token has been cancelled. Batch operations
/// call this before each per-entry action so cancellation stops new work
/// promptly, not just the snapshot walk.
pub(crate) fn ensure_live(cancel: &Option<CancelToken>) -> Result<()> {
    if cancel.as_ref().is_some_and(|c| c.is_cancelled()) {
        return Err(FsError::Cancelled);
    }
    Ok(())
}

/// Traversal configuration.
///
/// `filter` removes an entry from the result set but recursion into it
/// still happens; `search_filter` removes a directory from recursion and
/// results entirely.
#[derive(Clone)]
pub struct WalkOptions {
    /// Include dotfile entries in the traversal. When off, a dot-named
    /// directory is skipped wholesale, non-dot descendants included.
    /// Pattern operations instead walk with this on and leave dotfile
    /// policy to the matcher, which judges only an entry's last segment.
    pub all: bool,
    /// Post-order (children before their directory) instead of pre-order.
    pub is_reverse: bool,
    /// Stat through symlinks instead of reporting the links themselves.
    pub follow_links: bool,
    /// Bound on per-directory stat fan-out.
    pub concurrency: usize,
    /// Treat a missing root as an empty traversal instead of an error.
    pub ignore_missing: bool,
    pub filter: Option<EntryPredicate>,
    pub search_filter: Option<EntryPredicate>,
    pub cancel: Option<CancelToken>,
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self {
            all: false,
            is_reverse: false,
            follow_links: false,
            concurrency: DEFAULT_CONCURRENCY,
            ignore_missing: false,
            filter: None,
            search_filter: None,
            cancel: None,
        }
    }
}

impl fmt::Debug for WalkOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WalkOptions")
            .field("all", &self.all)
            .field("is_reverse", &self.is_reverse)
            .field("follow_links", &self.follow_links)
            .field("concurrency", &self.concurrency)
            .field("ignore_missing", &self.ignore_missing)
            .field("filter", &self.filter.is_some())
            .field("search_filter", &self.search_filter.is_some())
            .finish()
    }
}

impl WalkOptions {
    fn ensure_live(&self) -> Result<()> {
        ensure_live(&self.cancel)
    }

    fn include(&self, entry: &EntryStat) -> bool {
        self.filter.as_ref().is_none_or(|f| f(entry))
    }

    fn descend(&self, entry: &EntryStat) -> bool {
        self.search_filter.as_ref().is_none_or(|f| f(entry))
    }
}

/// Walk each root depth first, yielding a deterministic ordered snapshot.
///
/// A root that is a plain file yields exactly that one entry. A missing
/// root is an error unless `ignore_missing` is set.
pub async fn walk(
    fs: &dyn FileSystem,
    roots: &[PathBuf],
    opts: &WalkOptions,
) -> Result<Vec<EntryStat>> {
    let mut out = Vec::new();
    for root in roots {
        let stat = match stat_entry(fs, root.clone(), opts).await {
            Ok(stat) => stat,
            Err(err) if opts.ignore_missing && err.is_not_found() => continue,
            Err(err) => return Err(err),
        };
        visit(fs, stat, opts, &mut out).await?;
    }
    Ok(out)
}

async fn stat_entry(fs: &dyn FileSystem, path: PathBuf, opts: &WalkOptions) -> Result<EntryStat> {
    if opts.follow_links {
        match fs.stat(&path).await {
            Ok(stat) => Ok(stat),
            // A broken link still exists; report the link itself.
            Err(err) if err.is_not_found() => fs.lstat(&path).await,
            Err(err) => Err(err),
        }
    } else {
        fs.lstat(&path).await
    }
}

fn visit<'a>(
    fs: &'a dyn FileSystem,
    entry: EntryStat,
    opts: &'a WalkOptions,
    out: &'a mut Vec<EntryStat>,
) -> BoxFuture<'a, Result<()>> {
    async move {
        opts.ensure_live()?;

        if !entry.is_dir {
            if opts.include(&entry) {
                out.push(entry);
            }
            return Ok(());
        }
        if !opts.descend(&entry) {
            trace!(path = %entry.path.display(), "pruned by search filter");
            return Ok(());
        }
        if !opts.is_reverse && opts.include(&entry) {
            out.push(entry.clone());
        }

        let names = match fs.read_dir(&entry.path).await {
            Ok(names) => names,
            // The directory vanished after being statted.
            Err(err) if err.is_not_found() => Vec::new(),
            Err(err) => return Err(err),
        };
        let stats: Vec<Result<EntryStat>> = stream::iter(
            names
                .into_iter()
                .filter(|name| opts.all || !name.starts_with('.'))
                .map(|name| stat_entry(fs, entry.path.join(name), opts)),
        )
        .buffered(opts.concurrency.max(1))
        .collect()
        .await;

        for stat in stats {
            let stat = match stat {
                Ok(stat) => stat,
                // Listed but gone by stat time.
                Err(err) if err.is_not_found() => continue,
                Err(err) => return Err(err),
            };
            visit(fs, stat, opts, &mut *out).await?;
        }

        if opts.is_reverse && opts.include(&entry) {
            out.push(entry);
        }
        Ok(())
    }
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::OsFileSystem;
    use tempfile::TempDir;

    fn fixture() -> TempDir {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("b/nested")).unwrap();
        std::fs::write(dir.path().join("a.txt"), b"a").unwrap();
        std::fs::write(dir.path().join("b/c.txt"), b"c").unwrap();
        std::fs::write(dir.path().join("b/nested/d.txt"), b"d").unwrap();
        std::fs::write(dir.path().join("z.txt"), b"z").unwrap();
        dir
    }

    fn rel_names(entries: &[EntryStat], base: &Path) -> Vec<String> {
        entries.iter().map(|e| glob_utils::rel_str(&e.path, base)).collect()
    }

    #[tokio::test]
    async fn pre_order_is_lexicographic_depth_first() {
        let dir = fixture();
        let fs = OsFileSystem::new();
        let entries =
            walk(&fs, &[dir.path().to_path_buf()], &WalkOptions::default()).await.unwrap();
        assert_eq!(
            rel_names(&entries, dir.path()),
            vec!["", "a.txt", "b", "b/c.txt", "b/nested", "b/nested/d.txt", "z.txt"]
        );
    }

    #[tokio::test]
    async fn reverse_visits_children_first() {
        let dir = fixture();
        let fs = OsFileSystem::new();
        let opts = WalkOptions { is_reverse: true, ..Default::default() };
        let entries = walk(&fs, &[dir.path().to_path_buf()], &opts).await.unwrap();
        assert_eq!(
            rel_names(&entries, dir.path()),
            vec!["a.txt", "b/c.txt", "b/nested/d.txt", "b/nested", "b", "z.txt", ""]
        );
    }

    #[tokio::test]
    async fn order_is_independent_of_concurrency() {
        let dir = fixture();
        let fs = OsFileSystem::new();
        let serial = WalkOptions { concurrency: 1, ..Default::default() };
        let wide = WalkOptions { concurrency: 32, ..Default::default() };
        let a = walk(&fs, &[dir.path().to_path_buf()], &serial).await.unwrap();
        let b = walk(&fs, &[dir.path().to_path_buf()], &wide).await.unwrap();
        assert_eq!(rel_names(&a, dir.path()), rel_names(&b, dir.path()));
    }

    #[tokio::test]
    async fn filter_excludes_results_but_still_recurses() {
        let dir = fixture();
        let fs = OsFileSystem::new();
        let opts = WalkOptions {
            filter: Some(Arc::new(|e: &EntryStat| !e.is_dir)),
            ..Default::default()
        };
        let entries = walk(&fs, &[dir.path().to_path_buf()], &opts).await.unwrap();
        // Directories are gone from results, their children are not.
        assert_eq!(
            rel_names(&entries, dir.path()),
            vec!["a.txt", "b/c.txt", "b/nested/d.txt", "z.txt"]
        );
    }

    #[tokio::test]
    async fn search_filter_prunes_whole_subtrees() {
        let dir = fixture();
        let fs = OsFileSystem::new();
        let opts = WalkOptions {
            search_filter: Some(Arc::new(|e: &EntryStat| {
                e.path.file_name().is_none_or(|n| n != "nested")
            })),
            ..Default::default()
        };
        let entries = walk(&fs, &[dir.path().to_path_buf()], &opts).await.unwrap();
        assert_eq!(rel_names(&entries, dir.path()), vec!["", "a.txt", "b", "b/c.txt", "z.txt"]);
    }

    #[tokio::test]
    async fn file_root_yields_single_entry() {
        let dir = fixture();
        let fs = OsFileSystem::new();
        let entries =
            walk(&fs, &[dir.path().join("a.txt")], &WalkOptions::default()).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert!(!entries[0].is_dir);
    }

    #[tokio::test]
    async fn missing_root_policy() {
        let dir = TempDir::new().unwrap();
        let fs = OsFileSystem::new();
        let missing = dir.path().join("nope");

        let err =
            walk(&fs, &[missing.clone()], &WalkOptions::default()).await.unwrap_err();
        assert!(err.is_not_found());

        let opts = WalkOptions { ignore_missing: true, ..Default::default() };
        assert!(walk(&fs, &[missing], &opts).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn dotfiles_skipped_unless_all() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join(".cache")).unwrap();
        std::fs::write(dir.path().join(".cache/data"), b"").unwrap();
        std::fs::write(dir.path().join(".hidden"), b"").unwrap();
        std::fs::write(dir.path().join("seen"), b"").unwrap();
        let fs = OsFileSystem::new();

        // A dot directory is pruned wholesale, its non-dot child with it.
        let entries =
            walk(&fs, &[dir.path().to_path_buf()], &WalkOptions::default()).await.unwrap();
        assert_eq!(rel_names(&entries, dir.path()), vec!["", "seen"]);

        let opts = WalkOptions { all: true, ..Default::default() };
        let entries = walk(&fs, &[dir.path().to_path_buf()], &opts).await.unwrap();
        assert_eq!(
            rel_names(&entries, dir.path()),
            vec!["", ".cache", ".cache/data", ".hidden", "seen"]
        );
    }

    #[tokio::test]
    async fn cancellation_stops_traversal() {
        let dir = fixture();
        let fs = OsFileSystem::new();
        let token = CancelToken::new();
        token.cancel();
        let opts = WalkOptions { cancel: Some(token), ..Default::default() };
        let err = walk(&fs, &[dir.path().to_path_buf()], &opts).await.unwrap_err();
        assert!(err.is_cancelled());
    }
}
