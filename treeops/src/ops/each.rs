//! Per-entry iteration and reduction

use std::future::Future;
use std::path::PathBuf;

use glob_utils::Matcher;

use crate::error::{Result, fail_at};
use crate::fs::{EntryStat, FileSystem};
use crate::ops::matched_entries;
use crate::walk::{CancelToken, DEFAULT_CONCURRENCY, EntryPredicate, WalkOptions, ensure_live};

/// Options shared by `each_dir` and `reduce_dir`.
#[derive(Clone)]
pub struct EachOptions {
    pub cwd: PathBuf,
    /// Include dotfiles.
    pub all: bool,
    /// Visit children before their directory.
    pub is_reverse: bool,
    pub follow_links: bool,
    pub concurrency: usize,
    /// Excludes an entry from delivery; recursion is unaffected.
    pub filter: Option<EntryPredicate>,
    /// Excludes a directory from recursion entirely.
    pub search_filter: Option<EntryPredicate>,
    pub cancel: Option<CancelToken>,
}

impl Default for EachOptions {
    fn default() -> Self {
        Self {
            cwd: PathBuf::from("."),
            all: false,
            is_reverse: false,
            follow_links: false,
            concurrency: DEFAULT_CONCURRENCY,
            filter: None,
            search_filter: None,
            cancel: None,
        }
    }
}

impl EachOptions {
    fn walk_options(&self) -> WalkOptions {
        WalkOptions {
            all: self.all,
            is_reverse: self.is_reverse,
            follow_links: self.follow_links,
            concurrency: self.concurrency,
            ignore_missing: false,
            filter: self.filter.clone(),
            search_filter: self.search_filter.clone(),
            cancel: self.cancel.clone(),
        }
    }
}

/// Invoke `iter` once per matched entry, awaiting each invocation before
/// delivering the next. A literal path pattern traverses its whole subtree
/// and is strict about the root existing.
pub async fn each_dir<F, Fut>(
    fs: &dyn FileSystem,
    patterns: &[&str],
    opts: &EachOptions,
    mut iter: F,
) -> Result<()>
where
    F: FnMut(EntryStat) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let matcher = Matcher::compile(patterns)?;
    let entries =
        matched_entries(fs, &matcher, &opts.cwd, opts.all, opts.all, opts.walk_options())
            .await?;

    let total = entries.len();
    for (idx, entry) in entries.into_iter().enumerate() {
        ensure_live(&opts.cancel)?;
        let path = entry.path.clone();
        iter(entry).await.map_err(|e| fail_at(&path, e, total - idx - 1))?;
    }
    Ok(())
}

/// Thread an accumulator through the traversal. `is_reverse` delivers
/// children before their directory, supporting reverse accumulation.
pub async fn reduce_dir<A, F, Fut>(
    fs: &dyn FileSystem,
    patterns: &[&str],
    opts: &EachOptions,
    init: A,
    mut iter: F,
) -> Result<A>
where
    F: FnMut(A, EntryStat) -> Fut,
    Fut: Future<Output = Result<A>>,
{
    let matcher = Matcher::compile(patterns)?;
    let entries =
        matched_entries(fs, &matcher, &opts.cwd, opts.all, opts.all, opts.walk_options())
            .await?;

    let total = entries.len();
    let mut acc = init;
    for (idx, entry) in entries.into_iter().enumerate() {
        ensure_live(&opts.cancel)?;
        let path = entry.path.clone();
        acc = iter(acc, entry).await.map_err(|e| fail_at(&path, e, total - idx - 1))?;
    }
    Ok(acc)
}
