//! Recursive removal
//!
//! Walks post-order so children go before their directory. An entry that
//! disappeared between the snapshot and its removal counts as removed.

use std::path::PathBuf;

use glob_utils::Matcher;
use tracing::{debug, trace};

use crate::error::{FsError, Result, fail_at};
use crate::fs::{EntryStat, FileSystem};
use crate::ops::matched_entries;
use crate::walk::{CancelToken, DEFAULT_CONCURRENCY, EntryPredicate, WalkOptions, ensure_live};

#[derive(Clone)]
pub struct RemoveOptions {
    pub cwd: PathBuf,
    /// Include dotfiles in wildcard matches.
    pub all: bool,
    /// Excludes an entry from removal; recursion is unaffected.
    pub filter: Option<EntryPredicate>,
    pub concurrency: usize,
    pub cancel: Option<CancelToken>,
}

impl Default for RemoveOptions {
    fn default() -> Self {
        Self {
            cwd: PathBuf::from("."),
            all: false,
            filter: None,
            concurrency: DEFAULT_CONCURRENCY,
            cancel: None,
        }
    }
}

/// Remove everything the patterns select. Files and symlinks are unlinked
/// (links are never followed), directories removed after their children.
///
/// A selective removal (glob pattern or filter) leaves a directory that
/// still has unmatched children in place instead of failing.
pub async fn remove(fs: &dyn FileSystem, patterns: &[&str], opts: &RemoveOptions) -> Result<()> {
    let matcher = Matcher::compile(patterns)?;
    let selective = matcher.as_literal().is_none() || opts.filter.is_some();
    let wopts = WalkOptions {
        is_reverse: true,
        concurrency: opts.concurrency,
        filter: opts.filter.clone(),
        cancel: opts.cancel.clone(),
        ..Default::default()
    };
    // Dotfiles are always traversed for a literal target; a directory
    // cannot go away while hidden children linger.
    let entries = match matched_entries(fs, &matcher, &opts.cwd, opts.all, true, wopts).await {
        Ok(entries) => entries,
        // Removing what is already gone is success.
        Err(err) if err.is_not_found() => return Ok(()),
        Err(err) => return Err(err),
    };
    debug!(count = entries.len(), selective, "remove");

    let total = entries.len();
    for (idx, entry) in entries.iter().enumerate() {
        ensure_live(&opts.cancel)?;
        remove_entry(fs, entry, selective)
            .await
            .map_err(|e| fail_at(&entry.path, e, total - idx - 1))?;
    }
    Ok(())
}

async fn remove_entry(fs: &dyn FileSystem, entry: &EntryStat, selective: bool) -> Result<()> {
    let res = if entry.is_dir && !entry.is_symlink {
        fs.rmdir(&entry.path).await
    } else {
        fs.unlink(&entry.path).await
    };
    match res {
        Ok(()) => Ok(()),
        // Concurrent removal did our work for us.
        Err(err) if err.is_not_found() => {
            trace!(path = %entry.path.display(), "already gone");
            Ok(())
        }
        Err(FsError::DirectoryNotEmpty { .. }) if selective => Ok(()),
        Err(err) => Err(err),
    }
}
