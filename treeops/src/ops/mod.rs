//! Pattern-scoped batch operations over directory trees
//!
//! Every operation resolves its scope through `glob_utils`, drives the
//! walker over the scope roots, snapshots the matched entries, and only
//! then performs per-entry actions. Per-entry failures abort remaining new
//! work and surface as `FsError::Aggregate`.

pub mod each;
pub mod glob;
pub mod map;
pub mod remove;
pub mod simple;
pub mod transfer;


pub use each::{EachOptions, each_dir, reduce_dir};
pub use glob::{GlobOptions, glob};
pub use map::{MapOptions, map_dir};
pub use remove::{RemoveOptions, remove};
pub use simple::{
    TouchOptions, dir_exists, ensure_file, exists, file_exists, mkdirs, output_file,
    output_json, read_json, touch,
};
pub use transfer::{CopyOptions, copy, mv};

use std::path::{Path, PathBuf};
use std::sync::Arc;

use glob_utils::Matcher;

use crate::error::Result;
use crate::fs::{EntryStat, FileSystem};
use crate::walk::{EntryPredicate, WalkOptions, walk};

/// Predicate combining a compiled matcher (applied to the cwd-relative
/// path) with an optional user filter.
pub(crate) fn matcher_filter(
    matcher: &Matcher,
    cwd: &Path,
    all: bool,
    user: Option<EntryPredicate>,
) -> EntryPredicate {
    let matcher = matcher.clone();
    let cwd = cwd.to_path_buf();
    Arc::new(move |entry: &EntryStat| {
        matcher.matches(&glob_utils::rel_str(&entry.path, &cwd), entry.is_dir, all)
            && user.as_ref().is_none_or(|f| f(entry))
    })
}

/// Snapshot the entries a pattern set selects.
///
/// A single literal pattern means plain-path traversal: the whole subtree
/// under that path, strict about a missing root, with dotfile visibility
/// controlled by `literal_all`. Glob patterns walk the literal roots with
/// the matcher as result filter and tolerate missing roots.
pub(crate) async fn matched_entries(
    fs: &dyn FileSystem,
    matcher: &Matcher,
    cwd: &Path,
    all: bool,
    literal_all: bool,
    mut wopts: WalkOptions,
) -> Result<Vec<EntryStat>> {
    if let Some(lit) = matcher.as_literal() {
        let root = join_rel(cwd, lit);
        wopts.all = literal_all;
        wopts.ignore_missing = false;
        walk(fs, &[root], &wopts).await
    } else {
        let roots = matcher.roots_in(cwd);
        wopts.filter = Some(matcher_filter(matcher, cwd, all, wopts.filter.take()));
        wopts.all = true;
        wopts.ignore_missing = true;
        walk(fs, &roots, &wopts).await
    }
}

pub(crate) fn join_rel(base: &Path, rel: &str) -> PathBuf {
    if rel.is_empty() { base.to_path_buf() } else { base.join(rel) }
}

/// The source root the copy/move/map destination mapping strips off.
pub(crate) fn source_root(matcher: &Matcher, cwd: &Path) -> PathBuf {
    match matcher.as_literal() {
        Some(lit) => join_rel(cwd, lit),
        None => join_rel(cwd, &matcher.common_root()),
    }
}
