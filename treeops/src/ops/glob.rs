//! Pattern enumeration

use std::path::{Path, PathBuf};

use glob_utils::Matcher;

use crate::error::Result;
use crate::fs::FileSystem;
use crate::ops::{join_rel, matcher_filter};
use crate::walk::{CancelToken, DEFAULT_CONCURRENCY, WalkOptions, walk};

#[derive(Debug, Clone)]
pub struct GlobOptions {
    pub cwd: PathBuf,
    /// Include dotfiles in wildcard matches.
    pub all: bool,
    pub follow_links: bool,
    pub concurrency: usize,
    pub cancel: Option<CancelToken>,
}

impl Default for GlobOptions {
    fn default() -> Self {
        Self {
            cwd: PathBuf::from("."),
            all: false,
            follow_links: false,
            concurrency: DEFAULT_CONCURRENCY,
            cancel: None,
        }
    }
}

/// Enumerate the paths a pattern set selects, sorted and deduplicated.
///
/// A missing scope root yields an empty result, not an error. A single
/// literal pattern denotes exactly that one path.
pub async fn glob(
    fs: &dyn FileSystem,
    patterns: &[&str],
    opts: &GlobOptions,
) -> Result<Vec<PathBuf>> {
    let matcher = Matcher::compile(patterns)?;

    if let Some(lit) = matcher.as_literal() {
        let path = join_rel(&opts.cwd, lit);
        return match stat_literal(fs, &path, opts.follow_links).await {
            Ok(()) => Ok(vec![path]),
            Err(err) if err.is_not_found() => Ok(Vec::new()),
            Err(err) => Err(err),
        };
    }

    let roots = matcher.roots_in(&opts.cwd);
    let wopts = WalkOptions {
        all: true,
        follow_links: opts.follow_links,
        concurrency: opts.concurrency,
        ignore_missing: true,
        filter: Some(matcher_filter(&matcher, &opts.cwd, opts.all, None)),
        cancel: opts.cancel.clone(),
        ..Default::default()
    };
    let entries = walk(fs, &roots, &wopts).await?;

    let mut paths: Vec<PathBuf> = entries.into_iter().map(|e| e.path).collect();
    paths.sort();
    paths.dedup();
    Ok(paths)
}

async fn stat_literal(fs: &dyn FileSystem, path: &Path, follow_links: bool) -> Result<()> {
    if follow_links {
        fs.stat(path).await.map(|_| ())
    } else {
        fs.lstat(path).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::OsFileSystem;
    use crate::sync::glob_sync;
    use tempfile::TempDir;

    fn fixture() -> TempDir {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("a/sub")).unwrap();
        std::fs::create_dir_all(dir.path().join("b")).unwrap();
        std::fs::write(dir.path().join("a/one.txt"), b"1").unwrap();
        std::fs::write(dir.path().join("a/sub/two.txt"), b"2").unwrap();
        std::fs::write(dir.path().join("a/sub/c"), b"c").unwrap();
        std::fs::write(dir.path().join("b/c"), b"c").unwrap();
        std::fs::write(dir.path().join("b/keep.log"), b"k").unwrap();
        std::fs::write(dir.path().join(".dotfile"), b"").unwrap();
        dir
    }

    fn opts(dir: &TempDir) -> GlobOptions {
        GlobOptions { cwd: dir.path().to_path_buf(), ..Default::default() }
    }

    fn rels(paths: &[PathBuf], dir: &TempDir) -> Vec<String> {
        paths.iter().map(|p| glob_utils::rel_str(p, dir.path())).collect()
    }

    #[tokio::test]
    async fn double_star_enumerates_recursively() {
        let dir = fixture();
        let fs = OsFileSystem::new();
        let paths = glob(&fs, &["a/**"], &opts(&dir)).await.unwrap();
        assert_eq!(rels(&paths, &dir), vec!["a", "a/one.txt", "a/sub", "a/sub/c", "a/sub/two.txt"]);
    }

    #[tokio::test]
    async fn negation_vetoes_matches() {
        let dir = fixture();
        let fs = OsFileSystem::new();
        let paths = glob(&fs, &["a/**", "b/**", "!**/c"], &opts(&dir)).await.unwrap();
        let rels = rels(&paths, &dir);
        assert!(rels.iter().all(|p| !p.ends_with("/c")));
        assert!(rels.contains(&"a/one.txt".to_string()));
        assert!(rels.contains(&"b/keep.log".to_string()));
    }

    #[tokio::test]
    async fn dotfiles_require_all_flag() {
        let dir = fixture();
        let fs = OsFileSystem::new();
        let paths = glob(&fs, &["**"], &opts(&dir)).await.unwrap();
        assert!(!rels(&paths, &dir).contains(&".dotfile".to_string()));

        let all = GlobOptions { all: true, ..opts(&dir) };
        let paths = glob(&fs, &["**"], &all).await.unwrap();
        assert!(rels(&paths, &dir).contains(&".dotfile".to_string()));
    }

    #[tokio::test]
    async fn literal_path_denotes_one_entry() {
        let dir = fixture();
        let fs = OsFileSystem::new();
        let paths = glob(&fs, &["./a/one.txt"], &opts(&dir)).await.unwrap();
        assert_eq!(rels(&paths, &dir), vec!["a/one.txt"]);

        let paths = glob(&fs, &["a/gone.txt"], &opts(&dir)).await.unwrap();
        assert!(paths.is_empty());
    }

    #[tokio::test]
    async fn missing_scope_root_is_empty() {
        let dir = fixture();
        let fs = OsFileSystem::new();
        let paths = glob(&fs, &["nothing/**"], &opts(&dir)).await.unwrap();
        assert!(paths.is_empty());
    }

    #[tokio::test]
    async fn sync_form_matches_async_form() {
        let dir = fixture();
        let fs = OsFileSystem::new();
        let options = opts(&dir);
        let async_paths = glob(&fs, &["**/*.txt"], &options).await.unwrap();
        let handle = {
            let options = options.clone();
            std::thread::spawn(move || {
                let fs = OsFileSystem::new();
                glob_sync(&fs, &["**/*.txt"], &options)
            })
        };
        let sync_paths = handle.join().unwrap().unwrap();
        assert_eq!(async_paths, sync_paths);
    }
}
