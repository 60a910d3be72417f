//! Polling filesystem watcher
//!
//! A `WatcherRegistry` owns every watch table explicitly; there is no
//! process-global state. One tokio task per registry ticks at a fixed
//! granularity, re-stats due entries, diffs against the cached snapshot
//! and delivers typed events through the user handler. Handlers run
//! inline on the poll task, so deliveries are serialized: no two
//! concurrent deliveries for one path ever occur.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use dashmap::DashMap;
use glob_utils::Matcher;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::error::Result;
use crate::fs::{EntryStat, FileSystem};
use crate::ops::{GlobOptions, glob};
use crate::walk::{WalkOptions, walk};

/// Poll loop timing. `tick_ms` is the scheduling granularity; every watch
/// fires on its own interval, rounded up to the next tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    pub tick_ms: u64,
    pub default_interval_ms: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self { tick_ms: 100, default_interval_ms: 300 }
    }
}

/// What a directory watch observed about one child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEventKind {
    Create,
    Modify,
    Delete,
}

/// Delivery for `watch_path` / `watch_files` watches.
#[derive(Debug, Clone)]
pub struct PathChange {
    pub path: PathBuf,
    pub curr: Option<EntryStat>,
    pub prev: Option<EntryStat>,
    pub is_delete: bool,
}

/// Delivery for `watch_dir` watches.
#[derive(Debug, Clone)]
pub struct DirChange {
    pub kind: WatchEventKind,
    pub path: PathBuf,
    pub stat: Option<EntryStat>,
    pub prev: Option<EntryStat>,
}

pub type PathHandler = Arc<dyn Fn(PathChange) + Send + Sync>;
pub type DirHandler = Arc<dyn Fn(DirChange) + Send + Sync>;

#[derive(Debug, Clone, Copy, Default)]
pub struct WatchOptions {
    /// Poll interval; the registry default when unset.
    pub interval: Option<Duration>,
    /// Include dotfiles when resolving pattern watches.
    pub all: bool,
}

#[derive(Debug, Clone, Default)]
pub struct DirWatchOptions {
    /// Patterns selecting which children to report, `**` when empty.
    pub patterns: Vec<String>,
    /// Include dotfile children.
    pub all: bool,
    pub interval: Option<Duration>,
}

struct PathWatch {
    interval: Duration,
    next_due: Instant,
    prev: Option<EntryStat>,
    handler: PathHandler,
}

struct DirWatch {
    interval: Duration,
    next_due: Instant,
    matcher: Matcher,
    all: bool,
    self_stat: Option<EntryStat>,
    children: HashMap<PathBuf, EntryStat>,
    handler: DirHandler,
}

struct PatternWatch {
    interval: Duration,
    next_due: Instant,
    patterns: Vec<String>,
    cwd: PathBuf,
    all: bool,
    handler: PathHandler,
}

struct Inner {
    fs: Arc<dyn FileSystem>,
    config: RegistryConfig,
    paths: DashMap<PathBuf, PathWatch>,
    dirs: DashMap<PathBuf, DirWatch>,
    patterns: DashMap<u64, PatternWatch>,
    next_pattern_id: AtomicU64,
}

/// Explicit watch registry with its own lifecycle. Dropping or
/// `dispose`-ing the registry stops the poll task and every watch.
pub struct WatcherRegistry {
    inner: Arc<Inner>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl WatcherRegistry {
    /// Create a registry with default timing. Must be called inside a
    /// tokio runtime; the poll task starts immediately.
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self::with_config(fs, RegistryConfig::default())
    }

    pub fn with_config(fs: Arc<dyn FileSystem>, config: RegistryConfig) -> Self {
        let tick = Duration::from_millis(config.tick_ms.max(1));
        let inner = Arc::new(Inner {
            fs,
            config,
            paths: DashMap::new(),
            dirs: DashMap::new(),
            patterns: DashMap::new(),
            next_pattern_id: AtomicU64::new(0),
        });
        let weak: Weak<Inner> = Arc::downgrade(&inner);
        let task = tokio::spawn(async move {
            loop {
                tokio::time::sleep(tick).await;
                // The registry owns the only strong reference.
                let Some(inner) = weak.upgrade() else { break };
                inner.poll(Instant::now()).await;
            }
        });
        Self { inner, task: Mutex::new(Some(task)) }
    }

    fn default_interval(&self) -> Duration {
        Duration::from_millis(self.inner.config.default_interval_ms.max(1))
    }

    /// Watch one path. A path that does not exist yet is accepted; its
    /// later appearance is delivered with `prev: None`.
    pub async fn watch_path(
        &self,
        path: &Path,
        opts: &WatchOptions,
        handler: impl Fn(PathChange) + Send + Sync + 'static,
    ) -> Result<()> {
        let interval = opts.interval.unwrap_or_else(|| self.default_interval());
        let prev = self.inner.stat_quietly(path).await;
        debug!(path = %path.display(), ?interval, present = prev.is_some(), "watch path");
        self.inner.paths.insert(
            path.to_path_buf(),
            PathWatch {
                interval,
                next_due: Instant::now() + interval,
                prev,
                handler: Arc::new(handler),
            },
        );
        Ok(())
    }

    /// Watch every path a pattern set selects. The set is re-resolved on
    /// each poll so newly created matches get watched too.
    pub async fn watch_files(
        &self,
        patterns: &[&str],
        cwd: &Path,
        opts: &WatchOptions,
        handler: impl Fn(PathChange) + Send + Sync + 'static,
    ) -> Result<()> {
        let interval = opts.interval.unwrap_or_else(|| self.default_interval());
        let handler: PathHandler = Arc::new(handler);

        let gopts = GlobOptions { cwd: cwd.to_path_buf(), all: opts.all, ..Default::default() };
        let matched = glob(self.inner.fs.as_ref(), patterns, &gopts).await?;
        debug!(?patterns, matched = matched.len(), "watch files");
        for path in matched {
            self.inner.install_path_watch(&path, interval, handler.clone()).await;
        }

        let id = self.inner.next_pattern_id.fetch_add(1, Ordering::Relaxed);
        self.inner.patterns.insert(
            id,
            PatternWatch {
                interval,
                next_due: Instant::now() + interval,
                patterns: patterns.iter().map(|p| p.to_string()).collect(),
                cwd: cwd.to_path_buf(),
                all: opts.all,
                handler,
            },
        );
        Ok(())
    }

    /// Watch a directory's children. Each poll re-walks the directory,
    /// diffs against the previous snapshot and emits one event per
    /// changed child. Deleting the watched directory itself delivers a
    /// delete carrying its last-known stat and removes the watch.
    pub async fn watch_dir(
        &self,
        dir: &Path,
        opts: &DirWatchOptions,
        handler: impl Fn(DirChange) + Send + Sync + 'static,
    ) -> Result<()> {
        let interval = opts.interval.unwrap_or_else(|| self.default_interval());
        let matcher = if opts.patterns.is_empty() {
            glob_utils::MATCH_ALL.clone()
        } else {
            let patterns: Vec<&str> = opts.patterns.iter().map(|p| p.as_str()).collect();
            Matcher::compile(&patterns)?
        };

        let self_stat = self.inner.fs.stat(dir).await?;
        let children = self.inner.snapshot_children(dir, &matcher, opts.all).await?;
        debug!(dir = %dir.display(), children = children.len(), "watch dir");
        self.inner.dirs.insert(
            dir.to_path_buf(),
            DirWatch {
                interval,
                next_due: Instant::now() + interval,
                matcher,
                all: opts.all,
                self_stat: Some(self_stat),
                children,
                handler: Arc::new(handler),
            },
        );
        Ok(())
    }

    /// Drop the watch on `path`, whether a path or a directory watch.
    /// No-op when nothing watches it.
    pub fn unwatch(&self, path: &Path) {
        self.inner.paths.remove(path);
        self.inner.dirs.remove(path);
    }

    /// Stop the poll task and drop every watch.
    pub fn dispose(&self) {
        self.inner.paths.clear();
        self.inner.dirs.clear();
        self.inner.patterns.clear();
        if let Ok(mut guard) = self.task.lock() {
            if let Some(task) = guard.take() {
                task.abort();
            }
        }
    }
}

impl Drop for WatcherRegistry {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl Inner {
    async fn poll(self: Arc<Self>, now: Instant) {
        self.poll_patterns(now).await;
        self.poll_paths(now).await;
        self.poll_dirs(now).await;
    }

    /// Stat where "gone" and "unreadable" both mean absent.
    async fn stat_quietly(&self, path: &Path) -> Option<EntryStat> {
        match self.fs.stat(path).await {
            Ok(stat) => Some(stat),
            Err(err) if err.is_not_found() => None,
            Err(err) => {
                warn!(path = %path.display(), %err, "stat failed, treating as absent");
                None
            }
        }
    }

    async fn install_path_watch(&self, path: &Path, interval: Duration, handler: PathHandler) {
        if self.paths.contains_key(path) {
            return;
        }
        let prev = self.stat_quietly(path).await;
        trace!(path = %path.display(), "installing path watch");
        self.paths.insert(
            path.to_path_buf(),
            PathWatch { interval, next_due: Instant::now() + interval, prev, handler },
        );
    }

    async fn snapshot_children(
        &self,
        dir: &Path,
        matcher: &Matcher,
        all: bool,
    ) -> Result<HashMap<PathBuf, EntryStat>> {
        let wopts = WalkOptions { all: true, ignore_missing: true, ..Default::default() };
        let entries = walk(self.fs.as_ref(), &[dir.to_path_buf()], &wopts).await?;
        Ok(entries
            .into_iter()
            .filter(|e| e.path != dir)
            .filter(|e| matcher.matches(&glob_utils::rel_str(&e.path, dir), e.is_dir, all))
            .map(|e| (e.path.clone(), e))
            .collect())
    }

    async fn poll_paths(&self, now: Instant) {
        let due: Vec<PathBuf> = self
            .paths
            .iter()
            .filter(|w| w.value().next_due <= now)
            .map(|w| w.key().clone())
            .collect();

        for path in due {
            // Clone what the poll needs and release the table before any
            // filesystem await.
            let (handler, prev) = match self.paths.get_mut(&path) {
                Some(mut watch) => {
                    watch.next_due = now + watch.interval;
                    (watch.handler.clone(), watch.prev.clone())
                }
                None => continue,
            };
            let curr = self.stat_quietly(&path).await;

            match (prev, curr) {
                (Some(prev), None) => {
                    trace!(path = %path.display(), "watched path deleted");
                    self.paths.remove(&path);
                    handler(PathChange {
                        path: path.clone(),
                        curr: None,
                        prev: Some(prev),
                        is_delete: true,
                    });
                }
                (prev, Some(curr))
                    if prev.as_ref().is_none_or(|p| curr.differs_from(p)) =>
                {
                    if let Some(mut watch) = self.paths.get_mut(&path) {
                        watch.prev = Some(curr.clone());
                    }
                    handler(PathChange {
                        path: path.clone(),
                        curr: Some(curr),
                        prev,
                        is_delete: false,
                    });
                }
                _ => {}
            }
        }
    }

    async fn poll_dirs(&self, now: Instant) {
        let due: Vec<PathBuf> = self
            .dirs
            .iter()
            .filter(|w| w.value().next_due <= now)
            .map(|w| w.key().clone())
            .collect();

        for dir in due {
            let (handler, matcher, all, self_stat, prev_children) =
                match self.dirs.get_mut(&dir) {
                    Some(mut watch) => {
                        watch.next_due = now + watch.interval;
                        (
                            watch.handler.clone(),
                            watch.matcher.clone(),
                            watch.all,
                            watch.self_stat.clone(),
                            watch.children.clone(),
                        )
                    }
                    None => continue,
                };

            if self.stat_quietly(&dir).await.is_none() {
                trace!(dir = %dir.display(), "watched directory deleted");
                self.dirs.remove(&dir);
                let mut gone: Vec<_> = prev_children.into_iter().collect();
                gone.sort_by(|a, b| a.0.cmp(&b.0));
                for (path, prev) in gone.into_iter().rev() {
                    handler(DirChange {
                        kind: WatchEventKind::Delete,
                        path,
                        stat: None,
                        prev: Some(prev),
                    });
                }
                handler(DirChange {
                    kind: WatchEventKind::Delete,
                    path: dir.clone(),
                    stat: None,
                    prev: self_stat,
                });
                continue;
            }

            let curr = match self.snapshot_children(&dir, &matcher, all).await {
                Ok(curr) => curr,
                Err(err) => {
                    warn!(dir = %dir.display(), %err, "dir poll failed");
                    continue;
                }
            };

            let mut events = Vec::new();
            for (path, stat) in &curr {
                match prev_children.get(path) {
                    None => events.push(DirChange {
                        kind: WatchEventKind::Create,
                        path: path.clone(),
                        stat: Some(stat.clone()),
                        prev: None,
                    }),
                    Some(prev) if stat.differs_from(prev) => events.push(DirChange {
                        kind: WatchEventKind::Modify,
                        path: path.clone(),
                        stat: Some(stat.clone()),
                        prev: Some(prev.clone()),
                    }),
                    Some(_) => {}
                }
            }
            for (path, prev) in &prev_children {
                if !curr.contains_key(path) {
                    events.push(DirChange {
                        kind: WatchEventKind::Delete,
                        path: path.clone(),
                        stat: None,
                        prev: Some(prev.clone()),
                    });
                }
            }
            events.sort_by(|a, b| a.path.cmp(&b.path));

            // Stat before reacquiring the table entry; a guard must never
            // be held across an await.
            let self_stat = self.stat_quietly(&dir).await;
            if let Some(mut watch) = self.dirs.get_mut(&dir) {
                watch.children = curr;
                watch.self_stat = self_stat;
            }
            for event in events {
                handler(event);
            }
        }
    }

    async fn poll_patterns(&self, now: Instant) {
        let due: Vec<u64> = self
            .patterns
            .iter()
            .filter(|w| w.value().next_due <= now)
            .map(|w| *w.key())
            .collect();

        for id in due {
            let (patterns, cwd, all, interval, handler) = match self.patterns.get_mut(&id) {
                Some(mut watch) => {
                    watch.next_due = now + watch.interval;
                    (
                        watch.patterns.clone(),
                        watch.cwd.clone(),
                        watch.all,
                        watch.interval,
                        watch.handler.clone(),
                    )
                }
                None => continue,
            };
            let refs: Vec<&str> = patterns.iter().map(|p| p.as_str()).collect();
            let gopts = GlobOptions { cwd, all, ..Default::default() };
            match glob(self.fs.as_ref(), &refs, &gopts).await {
                Ok(matched) => {
                    for path in matched {
                        self.install_path_watch(&path, interval, handler.clone()).await;
                    }
                }
                Err(err) => warn!(?patterns, %err, "pattern re-resolution failed"),
            }
        }
    }
}
