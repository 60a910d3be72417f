//! Pattern-scoped filesystem tree operations
//!
//! This crate walks, copies, moves, maps and removes directory trees
//! selected by glob patterns, and polls watched paths and directories for
//! changes. All syscalls flow through the [`fs::FileSystem`] capability
//! trait; [`fs::OsFileSystem`] is the tokio-backed implementation.
//!
//! The primary surface is async. Blocking `*_sync` forms live in [`sync`]
//! and produce identical results by driving the async core on a fresh
//! current-thread runtime.

pub mod error;
pub mod fs;
pub mod ops;
pub mod sync;
pub mod walk;
pub mod watch;

pub use error::{FsError, Result};
pub use fs::{EntryStat, FileSystem, OsFileSystem};
pub use glob_utils::{Matcher, Pattern, PatternError, is_glob};
pub use ops::{
    CopyOptions, EachOptions, GlobOptions, MapOptions, RemoveOptions, TouchOptions, copy,
    dir_exists, each_dir, ensure_file, exists, file_exists, glob, map_dir, mkdirs, mv,
    output_file, output_json, read_json, reduce_dir, remove, touch,
};
pub use walk::{CancelToken, DEFAULT_CONCURRENCY, EntryPredicate, WalkOptions, walk};
pub use watch::{
    DirChange, DirWatchOptions, PathChange, RegistryConfig, WatchEventKind, WatchOptions,
    WatcherRegistry,
};
