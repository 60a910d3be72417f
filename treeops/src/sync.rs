//! Blocking forms of the async surface
//!
//! Each `*_sync` function builds a fresh current-thread runtime and drives
//! the async operation to completion on the calling thread, so results are
//! identical to the async forms minus the stat fan-out. These must not be
//! called from inside a tokio runtime; use the async forms there.

use std::future::{Future, ready};
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{FsError, Result};
use crate::fs::{EntryStat, FileSystem};
use crate::ops::{
    CopyOptions, EachOptions, GlobOptions, MapOptions, RemoveOptions, TouchOptions,
};

fn block_on<T>(fut: impl Future<Output = Result<T>>) -> Result<T> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| FsError::Runtime(e.to_string()))?;
    rt.block_on(fut)
}

pub fn glob_sync(
    fs: &dyn FileSystem,
    patterns: &[&str],
    opts: &GlobOptions,
) -> Result<Vec<PathBuf>> {
    block_on(crate::ops::glob(fs, patterns, opts))
}

pub fn each_dir_sync<F>(
    fs: &dyn FileSystem,
    patterns: &[&str],
    opts: &EachOptions,
    mut iter: F,
) -> Result<()>
where
    F: FnMut(EntryStat) -> Result<()>,
{
    block_on(crate::ops::each_dir(fs, patterns, opts, |entry| ready(iter(entry))))
}

pub fn reduce_dir_sync<A, F>(
    fs: &dyn FileSystem,
    patterns: &[&str],
    opts: &EachOptions,
    init: A,
    mut iter: F,
) -> Result<A>
where
    F: FnMut(A, EntryStat) -> Result<A>,
{
    block_on(crate::ops::reduce_dir(fs, patterns, opts, init, |acc, entry| {
        ready(iter(acc, entry))
    }))
}

pub fn map_dir_sync<F>(
    fs: &dyn FileSystem,
    patterns: &[&str],
    dest: &Path,
    opts: &MapOptions,
    mut iter: F,
) -> Result<()>
where
    F: FnMut(Vec<u8>, &EntryStat) -> Result<Vec<u8>>,
{
    block_on(crate::ops::map_dir(fs, patterns, dest, opts, |content, entry| {
        ready(iter(content, entry))
    }))
}

pub fn copy_sync(
    fs: &dyn FileSystem,
    patterns: &[&str],
    dest: &Path,
    opts: &CopyOptions,
) -> Result<()> {
    block_on(crate::ops::copy(fs, patterns, dest, opts))
}

pub fn mv_sync(
    fs: &dyn FileSystem,
    patterns: &[&str],
    dest: &Path,
    opts: &CopyOptions,
) -> Result<()> {
    block_on(crate::ops::mv(fs, patterns, dest, opts))
}

pub fn remove_sync(fs: &dyn FileSystem, patterns: &[&str], opts: &RemoveOptions) -> Result<()> {
    block_on(crate::ops::remove(fs, patterns, opts))
}

pub fn exists_sync(fs: &dyn FileSystem, path: &Path) -> Result<bool> {
    block_on(crate::ops::exists(fs, path))
}

pub fn file_exists_sync(fs: &dyn FileSystem, path: &Path) -> Result<bool> {
    block_on(crate::ops::file_exists(fs, path))
}

pub fn dir_exists_sync(fs: &dyn FileSystem, path: &Path) -> Result<bool> {
    block_on(crate::ops::dir_exists(fs, path))
}

pub fn mkdirs_sync(fs: &dyn FileSystem, path: &Path) -> Result<()> {
    block_on(crate::ops::mkdirs(fs, path))
}

pub fn ensure_file_sync(fs: &dyn FileSystem, path: &Path) -> Result<()> {
    block_on(crate::ops::ensure_file(fs, path))
}

pub fn touch_sync(fs: &dyn FileSystem, path: &Path, opts: &TouchOptions) -> Result<()> {
    block_on(crate::ops::touch(fs, path, opts))
}

pub fn output_file_sync(fs: &dyn FileSystem, path: &Path, data: &[u8]) -> Result<()> {
    block_on(crate::ops::output_file(fs, path, data))
}

pub fn output_json_sync<T: Serialize>(
    fs: &dyn FileSystem,
    path: &Path,
    value: &T,
) -> Result<()> {
    block_on(crate::ops::output_json(fs, path, value))
}

pub fn read_json_sync<T: DeserializeOwned>(fs: &dyn FileSystem, path: &Path) -> Result<T> {
    block_on(crate::ops::read_json(fs, path))
}
