//! Error taxonomy shared by every treeops operation
//!
//! Each variant carries the offending path. `Aggregate` wraps the first
//! per-entry failure of a batch operation together with the number of
//! entries that were not attempted after it.

use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FsError {
    #[error("not found: {path}")]
    NotFound { path: PathBuf },

    #[error("permission denied: {path}")]
    PermissionDenied { path: PathBuf },

    #[error("not a directory: {path}")]
    NotADirectory { path: PathBuf },

    #[error("is a directory: {path}")]
    IsADirectory { path: PathBuf },

    #[error("already exists: {path}")]
    AlreadyExists { path: PathBuf },

    #[error("directory not empty: {path}")]
    DirectoryNotEmpty { path: PathBuf },

    #[error(transparent)]
    InvalidPattern(#[from] glob_utils::PatternError),

    #[error("operation cancelled")]
    Cancelled,

    #[error("batch operation failed at {path} ({additional} entries not attempted): {source}")]
    Aggregate {
        path: PathBuf,
        #[source]
        source: Box<FsError>,
        additional: usize,
    },

    #[error("json error at {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("runtime error: {0}")]
    Runtime(String),

    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, FsError>;

impl FsError {
    /// Map an OS-level error to a typed variant carrying the path.
    pub fn from_io(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        use std::io::ErrorKind;
        let path = path.into();
        match err.kind() {
            ErrorKind::NotFound => Self::NotFound { path },
            ErrorKind::PermissionDenied => Self::PermissionDenied { path },
            ErrorKind::NotADirectory => Self::NotADirectory { path },
            ErrorKind::IsADirectory => Self::IsADirectory { path },
            ErrorKind::AlreadyExists => Self::AlreadyExists { path },
            ErrorKind::DirectoryNotEmpty => Self::DirectoryNotEmpty { path },
            _ => Self::Io { path, source: err },
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// The path the error is about, when it has one.
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::NotFound { path }
            | Self::PermissionDenied { path }
            | Self::NotADirectory { path }
            | Self::IsADirectory { path }
            | Self::AlreadyExists { path }
            | Self::DirectoryNotEmpty { path }
            | Self::Aggregate { path, .. }
            | Self::Json { path, .. }
            | Self::Io { path, .. } => Some(path),
            Self::InvalidPattern(_) | Self::Cancelled | Self::Runtime(_) => None,
        }
    }
}

/// Wrap a per-entry failure in an `Aggregate`, except cancellation which
/// passes through untouched.
pub(crate) fn fail_at(path: &Path, err: FsError, additional: usize) -> FsError {
    match err {
        FsError::Cancelled => FsError::Cancelled,
        err => FsError::Aggregate { path: path.to_path_buf(), source: Box::new(err), additional },
    }
}
