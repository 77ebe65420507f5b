//! Error type for filesystem contract operations.

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors returned by [`FsIo`](crate::FsIo) implementations.
#[derive(Debug, Error)]
pub enum FsError {
    /// An I/O operation failed on a specific path.
    #[error("{op} failed for {}: {source}", path.display())]
    Io {
        /// Operation that failed (e.g. "open", "rename").
        op: &'static str,
        /// Path the operation was applied to.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The path does not live below the filesystem's root.
    #[error("Path is outside the filesystem root: {}", .0.display())]
    OutsideRoot(PathBuf),

    /// A path component is not a plain name (`.`, `..`, prefixes) or is not valid UTF-8.
    #[error("Invalid path component in {}", .0.display())]
    InvalidName(PathBuf),
}

/// Result type for filesystem contract operations.
pub type FsResult<T> = Result<T, FsError>;

impl FsError {
    /// Wrap an `io::Error` with the operation and path it came from.
    pub fn io(op: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        FsError::Io {
            op,
            path: path.into(),
            source,
        }
    }

    /// Build an error of the given kind without an OS error behind it.
    pub fn from_kind(op: &'static str, path: &Path, kind: io::ErrorKind) -> Self {
        FsError::io(op, path, io::Error::from(kind))
    }

    /// The `io::ErrorKind` this error maps to.
    pub fn kind(&self) -> io::ErrorKind {
        match self {
            FsError::Io { source, .. } => source.kind(),
            FsError::OutsideRoot(_) | FsError::InvalidName(_) => io::ErrorKind::InvalidInput,
        }
    }

    /// Returns true if the path does not exist.
    pub fn is_not_found(&self) -> bool {
        self.kind() == io::ErrorKind::NotFound
    }
}

impl From<FsError> for io::Error {
    fn from(e: FsError) -> Self {
        match e {
            FsError::Io { source, .. } => source,
            other => io::Error::new(other.kind(), other.to_string()),
        }
    }
}
