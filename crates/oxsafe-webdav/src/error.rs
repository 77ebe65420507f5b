//! Error handling and mapping for the WebDAV server.
//!
//! Filesystem errors are first classified into an [`ErrorCategory`] and then
//! turned into the `dav_server` error the request dispatcher turns into an
//! HTTP status.

use dav_server::fs::FsError as DavError;
use oxsafe_fs::FsError;
use std::io;
use thiserror::Error;

/// Errors raised while serving a filesystem over WebDAV.
#[derive(Debug, Error)]
pub enum WebDavError {
    /// Underlying filesystem operation failed.
    #[error("Filesystem operation failed: {0}")]
    Fs(#[from] FsError),

    /// IO error (listener, runtime).
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Request path cannot be mapped onto the filesystem.
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Background task failed.
    #[error("Server error: {0}")]
    Server(String),
}

impl WebDavError {
    /// Converts this error to a dav-server FsError.
    pub fn to_dav_error(&self) -> DavError {
        match self {
            WebDavError::Fs(e) => category_to_dav_error(ErrorCategory::from(e)),
            WebDavError::Io(e) => category_to_dav_error(ErrorCategory::from(e.kind())),
            WebDavError::InvalidPath(_) => DavError::Forbidden,
            WebDavError::Server(_) => DavError::GeneralFailure,
        }
    }
}

/// Semantic category of a filesystem failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Resource not found (HTTP 404)
    NotFound,
    /// Resource already exists
    AlreadyExists,
    /// Directory not empty
    NotEmpty,
    /// Expected a file but got a directory
    IsDirectory,
    /// Expected a directory but got a file
    NotDirectory,
    /// Invalid path or argument
    InvalidArgument,
    /// Permission denied
    PermissionDenied,
    /// I/O or crypto error
    IoError,
    /// Operation not supported
    NotSupported,
}

impl From<io::ErrorKind> for ErrorCategory {
    fn from(kind: io::ErrorKind) -> Self {
        match kind {
            io::ErrorKind::NotFound => Self::NotFound,
            io::ErrorKind::AlreadyExists => Self::AlreadyExists,
            io::ErrorKind::DirectoryNotEmpty => Self::NotEmpty,
            io::ErrorKind::IsADirectory => Self::IsDirectory,
            io::ErrorKind::NotADirectory => Self::NotDirectory,
            io::ErrorKind::InvalidInput | io::ErrorKind::InvalidFilename => Self::InvalidArgument,
            io::ErrorKind::PermissionDenied | io::ErrorKind::ReadOnlyFilesystem => {
                Self::PermissionDenied
            }
            io::ErrorKind::Unsupported => Self::NotSupported,
            _ => Self::IoError,
        }
    }
}

impl From<&FsError> for ErrorCategory {
    fn from(e: &FsError) -> Self {
        match e {
            FsError::Io { source, .. } => Self::from(source.kind()),
            FsError::OutsideRoot(_) => Self::PermissionDenied,
            FsError::InvalidName(_) => Self::InvalidArgument,
        }
    }
}

/// Map a category onto the dav-server error vocabulary.
fn category_to_dav_error(category: ErrorCategory) -> DavError {
    match category {
        ErrorCategory::NotFound => DavError::NotFound,
        ErrorCategory::AlreadyExists => DavError::Exists,
        ErrorCategory::NotEmpty
        | ErrorCategory::IsDirectory
        | ErrorCategory::NotDirectory
        | ErrorCategory::InvalidArgument
        | ErrorCategory::PermissionDenied => DavError::Forbidden,
        ErrorCategory::IoError => DavError::GeneralFailure,
        ErrorCategory::NotSupported => DavError::NotImplemented,
    }
}

/// Converts a filesystem error to a dav-server FsError.
///
/// Takes ownership to work with `.map_err()`.
#[allow(clippy::needless_pass_by_value)]
pub fn fs_error_to_dav_error(e: FsError) -> DavError {
    category_to_dav_error(ErrorCategory::from(&e))
}

/// Result type for WebDAV operations.
pub type WebDavResult<T> = Result<T, WebDavError>;

impl From<WebDavError> for DavError {
    fn from(e: WebDavError) -> Self {
        e.to_dav_error()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_fs_error_mapping() {
        let e = FsError::from_kind("stat", Path::new("/x"), io::ErrorKind::NotFound);
        assert!(matches!(fs_error_to_dav_error(e), DavError::NotFound));

        let e = FsError::from_kind("mkdir", Path::new("/x"), io::ErrorKind::AlreadyExists);
        assert!(matches!(fs_error_to_dav_error(e), DavError::Exists));

        let e = FsError::from_kind("rmdir", Path::new("/x"), io::ErrorKind::DirectoryNotEmpty);
        assert!(matches!(fs_error_to_dav_error(e), DavError::Forbidden));

        let e = FsError::OutsideRoot("/elsewhere".into());
        assert!(matches!(fs_error_to_dav_error(e), DavError::Forbidden));
    }

    #[test]
    fn test_webdav_error_to_dav_error() {
        assert!(matches!(
            WebDavError::InvalidPath("..".to_string()).to_dav_error(),
            DavError::Forbidden
        ));
        assert!(matches!(
            WebDavError::Server("boom".to_string()).to_dav_error(),
            DavError::GeneralFailure
        ));
        let io = io::Error::from(io::ErrorKind::Unsupported);
        assert!(matches!(
            WebDavError::from(io).to_dav_error(),
            DavError::NotImplemented
        ));
    }
}
