//! Error types for mounting and the recent-containers store.

use std::io;
use std::path::PathBuf;

use oxsafe_fs::FsError;
use thiserror::Error;

/// Failure opening a container through the encryption layer.
#[derive(Debug, Error)]
pub enum OpenError {
    /// Wrong password (or key material that does not decrypt).
    #[error("Authentication failed")]
    AuthenticationFailed,
    /// The container's configuration is missing or unusable.
    #[error("Invalid container configuration: {0}")]
    InvalidConfiguration(String),
    #[error(transparent)]
    Fs(#[from] FsError),
}

/// Failure of [`crate::Orchestrator::mount`] or [`crate::MountSession::unmount`].
#[derive(Debug, Error)]
pub enum MountError {
    #[error("Not a directory: {}", .0.display())]
    NotADirectory(PathBuf),
    /// The encryption layer rejected the password.
    #[error("Authentication failed for {}", .0.display())]
    AuthenticationFailed(PathBuf),
    /// The worker thread could not bring the server up.
    #[error("Server failed to start: {0}")]
    ServerStartFailed(String),
    /// The OS refused to attach or detach the drive.
    #[error("Platform mount failed: {0}")]
    PlatformMountFailed(#[source] anyhow::Error),
    #[error(transparent)]
    Fs(#[from] FsError),
}

impl MountError {
    /// Whether this failure means the user should retry with another password.
    pub fn is_authentication_failure(&self) -> bool {
        matches!(self, MountError::AuthenticationFailed(_))
    }
}

/// Failure loading or saving the recently used containers file.
#[derive(Debug, Error)]
pub enum RecentPathsError {
    #[error("Malformed recent paths file: {0}")]
    Parse(String),
    /// The file was rewritten by someone else since it was loaded.
    #[error("Recent paths file changed on disk (expected revision {expected}, found {found})")]
    Consistency { expected: u64, found: u64 },
    #[error("Path is not valid UTF-8: {}", .0.display())]
    NonUtf8Path(PathBuf),
    #[error(transparent)]
    Fs(#[from] FsError),
}

impl From<RecentPathsError> for io::Error {
    fn from(e: RecentPathsError) -> Self {
        match e {
            RecentPathsError::Fs(fs) => fs.into(),
            RecentPathsError::Parse(_) => io::Error::new(io::ErrorKind::InvalidData, e),
            other => io::Error::other(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authentication_failure_is_distinguishable() {
        let auth = MountError::AuthenticationFailed(PathBuf::from("/c"));
        let start = MountError::ServerStartFailed("bad config".into());
        assert!(auth.is_authentication_failure());
        assert!(!start.is_authentication_failure());
    }

    #[test]
    fn test_consistency_message_names_revisions() {
        let e = RecentPathsError::Consistency {
            expected: 3,
            found: 5,
        };
        let msg = e.to_string();
        assert!(msg.contains('3') && msg.contains('5'), "{msg}");
    }

    #[test]
    fn test_parse_error_into_io() {
        let io: io::Error = RecentPathsError::Parse("bad magic".into()).into();
        assert_eq!(io.kind(), io::ErrorKind::InvalidData);
    }
}
