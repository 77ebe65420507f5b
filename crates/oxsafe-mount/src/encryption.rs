//! Seam to the encryption layer.
//!
//! The cipher itself lives outside this crate. A factory turns the native
//! filesystem, a container directory, the container's configuration and the
//! user's password into a filesystem that reads and writes plaintext.

use std::path::Path;
use std::sync::Arc;

use oxsafe_fs::FsIo;
use secrecy::SecretString;

use crate::error::OpenError;

/// Opens containers as plaintext filesystems.
///
/// Called on the mount's worker thread, once per mount.
pub trait EncryptedFsFactory: Send + Sync + 'static {
    /// Container configuration, usually parsed from a file inside the
    /// container before mounting.
    type Config: Send + 'static;

    /// Open the container at `container_root` on `base`.
    ///
    /// Paths handed to the returned filesystem are plaintext paths rooted at
    /// `container_root`. Return [`OpenError::AuthenticationFailed`] when the
    /// password is wrong so the caller can prompt again.
    fn open(
        &self,
        base: Arc<dyn FsIo>,
        container_root: &Path,
        config: Self::Config,
        password: &SecretString,
    ) -> Result<Arc<dyn FsIo>, OpenError>;
}
