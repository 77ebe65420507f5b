//! Mounting encrypted containers as drives.
//!
//! An [`Orchestrator`] opens a container through an
//! [`EncryptedFsFactory`], serves the plaintext view over loopback WebDAV on
//! a dedicated thread, and asks the OS to attach it through a
//! [`PlatformMountBridge`]. The resulting [`MountSession`] owns the thread
//! until [`MountSession::unmount`].
//!
//! # Modules
//!
//! - [`handshake`] - One-shot success/failure signal between threads
//! - [`binder`] - Random free loopback port selection
//! - [`bridge`] - OS attach/detach (`mount_webdav`, `net use`, davfs)
//! - [`recent`] - Persistent list of recently used containers
//! - [`config`] - JSON-persisted mount settings
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! use oxsafe_fs::{FsIo, NativeFs};
//! use oxsafe_mount::{EncryptedFsFactory, MountConfig, OpenError, Orchestrator};
//! use secrecy::SecretString;
//!
//! struct MyCipher;
//!
//! impl EncryptedFsFactory for MyCipher {
//!     type Config = ();
//!
//!     fn open(
//!         &self,
//!         base: Arc<dyn FsIo>,
//!         _root: &Path,
//!         _config: (),
//!         _password: &SecretString,
//!     ) -> Result<Arc<dyn FsIo>, OpenError> {
//!         Ok(base)
//!     }
//! }
//!
//! let orchestrator = Orchestrator::with_default_bridge(MyCipher, MountConfig::load());
//! let session = orchestrator.mount(
//!     Arc::new(NativeFs::new()),
//!     Path::new("/home/me/Safe"),
//!     (),
//!     SecretString::from("hunter2".to_string()),
//! )?;
//! println!("Mounted at {}", session.mount_target());
//! session.unmount()?;
//! # Ok::<(), oxsafe_mount::MountError>(())
//! ```

pub mod binder;
pub mod bridge;
pub mod config;
mod encryption;
mod error;
pub mod handshake;
pub mod recent;
mod session;

pub use binder::{bind_free_port, find_free_port};
pub use bridge::{default_bridge, ManualBridge, MountTarget, PlatformMountBridge};
pub use config::{ConfigError, MountConfig};
pub use encryption::EncryptedFsFactory;
pub use error::{MountError, OpenError, RecentPathsError};
pub use recent::RecentlyUsedPathStore;
pub use session::{MountSession, MountState, Orchestrator};
