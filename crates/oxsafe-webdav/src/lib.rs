//! Loopback WebDAV server for oxsafe mounts.
//!
//! This crate serves a subtree of any [`oxsafe_fs::FsIo`] over WebDAV so the
//! operating system's own WebDAV client can mount it as a drive.
//!
//! # How It Works
//!
//! 1. The caller binds a loopback listener (see `oxsafe-mount`'s port binder)
//! 2. [`run_server`] adopts it on a dedicated thread with its own
//!    current-thread tokio runtime
//! 3. The ready callback hands back a [`ServerHandle`] used to disconnect
//!    clients or stop the server
//! 4. Requests below `/<mount name>/` are translated into filesystem calls
//!
//! # Example
//!
//! ```no_run
//! use oxsafe_fs::{FsIo, NativeFs};
//! use oxsafe_webdav::{mount_url, run_server};
//! use std::sync::Arc;
//!
//! let fs: Arc<dyn FsIo> = Arc::new(NativeFs::new());
//! let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
//!
//! let worker = std::thread::spawn(move || {
//!     run_server(fs, "/srv/share", "share", listener, |handle| {
//!         println!("Mount via: {}", mount_url(handle.local_addr(), "share"));
//!     })
//! });
//! # let _ = worker;
//! # Ok::<(), std::io::Error>(())
//! ```
//!
//! # Security
//!
//! The server never binds by itself; callers are expected to hand it a
//! listener bound to 127.0.0.1 only. No authentication is performed.

mod dir_entry;
mod error;
mod file;
mod filesystem;
mod metadata;
mod server;

// Public exports
pub use dir_entry::SafeDirEntry;
pub use error::{fs_error_to_dav_error, ErrorCategory, WebDavError, WebDavResult};
pub use file::SafeDavFile;
pub use filesystem::SafeDavFs;
pub use metadata::SafeMetaData;
pub use server::{mount_url, run_server, ServerHandle};
