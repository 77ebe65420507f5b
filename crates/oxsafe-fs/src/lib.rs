//! Filesystem contract and path canonicalization for oxsafe.
//!
//! Every layer of a mount speaks the same small filesystem contract,
//! [`FsIo`]. This lets the pieces stack transparently:
//!
//! ```text
//! WebDAV server
//!     └── CanonicalFs      (case/normalization-insensitive names)
//!         └── encrypted fs (external, byte-exact lookups)
//!             └── NativeFs (std::fs)
//! ```
//!
//! # Components
//!
//! - [`FsIo`], [`FsFile`], [`FsAttrs`] - the contract itself
//! - [`NativeFs`] - thread-safe implementation over `std::fs`
//! - [`MemoryFs`] - byte-exact in-memory implementation, used as a test fake
//! - [`CanonicalFs`] - wrapper that maps user-typed names onto the names
//!   actually stored on disk
//! - [`unicode`] - normalization and equivalence rules for path components
//!
//! # Example
//!
//! ```
//! use oxsafe_fs::{CanonicalFs, FsIo, MemoryFs, OpenMode};
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! let base = Arc::new(MemoryFs::new());
//! base.mkdir(Path::new("/vault")).unwrap();
//! base.open_file(Path::new("/vault/Notes.txt"), OpenMode::create()).unwrap();
//!
//! let fs = CanonicalFs::new(base, "/vault");
//! let resolved = fs.resolve(Path::new("/vault/NOTES.TXT")).unwrap();
//! assert_eq!(resolved, Path::new("/vault/Notes.txt"));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod canonical;
mod error;
mod fs_io;
pub mod memory;
mod native;
pub mod unicode;

pub use canonical::{canonical_component, CanonicalFs};
pub use error::{FsError, FsResult};
pub use fs_io::{
    read_dir_all, read_to_end, write_all, DirEntry, DirStream, FileKind, FsAttrs, FsFile, FsIo,
    OpenMode,
};
pub use memory::MemoryFs;
pub use native::NativeFs;
