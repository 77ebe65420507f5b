//! The filesystem contract shared by every layer of a mount.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use crate::error::{FsError, FsResult};

/// Type of a filesystem entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    /// Regular file.
    File,
    /// Directory.
    Directory,
    /// Symbolic link (not followed).
    Symlink,
    /// Anything else (sockets, devices, ...).
    Other,
}

/// Attributes of a filesystem entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsAttrs {
    /// Entry type.
    pub kind: FileKind,
    /// Size in bytes (0 for directories on backends that do not track it).
    pub size: u64,
    /// Last modification time.
    pub modified: SystemTime,
    /// Last access time.
    pub accessed: SystemTime,
    /// Creation time, where the platform records one.
    pub created: Option<SystemTime>,
    /// Stable identity of the entry within its volume (inode number on Unix).
    pub file_id: Option<u64>,
    /// Identity of the volume holding the entry (device number on Unix).
    pub volume_id: Option<u64>,
}

impl FsAttrs {
    /// Returns true for directories.
    pub fn is_dir(&self) -> bool {
        self.kind == FileKind::Directory
    }

    /// Returns true for regular files.
    pub fn is_file(&self) -> bool {
        self.kind == FileKind::File
    }

    /// Whether both attributes describe the same entry.
    ///
    /// Only meaningful when the backend reports identities; returns false
    /// when either side lacks them.
    pub fn same_entry(&self, other: &FsAttrs) -> bool {
        matches!(
            (self.file_id, self.volume_id, other.file_id, other.volume_id),
            (Some(a), Some(va), Some(b), Some(vb)) if a == b && va == vb
        )
    }
}

/// How a file should be opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OpenMode {
    /// Allow writes through the handle.
    pub write: bool,
    /// Create the file if it does not exist (implies `write`).
    pub create: bool,
}

impl OpenMode {
    /// Read-only access to an existing file.
    pub fn read() -> Self {
        Self::default()
    }

    /// Read-write access to an existing file.
    pub fn write() -> Self {
        Self {
            write: true,
            create: false,
        }
    }

    /// Read-write access, creating the file if needed.
    pub fn create() -> Self {
        Self {
            write: true,
            create: true,
        }
    }
}

/// One entry produced by [`FsIo::open_dir`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// Entry name as stored by the backend.
    pub name: OsString,
    /// Entry type.
    pub kind: FileKind,
}

/// Directory listing. Dropping the iterator closes the directory.
pub type DirStream = Box<dyn Iterator<Item = FsResult<DirEntry>> + Send>;

/// An open file handle with positional I/O.
pub trait FsFile: Send + Sync {
    /// Read up to `buf.len()` bytes at `offset`. Returns 0 at end of file.
    fn read_at(&self, buf: &mut [u8], offset: u64) -> FsResult<usize>;

    /// Write `buf` at `offset`, returning the number of bytes written.
    fn write_at(&self, buf: &[u8], offset: u64) -> FsResult<usize>;

    /// Set the file length, zero-filling when growing.
    fn truncate(&self, len: u64) -> FsResult<()>;

    /// Attributes of the open file.
    fn attrs(&self) -> FsResult<FsAttrs>;

    /// Flush buffered data to the backing store.
    fn sync(&self) -> FsResult<()> {
        Ok(())
    }
}

/// Filesystem operations, thread-safe so one instance can back every mount.
///
/// Paths are absolute paths in the backend's namespace. Implementations
/// compare names byte for byte; see [`CanonicalFs`](crate::CanonicalFs)
/// for a case-insensitive view.
pub trait FsIo: Send + Sync {
    /// Parse a user-supplied string into a path for this backend.
    fn path_from_string(&self, path: &str) -> FsResult<PathBuf> {
        Ok(PathBuf::from(path))
    }

    /// Open (and optionally create) a regular file.
    fn open_file(&self, path: &Path, mode: OpenMode) -> FsResult<Box<dyn FsFile>>;

    /// List a directory. `.` and `..` are never returned.
    fn open_dir(&self, path: &Path) -> FsResult<DirStream>;

    /// Create a directory. The parent must exist.
    fn mkdir(&self, path: &Path) -> FsResult<()>;

    /// Rename `from` to `to`, replacing a file or empty directory at `to`.
    fn rename(&self, from: &Path, to: &Path) -> FsResult<()>;

    /// Remove a file.
    fn unlink(&self, path: &Path) -> FsResult<()>;

    /// Remove an empty directory.
    fn rmdir(&self, path: &Path) -> FsResult<()>;

    /// Attributes of an entry, without following a final symlink.
    fn get_attrs(&self, path: &Path) -> FsResult<FsAttrs>;

    /// Update access and/or modification times. `None` leaves a time unchanged.
    fn set_times(
        &self,
        path: &Path,
        accessed: Option<SystemTime>,
        modified: Option<SystemTime>,
    ) -> FsResult<()>;
}

impl<T: FsIo + ?Sized> FsIo for Arc<T> {
    fn path_from_string(&self, path: &str) -> FsResult<PathBuf> {
        (**self).path_from_string(path)
    }

    fn open_file(&self, path: &Path, mode: OpenMode) -> FsResult<Box<dyn FsFile>> {
        (**self).open_file(path, mode)
    }

    fn open_dir(&self, path: &Path) -> FsResult<DirStream> {
        (**self).open_dir(path)
    }

    fn mkdir(&self, path: &Path) -> FsResult<()> {
        (**self).mkdir(path)
    }

    fn rename(&self, from: &Path, to: &Path) -> FsResult<()> {
        (**self).rename(from, to)
    }

    fn unlink(&self, path: &Path) -> FsResult<()> {
        (**self).unlink(path)
    }

    fn rmdir(&self, path: &Path) -> FsResult<()> {
        (**self).rmdir(path)
    }

    fn get_attrs(&self, path: &Path) -> FsResult<FsAttrs> {
        (**self).get_attrs(path)
    }

    fn set_times(
        &self,
        path: &Path,
        accessed: Option<SystemTime>,
        modified: Option<SystemTime>,
    ) -> FsResult<()> {
        (**self).set_times(path, accessed, modified)
    }
}

/// Collect a whole directory listing.
pub fn read_dir_all(fs: &dyn FsIo, path: &Path) -> FsResult<Vec<DirEntry>> {
    fs.open_dir(path)?.collect()
}

/// Read an entire file from offset 0.
pub fn read_to_end(file: &dyn FsFile) -> FsResult<Vec<u8>> {
    let mut out = Vec::new();
    let mut chunk = vec![0u8; 64 * 1024];
    loop {
        let n = file.read_at(&mut chunk, out.len() as u64)?;
        if n == 0 {
            return Ok(out);
        }
        out.extend_from_slice(&chunk[..n]);
    }
}

/// Write all of `buf` at `offset`, retrying short writes.
pub fn write_all(file: &dyn FsFile, mut buf: &[u8], mut offset: u64) -> FsResult<()> {
    while !buf.is_empty() {
        let n = file.write_at(buf, offset)?;
        if n == 0 {
            return Err(FsError::from_kind(
                "write",
                Path::new(""),
                std::io::ErrorKind::WriteZero,
            ));
        }
        buf = &buf[n..];
        offset += n as u64;
    }
    Ok(())
}
