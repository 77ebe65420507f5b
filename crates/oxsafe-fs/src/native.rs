//! [`FsIo`] over the host filesystem.

use std::fs::{self, File, FileTimes, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::trace;

use crate::error::{FsError, FsResult};
use crate::fs_io::{DirEntry, DirStream, FileKind, FsAttrs, FsFile, FsIo, OpenMode};

/// The host filesystem via `std::fs`.
///
/// Stateless, so a single instance (usually behind an `Arc<dyn FsIo>`) is
/// shared by every mount.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeFs;

impl NativeFs {
    /// Create a native filesystem handle.
    pub fn new() -> Self {
        Self
    }
}

fn kind_of(file_type: fs::FileType) -> FileKind {
    if file_type.is_dir() {
        FileKind::Directory
    } else if file_type.is_file() {
        FileKind::File
    } else if file_type.is_symlink() {
        FileKind::Symlink
    } else {
        FileKind::Other
    }
}

fn attrs_from_metadata(meta: &fs::Metadata) -> FsAttrs {
    #[cfg(unix)]
    let (file_id, volume_id) = {
        use std::os::unix::fs::MetadataExt;
        (Some(meta.ino()), Some(meta.dev()))
    };
    #[cfg(not(unix))]
    let (file_id, volume_id) = (None, None);

    let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
    FsAttrs {
        kind: kind_of(meta.file_type()),
        size: meta.len(),
        modified,
        accessed: meta.accessed().unwrap_or(modified),
        created: meta.created().ok(),
        file_id,
        volume_id,
    }
}

impl FsIo for NativeFs {
    fn open_file(&self, path: &Path, mode: OpenMode) -> FsResult<Box<dyn FsFile>> {
        trace!(path = %path.display(), ?mode, "open_file");
        let file = OpenOptions::new()
            .read(true)
            .write(mode.write || mode.create)
            .create(mode.create)
            .open(path)
            .map_err(|e| FsError::io("open", path, e))?;

        let meta = file.metadata().map_err(|e| FsError::io("open", path, e))?;
        if meta.is_dir() {
            return Err(FsError::from_kind(
                "open",
                path,
                std::io::ErrorKind::IsADirectory,
            ));
        }

        Ok(Box::new(NativeFile {
            file,
            path: path.to_path_buf(),
        }))
    }

    fn open_dir(&self, path: &Path) -> FsResult<DirStream> {
        let owner = path.to_path_buf();
        let iter = fs::read_dir(path)
            .map_err(|e| FsError::io("opendir", path, e))?
            .map(move |entry| {
                let entry = entry.map_err(|e| FsError::io("readdir", &owner, e))?;
                let kind = entry
                    .file_type()
                    .map(kind_of)
                    .map_err(|e| FsError::io("readdir", entry.path(), e))?;
                Ok(DirEntry {
                    name: entry.file_name(),
                    kind,
                })
            });
        Ok(Box::new(iter))
    }

    fn mkdir(&self, path: &Path) -> FsResult<()> {
        fs::create_dir(path).map_err(|e| FsError::io("mkdir", path, e))
    }

    fn rename(&self, from: &Path, to: &Path) -> FsResult<()> {
        fs::rename(from, to).map_err(|e| FsError::io("rename", from, e))
    }

    fn unlink(&self, path: &Path) -> FsResult<()> {
        fs::remove_file(path).map_err(|e| FsError::io("unlink", path, e))
    }

    fn rmdir(&self, path: &Path) -> FsResult<()> {
        fs::remove_dir(path).map_err(|e| FsError::io("rmdir", path, e))
    }

    fn get_attrs(&self, path: &Path) -> FsResult<FsAttrs> {
        fs::symlink_metadata(path)
            .map(|m| attrs_from_metadata(&m))
            .map_err(|e| FsError::io("stat", path, e))
    }

    fn set_times(
        &self,
        path: &Path,
        accessed: Option<SystemTime>,
        modified: Option<SystemTime>,
    ) -> FsResult<()> {
        let mut times = FileTimes::new();
        if let Some(t) = accessed {
            times = times.set_accessed(t);
        }
        if let Some(t) = modified {
            times = times.set_modified(t);
        }
        let file = File::open(path).map_err(|e| FsError::io("utimes", path, e))?;
        file.set_times(times)
            .map_err(|e| FsError::io("utimes", path, e))
    }
}

/// Open handle on a host file.
struct NativeFile {
    file: File,
    path: PathBuf,
}

impl FsFile for NativeFile {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> FsResult<usize> {
        #[cfg(unix)]
        let result = std::os::unix::fs::FileExt::read_at(&self.file, buf, offset);
        #[cfg(windows)]
        let result = std::os::windows::fs::FileExt::seek_read(&self.file, buf, offset);
        result.map_err(|e| FsError::io("read", &self.path, e))
    }

    fn write_at(&self, buf: &[u8], offset: u64) -> FsResult<usize> {
        #[cfg(unix)]
        let result = std::os::unix::fs::FileExt::write_at(&self.file, buf, offset);
        #[cfg(windows)]
        let result = std::os::windows::fs::FileExt::seek_write(&self.file, buf, offset);
        result.map_err(|e| FsError::io("write", &self.path, e))
    }

    fn truncate(&self, len: u64) -> FsResult<()> {
        self.file
            .set_len(len)
            .map_err(|e| FsError::io("truncate", &self.path, e))
    }

    fn attrs(&self) -> FsResult<FsAttrs> {
        self.file
            .metadata()
            .map(|m| attrs_from_metadata(&m))
            .map_err(|e| FsError::io("fstat", &self.path, e))
    }

    fn sync(&self) -> FsResult<()> {
        self.file
            .sync_all()
            .map_err(|e| FsError::io("fsync", &self.path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs_io::{read_dir_all, read_to_end, write_all};
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_create_write_read() {
        let tmp = TempDir::new().unwrap();
        let fs = NativeFs::new();
        let path = tmp.path().join("hello.txt");

        let file = fs.open_file(&path, OpenMode::create()).unwrap();
        write_all(file.as_ref(), b"hello world", 0).unwrap();
        file.truncate(5).unwrap();
        drop(file);

        let file = fs.open_file(&path, OpenMode::read()).unwrap();
        assert_eq!(read_to_end(file.as_ref()).unwrap(), b"hello");
        assert_eq!(file.attrs().unwrap().size, 5);
        assert!(fs.get_attrs(&path).unwrap().is_file());
    }

    #[test]
    fn test_open_missing_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let err = NativeFs
            .open_file(&tmp.path().join("nope"), OpenMode::read())
            .err()
            .unwrap();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_directory_ops() {
        let tmp = TempDir::new().unwrap();
        let fs = NativeFs::new();
        let dir = tmp.path().join("sub");
        fs.mkdir(&dir).unwrap();
        fs.open_file(&dir.join("a"), OpenMode::create()).unwrap();

        let names: Vec<_> = read_dir_all(&fs, &dir)
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("a")]);

        fs.rename(&dir.join("a"), &dir.join("b")).unwrap();
        fs.unlink(&dir.join("b")).unwrap();
        fs.rmdir(&dir).unwrap();
        assert!(fs.get_attrs(&dir).unwrap_err().is_not_found());
    }

    #[test]
    fn test_set_times() {
        let tmp = TempDir::new().unwrap();
        let fs = NativeFs::new();
        let path = tmp.path().join("t");
        fs.open_file(&path, OpenMode::create()).unwrap();

        let when = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000_000);
        fs.set_times(&path, None, Some(when)).unwrap();
        assert_eq!(fs.get_attrs(&path).unwrap().modified, when);
    }

    #[cfg(unix)]
    #[test]
    fn test_identity_reported() {
        let tmp = TempDir::new().unwrap();
        let a = NativeFs.get_attrs(tmp.path()).unwrap();
        let b = NativeFs.get_attrs(tmp.path()).unwrap();
        assert!(a.same_entry(&b));
    }
}
