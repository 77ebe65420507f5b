//! WebDAV metadata for filesystem entries.

use dav_server::fs::{DavMetaData, FsError};
use oxsafe_fs::{FileKind, FsAttrs};
use std::time::SystemTime;

/// Metadata of one entry, snapshotted from [`FsAttrs`].
#[derive(Debug, Clone)]
pub struct SafeMetaData {
    attrs: FsAttrs,
}

impl SafeMetaData {
    /// Wrap filesystem attributes.
    pub fn new(attrs: FsAttrs) -> Self {
        Self { attrs }
    }

    /// The wrapped attributes.
    pub fn attrs(&self) -> &FsAttrs {
        &self.attrs
    }
}

impl From<FsAttrs> for SafeMetaData {
    fn from(attrs: FsAttrs) -> Self {
        Self::new(attrs)
    }
}

impl DavMetaData for SafeMetaData {
    fn len(&self) -> u64 {
        if self.attrs.is_dir() { 0 } else { self.attrs.size }
    }

    fn modified(&self) -> Result<SystemTime, FsError> {
        Ok(self.attrs.modified)
    }

    fn is_dir(&self) -> bool {
        self.attrs.is_dir()
    }

    fn is_file(&self) -> bool {
        // WebDAV has no symlinks; anything that is not a collection is a file
        !self.attrs.is_dir()
    }

    fn is_symlink(&self) -> bool {
        false
    }

    fn created(&self) -> Result<SystemTime, FsError> {
        Ok(self.attrs.created.unwrap_or(self.attrs.modified))
    }

    fn accessed(&self) -> Result<SystemTime, FsError> {
        Ok(self.attrs.accessed)
    }

    fn status_changed(&self) -> Result<SystemTime, FsError> {
        Ok(self.attrs.modified)
    }

    fn executable(&self) -> Result<bool, FsError> {
        Ok(false)
    }
}

/// Whether an entry kind is exposed as a regular file.
pub(crate) fn is_exposed_file(kind: FileKind) -> bool {
    kind != FileKind::Directory
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn attrs(kind: FileKind, size: u64) -> FsAttrs {
        let t = SystemTime::UNIX_EPOCH + Duration::from_secs(42);
        FsAttrs {
            kind,
            size,
            modified: t,
            accessed: t,
            created: None,
            file_id: None,
            volume_id: None,
        }
    }

    #[test]
    fn test_directory_metadata() {
        let meta = SafeMetaData::new(attrs(FileKind::Directory, 4096));
        assert!(meta.is_dir());
        assert!(!meta.is_file());
        assert_eq!(meta.len(), 0);
    }

    #[test]
    fn test_file_metadata() {
        let meta = SafeMetaData::new(attrs(FileKind::File, 1024));
        assert!(meta.is_file());
        assert_eq!(meta.len(), 1024);
        assert_eq!(meta.created().unwrap(), meta.modified().unwrap());
    }

    #[test]
    fn test_symlink_exposed_as_file() {
        let meta = SafeMetaData::new(attrs(FileKind::Symlink, 7));
        assert!(meta.is_file());
        assert!(!meta.is_symlink());
        assert!(is_exposed_file(FileKind::Symlink));
    }
}
