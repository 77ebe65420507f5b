//! WebDAV directory entries.

use crate::metadata::{is_exposed_file, SafeMetaData};
use dav_server::fs::{DavDirEntry, DavMetaData, FsFuture};
use oxsafe_fs::{FileKind, FsAttrs};

/// One entry of a directory listing with its attributes already fetched.
#[derive(Debug, Clone)]
pub struct SafeDirEntry {
    name: String,
    meta: SafeMetaData,
}

impl SafeDirEntry {
    /// Create an entry from its listed name and attributes.
    pub fn new(name: String, attrs: FsAttrs) -> Self {
        Self {
            name,
            meta: SafeMetaData::new(attrs),
        }
    }

    fn kind(&self) -> FileKind {
        self.meta.attrs().kind
    }
}

impl DavDirEntry for SafeDirEntry {
    fn name(&self) -> Vec<u8> {
        self.name.as_bytes().to_vec()
    }

    fn metadata(&self) -> FsFuture<'_, Box<dyn DavMetaData>> {
        let meta = self.meta.clone();
        Box::pin(async move { Ok(Box::new(meta) as Box<dyn DavMetaData>) })
    }

    fn is_dir(&self) -> FsFuture<'_, bool> {
        let is_dir = self.kind() == FileKind::Directory;
        Box::pin(async move { Ok(is_dir) })
    }

    fn is_file(&self) -> FsFuture<'_, bool> {
        let is_file = is_exposed_file(self.kind());
        Box::pin(async move { Ok(is_file) })
    }

    fn is_symlink(&self) -> FsFuture<'_, bool> {
        // WebDAV doesn't support symlinks, expose them as files
        Box::pin(async { Ok(false) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::SystemTime;

    fn attrs(kind: FileKind) -> FsAttrs {
        FsAttrs {
            kind,
            size: 3,
            modified: SystemTime::UNIX_EPOCH,
            accessed: SystemTime::UNIX_EPOCH,
            created: None,
            file_id: None,
            volume_id: None,
        }
    }

    #[test]
    fn test_entry_name_bytes() {
        let entry = SafeDirEntry::new("r\u{e9}sum\u{e9}.txt".to_string(), attrs(FileKind::File));
        assert_eq!(entry.name(), "r\u{e9}sum\u{e9}.txt".as_bytes());
    }

    #[tokio::test]
    async fn test_file_entry_is_file() {
        let entry = SafeDirEntry::new("a".to_string(), attrs(FileKind::File));
        assert!(entry.is_file().await.unwrap());
        assert!(!entry.is_dir().await.unwrap());
        assert_eq!(entry.metadata().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_dir_entry_is_dir() {
        let entry = SafeDirEntry::new("d".to_string(), attrs(FileKind::Directory));
        assert!(entry.is_dir().await.unwrap());
        assert!(!entry.is_file().await.unwrap());
    }
}
