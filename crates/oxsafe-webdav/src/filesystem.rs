//! `DavFileSystem` implementation over an [`FsIo`] subtree.
//!
//! Request paths arrive already stripped of the mount prefix and
//! percent-decoded. They are mapped component by component below the
//! configured root; anything that would climb out of it is refused.

use crate::dir_entry::SafeDirEntry;
use crate::error::WebDavError;
use crate::file::{blocking, SafeDavFile};
use crate::metadata::SafeMetaData;
use dav_server::davpath::DavPath;
use dav_server::fs::{
    DavDirEntry, DavFile, DavFileSystem, DavMetaData, FsError, FsFuture, FsStream, OpenOptions,
    ReadDirMeta,
};
use futures::stream;
use oxsafe_fs::{FsIo, OpenMode};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, instrument, trace, warn};

/// Chunk size used when copying file contents.
const COPY_CHUNK: usize = 256 * 1024;

/// WebDAV view of a filesystem subtree.
#[derive(Clone)]
pub struct SafeDavFs {
    fs: Arc<dyn FsIo>,
    root: PathBuf,
}

impl std::fmt::Debug for SafeDavFs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SafeDavFs")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

impl SafeDavFs {
    /// Serve `root` (and everything below it) from `fs`.
    pub fn new(fs: Arc<dyn FsIo>, root: impl Into<PathBuf>) -> Self {
        Self {
            fs,
            root: root.into(),
        }
    }

    /// The directory served as the WebDAV root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a WebDAV path onto the filesystem.
    fn map_path(&self, path: &DavPath) -> Result<PathBuf, FsError> {
        let raw = std::str::from_utf8(path.as_bytes())
            .map_err(|_| WebDavError::InvalidPath(path.to_string()))?;
        let mut mapped = self.root.clone();
        for component in raw.split('/').filter(|c| !c.is_empty()) {
            if component == "." || component == ".." || component.contains('\\') {
                return Err(WebDavError::InvalidPath(raw.to_string()).into());
            }
            mapped.push(component);
        }
        trace!(raw = %raw, mapped = %mapped.display(), "map_path");
        Ok(mapped)
    }

    /// Copy one regular file's contents to a new file.
    fn copy_file(fs: &dyn FsIo, from: &Path, to: &Path) -> oxsafe_fs::FsResult<()> {
        let src = fs.open_file(from, OpenMode::read())?;
        let dst = fs.open_file(to, OpenMode::create())?;
        dst.truncate(0)?;

        let mut buf = vec![0u8; COPY_CHUNK];
        let mut offset = 0u64;
        loop {
            let n = src.read_at(&mut buf, offset)?;
            if n == 0 {
                break;
            }
            oxsafe_fs::write_all(dst.as_ref(), &buf[..n], offset)?;
            offset += n as u64;
        }

        let attrs = src.attrs()?;
        fs.set_times(to, None, Some(attrs.modified))
    }
}

impl DavFileSystem for SafeDavFs {
    #[instrument(level = "debug", skip(self), fields(path = %path.as_url_string()))]
    fn open<'a>(&'a self, path: &'a DavPath, options: OpenOptions) -> FsFuture<'a, Box<dyn DavFile>> {
        Box::pin(async move {
            let target = self.map_path(path)?;
            debug!(fs_path = %target.display(), options = ?options, "Opening file");

            if options.create_new {
                let fs = Arc::clone(&self.fs);
                let probe = target.clone();
                match blocking(move || fs.get_attrs(&probe)).await {
                    Ok(_) => return Err(FsError::Exists),
                    Err(FsError::NotFound) => {}
                    Err(e) => return Err(e),
                }
            }

            let mode = OpenMode {
                write: options.write || options.append || options.truncate,
                create: options.create || options.create_new,
            };
            let fs = Arc::clone(&self.fs);
            let open_path = target.clone();
            let truncate = options.truncate;
            let (file, size) = blocking(move || {
                let file = fs.open_file(&open_path, mode)?;
                if truncate {
                    file.truncate(0)?;
                }
                let size = file.attrs()?.size;
                Ok((file, size))
            })
            .await?;

            let position = if options.append { size } else { 0 };
            Ok(Box::new(SafeDavFile::new(file, target, position)) as Box<dyn DavFile>)
        })
    }

    #[instrument(level = "debug", skip(self), fields(path = %path.as_url_string()))]
    fn read_dir<'a>(
        &'a self,
        path: &'a DavPath,
        _: ReadDirMeta,
    ) -> FsFuture<'a, FsStream<Box<dyn DavDirEntry>>> {
        Box::pin(async move {
            let dir = self.map_path(path)?;
            debug!(dir = %dir.display(), "Reading directory");

            let fs = Arc::clone(&self.fs);
            let listed = blocking(move || {
                let mut entries = Vec::new();
                for entry in fs.open_dir(&dir)? {
                    let entry = entry?;
                    let Some(name) = entry.name.to_str() else {
                        warn!(dir = %dir.display(), "Skipping entry with non-UTF-8 name");
                        continue;
                    };
                    match fs.get_attrs(&dir.join(name)) {
                        Ok(attrs) => entries.push(SafeDirEntry::new(name.to_owned(), attrs)),
                        // Removed between listing and stat
                        Err(e) if e.is_not_found() => {}
                        Err(e) => return Err(e),
                    }
                }
                Ok(entries)
            })
            .await?;

            trace!(count = listed.len(), "Directory entries found");
            let entries: Vec<Box<dyn DavDirEntry>> = listed
                .into_iter()
                .map(|e| Box::new(e) as Box<dyn DavDirEntry>)
                .collect();
            Ok(Box::pin(stream::iter(entries.into_iter().map(Ok))) as FsStream<_>)
        })
    }

    #[instrument(level = "debug", skip(self), fields(path = %path.as_url_string()))]
    fn metadata<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, Box<dyn DavMetaData>> {
        Box::pin(async move {
            let target = self.map_path(path)?;
            let fs = Arc::clone(&self.fs);
            let attrs = blocking(move || fs.get_attrs(&target)).await?;
            Ok(Box::new(SafeMetaData::new(attrs)) as Box<dyn DavMetaData>)
        })
    }

    #[instrument(level = "debug", skip(self), fields(path = %path.as_url_string()))]
    fn create_dir<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, ()> {
        Box::pin(async move {
            let target = self.map_path(path)?;
            debug!(fs_path = %target.display(), "Creating directory");
            let fs = Arc::clone(&self.fs);
            blocking(move || fs.mkdir(&target)).await
        })
    }

    #[instrument(level = "debug", skip(self), fields(path = %path.as_url_string()))]
    fn remove_dir<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, ()> {
        Box::pin(async move {
            let target = self.map_path(path)?;
            if target == self.root {
                return Err(FsError::Forbidden);
            }
            debug!(fs_path = %target.display(), "Removing directory");
            let fs = Arc::clone(&self.fs);
            blocking(move || fs.rmdir(&target)).await
        })
    }

    #[instrument(level = "debug", skip(self), fields(path = %path.as_url_string()))]
    fn remove_file<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, ()> {
        Box::pin(async move {
            let target = self.map_path(path)?;
            debug!(fs_path = %target.display(), "Removing file");
            let fs = Arc::clone(&self.fs);
            blocking(move || fs.unlink(&target)).await
        })
    }

    #[instrument(level = "debug", skip(self), fields(from = %from.as_url_string(), to = %to.as_url_string()))]
    fn rename<'a>(&'a self, from: &'a DavPath, to: &'a DavPath) -> FsFuture<'a, ()> {
        Box::pin(async move {
            let from = self.map_path(from)?;
            let to = self.map_path(to)?;
            if from == self.root || to == self.root {
                return Err(FsError::Forbidden);
            }
            debug!(from = %from.display(), to = %to.display(), "Renaming/moving");
            let fs = Arc::clone(&self.fs);
            blocking(move || fs.rename(&from, &to)).await
        })
    }

    #[instrument(level = "debug", skip(self), fields(from = %from.as_url_string(), to = %to.as_url_string()))]
    fn copy<'a>(&'a self, from: &'a DavPath, to: &'a DavPath) -> FsFuture<'a, ()> {
        Box::pin(async move {
            let from = self.map_path(from)?;
            let to = self.map_path(to)?;
            debug!(from = %from.display(), to = %to.display(), "Copying");
            let fs = Arc::clone(&self.fs);
            blocking(move || {
                if fs.get_attrs(&from)?.is_dir() {
                    // Collections are copied member by member by the dispatcher
                    return fs.mkdir(&to);
                }
                Self::copy_file(fs.as_ref(), &from, &to)
            })
            .await
        })
    }

    #[instrument(level = "debug", skip(self), fields(path = %path.as_url_string()))]
    fn set_accessed<'a>(&'a self, path: &'a DavPath, tm: SystemTime) -> FsFuture<'a, ()> {
        Box::pin(async move {
            let target = self.map_path(path)?;
            let fs = Arc::clone(&self.fs);
            blocking(move || fs.set_times(&target, Some(tm), None)).await
        })
    }

    #[instrument(level = "debug", skip(self), fields(path = %path.as_url_string()))]
    fn set_modified<'a>(&'a self, path: &'a DavPath, tm: SystemTime) -> FsFuture<'a, ()> {
        Box::pin(async move {
            let target = self.map_path(path)?;
            let fs = Arc::clone(&self.fs);
            blocking(move || fs.set_times(&target, None, Some(tm))).await
        })
    }
}
