//! WebDAV file handle over an open [`FsFile`].
//!
//! Every I/O call runs on tokio's blocking pool since the underlying handle
//! may be decrypting or hitting disk.

use crate::error::fs_error_to_dav_error;
use crate::metadata::SafeMetaData;
use bytes::{Buf, Bytes};
use dav_server::fs::{DavFile, DavMetaData, FsError, FsFuture};
use oxsafe_fs::FsFile;
use std::io::SeekFrom;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, trace};

/// Run a blocking filesystem call off the runtime thread.
pub(crate) async fn blocking<T, F>(f: F) -> Result<T, FsError>
where
    F: FnOnce() -> oxsafe_fs::FsResult<T> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(result) => result.map_err(fs_error_to_dav_error),
        Err(e) => {
            tracing::error!(error = %e, "Blocking filesystem task failed");
            Err(FsError::GeneralFailure)
        }
    }
}

/// A file opened through the WebDAV server.
pub struct SafeDavFile {
    file: Arc<dyn FsFile>,
    path: PathBuf,
    position: u64,
}

impl std::fmt::Debug for SafeDavFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SafeDavFile")
            .field("path", &self.path)
            .field("position", &self.position)
            .finish_non_exhaustive()
    }
}

impl SafeDavFile {
    /// Wrap an open handle, starting at `position`.
    pub fn new(file: Box<dyn FsFile>, path: PathBuf, position: u64) -> Self {
        Self {
            file: Arc::from(file),
            path,
            position,
        }
    }

    async fn size(&self) -> Result<u64, FsError> {
        let file = Arc::clone(&self.file);
        blocking(move || file.attrs().map(|a| a.size)).await
    }
}

impl DavFile for SafeDavFile {
    fn metadata(&mut self) -> FsFuture<'_, Box<dyn DavMetaData>> {
        Box::pin(async move {
            let file = Arc::clone(&self.file);
            let attrs = blocking(move || file.attrs()).await?;
            Ok(Box::new(SafeMetaData::new(attrs)) as Box<dyn DavMetaData>)
        })
    }

    fn read_bytes(&mut self, count: usize) -> FsFuture<'_, Bytes> {
        Box::pin(async move {
            let file = Arc::clone(&self.file);
            let offset = self.position;
            let data = blocking(move || {
                let mut buf = vec![0u8; count];
                let mut filled = 0;
                while filled < count {
                    let n = file.read_at(&mut buf[filled..], offset + filled as u64)?;
                    if n == 0 {
                        break;
                    }
                    filled += n;
                }
                buf.truncate(filled);
                Ok(buf)
            })
            .await?;

            trace!(path = %self.path.display(), offset, len = data.len(), "read");
            self.position += data.len() as u64;
            Ok(Bytes::from(data))
        })
    }

    fn write_bytes(&mut self, buf: Bytes) -> FsFuture<'_, ()> {
        Box::pin(async move {
            let file = Arc::clone(&self.file);
            let offset = self.position;
            let len = buf.len() as u64;
            blocking(move || oxsafe_fs::write_all(file.as_ref(), &buf, offset)).await?;

            trace!(path = %self.path.display(), offset, len, "write");
            self.position += len;
            Ok(())
        })
    }

    fn write_buf(&mut self, mut buf: Box<dyn Buf + Send>) -> FsFuture<'_, ()> {
        Box::pin(async move {
            let bytes = buf.copy_to_bytes(buf.remaining());
            self.write_bytes(bytes).await
        })
    }

    fn seek(&mut self, pos: SeekFrom) -> FsFuture<'_, u64> {
        Box::pin(async move {
            let (base, offset) = match pos {
                SeekFrom::Start(n) => {
                    self.position = n;
                    return Ok(n);
                }
                SeekFrom::End(n) => (self.size().await?, n),
                SeekFrom::Current(n) => (self.position, n),
            };

            let new_pos = base.checked_add_signed(offset).ok_or(FsError::GeneralFailure)?;
            self.position = new_pos;
            Ok(new_pos)
        })
    }

    fn flush(&mut self) -> FsFuture<'_, ()> {
        Box::pin(async move {
            let file = Arc::clone(&self.file);
            debug!(path = %self.path.display(), "Flushing file");
            blocking(move || file.sync()).await
        })
    }
}
