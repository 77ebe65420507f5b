//! Case- and normalization-insensitive view over a byte-exact filesystem.
//!
//! Users type names the way their platform presents them: macOS hands out
//! decomposed Unicode, Windows folds case, and people rename `notes.txt` to
//! `Notes.txt` expecting the same file. The encrypted backend underneath
//! compares names as raw bytes. [`CanonicalFs`] bridges the two by mapping
//! every incoming path onto the one spelling that actually exists on disk.
//!
//! Resolution walks the path below the conversion root one component at a
//! time. Each component is normalized to NFC and looked up in its parent's
//! listing; the smallest equivalent stored name wins, and when nothing
//! matches the normalized name is used as-is (so creation stores NFC).

use std::ffi::{OsStr, OsString};
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

use tracing::{debug, trace};

use crate::error::{FsError, FsResult};
use crate::fs_io::{DirEntry, DirStream, FsAttrs, FsFile, FsIo, OpenMode};
use crate::unicode;

/// Pick the stored name that `requested` refers to.
///
/// Entries that are not valid UTF-8 or not in stored (NFC) form are
/// ignored. Among the remaining entries equivalent to `requested`, the
/// lexicographically smallest is returned so the choice does not depend on
/// listing order. With no match, the normalized `requested` is returned.
pub fn canonical_component<I, S>(requested: &str, listing: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let wanted = unicode::normalize_for_fs(requested);
    let key = unicode::fold(&wanted);
    listing
        .into_iter()
        .filter_map(|name| name.as_ref().to_str().map(str::to_owned))
        .filter(|name| unicode::is_normalized(name))
        .filter(|name| *name == wanted || unicode::fold(name) == key)
        .min()
        .unwrap_or(wanted)
}

/// Filesystem wrapper resolving every path to its canonical stored form.
///
/// Only paths under `root` are accepted. Listings hide entries whose names
/// are not in stored form, since they could never be addressed through this
/// wrapper.
#[derive(Debug, Clone)]
pub struct CanonicalFs<F> {
    base: F,
    root: PathBuf,
}

impl<F: FsIo> CanonicalFs<F> {
    /// Wrap `base`, resolving paths below `root`.
    pub fn new(base: F, root: impl Into<PathBuf>) -> Self {
        Self {
            base,
            root: root.into(),
        }
    }

    /// The conversion root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The wrapped filesystem.
    pub fn base(&self) -> &F {
        &self.base
    }

    /// Map a user path to the canonical path stored in the base filesystem.
    pub fn resolve(&self, path: &Path) -> FsResult<PathBuf> {
        let relative = path
            .strip_prefix(&self.root)
            .map_err(|_| FsError::OutsideRoot(path.to_path_buf()))?;

        let mut resolved = self.root.clone();
        for component in relative.components() {
            let Component::Normal(name) = component else {
                return Err(FsError::InvalidName(path.to_path_buf()));
            };
            let name = name
                .to_str()
                .ok_or_else(|| FsError::InvalidName(path.to_path_buf()))?;
            let listing = self.list_names(&resolved)?;
            resolved.push(canonical_component(name, listing));
        }

        trace!(from = %path.display(), to = %resolved.display(), "resolved path");
        Ok(resolved)
    }

    fn list_names(&self, dir: &Path) -> FsResult<Vec<OsString>> {
        match self.base.open_dir(dir) {
            Ok(entries) => entries.map(|e| e.map(|e| e.name)).collect(),
            Err(e) if e.is_not_found() => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    fn same_directory(&self, a: &Path, b: &Path) -> bool {
        if a == b {
            return true;
        }
        match (self.base.get_attrs(a), self.base.get_attrs(b)) {
            (Ok(a), Ok(b)) => a.same_entry(&b),
            _ => false,
        }
    }
}

impl<F: FsIo> FsIo for CanonicalFs<F> {
    fn path_from_string(&self, path: &str) -> FsResult<PathBuf> {
        self.base.path_from_string(path)
    }

    fn open_file(&self, path: &Path, mode: OpenMode) -> FsResult<Box<dyn FsFile>> {
        self.base.open_file(&self.resolve(path)?, mode)
    }

    fn open_dir(&self, path: &Path) -> FsResult<DirStream> {
        let entries = self.base.open_dir(&self.resolve(path)?)?;
        Ok(Box::new(entries.filter_map(|entry| match entry {
            Ok(entry) => {
                let name = entry.name.to_str()?;
                if !unicode::is_normalized(name) {
                    return None;
                }
                Some(Ok(DirEntry {
                    name: unicode::normalize_for_user(name).into(),
                    kind: entry.kind,
                }))
            }
            Err(e) => Some(Err(e)),
        })))
    }

    fn mkdir(&self, path: &Path) -> FsResult<()> {
        self.base.mkdir(&self.resolve(path)?)
    }

    fn rename(&self, from: &Path, to: &Path) -> FsResult<()> {
        let src = self.resolve(from)?;
        let dst = self.resolve(to)?;

        if let (Some(src_parent), Some(dst_parent), Some(requested)) =
            (src.parent(), dst.parent(), to.file_name())
            && src.file_name() == dst.file_name()
            && self.same_directory(src_parent, dst_parent)
        {
            // Same entry in the same directory: honor the spelling the
            // caller asked for so case can be changed deliberately.
            let requested = requested
                .to_str()
                .ok_or_else(|| FsError::InvalidName(to.to_path_buf()))?;
            let recased = dst_parent.join(unicode::normalize_for_fs(requested));
            debug!(from = %src.display(), to = %recased.display(), "re-casing entry");
            return self.base.rename(&src, &recased);
        }

        self.base.rename(&src, &dst)
    }

    fn unlink(&self, path: &Path) -> FsResult<()> {
        self.base.unlink(&self.resolve(path)?)
    }

    fn rmdir(&self, path: &Path) -> FsResult<()> {
        self.base.rmdir(&self.resolve(path)?)
    }

    fn get_attrs(&self, path: &Path) -> FsResult<FsAttrs> {
        self.base.get_attrs(&self.resolve(path)?)
    }

    fn set_times(
        &self,
        path: &Path,
        accessed: Option<SystemTime>,
        modified: Option<SystemTime>,
    ) -> FsResult<()> {
        self.base
            .set_times(&self.resolve(path)?, accessed, modified)
    }
}
