//! Recently used containers, persisted as a small revisioned file.
//!
//! # File Format
//!
//! ```text
//! RecentlyUsedPathStoreV1\n
//! <revision>\n
//! <count>\n
//! <byte length>\n<path bytes>\n      (count times)
//! ```
//!
//! Numbers are ASCII decimal of at most 20 digits. Paths are UTF-8 and
//! shorter than [`MAX_PATH_LEN`] bytes. The revision increases by one on
//! every save; a save whose loaded revision no longer matches the file is
//! refused rather than merged.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use oxsafe_fs::{read_to_end, write_all, FsError, FsIo, NativeFs, OpenMode};
use tracing::{debug, info, warn};

use crate::config::project_dirs;
use crate::error::RecentPathsError;

/// File name inside the application data directory.
pub const RECENT_PATHS_FILE: &str = "RecentlyUsedPathsV1.db";

/// Default number of remembered containers.
pub const DEFAULT_MAX_ENTRIES: usize = 10;

/// Paths of this many bytes or more are rejected.
pub const MAX_PATH_LEN: usize = 1024;

const MAGIC: &str = "RecentlyUsedPathStoreV1";
const MAX_NUM_DIGITS: usize = 20;

pub type RecentResult<T> = Result<T, RecentPathsError>;

/// Ordered list of recently opened containers, most recent first.
pub struct RecentlyUsedPathStore {
    fs: Arc<dyn FsIo>,
    file: PathBuf,
    max_entries: usize,
    revision: u64,
    paths: Vec<PathBuf>,
}

impl std::fmt::Debug for RecentlyUsedPathStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecentlyUsedPathStore")
            .field("file", &self.file)
            .field("max_entries", &self.max_entries)
            .field("revision", &self.revision)
            .field("paths", &self.paths)
            .finish_non_exhaustive()
    }
}

impl RecentlyUsedPathStore {
    /// Load the store at `file` through `fs`. A missing file is an empty
    /// store at revision 0.
    pub fn open(
        fs: Arc<dyn FsIo>,
        file: impl Into<PathBuf>,
        max_entries: usize,
    ) -> RecentResult<Self> {
        let file = file.into();
        let (revision, paths) = load(fs.as_ref(), &file, max_entries)?;
        debug!(file = %file.display(), revision, count = paths.len(), "Loaded recent paths");
        Ok(Self {
            fs,
            file,
            max_entries,
            revision,
            paths,
        })
    }

    /// Load the store from the application data directory on the native
    /// filesystem, creating the directory if needed.
    pub fn open_default(max_entries: usize) -> RecentResult<Self> {
        let dir = project_dirs()
            .map_err(|e| {
                FsError::io(
                    "locate data dir",
                    PathBuf::new(),
                    std::io::Error::new(std::io::ErrorKind::NotFound, e),
                )
            })?
            .data_dir()
            .to_path_buf();
        std::fs::create_dir_all(&dir).map_err(|e| FsError::io("mkdir", &dir, e))?;
        Self::open(Arc::new(NativeFs::new()), dir.join(RECENT_PATHS_FILE), max_entries)
    }

    /// Record `path` as the most recently used container.
    pub fn use_path(&mut self, path: impl AsRef<Path>) -> RecentResult<()> {
        let path = path.as_ref();
        let encoded = encode_path(path)?;
        let mut paths: Vec<PathBuf> = self.paths.iter().filter(|p| *p != path).cloned().collect();
        paths.insert(0, PathBuf::from(encoded));
        paths.truncate(self.max_entries);
        self.commit(paths)
    }

    /// Most recent first.
    pub fn recently_used_paths(&self) -> &[PathBuf] {
        &self.paths
    }

    pub fn front(&self) -> Option<&Path> {
        self.paths.first().map(PathBuf::as_path)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Revision of the file as last loaded or saved.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Forget every entry.
    pub fn clear(&mut self) -> RecentResult<()> {
        self.commit(Vec::new())
    }

    /// Re-read the file, discarding in-memory state. Use after a
    /// [`RecentPathsError::Consistency`] to pick up the other writer's list.
    pub fn reload(&mut self) -> RecentResult<()> {
        let (revision, paths) = load(self.fs.as_ref(), &self.file, self.max_entries)?;
        self.revision = revision;
        self.paths = paths;
        Ok(())
    }

    fn commit(&mut self, paths: Vec<PathBuf>) -> RecentResult<()> {
        self.revision = save(self.fs.as_ref(), &self.file, self.revision, &paths)?;
        self.paths = paths;
        info!(file = %self.file.display(), revision = self.revision, "Saved recent paths");
        Ok(())
    }
}

fn encode_path(path: &Path) -> RecentResult<&str> {
    let s = path
        .to_str()
        .ok_or_else(|| RecentPathsError::NonUtf8Path(path.to_path_buf()))?;
    if s.len() >= MAX_PATH_LEN {
        return Err(RecentPathsError::Parse(format!(
            "path of {} bytes exceeds limit",
            s.len()
        )));
    }
    Ok(s)
}

/// Read the raw file, or `None` if it does not exist.
fn read_file(fs: &dyn FsIo, file: &Path) -> RecentResult<Option<Vec<u8>>> {
    match fs.open_file(file, OpenMode::read()) {
        Ok(handle) => Ok(Some(read_to_end(handle.as_ref())?)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn load(fs: &dyn FsIo, file: &Path, max_entries: usize) -> RecentResult<(u64, Vec<PathBuf>)> {
    let Some(data) = read_file(fs, file)? else {
        return Ok((0, Vec::new()));
    };

    let mut cursor = Cursor::new(&data);
    let revision = cursor.header()?;
    let count = cursor.number()?;
    let wanted = usize::try_from(count).unwrap_or(usize::MAX);
    if wanted > max_entries {
        warn!(count, max_entries, "More recent paths on disk than kept, skipping the rest");
    }

    let mut paths = Vec::with_capacity(wanted.min(max_entries));
    for _ in 0..wanted.min(max_entries) {
        let len = cursor.number()?;
        let len = usize::try_from(len)
            .ok()
            .filter(|len| *len < MAX_PATH_LEN)
            .ok_or_else(|| RecentPathsError::Parse(format!("path length {len} too large")))?;
        let bytes = cursor.bytes(len)?;
        let s = std::str::from_utf8(bytes)
            .map_err(|_| RecentPathsError::Parse("path is not UTF-8".into()))?;
        paths.push(fs.path_from_string(s)?);
    }
    Ok((revision, paths))
}

/// Write `paths` over `file`, returning the new revision.
fn save(fs: &dyn FsIo, file: &Path, revision: u64, paths: &[PathBuf]) -> RecentResult<u64> {
    if let Some(existing) = read_file(fs, file)? {
        let found = Cursor::new(&existing).header()?;
        if found != revision {
            return Err(RecentPathsError::Consistency {
                expected: revision,
                found,
            });
        }
    }

    let new_revision = revision
        .checked_add(1)
        .ok_or_else(|| {
            RecentPathsError::Parse(format!("revision {revision} cannot be incremented"))
        })?;
    let mut out = Vec::new();
    push_line(&mut out, MAGIC.as_bytes());
    push_line(&mut out, new_revision.to_string().as_bytes());
    push_line(&mut out, paths.len().to_string().as_bytes());
    for path in paths {
        let s = encode_path(path)?;
        push_line(&mut out, s.len().to_string().as_bytes());
        push_line(&mut out, s.as_bytes());
    }

    let handle = fs.open_file(file, OpenMode::create())?;
    write_all(handle.as_ref(), &out, 0)?;
    handle.truncate(out.len() as u64)?;
    handle.sync()?;
    Ok(new_revision)
}

fn push_line(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(bytes);
    out.push(b'\n');
}

/// Forward-only reader over the file contents.
struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Magic line plus revision.
    fn header(&mut self) -> RecentResult<u64> {
        let magic = self.line(MAGIC.len())?;
        if magic != MAGIC.as_bytes() {
            return Err(RecentPathsError::Parse(format!(
                "bad magic {:?}",
                String::from_utf8_lossy(magic)
            )));
        }
        self.number()
    }

    fn number(&mut self) -> RecentResult<u64> {
        let digits = self.line(MAX_NUM_DIGITS)?;
        if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
            return Err(RecentPathsError::Parse(format!(
                "bad number {:?}",
                String::from_utf8_lossy(digits)
            )));
        }
        std::str::from_utf8(digits)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| RecentPathsError::Parse("number out of range".into()))
    }

    /// Bytes up to the next newline (consumed), at most `max` of them.
    fn line(&mut self, max: usize) -> RecentResult<&'a [u8]> {
        let rest = &self.data[self.pos..];
        let window = &rest[..rest.len().min(max + 1)];
        match window.iter().position(|b| *b == b'\n') {
            Some(end) => {
                self.pos += end + 1;
                Ok(&rest[..end])
            }
            None if window.len() > max => {
                Err(RecentPathsError::Parse(format!("line longer than {max} bytes")))
            }
            None => Err(RecentPathsError::Parse("unexpected end of file".into())),
        }
    }

    /// Exactly `len` bytes followed by a newline.
    fn bytes(&mut self, len: usize) -> RecentResult<&'a [u8]> {
        let rest = &self.data[self.pos..];
        if rest.len() < len + 1 {
            return Err(RecentPathsError::Parse("unexpected end of file".into()));
        }
        if rest[len] != b'\n' {
            return Err(RecentPathsError::Parse("missing newline after path".into()));
        }
        self.pos += len + 1;
        Ok(&rest[..len])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxsafe_fs::MemoryFs;

    const FILE: &str = "/data/RecentlyUsedPathsV1.db";

    fn mem() -> Arc<MemoryFs> {
        let fs = Arc::new(MemoryFs::new());
        fs.create_dir_all(Path::new("/data")).unwrap();
        fs
    }

    fn contents(fs: &MemoryFs) -> String {
        let file = fs.open_file(Path::new(FILE), OpenMode::read()).unwrap();
        String::from_utf8(read_to_end(file.as_ref()).unwrap()).unwrap()
    }

    fn parse_err(fs: &Arc<MemoryFs>, raw: &str) -> String {
        fs.write_file(Path::new(FILE), raw.as_bytes()).unwrap();
        match RecentlyUsedPathStore::open(fs.clone(), FILE, DEFAULT_MAX_ENTRIES) {
            Err(RecentPathsError::Parse(msg)) => msg,
            other => panic!("expected parse error for {raw:?}, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_file_is_empty_store() {
        let store = RecentlyUsedPathStore::open(mem(), FILE, DEFAULT_MAX_ENTRIES).unwrap();
        assert!(store.is_empty());
        assert_eq!(store.revision(), 0);
        assert_eq!(store.front(), None);
    }

    #[test]
    fn test_exact_file_layout() {
        let fs = mem();
        let mut store = RecentlyUsedPathStore::open(fs.clone(), FILE, DEFAULT_MAX_ENTRIES).unwrap();
        store.use_path("/home/u/Safe").unwrap();
        store.use_path("/tmp/b").unwrap();

        assert_eq!(
            contents(&fs),
            "RecentlyUsedPathStoreV1\n2\n2\n6\n/tmp/b\n12\n/home/u/Safe\n"
        );
    }

    #[test]
    fn test_shrinking_list_truncates_file() {
        let fs = mem();
        let mut store = RecentlyUsedPathStore::open(fs.clone(), FILE, DEFAULT_MAX_ENTRIES).unwrap();
        store.use_path("/a/very/long/container/path").unwrap();
        store.clear().unwrap();
        assert_eq!(contents(&fs), "RecentlyUsedPathStoreV1\n2\n0\n");
    }

    #[test]
    fn test_use_path_caps_entries() {
        let mut store = RecentlyUsedPathStore::open(mem(), FILE, 3).unwrap();
        for p in ["/1", "/2", "/3", "/4"] {
            store.use_path(p).unwrap();
        }
        let expected: Vec<PathBuf> = ["/4", "/3", "/2"].iter().map(PathBuf::from).collect();
        assert_eq!(store.recently_used_paths(), expected.as_slice());
    }

    #[test]
    fn test_load_skips_entries_beyond_cap() {
        let fs = mem();
        fs.write_file(
            Path::new(FILE),
            b"RecentlyUsedPathStoreV1\n7\n3\n2\n/a\n2\n/b\n2\n/c\n",
        )
        .unwrap();
        let store = RecentlyUsedPathStore::open(fs, FILE, 2).unwrap();
        assert_eq!(store.revision(), 7);
        assert_eq!(store.len(), 2);
        assert_eq!(store.front(), Some(Path::new("/a")));
    }

    #[test]
    fn test_parse_errors() {
        let fs = mem();
        assert!(parse_err(&fs, "NotTheMagic\n1\n0\n").contains("magic"));
        assert!(parse_err(&fs, "RecentlyUsedPathStoreV1\nabc\n0\n").contains("number"));
        assert!(parse_err(&fs, "RecentlyUsedPathStoreV1\n1\n").contains("end of file"));
        assert!(parse_err(&fs, "RecentlyUsedPathStoreV1\n1\n1\n5\n/ab").contains("end of file"));
        assert!(parse_err(&fs, "RecentlyUsedPathStoreV1\n1\n1\n2\n/abc\n").contains("newline"));
        assert!(parse_err(&fs, "RecentlyUsedPathStoreV1\n1\n1\n1024\n").contains("too large"));
        assert!(
            parse_err(&fs, "RecentlyUsedPathStoreV1\n123456789012345678901\n0\n")
                .contains("longer than")
        );
    }

    #[test]
    fn test_rejects_oversize_path() {
        let mut store = RecentlyUsedPathStore::open(mem(), FILE, DEFAULT_MAX_ENTRIES).unwrap();
        let long = format!("/{}", "x".repeat(MAX_PATH_LEN));
        assert!(matches!(store.use_path(&long), Err(RecentPathsError::Parse(_))));
        assert!(store.is_empty());
        assert_eq!(store.revision(), 0);
    }

    #[test]
    fn test_exhausted_revision_is_parse_error() {
        let fs = mem();
        let raw = format!("RecentlyUsedPathStoreV1\n{}\n1\n2\n/a\n", u64::MAX);
        fs.write_file(Path::new(FILE), raw.as_bytes()).unwrap();
        let mut store = RecentlyUsedPathStore::open(fs.clone(), FILE, DEFAULT_MAX_ENTRIES).unwrap();
        assert_eq!(store.revision(), u64::MAX);

        assert!(matches!(store.use_path("/x"), Err(RecentPathsError::Parse(_))));
        assert!(matches!(store.clear(), Err(RecentPathsError::Parse(_))));
        assert_eq!(store.recently_used_paths(), [PathBuf::from("/a")].as_slice());
        assert_eq!(contents(&fs), raw);
    }

    #[test]
    fn test_failed_save_keeps_memory_state() {
        let fs = mem();
        let mut first = RecentlyUsedPathStore::open(fs.clone(), FILE, DEFAULT_MAX_ENTRIES).unwrap();
        let mut second = RecentlyUsedPathStore::open(fs, FILE, DEFAULT_MAX_ENTRIES).unwrap();
        first.use_path("/one").unwrap();

        let err = second.use_path("/two").unwrap_err();
        assert!(matches!(
            err,
            RecentPathsError::Consistency {
                expected: 0,
                found: 1
            }
        ));
        assert!(second.is_empty());

        second.reload().unwrap();
        second.use_path("/two").unwrap();
        assert_eq!(second.recently_used_paths().len(), 2);
        assert_eq!(second.revision(), 2);
    }
}
