//! In-memory [`FsIo`] with byte-exact name comparison.
//!
//! Behaves like a case-sensitive POSIX filesystem: `"A"` and `"a"` are
//! different entries and names are never normalized. It is the backend used
//! to exercise the canonicalizing layer and the mount orchestration in
//! tests.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use parking_lot::Mutex;

use crate::error::{FsError, FsResult};
use crate::fs_io::{DirEntry, DirStream, FileKind, FsAttrs, FsFile, FsIo, OpenMode};

const VOLUME_ID: u64 = 1;

#[derive(Debug)]
struct Times {
    modified: SystemTime,
    accessed: SystemTime,
    created: SystemTime,
}

impl Times {
    fn now() -> Self {
        let now = SystemTime::now();
        Self {
            modified: now,
            accessed: now,
            created: now,
        }
    }
}

#[derive(Debug)]
struct FileNode {
    id: u64,
    data: Vec<u8>,
    times: Times,
}

#[derive(Debug)]
struct DirNode {
    id: u64,
    times: Times,
}

#[derive(Debug)]
enum Node {
    File(Arc<Mutex<FileNode>>),
    Dir(DirNode),
}

impl Node {
    fn kind(&self) -> FileKind {
        match self {
            Node::File(_) => FileKind::File,
            Node::Dir(_) => FileKind::Directory,
        }
    }

    fn attrs(&self) -> FsAttrs {
        match self {
            Node::File(file) => file_attrs(&file.lock()),
            Node::Dir(dir) => FsAttrs {
                kind: FileKind::Directory,
                size: 0,
                modified: dir.times.modified,
                accessed: dir.times.accessed,
                created: Some(dir.times.created),
                file_id: Some(dir.id),
                volume_id: Some(VOLUME_ID),
            },
        }
    }
}

fn file_attrs(file: &FileNode) -> FsAttrs {
    FsAttrs {
        kind: FileKind::File,
        size: file.data.len() as u64,
        modified: file.times.modified,
        accessed: file.times.accessed,
        created: Some(file.times.created),
        file_id: Some(file.id),
        volume_id: Some(VOLUME_ID),
    }
}

/// A thread-safe in-memory filesystem rooted at `/`.
#[derive(Debug)]
pub struct MemoryFs {
    nodes: Mutex<BTreeMap<PathBuf, Node>>,
    next_id: AtomicU64,
}

impl Default for MemoryFs {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryFs {
    /// Create an empty filesystem containing only `/`.
    pub fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(
            PathBuf::from("/"),
            Node::Dir(DirNode {
                id: 1,
                times: Times::now(),
            }),
        );
        Self {
            nodes: Mutex::new(nodes),
            next_id: AtomicU64::new(2),
        }
    }

    /// Create a directory and all missing ancestors.
    pub fn create_dir_all(&self, path: &Path) -> FsResult<()> {
        let key = normalize(path)?;
        let mut current = PathBuf::from("/");
        for component in key.components().skip(1) {
            current.push(component);
            match self.get_attrs(&current) {
                Ok(attrs) if attrs.is_dir() => {}
                Ok(_) => return Err(FsError::from_kind("mkdir", &current, ErrorKind::NotADirectory)),
                Err(e) if e.is_not_found() => self.mkdir(&current)?,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Create or replace a file with the given contents.
    pub fn write_file(&self, path: &Path, contents: &[u8]) -> FsResult<()> {
        let file = self.open_file(path, OpenMode::create())?;
        file.truncate(0)?;
        crate::fs_io::write_all(file.as_ref(), contents, 0)
    }

    fn alloc_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }
}

/// Reduce a path to the absolute key form used by the node map.
fn normalize(path: &Path) -> FsResult<PathBuf> {
    let mut out = PathBuf::from("/");
    let mut components = path.components();
    if components.next() != Some(Component::RootDir) {
        return Err(FsError::InvalidName(path.to_path_buf()));
    }
    for component in components {
        match component {
            Component::Normal(name) => out.push(name),
            Component::CurDir => {}
            _ => return Err(FsError::InvalidName(path.to_path_buf())),
        }
    }
    Ok(out)
}

fn require_parent_dir(
    nodes: &BTreeMap<PathBuf, Node>,
    op: &'static str,
    key: &Path,
) -> FsResult<()> {
    let parent = key
        .parent()
        .ok_or_else(|| FsError::from_kind(op, key, ErrorKind::AlreadyExists))?;
    match nodes.get(parent) {
        Some(Node::Dir(_)) => Ok(()),
        Some(Node::File(_)) => Err(FsError::from_kind(op, key, ErrorKind::NotADirectory)),
        None => Err(FsError::from_kind(op, key, ErrorKind::NotFound)),
    }
}

fn has_children(nodes: &BTreeMap<PathBuf, Node>, key: &Path) -> bool {
    nodes
        .range::<Path, _>((std::ops::Bound::Excluded(key), std::ops::Bound::Unbounded))
        .next()
        .is_some_and(|(p, _)| p.starts_with(key))
}

impl FsIo for MemoryFs {
    fn open_file(&self, path: &Path, mode: OpenMode) -> FsResult<Box<dyn FsFile>> {
        let key = normalize(path)?;
        let mut nodes = self.nodes.lock();
        let node = match nodes.get(&key) {
            Some(Node::File(file)) => Arc::clone(file),
            Some(Node::Dir(_)) => {
                return Err(FsError::from_kind("open", &key, ErrorKind::IsADirectory));
            }
            None if mode.create => {
                require_parent_dir(&nodes, "open", &key)?;
                let file = Arc::new(Mutex::new(FileNode {
                    id: self.alloc_id(),
                    data: Vec::new(),
                    times: Times::now(),
                }));
                nodes.insert(key.clone(), Node::File(Arc::clone(&file)));
                file
            }
            None => return Err(FsError::from_kind("open", &key, ErrorKind::NotFound)),
        };
        Ok(Box::new(MemoryFile {
            node,
            path: key,
            writable: mode.write || mode.create,
        }))
    }

    fn open_dir(&self, path: &Path) -> FsResult<DirStream> {
        let key = normalize(path)?;
        let nodes = self.nodes.lock();
        match nodes.get(&key) {
            Some(Node::Dir(_)) => {}
            Some(Node::File(_)) => {
                return Err(FsError::from_kind("opendir", &key, ErrorKind::NotADirectory));
            }
            None => return Err(FsError::from_kind("opendir", &key, ErrorKind::NotFound)),
        }
        let entries: Vec<FsResult<DirEntry>> = nodes
            .iter()
            .filter(|(p, _)| p.parent() == Some(key.as_path()) && **p != key)
            .filter_map(|(p, node)| {
                p.file_name().map(|name| {
                    Ok(DirEntry {
                        name: OsString::from(name),
                        kind: node.kind(),
                    })
                })
            })
            .collect();
        Ok(Box::new(entries.into_iter()))
    }

    fn mkdir(&self, path: &Path) -> FsResult<()> {
        let key = normalize(path)?;
        let mut nodes = self.nodes.lock();
        if nodes.contains_key(&key) {
            return Err(FsError::from_kind("mkdir", &key, ErrorKind::AlreadyExists));
        }
        require_parent_dir(&nodes, "mkdir", &key)?;
        nodes.insert(
            key,
            Node::Dir(DirNode {
                id: self.alloc_id(),
                times: Times::now(),
            }),
        );
        Ok(())
    }

    fn rename(&self, from: &Path, to: &Path) -> FsResult<()> {
        let from = normalize(from)?;
        let to = normalize(to)?;
        if from == to {
            return Ok(());
        }
        let mut nodes = self.nodes.lock();
        let Some(source) = nodes.get(&from) else {
            return Err(FsError::from_kind("rename", &from, ErrorKind::NotFound));
        };
        let moving_dir = matches!(source, Node::Dir(_));
        if moving_dir && to.starts_with(&from) {
            return Err(FsError::from_kind("rename", &from, ErrorKind::InvalidInput));
        }
        require_parent_dir(&nodes, "rename", &to)?;
        match nodes.get(&to) {
            Some(Node::Dir(_)) if !moving_dir => {
                return Err(FsError::from_kind("rename", &to, ErrorKind::IsADirectory));
            }
            Some(Node::File(_)) if moving_dir => {
                return Err(FsError::from_kind("rename", &to, ErrorKind::NotADirectory));
            }
            Some(Node::Dir(_)) if has_children(&nodes, &to) => {
                return Err(FsError::from_kind(
                    "rename",
                    &to,
                    ErrorKind::DirectoryNotEmpty,
                ));
            }
            _ => {}
        }
        nodes.remove(&to);

        let moved: Vec<PathBuf> = nodes
            .keys()
            .filter(|p| p.starts_with(&from))
            .cloned()
            .collect();
        for old in moved {
            if let Some(node) = nodes.remove(&old) {
                let suffix = old.strip_prefix(&from).unwrap_or(Path::new(""));
                let new = if suffix.as_os_str().is_empty() {
                    to.clone()
                } else {
                    to.join(suffix)
                };
                nodes.insert(new, node);
            }
        }
        Ok(())
    }

    fn unlink(&self, path: &Path) -> FsResult<()> {
        let key = normalize(path)?;
        let mut nodes = self.nodes.lock();
        match nodes.get(&key) {
            Some(Node::File(_)) => {
                nodes.remove(&key);
                Ok(())
            }
            Some(Node::Dir(_)) => Err(FsError::from_kind("unlink", &key, ErrorKind::IsADirectory)),
            None => Err(FsError::from_kind("unlink", &key, ErrorKind::NotFound)),
        }
    }

    fn rmdir(&self, path: &Path) -> FsResult<()> {
        let key = normalize(path)?;
        let mut nodes = self.nodes.lock();
        match nodes.get(&key) {
            Some(Node::Dir(_)) if key == Path::new("/") => {
                Err(FsError::from_kind("rmdir", &key, ErrorKind::PermissionDenied))
            }
            Some(Node::Dir(_)) if has_children(&nodes, &key) => Err(FsError::from_kind(
                "rmdir",
                &key,
                ErrorKind::DirectoryNotEmpty,
            )),
            Some(Node::Dir(_)) => {
                nodes.remove(&key);
                Ok(())
            }
            Some(Node::File(_)) => Err(FsError::from_kind("rmdir", &key, ErrorKind::NotADirectory)),
            None => Err(FsError::from_kind("rmdir", &key, ErrorKind::NotFound)),
        }
    }

    fn get_attrs(&self, path: &Path) -> FsResult<FsAttrs> {
        let key = normalize(path)?;
        self.nodes
            .lock()
            .get(&key)
            .map(Node::attrs)
            .ok_or_else(|| FsError::from_kind("stat", &key, ErrorKind::NotFound))
    }

    fn set_times(
        &self,
        path: &Path,
        accessed: Option<SystemTime>,
        modified: Option<SystemTime>,
    ) -> FsResult<()> {
        let key = normalize(path)?;
        let mut nodes = self.nodes.lock();
        let apply = |times: &mut Times| {
            if let Some(t) = accessed {
                times.accessed = t;
            }
            if let Some(t) = modified {
                times.modified = t;
            }
        };
        match nodes.get_mut(&key) {
            Some(Node::File(file)) => apply(&mut file.lock().times),
            Some(Node::Dir(dir)) => apply(&mut dir.times),
            None => return Err(FsError::from_kind("utimes", &key, ErrorKind::NotFound)),
        }
        Ok(())
    }
}

/// Open handle on a [`MemoryFs`] file. Survives unlinking, like a POSIX fd.
struct MemoryFile {
    node: Arc<Mutex<FileNode>>,
    path: PathBuf,
    writable: bool,
}

impl MemoryFile {
    fn check_writable(&self, op: &'static str) -> FsResult<()> {
        if self.writable {
            Ok(())
        } else {
            Err(FsError::from_kind(op, &self.path, ErrorKind::PermissionDenied))
        }
    }
}

impl FsFile for MemoryFile {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> FsResult<usize> {
        let node = self.node.lock();
        let Ok(start) = usize::try_from(offset) else {
            return Ok(0);
        };
        if start >= node.data.len() {
            return Ok(0);
        }
        let n = buf.len().min(node.data.len() - start);
        buf[..n].copy_from_slice(&node.data[start..start + n]);
        Ok(n)
    }

    fn write_at(&self, buf: &[u8], offset: u64) -> FsResult<usize> {
        self.check_writable("write")?;
        let start = usize::try_from(offset)
            .map_err(|_| FsError::from_kind("write", &self.path, ErrorKind::InvalidInput))?;
        let mut node = self.node.lock();
        let end = start + buf.len();
        if node.data.len() < end {
            node.data.resize(end, 0);
        }
        node.data[start..end].copy_from_slice(buf);
        node.times.modified = SystemTime::now();
        Ok(buf.len())
    }

    fn truncate(&self, len: u64) -> FsResult<()> {
        self.check_writable("truncate")?;
        let len = usize::try_from(len)
            .map_err(|_| FsError::from_kind("truncate", &self.path, ErrorKind::InvalidInput))?;
        let mut node = self.node.lock();
        node.data.resize(len, 0);
        node.times.modified = SystemTime::now();
        Ok(())
    }

    fn attrs(&self) -> FsResult<FsAttrs> {
        Ok(file_attrs(&self.node.lock()))
    }
}
