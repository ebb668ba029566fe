//! File access and url resolution for documents.
//!
//! A document never touches the filesystem directly. Every read and write,
//! and every conversion between a url found in a file and the location it
//! names, goes through the `FileManager` it was created with.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

/// Collapse `.` and `..` components without touching the filesystem, so
/// that two spellings of one location compare equal.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Resolve `uri` against the location of the referring document.
pub fn resolve_uri(base: Option<&Path>, uri: &str) -> PathBuf {
    let uri = uri.strip_prefix("file://").unwrap_or(uri).replace("%20", " ");
    let path = Path::new(&uri);
    if path.is_absolute() {
        return normalize_path(path);
    }
    match base.and_then(Path::parent) {
        Some(dir) => normalize_path(&dir.join(path)),
        None => normalize_path(path),
    }
}

/// Express `target` relative to the directory of `base` when it lies below
/// it, and as a full path otherwise.
pub fn relative_uri(base: Option<&Path>, target: &Path) -> String {
    let relative = base
        .and_then(Path::parent)
        .and_then(|dir| target.strip_prefix(dir).ok());
    match relative {
        Some(rel) => rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/"),
        None => target.to_string_lossy().into_owned(),
    }
}

pub trait FileManager: fmt::Debug {
    fn read_to_string(&self, path: &Path) -> io::Result<String>;

    fn write(&self, path: &Path, contents: &str) -> io::Result<()>;

    fn resolve(&self, base: Option<&Path>, uri: &str) -> PathBuf {
        resolve_uri(base, uri)
    }

    fn make_relative(&self, base: Option<&Path>, target: &Path) -> String {
        relative_uri(base, target)
    }
}

/// Reads and writes the local filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsFileManager;

impl FileManager for FsFileManager {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        fs::read_to_string(path)
    }

    fn write(&self, path: &Path, contents: &str) -> io::Result<()> {
        fs::write(path, contents)
    }
}

/// Serves files from memory. Counts reads, so callers can observe how often
/// a document was actually loaded.
#[derive(Debug, Default)]
pub struct MemoryFileManager {
    files: RefCell<HashMap<PathBuf, String>>,
    reads: Cell<usize>,
}

impl MemoryFileManager {
    pub fn new() -> MemoryFileManager {
        MemoryFileManager::default()
    }

    pub fn insert(&self, path: impl AsRef<Path>, contents: impl Into<String>) {
        self.files
            .borrow_mut()
            .insert(normalize_path(path.as_ref()), contents.into());
    }

    pub fn contents(&self, path: impl AsRef<Path>) -> Option<String> {
        self.files.borrow().get(&normalize_path(path.as_ref())).cloned()
    }

    /// Number of `read_to_string` calls so far, failed ones included.
    pub fn read_count(&self) -> usize {
        self.reads.get()
    }
}

impl FileManager for MemoryFileManager {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        self.reads.set(self.reads.get() + 1);
        self.contents(path).ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("no file at {}", path.display()))
        })
    }

    fn write(&self, path: &Path, contents: &str) -> io::Result<()> {
        self.insert(path, contents);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_relative_to_base() {
        let base = Path::new("/scenes/a.dae");
        assert_eq!(resolve_uri(Some(base), "b.dae"), PathBuf::from("/scenes/b.dae"));
        assert_eq!(resolve_uri(Some(base), "./props/../b.dae"), PathBuf::from("/scenes/b.dae"));
        assert_eq!(resolve_uri(Some(base), "file:///models/c.dae"), PathBuf::from("/models/c.dae"));
        assert_eq!(resolve_uri(None, "b.dae"), PathBuf::from("b.dae"));
    }

    #[test]
    fn test_make_relative() {
        let base = Path::new("/scenes/a.dae");
        assert_eq!(relative_uri(Some(base), Path::new("/scenes/props/b.dae")), "props/b.dae");
        assert_eq!(relative_uri(Some(base), Path::new("/models/c.dae")), "/models/c.dae");
    }

    #[test]
    fn test_memory_reads_are_counted() {
        let files = MemoryFileManager::new();
        files.insert("/a.dae", "<COLLADA/>");
        assert_eq!(files.read_to_string(Path::new("/a.dae")).unwrap(), "<COLLADA/>");
        assert!(files.read_to_string(Path::new("/missing.dae")).is_err());
        assert_eq!(files.read_count(), 2);
    }
}
