//! The pluggable file-system collaborator.
//!
//! All pipeline I/O funnels through [`FileOps`], so callers can swap the
//! real file system for an in-memory one and compile hermetically.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Metadata returned by [`FileOps::read_file_info`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FileInfo {
    pub size: u64,
}

/// Synchronous file operations used by the pipeline.
pub trait FileOps {
    fn read_file(&self, path: &Path) -> io::Result<Vec<u8>>;

    /// Probes a path without reading it; used by the import resolver to
    /// select the first readable search-path match.
    fn read_file_info(&self, path: &Path) -> io::Result<FileInfo>;

    fn write_file(&self, path: &Path, contents: &[u8]) -> io::Result<()>;
}

/// The default collaborator, backed by `std::fs`.
#[derive(Clone, Copy, Debug, Default)]
pub struct OsFileOps;

impl FileOps for OsFileOps {
    fn read_file(&self, path: &Path) -> io::Result<Vec<u8>> {
        fs::read(path)
    }

    fn read_file_info(&self, path: &Path) -> io::Result<FileInfo> {
        fs::metadata(path).map(|meta| FileInfo { size: meta.len() })
    }

    fn write_file(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        fs::write(path, contents)
    }
}

/// An in-memory collaborator for hermetic tests. Clones share the same
/// underlying map, so a clone handed to a [`Config`] stays observable.
///
/// [`Config`]: crate::Config
#[derive(Clone, Debug, Default)]
pub struct MemFileOps {
    files: Arc<Mutex<HashMap<PathBuf, Vec<u8>>>>,
}

impl MemFileOps {
    pub fn new() -> MemFileOps {
        MemFileOps::default()
    }

    pub fn insert(&self, path: impl Into<PathBuf>, contents: impl Into<Vec<u8>>) -> &MemFileOps {
        self.files
            .lock()
            .expect("file map lock poisoned")
            .insert(path.into(), contents.into());
        self
    }

    pub fn get(&self, path: impl AsRef<Path>) -> Option<Vec<u8>> {
        self.files
            .lock()
            .expect("file map lock poisoned")
            .get(path.as_ref())
            .cloned()
    }

    /// All stored paths, sorted for deterministic assertions.
    pub fn paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self
            .files
            .lock()
            .expect("file map lock poisoned")
            .keys()
            .cloned()
            .collect();
        paths.sort();
        paths
    }
}

impl FileOps for MemFileOps {
    fn read_file(&self, path: &Path) -> io::Result<Vec<u8>> {
        self.get(path)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, path.display().to_string()))
    }

    fn read_file_info(&self, path: &Path) -> io::Result<FileInfo> {
        self.read_file(path).map(|contents| FileInfo {
            size: contents.len() as u64,
        })
    }

    fn write_file(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        self.insert(path.to_path_buf(), contents);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mem_file_ops_share_a_map_across_clones() {
        let ops = MemFileOps::new();
        let clone = ops.clone();
        clone.insert("a.proto", "message A {}");
        assert_eq!(
            ops.read_file(Path::new("a.proto")).unwrap(),
            b"message A {}"
        );
        assert_eq!(ops.read_file_info(Path::new("a.proto")).unwrap().size, 12);
        assert!(ops.read_file(Path::new("b.proto")).is_err());
    }
}
