//! Class byte sources

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// File extension of class files
pub const CLASS_FILE_EXTENSION: &str = "umbc";

/// Relative path of a class file: `a.b.C` becomes `a/b/C.umbc`
pub fn class_file_path(class_name: &str) -> PathBuf {
    let mut path: PathBuf = class_name.split('.').collect();
    path.set_extension(CLASS_FILE_EXTENSION);
    path
}

/// Name-to-bytes lookup
pub trait ResourceProvider: Send + Sync {
    /// Raw bytes of the named class, `None` when absent
    fn class_bytes(&self, class_name: &str) -> io::Result<Option<Vec<u8>>>;
}

/// Class files laid out under one or more root directories
///
/// Roots are searched in order; the first hit wins.
#[derive(Debug, Clone)]
pub struct DirectoryResources {
    roots: Vec<PathBuf>,
}

impl DirectoryResources {
    /// Search the given roots
    pub fn new(roots: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            roots: roots.into_iter().collect(),
        }
    }

    /// Search a single root
    pub fn single(root: impl AsRef<Path>) -> Self {
        Self::new([root.as_ref().to_path_buf()])
    }

    /// Configured roots
    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }
}

impl ResourceProvider for DirectoryResources {
    fn class_bytes(&self, class_name: &str) -> io::Result<Option<Vec<u8>>> {
        let relative = class_file_path(class_name);
        for root in &self.roots {
            match fs::read(root.join(&relative)) {
                Ok(bytes) => return Ok(Some(bytes)),
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(None)
    }
}

/// In-memory class bytes
#[derive(Default)]
pub struct MemoryResources {
    classes: RwLock<FxHashMap<String, Vec<u8>>>,
}

impl MemoryResources {
    /// Create an empty provider
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a class
    pub fn insert(&self, class_name: &str, bytes: Vec<u8>) {
        self.classes.write().insert(class_name.to_string(), bytes);
    }

    /// Builder-style insert
    pub fn with_class(self, class_name: &str, bytes: Vec<u8>) -> Self {
        self.insert(class_name, bytes);
        self
    }

    /// Number of classes held
    pub fn len(&self) -> usize {
        self.classes.read().len()
    }

    /// Check if no classes are held
    pub fn is_empty(&self) -> bool {
        self.classes.read().is_empty()
    }
}

impl ResourceProvider for MemoryResources {
    fn class_bytes(&self, class_name: &str) -> io::Result<Option<Vec<u8>>> {
        Ok(self.classes.read().get(class_name).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_file_path() {
        assert_eq!(
            class_file_path("platform.widget.View"),
            PathBuf::from("platform/widget/View.umbc")
        );
        assert_eq!(class_file_path("Root"), PathBuf::from("Root.umbc"));
    }

    #[test]
    fn test_directory_resources_search_order() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        fs::create_dir_all(second.path().join("a")).unwrap();
        fs::write(second.path().join("a/B.umbc"), b"second").unwrap();

        let resources =
            DirectoryResources::new([first.path().to_path_buf(), second.path().to_path_buf()]);
        assert_eq!(resources.class_bytes("a.B").unwrap(), Some(b"second".to_vec()));
        assert_eq!(resources.class_bytes("a.Missing").unwrap(), None);

        fs::create_dir_all(first.path().join("a")).unwrap();
        fs::write(first.path().join("a/B.umbc"), b"first").unwrap();
        assert_eq!(resources.class_bytes("a.B").unwrap(), Some(b"first".to_vec()));
    }

    #[test]
    fn test_memory_resources() {
        let resources = MemoryResources::new().with_class("a.B", vec![1, 2, 3]);
        assert_eq!(resources.len(), 1);
        assert_eq!(resources.class_bytes("a.B").unwrap(), Some(vec![1, 2, 3]));
        assert_eq!(resources.class_bytes("a.C").unwrap(), None);
    }
}
