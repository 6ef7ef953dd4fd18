//! On-disk cache backend
//!
//! Directory structure:
//! ```text
//! <root>/
//! ├── v<version>/
//! │   └── <class name>.umbc   (32-byte SHA-256 of the body, then the body)
//! └── tmp/
//! ```
//!
//! Entries are written to `tmp/` and renamed into place, so readers never
//! observe a partial file.

use super::{CacheError, ClassCache, CACHE_VERSION};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

const CHECKSUM_LEN: usize = 32;

static NEXT_TMP_ID: AtomicU64 = AtomicU64::new(0);

/// Filesystem-backed cache shared across runs
#[derive(Debug)]
pub struct DiskClassCache {
    root: PathBuf,
    version: u32,
    writing: bool,
}

impl DiskClassCache {
    /// Open (creating if needed) a cache at [`CACHE_VERSION`]
    pub fn open(root: impl AsRef<Path>) -> Result<Self, CacheError> {
        Self::with_version(root, CACHE_VERSION)
    }

    /// Open (creating if needed) a cache at a specific version
    pub fn with_version(root: impl AsRef<Path>, version: u32) -> Result<Self, CacheError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(root.join(format!("v{}", version)))?;
        fs::create_dir_all(root.join("tmp"))?;
        Ok(Self {
            root,
            version,
            writing: true,
        })
    }

    /// Make `put` a no-op
    pub fn read_only(mut self) -> Self {
        self.writing = false;
        self
    }

    /// Root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File holding the entry for `class_name`
    pub fn entry_path(&self, class_name: &str) -> PathBuf {
        self.root
            .join(format!("v{}", self.version))
            .join(format!("{}.umbc", class_name))
    }

    /// Read and check an entry; `Ok(None)` when absent
    pub fn read_entry(&self, class_name: &str) -> Result<Option<Vec<u8>>, CacheError> {
        check_entry_name(class_name)?;
        let path = self.entry_path(class_name);
        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if data.len() < CHECKSUM_LEN {
            return Err(CacheError::Truncated(path));
        }

        let (expected, body) = data.split_at(CHECKSUM_LEN);
        let actual: [u8; CHECKSUM_LEN] = Sha256::digest(body).into();
        if expected != actual {
            return Err(CacheError::ChecksumMismatch {
                expected: hex::encode(expected),
                actual: hex::encode(actual),
            });
        }
        Ok(Some(body.to_vec()))
    }

    fn write_entry(&self, class_name: &str, bytes: &[u8]) -> Result<(), CacheError> {
        check_entry_name(class_name)?;
        let checksum: [u8; CHECKSUM_LEN] = Sha256::digest(bytes).into();

        // Write to temporary file first (atomic write)
        let tmp_dir = self.root.join("tmp");
        fs::create_dir_all(&tmp_dir)?;
        let tmp_path = tmp_dir.join(format!(
            "{}.{}.{}.tmp",
            class_name,
            std::process::id(),
            NEXT_TMP_ID.fetch_add(1, Ordering::Relaxed)
        ));
        let written = fs::File::create(&tmp_path).and_then(|mut tmp_file| {
            tmp_file.write_all(&checksum)?;
            tmp_file.write_all(bytes)?;
            tmp_file.sync_all()
        });
        if let Err(e) = written {
            let _ = fs::remove_file(&tmp_path);
            return Err(e.into());
        }

        let final_path = self.entry_path(class_name);
        if let Some(parent) = final_path.parent() {
            fs::create_dir_all(parent)?;
        }
        if let Err(e) = fs::rename(&tmp_path, &final_path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(e.into());
        }
        Ok(())
    }
}

/// Entry names must stay a single file inside `v<version>/`
fn check_entry_name(class_name: &str) -> Result<(), CacheError> {
    let valid = !class_name.is_empty()
        && !class_name.starts_with('.')
        && !class_name.contains("..")
        && !class_name.contains(&['/', '\\', '\0'][..]);
    if valid {
        Ok(())
    } else {
        Err(CacheError::InvalidName(class_name.to_string()))
    }
}

impl ClassCache for DiskClassCache {
    fn get(&self, class_name: &str) -> Option<Vec<u8>> {
        match self.read_entry(class_name) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(class = %class_name, error = %e, "ignoring unreadable cache entry");
                None
            }
        }
    }

    fn put(&self, class_name: &str, bytes: &[u8]) -> Result<(), CacheError> {
        if !self.writing {
            return Ok(());
        }
        self.write_entry(class_name, bytes)
    }

    fn is_writing(&self) -> bool {
        self.writing
    }

    fn version(&self) -> u32 {
        self.version
    }
}
