//! Transformed class cache
//!
//! Transformation output is deterministic, so it can be stored under
//! `(class name, cache version)` and reused across loaders and runs. A
//! version mismatch is indistinguishable from absence; bumping
//! [`CACHE_VERSION`] therefore forces every class to be transformed again.

mod disk;
mod memory;

pub use disk::DiskClassCache;
pub use memory::MemoryClassCache;

use std::path::PathBuf;
use thiserror::Error;

/// Current cache format version
///
/// Bump whenever the transformer's output changes.
pub const CACHE_VERSION: u32 = 2;

/// Cache errors
#[derive(Debug, Error)]
pub enum CacheError {
    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Class name cannot be used as an entry file name
    #[error("Invalid cache entry name: {0:?}")]
    InvalidName(String),

    /// Stored entry is shorter than its checksum header
    #[error("Truncated cache entry: {0}")]
    Truncated(PathBuf),

    /// Stored entry does not match its checksum
    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// Recorded checksum
        expected: String,
        /// Checksum of the stored body
        actual: String,
    },
}

/// Store of transformed class bytes
///
/// Implementations must tolerate concurrent readers; concurrent writers of
/// the same key may race, the last write wins.
pub trait ClassCache: Send + Sync {
    /// Bytes stored for `class_name` under this cache's version
    fn get(&self, class_name: &str) -> Option<Vec<u8>>;

    /// Store bytes for `class_name` under this cache's version
    fn put(&self, class_name: &str, bytes: &[u8]) -> Result<(), CacheError>;

    /// Whether `put` persists anything
    fn is_writing(&self) -> bool;

    /// Format version entries are keyed by
    fn version(&self) -> u32;
}
