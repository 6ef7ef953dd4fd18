//! Class loading
//!
//! A [`ClassLoader`] turns class names into defined [`RuntimeClass`]es and
//! memoizes them, so a name resolves to the same class for the lifetime of
//! the loader. Two implementations exist:
//! - [`BootstrapClassLoader`] defines classes from a resource provider as is
//! - [`InstrumentingClassLoader`] consults an [`AcquisitionPolicy`], runs the
//!   transformer (through the class cache) and injects the dispatch handler

mod bootstrap;
mod instrumenting;
mod policy;
mod resource;

pub use bootstrap::BootstrapClassLoader;
pub use instrumenting::{InstrumentingClassLoader, LoaderOptions, LoaderStats};
pub use policy::{AcquisitionPolicy, PolicyConfig, Setup, DO_NOT_INSTRUMENT, INSTRUMENT};
pub use resource::{class_file_path, DirectoryResources, MemoryResources, ResourceProvider};

use crate::class::{DefineError, RuntimeClass};
use crate::instrument::TransformError;
use parking_lot::ReentrantMutex;
use rustc_hash::{FxHashMap, FxHashSet};
use std::cell::RefCell;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use umbra_bytecode::{verify_class, ClassFile, ClassFileError, VerifyError};

static NEXT_LOADER_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique loader identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LoaderId(pub u64);

impl LoaderId {
    /// Allocate a fresh id
    pub fn next() -> Self {
        LoaderId(NEXT_LOADER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for LoaderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "loader#{}", self.0)
    }
}

/// Class loading errors
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// No resource holds the class bytes
    #[error("Class not found: {0}")]
    ClassNotFound(String),

    /// Class bytes failed to decode
    #[error("Malformed class {class}: {source}")]
    Malformed {
        /// Class name
        class: String,
        /// Underlying error
        source: ClassFileError,
    },

    /// Transformation failed
    #[error(transparent)]
    Transform(#[from] TransformError),

    /// Class failed verification
    #[error("Verification of {class} failed: {source}")]
    Verify {
        /// Class name
        class: String,
        /// Underlying error
        source: VerifyError,
    },

    /// Reading class bytes failed
    #[error("IO error loading {class}: {source}")]
    Io {
        /// Class name
        class: String,
        /// Underlying error
        source: std::io::Error,
    },

    /// Class could not be linked into the hierarchy
    #[error("Link error: {0}")]
    Link(String),
}

impl From<DefineError> for LoadError {
    fn from(e: DefineError) -> Self {
        LoadError::Link(e.to_string())
    }
}

/// Source of defined classes
pub trait ClassLoader: Send + Sync {
    /// Loader identity
    fn id(&self) -> LoaderId;

    /// Load (or return the memoized) class of the given name
    fn load_class(&self, name: &str) -> Result<Arc<RuntimeClass>, LoadError>;

    /// Return the class if this loader already produced it
    fn find_loaded(&self, name: &str) -> Option<Arc<RuntimeClass>>;
}

// ===== Shared loader plumbing =====

/// Memoized classes plus the names currently being defined
#[derive(Default)]
pub(crate) struct LoaderState {
    classes: FxHashMap<String, Arc<RuntimeClass>>,
    loading: FxHashSet<String>,
}

/// Loader-wide lock; reentrant because defining a class loads its
/// superclass through the same loader
pub(crate) type LoaderLock = ReentrantMutex<RefCell<LoaderState>>;

/// Run `define` for `name` under the loader lock unless already memoized
pub(crate) fn load_memoized(
    lock: &LoaderLock,
    name: &str,
    define: impl FnOnce() -> Result<Arc<RuntimeClass>, LoadError>,
) -> Result<Arc<RuntimeClass>, LoadError> {
    let guard = lock.lock();
    if let Some(class) = guard.borrow().classes.get(name) {
        return Ok(Arc::clone(class));
    }
    if !guard.borrow_mut().loading.insert(name.to_string()) {
        return Err(LoadError::Link(format!("circular class hierarchy through {}", name)));
    }

    let result = define();

    let mut state = guard.borrow_mut();
    state.loading.remove(name);
    let class = result?;
    state.classes.insert(name.to_string(), Arc::clone(&class));
    Ok(class)
}

/// Memoized class, if any
pub(crate) fn find_memoized(lock: &LoaderLock, name: &str) -> Option<Arc<RuntimeClass>> {
    lock.lock().borrow().classes.get(name).cloned()
}

/// Read, decode and verify a class from a resource provider
pub(crate) fn read_class_file(
    resources: &dyn ResourceProvider,
    name: &str,
) -> Result<ClassFile, LoadError> {
    let bytes = resources
        .class_bytes(name)
        .map_err(|source| LoadError::Io {
            class: name.to_string(),
            source,
        })?
        .ok_or_else(|| LoadError::ClassNotFound(name.to_string()))?;
    let file = ClassFile::decode(&bytes).map_err(|source| LoadError::Malformed {
        class: name.to_string(),
        source,
    })?;
    if file.name != name {
        return Err(LoadError::Link(format!(
            "resource for {} defines {}",
            name, file.name
        )));
    }
    verify_class(&file).map_err(|source| LoadError::Verify {
        class: name.to_string(),
        source,
    })?;
    Ok(file)
}
