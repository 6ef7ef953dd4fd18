//! Bootstrap class loader
//!
//! Defines classes exactly as stored. Used as the parent of the
//! instrumenting loader and for classes the harness owns itself.

use super::{
    find_memoized, load_memoized, read_class_file, ClassLoader, LoadError, LoaderId, LoaderLock,
    ResourceProvider,
};
use crate::class::RuntimeClass;
use std::sync::{Arc, Weak};

/// Loader that never rewrites classes
pub struct BootstrapClassLoader {
    id: LoaderId,
    this: Weak<BootstrapClassLoader>,
    resources: Arc<dyn ResourceProvider>,
    state: LoaderLock,
}

impl BootstrapClassLoader {
    /// Create a loader reading from `resources`
    pub fn new(resources: Arc<dyn ResourceProvider>) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            id: LoaderId::next(),
            this: this.clone(),
            resources,
            state: LoaderLock::default(),
        })
    }

    fn define_class(&self, name: &str) -> Result<Arc<RuntimeClass>, LoadError> {
        let file = read_class_file(self.resources.as_ref(), name)?;
        let super_class = match file.super_name.as_deref() {
            Some(super_name) => Some(self.load_class(super_name)?),
            None => None,
        };
        tracing::debug!(class = %name, loader = %self.id, "defining class");

        let loader: Weak<dyn ClassLoader> = self.this.clone();
        Ok(RuntimeClass::define(file, super_class, loader, self.id, false, None)?)
    }
}

impl ClassLoader for BootstrapClassLoader {
    fn id(&self) -> LoaderId {
        self.id
    }

    fn load_class(&self, name: &str) -> Result<Arc<RuntimeClass>, LoadError> {
        load_memoized(&self.state, name, || self.define_class(name))
    }

    fn find_loaded(&self, name: &str) -> Option<Arc<RuntimeClass>> {
        find_memoized(&self.state, name)
    }
}
