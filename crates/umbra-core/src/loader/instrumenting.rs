//! Instrumenting class loader
//!
//! Orchestrates acquisition, transformation and definition:
//! 1. memoized classes are returned as is
//! 2. classes the policy does not acquire come from the parent loader
//! 3. acquired classes are read from this loader's resources
//! 4. classes the policy instruments are transformed (through the cache)
//! 5. the result is defined with this loader's dispatch handler attached
//!
//! Everything happens under one reentrant loader-wide lock, so a class is
//! defined at most once per loader.

use super::{
    find_memoized, load_memoized, read_class_file, AcquisitionPolicy, ClassLoader, LoadError,
    LoaderId, LoaderLock, ResourceProvider,
};
use crate::cache::ClassCache;
use crate::class::RuntimeClass;
use crate::dispatch::DispatchHandler;
use crate::instrument::{ClassTransformer, TransformError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use umbra_bytecode::{disassemble, verify_class, ClassFile};

/// Loader behavior switches
#[derive(Debug, Clone, Copy, Default)]
pub struct LoaderOptions {
    /// Log a disassembly of every transformed class at `trace`
    pub dump_transformed: bool,
}

/// Counters for transformation work done by one loader
#[derive(Debug, Default)]
pub struct LoaderStats {
    transforms: AtomicUsize,
    cache_hits: AtomicUsize,
}

impl LoaderStats {
    /// Classes run through the transformer
    pub fn transforms(&self) -> usize {
        self.transforms.load(Ordering::Relaxed)
    }

    /// Instrumented classes served from the cache
    pub fn cache_hits(&self) -> usize {
        self.cache_hits.load(Ordering::Relaxed)
    }
}

/// Loader that rewrites acquired classes for dispatch
pub struct InstrumentingClassLoader {
    id: LoaderId,
    this: Weak<InstrumentingClassLoader>,
    parent: Arc<dyn ClassLoader>,
    resources: Arc<dyn ResourceProvider>,
    policy: Arc<dyn AcquisitionPolicy>,
    cache: Arc<dyn ClassCache>,
    handler: Arc<dyn DispatchHandler>,
    transformer: ClassTransformer,
    options: LoaderOptions,
    stats: LoaderStats,
    state: LoaderLock,
}

impl InstrumentingClassLoader {
    /// Create a loader
    ///
    /// # Arguments
    /// * `parent` - Loader for classes the policy does not acquire
    /// * `resources` - Source of acquired class bytes
    /// * `policy` - Acquire/instrument decisions
    /// * `cache` - Store of transformed class bytes
    /// * `handler` - Dispatch handler injected into instrumented classes
    /// * `options` - Behavior switches
    pub fn new(
        parent: Arc<dyn ClassLoader>,
        resources: Arc<dyn ResourceProvider>,
        policy: Arc<dyn AcquisitionPolicy>,
        cache: Arc<dyn ClassCache>,
        handler: Arc<dyn DispatchHandler>,
        options: LoaderOptions,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            id: LoaderId::next(),
            this: this.clone(),
            parent,
            resources,
            policy,
            cache,
            handler,
            transformer: ClassTransformer::new(),
            options,
            stats: LoaderStats::default(),
            state: LoaderLock::default(),
        })
    }

    /// Parent loader
    pub fn parent(&self) -> &Arc<dyn ClassLoader> {
        &self.parent
    }

    /// Handler injected into instrumented classes
    pub fn handler(&self) -> &Arc<dyn DispatchHandler> {
        &self.handler
    }

    /// Transformation counters
    pub fn stats(&self) -> &LoaderStats {
        &self.stats
    }

    fn define_class(&self, name: &str) -> Result<Arc<RuntimeClass>, LoadError> {
        if !self.policy.should_acquire(name) {
            tracing::debug!(class = %name, loader = %self.id, "delegating to parent");
            return self.parent.load_class(name);
        }

        let file = read_class_file(self.resources.as_ref(), name)?;
        let instrumented = self.policy.should_instrument(&file);
        let file = if instrumented {
            self.instrument(name, file)?
        } else {
            file
        };

        let super_class = match file.super_name.as_deref() {
            Some(super_name) => Some(self.load_class(super_name)?),
            None => None,
        };
        tracing::debug!(class = %name, loader = %self.id, instrumented, "defining class");

        let loader: Weak<dyn ClassLoader> = self.this.clone();
        Ok(RuntimeClass::define(
            file,
            super_class,
            loader,
            self.id,
            instrumented,
            Some(Arc::clone(&self.handler)),
        )?)
    }

    fn instrument(&self, name: &str, file: ClassFile) -> Result<ClassFile, LoadError> {
        let transformed = match self.cached(name) {
            Some(cached) => cached,
            None => self.transform(name, file)?,
        };

        verify_class(&transformed).map_err(|e| {
            let reason = format!("transformed class fails verification: {}", e);
            TransformError::violation(name, "*", reason)
        })?;
        if self.options.dump_transformed {
            tracing::trace!(class = %name, "transformed class\n{}", disassemble(&transformed));
        }
        Ok(transformed)
    }

    fn cached(&self, name: &str) -> Option<ClassFile> {
        let bytes = self.cache.get(name)?;
        match ClassFile::decode(&bytes) {
            Ok(cached) => {
                self.stats.cache_hits.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(class = %name, version = self.cache.version(), "cache hit");
                Some(cached)
            }
            Err(e) => {
                tracing::warn!(class = %name, error = %e, "discarding undecodable cached class");
                None
            }
        }
    }

    fn transform(&self, name: &str, file: ClassFile) -> Result<ClassFile, LoadError> {
        tracing::debug!(class = %name, version = self.cache.version(), "cache miss, transforming");
        let transformed = self.transformer.transform(file)?;
        self.stats.transforms.fetch_add(1, Ordering::Relaxed);

        if self.cache.is_writing() {
            if let Err(e) = self.cache.put(name, &transformed.encode()) {
                tracing::warn!(class = %name, error = %e, "failed to cache transformed class");
            }
        }
        Ok(transformed)
    }
}

impl ClassLoader for InstrumentingClassLoader {
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
