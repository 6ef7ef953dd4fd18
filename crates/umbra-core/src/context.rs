//! Context wiring
//!
//! [`UmbraContext`] assembles one instrumentation domain from a
//! configuration: resources, cache, policy, dispatch handler, both loaders
//! and a VM. Independent contexts share nothing but the on-disk cache.

use crate::cache::{ClassCache, DiskClassCache, MemoryClassCache};
use crate::config::{ConfigError, UmbraConfig};
use crate::dispatch::{DispatchHandler, ShadowWrangler};
use crate::loader::{
    BootstrapClassLoader, ClassLoader, DirectoryResources, InstrumentingClassLoader,
    ResourceProvider, Setup,
};
use crate::vm::Vm;
use std::sync::Arc;

/// One wired instrumentation domain
pub struct UmbraContext {
    config: UmbraConfig,
    wrangler: Arc<ShadowWrangler>,
    loader: Arc<InstrumentingClassLoader>,
    vm: Vm,
}

impl UmbraContext {
    /// Build a context reading classes from `config.class_path`
    pub fn new(config: UmbraConfig) -> Result<Self, ConfigError> {
        let resources = Arc::new(DirectoryResources::new(config.class_path.clone()));
        Self::with_resources(config, resources)
    }

    /// Build a context reading classes from an explicit provider
    pub fn with_resources(
        config: UmbraConfig,
        resources: Arc<dyn ResourceProvider>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let cache: Arc<dyn ClassCache> = if config.cache_enabled {
            Arc::new(DiskClassCache::with_version(config.cache_path(), config.cache_version)?)
        } else {
            Arc::new(MemoryClassCache::new().with_version(config.cache_version))
        };
        let wrangler = Arc::new(ShadowWrangler::new(config.wrangler_options()));
        let parent = BootstrapClassLoader::new(Arc::clone(&resources));
        let loader = InstrumentingClassLoader::new(
            parent,
            resources,
            Arc::new(Setup::new(config.policy.clone())),
            cache,
            Arc::clone(&wrangler) as Arc<dyn DispatchHandler>,
            config.loader_options(),
        );
        let vm = Vm::new(Arc::clone(&loader) as Arc<dyn ClassLoader>, config.vm_options());
        tracing::debug!(
            loader = %loader.id(),
            cache_version = config.cache_version,
            "context ready"
        );

        Ok(Self {
            config,
            wrangler,
            loader,
            vm,
        })
    }

    /// Active configuration
    pub fn config(&self) -> &UmbraConfig {
        &self.config
    }

    /// VM executing through the instrumenting loader
    pub fn vm(&self) -> &Vm {
        &self.vm
    }

    /// Instrumenting loader
    pub fn loader(&self) -> &Arc<InstrumentingClassLoader> {
        &self.loader
    }

    /// Default dispatch handler
    pub fn wrangler(&self) -> &Arc<ShadowWrangler> {
        &self.wrangler
    }

    /// Forget per-test handler state
    pub fn reset(&self) {
        self.wrangler.reset();
    }

    /// Toggle strict i18n checking until the next reset
    pub fn set_strict_i18n(&self, strict: bool) {
        self.wrangler.set_strict_i18n(strict);
    }
}
