//! Shared fixtures for integration tests

#![allow(dead_code)]

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use umbra_bytecode::ClassBuilder;
use umbra_core::cache::MemoryClassCache;
use umbra_core::dispatch::DispatchHandler;
use umbra_core::loader::{
    BootstrapClassLoader, ClassLoader, InstrumentingClassLoader, LoaderOptions, MemoryResources,
    PolicyConfig, Setup, INSTRUMENT,
};
use umbra_core::{RuntimeClass, Value, Vm, VmOptions, VmResult};
use umbra_core::CallRecord;

/// Handler that records every event it sees
///
/// Calls either run their original body (`call_through`) or return null.
#[derive(Default)]
pub struct Transcript {
    events: Mutex<Vec<String>>,
    call_through: bool,
    direct: AtomicBool,
}

impl Transcript {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calling_through() -> Arc<Self> {
        Arc::new(Self {
            call_through: true,
            ..Self::default()
        })
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }

    pub fn set_direct(&self, direct: bool) {
        self.direct.store(direct, Ordering::SeqCst);
    }

    fn record(&self, event: String) {
        self.events.lock().push(event);
    }
}

impl DispatchHandler for Transcript {
    fn reset(&self) {
        self.clear();
        self.set_direct(false);
    }

    fn class_initializing(&self, vm: &Vm, class: &Arc<RuntimeClass>) -> VmResult<()> {
        self.record(format!("classInitializing: {}", class.simple_name()));
        vm.perform_static_initialization(class)
    }

    fn method_invoked(&self, vm: &Vm, call: &CallRecord) -> VmResult<Value> {
        self.record(format!("methodInvoked: {}", call));
        if self.call_through {
            vm.call_direct(call)
        } else {
            Ok(Value::Null)
        }
    }

    fn should_call_directly(&self, _receiver: &Value) -> bool {
        self.direct.load(Ordering::SeqCst)
    }

    fn set_strict_i18n(&self, _strict: bool) {}
}

/// Everything one test needs to run instrumented classes
pub struct Harness {
    pub resources: Arc<MemoryResources>,
    pub cache: MemoryClassCache,
    pub loader: Arc<InstrumentingClassLoader>,
    pub vm: Vm,
}

impl Harness {
    /// Harness over the given classes with a fresh in-memory cache
    pub fn new(classes: Vec<ClassBuilder>, handler: Arc<dyn DispatchHandler>) -> Self {
        Self::with_cache(classes, handler, MemoryClassCache::new())
    }

    /// Harness over the given classes sharing `cache`
    pub fn with_cache(
        classes: Vec<ClassBuilder>,
        handler: Arc<dyn DispatchHandler>,
        cache: MemoryClassCache,
    ) -> Self {
        let resources = MemoryResources::new();
        for class in classes {
            let file = class.build().expect("fixture class builds");
            resources.insert(&file.name, file.encode());
        }
        let resources = Arc::new(resources);
        let parent = BootstrapClassLoader::new(resources.clone());
        let policy = Setup::new(PolicyConfig {
            delegated_prefixes: vec!["shared.".to_string()],
            ..PolicyConfig::default()
        });
        let loader = InstrumentingClassLoader::new(
            parent,
            resources.clone(),
            Arc::new(policy),
            Arc::new(cache.clone()),
            handler,
            LoaderOptions { dump_transformed: true },
        );
        let vm = Vm::new(loader.clone() as Arc<dyn ClassLoader>, VmOptions::default());
        Self {
            resources,
            cache,
            loader,
            vm,
        }
    }
}

/// Class annotated for instrumentation
pub fn instrumented(name: &str) -> ClassBuilder {
    ClassBuilder::new(name).annotate(INSTRUMENT)
}
