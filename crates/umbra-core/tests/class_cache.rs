//! Class Bytecode Cache Tests
//!
//! # Running Tests
//! ```bash
//! cargo test --test class_cache
//! ```

mod common;

use common::{instrumented, Harness, Transcript};
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;
use umbra_bytecode::{access, ClassBuilder, Instruction};
use umbra_core::cache::{ClassCache, DiskClassCache, MemoryClassCache, CACHE_VERSION};
use umbra_core::loader::{
    BootstrapClassLoader, ClassLoader, InstrumentingClassLoader, LoaderOptions, MemoryResources,
    Setup,
};
use umbra_core::{ClassTransformer, Value};

fn widget() -> ClassBuilder {
    instrumented("t.Widget")
        .default_constructor()
        .method("size", "()I", access::PUBLIC, |code| {
            code.const_i32(3).emit(Instruction::Return);
        })
}

fn widget_bytes() -> Vec<u8> {
    widget().build_bytes().unwrap()
}

fn disk_loader(cache: Arc<dyn ClassCache>) -> Arc<InstrumentingClassLoader> {
    let resources = Arc::new(MemoryResources::new().with_class("t.Widget", widget_bytes()));
    InstrumentingClassLoader::new(
        BootstrapClassLoader::new(resources.clone()),
        resources,
        Arc::new(Setup::default()),
        cache,
        Transcript::calling_through(),
        LoaderOptions::default(),
    )
}

// ===== In-memory =====

#[test]
fn test_warm_cache_skips_transformation() {
    let cache = MemoryClassCache::new();
    let cold = Harness::with_cache(vec![widget()], Transcript::new(), cache.clone());
    cold.vm.load_class("t.Widget").unwrap();
    assert_eq!(cold.loader.stats().transforms(), 1);
    assert_eq!(cold.loader.stats().cache_hits(), 0);

    let warm = Harness::with_cache(vec![widget()], Transcript::calling_through(), cache);
    let object = warm.vm.new_instance("t.Widget", "()V", vec![]).unwrap();
    assert_eq!(warm.loader.stats().transforms(), 0);
    assert_eq!(warm.loader.stats().cache_hits(), 1);
    assert_eq!(warm.vm.invoke_virtual(&object, "size", "()I", vec![]).unwrap(), Value::Int(3));
}

#[test]
fn test_cached_bytes_match_fresh_transformation() {
    let cache = MemoryClassCache::new();
    let harness = Harness::with_cache(vec![widget()], Transcript::new(), cache.clone());
    harness.vm.load_class("t.Widget").unwrap();

    let fresh = ClassTransformer::new().transform_bytes(&widget_bytes()).unwrap();
    assert_eq!(cache.get("t.Widget"), Some(fresh));
}

#[test]
fn test_version_bump_forces_retransformation() {
    let cache = MemoryClassCache::new();
    Harness::with_cache(vec![widget()], Transcript::new(), cache.clone())
        .vm
        .load_class("t.Widget")
        .unwrap();

    let bumped = cache.with_version(CACHE_VERSION + 1);
    let harness = Harness::with_cache(vec![widget()], Transcript::new(), bumped.clone());
    harness.vm.load_class("t.Widget").unwrap();
    assert_eq!(harness.loader.stats().transforms(), 1);
    assert_eq!(harness.loader.stats().cache_hits(), 0);
    assert_eq!(cache.len(), 2);
    assert_eq!(cache.get("t.Widget"), bumped.get("t.Widget"));
}

#[test]
fn test_read_only_cache_is_not_populated() {
    let cache = MemoryClassCache::new().read_only();
    let harness = Harness::with_cache(vec![widget()], Transcript::new(), cache.clone());
    harness.vm.load_class("t.Widget").unwrap();
    assert!(cache.is_empty());
}

#[test]
fn test_uninstrumented_classes_bypass_cache() {
    let cache = MemoryClassCache::new();
    let plain = ClassBuilder::new("t.Plain").default_constructor();
    let harness = Harness::with_cache(vec![plain], Transcript::new(), cache.clone());
    harness.vm.load_class("t.Plain").unwrap();
    assert!(cache.is_empty());
}

// ===== On disk =====

#[test]
fn test_disk_cache_shared_between_loaders() {
    let dir = TempDir::new().unwrap();
    let cache = Arc::new(DiskClassCache::open(dir.path()).unwrap());

    let first = disk_loader(cache.clone());
    first.load_class("t.Widget").unwrap();
    assert_eq!(first.stats().transforms(), 1);
    assert!(cache.entry_path("t.Widget").is_file());

    let second = disk_loader(cache);
    second.load_class("t.Widget").unwrap();
    assert_eq!(second.stats().transforms(), 0);
    assert_eq!(second.stats().cache_hits(), 1);
}

#[test]
fn test_corrupt_disk_entry_is_retransformed() {
    let dir = TempDir::new().unwrap();
    let cache = Arc::new(DiskClassCache::open(dir.path()).unwrap());
    disk_loader(cache.clone()).load_class("t.Widget").unwrap();

    fs::write(cache.entry_path("t.Widget"), b"not a cache entry at all, definitely not").unwrap();

    let loader = disk_loader(cache.clone());
    assert!(loader.load_class("t.Widget").unwrap().is_instrumented());
    assert_eq!(loader.stats().transforms(), 1);
    // the rewrite repaired the entry
    assert!(cache.read_entry("t.Widget").unwrap().is_some());
}

#[test]
fn test_disk_versions_live_side_by_side() {
    let dir = TempDir::new().unwrap();
    let v1 = Arc::new(DiskClassCache::with_version(dir.path(), 1).unwrap());
    let v2 = Arc::new(DiskClassCache::with_version(dir.path(), 2).unwrap());
    disk_loader(v1.clone()).load_class("t.Widget").unwrap();

    let loader = disk_loader(v2.clone());
    loader.load_class("t.Widget").unwrap();
    assert_eq!(loader.stats().transforms(), 1);
    assert!(v1.entry_path("t.Widget").is_file());
    assert!(v2.entry_path("t.Widget").is_file());
}
