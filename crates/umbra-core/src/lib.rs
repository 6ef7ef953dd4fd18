//! Umbra Core Runtime
//!
//! This crate provides the instrumentation engine of the Umbra test harness:
//! - Runtime values, objects and classes
//! - An interpreter for the Umbra class format
//! - Class loaders (bootstrap and instrumenting) with an acquisition policy
//! - The method transformer that splits methods into entry and direct halves
//! - A versioned cache of transformed class bytes
//! - The dispatch handler contract and the shadow-binding default handler
//! - Configuration and context wiring

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod cache;
pub mod class;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod instrument;
pub mod loader;
pub mod object;
pub mod value;
pub mod vm;

pub use cache::{CacheError, ClassCache, DiskClassCache, MemoryClassCache, CACHE_VERSION};
pub use class::{ClassId, InitState, RuntimeClass, RuntimeMethod};
pub use config::{ConfigError, UmbraConfig};
pub use context::UmbraContext;
pub use dispatch::{
    CallRecord, DispatchError, DispatchHandler, ShadowClass, ShadowWrangler,
    WranglerOptions,
};
pub use instrument::{direct_method_name, ClassTransformer, TransformError};
pub use loader::{
    AcquisitionPolicy, BootstrapClassLoader, ClassLoader, InstrumentingClassLoader, LoadError,
    LoaderId, LoaderOptions, LoaderStats, PolicyConfig, ResourceProvider, Setup,
};
pub use object::{Array, Object};
pub use value::Value;
pub use vm::{Vm, VmOptions};

/// VM execution errors
#[derive(Debug, thiserror::Error)]
pub enum VmError {
    /// A value raised by `THROW` or by a substitute, propagated unchanged
    #[error("Uncaught failure: {0}")]
    Thrown(Value),

    /// Call depth limit exceeded
    #[error("Stack overflow")]
    StackOverflow,

    /// Operand stack underflow (only reachable with unverified code)
    #[error("Stack underflow")]
    StackUnderflow,

    /// Null pointer exception
    #[error("Null pointer exception")]
    NullPointer,

    /// Type error
    #[error("Type error: {0}")]
    TypeError(String),

    /// Method resolution failed
    #[error("No such method: {0}")]
    NoSuchMethod(String),

    /// Field resolution failed
    #[error("No such field: {0}")]
    NoSuchField(String),

    /// A native method body was invoked
    #[error("Unsatisfied link: {0}")]
    UnsatisfiedLink(String),

    /// An abstract method body was invoked
    #[error("Abstract method invoked: {0}")]
    AbstractMethod(String),

    /// Class loading failed during resolution
    #[error(transparent)]
    ClassLoad(#[from] LoadError),

    /// Harness plumbing failure inside the dispatch handler
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// Method refused while strict i18n checking is enabled
    #[error("Strict i18n violation: {class}.{method} is not locale safe")]
    StrictModeViolation {
        /// Declaring class name
        class: String,
        /// Method name
        method: String,
    },
}

/// VM execution result
pub type VmResult<T> = Result<T, VmError>;
