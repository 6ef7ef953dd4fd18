//! Acquisition policy
//!
//! Decides which classes the instrumenting loader defines itself and which
//! of those get their methods rewritten. Decisions depend only on the class
//! name and the class file, so they are stable for the lifetime of a loader.

use serde::{Deserialize, Serialize};
use umbra_bytecode::ClassFile;

/// Annotation that opts a class into instrumentation
pub const INSTRUMENT: &str = "umbra.Instrument";

/// Annotation that opts a class out of instrumentation
pub const DO_NOT_INSTRUMENT: &str = "umbra.DoNotInstrument";

/// Acquire/instrument decisions
pub trait AcquisitionPolicy: Send + Sync {
    /// Whether the instrumenting loader defines the class (otherwise the
    /// parent loader does)
    fn should_acquire(&self, class_name: &str) -> bool;

    /// Whether an acquired class is rewritten; `class` is the decoded,
    /// not yet defined class file
    fn should_instrument(&self, class: &ClassFile) -> bool;
}

/// Configuration of the default [`Setup`] policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Prefixes owned by the harness itself, never acquired
    pub reserved_prefixes: Vec<String>,
    /// Additional prefixes always left to the parent loader
    pub delegated_prefixes: Vec<String>,
    /// Prefixes to acquire; empty means everything not excluded
    pub acquired_prefixes: Vec<String>,
    /// Prefixes whose classes are instrumented without an annotation
    pub instrumented_prefixes: Vec<String>,
    /// Primitive-like value classes that are never instrumented
    pub value_types: Vec<String>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            reserved_prefixes: vec!["umbra.".to_string()],
            delegated_prefixes: Vec::new(),
            acquired_prefixes: Vec::new(),
            instrumented_prefixes: Vec::new(),
            value_types: Vec::new(),
        }
    }
}

/// Default policy driven by [`PolicyConfig`]
#[derive(Debug, Clone, Default)]
pub struct Setup {
    config: PolicyConfig,
}

impl Setup {
    /// Create a policy from configuration
    pub fn new(config: PolicyConfig) -> Self {
        Self { config }
    }

    /// Active configuration
    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }
}

fn has_prefix(prefixes: &[String], name: &str) -> bool {
    prefixes.iter().any(|p| name.starts_with(p.as_str()))
}

impl AcquisitionPolicy for Setup {
    fn should_acquire(&self, class_name: &str) -> bool {
        if has_prefix(&self.config.reserved_prefixes, class_name)
            || has_prefix(&self.config.delegated_prefixes, class_name)
        {
            return false;
        }
        self.config.acquired_prefixes.is_empty()
            || has_prefix(&self.config.acquired_prefixes, class_name)
    }

    fn should_instrument(&self, class: &ClassFile) -> bool {
        if class.has_annotation(DO_NOT_INSTRUMENT)
            || self.config.value_types.iter().any(|v| *v == class.name)
        {
            return false;
        }
        class.has_annotation(INSTRUMENT)
            || has_prefix(&self.config.instrumented_prefixes, &class.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn annotated(name: &str, annotation: Option<&str>) -> ClassFile {
        let mut class = ClassFile::new(name, None);
        class.annotations.extend(annotation.map(str::to_string));
        class
    }

    #[test]
    fn test_reserved_prefix_is_never_acquired() {
        let setup = Setup::default();
        assert!(!setup.should_acquire("umbra.internal.Handler"));
        assert!(setup.should_acquire("platform.View"));
    }

    #[test]
    fn test_acquired_and_delegated_prefixes() {
        let setup = Setup::new(PolicyConfig {
            delegated_prefixes: vec!["platform.shared.".to_string()],
            acquired_prefixes: vec!["platform.".to_string(), "app.".to_string()],
            ..PolicyConfig::default()
        });
        assert!(setup.should_acquire("platform.View"));
        assert!(setup.should_acquire("app.Main"));
        assert!(!setup.should_acquire("platform.shared.Log"));
        assert!(!setup.should_acquire("other.Thing"));
    }

    #[test]
    fn test_instrument_decisions() {
        let setup = Setup::new(PolicyConfig {
            instrumented_prefixes: vec!["platform.".to_string()],
            value_types: vec!["platform.Int".to_string()],
            ..PolicyConfig::default()
        });
        assert!(setup.should_instrument(&annotated("app.Widget", Some(INSTRUMENT))));
        assert!(setup.should_instrument(&annotated("platform.View", None)));
        assert!(!setup.should_instrument(&annotated("platform.View", Some(DO_NOT_INSTRUMENT))));
        assert!(!setup.should_instrument(&annotated("platform.Int", None)));
        assert!(!setup.should_instrument(&annotated("app.Plain", None)));
    }
}
