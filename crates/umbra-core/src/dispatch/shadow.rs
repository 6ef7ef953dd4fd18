//! Substitute implementations

use super::CallRecord;
use crate::class::RuntimeClass;
use crate::value::Value;
use crate::vm::Vm;
use crate::VmResult;
use std::fmt;
use std::sync::Arc;

/// A substitute method body
pub type ShadowFn = Arc<dyn Fn(&Vm, &CallRecord) -> VmResult<Value> + Send + Sync>;

/// A substitute static initializer
pub type ShadowInitFn = Arc<dyn Fn(&Vm, &Arc<RuntimeClass>) -> VmResult<()> + Send + Sync>;

struct ShadowMethod {
    name: String,
    params: Option<Vec<String>>,
    i18n_unsafe: bool,
    body: ShadowFn,
}

impl ShadowMethod {
    fn matches(&self, call: &CallRecord) -> bool {
        self.name == call.method_name
            && self.params.as_ref().map_or(true, |p| *p == call.param_types)
    }
}

/// Substitute implementation bound to a target class
///
/// Methods restricted to a parameter list take precedence over unrestricted
/// ones of the same name; among equals the first registered wins.
#[derive(Default)]
pub struct ShadowClass {
    name: String,
    methods: Vec<ShadowMethod>,
    static_initializer: Option<ShadowInitFn>,
}

impl ShadowClass {
    /// Create an empty substitute
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Substitute name (used in logs)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Substitute every overload of `name`
    pub fn method<F>(self, name: &str, body: F) -> Self
    where
        F: Fn(&Vm, &CallRecord) -> VmResult<Value> + Send + Sync + 'static,
    {
        self.push(name, None, false, Arc::new(body))
    }

    /// Substitute the overload of `name` with the given parameter type names
    pub fn method_with_params<F>(self, name: &str, params: &[&str], body: F) -> Self
    where
        F: Fn(&Vm, &CallRecord) -> VmResult<Value> + Send + Sync + 'static,
    {
        let params = params.iter().map(|p| p.to_string()).collect();
        self.push(name, Some(params), false, Arc::new(body))
    }

    /// Substitute `name` and mark it unsafe under strict i18n checking
    pub fn i18n_unsafe_method<F>(self, name: &str, body: F) -> Self
    where
        F: Fn(&Vm, &CallRecord) -> VmResult<Value> + Send + Sync + 'static,
    {
        self.push(name, None, true, Arc::new(body))
    }

    /// Override the target's static initializer
    pub fn static_initializer<F>(mut self, body: F) -> Self
    where
        F: Fn(&Vm, &Arc<RuntimeClass>) -> VmResult<()> + Send + Sync + 'static,
    {
        self.static_initializer = Some(Arc::new(body));
        self
    }

    fn push(
        mut self,
        name: &str,
        params: Option<Vec<String>>,
        i18n_unsafe: bool,
        body: ShadowFn,
    ) -> Self {
        self.methods.push(ShadowMethod {
            name: name.to_string(),
            params,
            i18n_unsafe,
            body,
        });
        self
    }

    /// Find the substitute for a call; the flag reports i18n unsafety
    pub fn find(&self, call: &CallRecord) -> Option<(ShadowFn, bool)> {
        let mut candidates = self.methods.iter().filter(|m| m.matches(call));
        let first = candidates.next()?;
        let chosen = if first.params.is_some() {
            first
        } else {
            candidates.find(|m| m.params.is_some()).unwrap_or(first)
        };
        Some((Arc::clone(&chosen.body), chosen.i18n_unsafe))
    }

    /// Static initializer override, if declared
    pub fn static_initializer_override(&self) -> Option<ShadowInitFn> {
        self.static_initializer.clone()
    }

    /// Number of substituted methods
    pub fn method_count(&self) -> usize {
        self.methods.len()
    }
}

impl fmt::Debug for ShadowClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShadowClass")
            .field("name", &self.name)
            .field("methods", &self.methods.iter().map(|m| &m.name).collect::<Vec<_>>())
            .field("static_initializer", &self.static_initializer.is_some())
            .finish()
    }
}
