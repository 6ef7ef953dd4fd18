//! Harness configuration
//!
//! Read from TOML, every key optional:
//!
//! ```toml
//! class_path = ["build/classes"]
//! cache_dir = "./tmp"
//! strict_i18n = false
//! call_through_by_default = true
//!
//! [policy]
//! instrumented_prefixes = ["platform."]
//! ```
//!
//! Two environment variables override the file: `UMBRA_CLASS_CACHE_PATH`
//! (cache directory) and `UMBRA_STRICT_I18N` (global strictness).

use crate::cache::{CacheError, CACHE_VERSION};
use crate::dispatch::WranglerOptions;
use crate::loader::{LoaderOptions, PolicyConfig};
use crate::vm::{VmOptions, DEFAULT_MAX_CALL_DEPTH};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Environment variable overriding [`UmbraConfig::cache_dir`]
pub const CACHE_PATH_ENV: &str = "UMBRA_CLASS_CACHE_PATH";

/// Environment variable overriding [`UmbraConfig::strict_i18n`]
pub const STRICT_I18N_ENV: &str = "UMBRA_STRICT_I18N";

/// Directory under [`UmbraConfig::cache_dir`] holding cached classes
pub const CACHE_DIR_NAME: &str = "cached-umbra-classes";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse TOML
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Values are inconsistent
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// The configured class cache could not be opened
    #[error("Failed to open class cache: {0}")]
    Cache(#[from] CacheError),
}

/// Harness configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UmbraConfig {
    /// Directories searched for class files, in order
    pub class_path: Vec<PathBuf>,
    /// Base directory of the on-disk class cache
    pub cache_dir: PathBuf,
    /// Use the on-disk cache (an in-memory cache is used otherwise)
    pub cache_enabled: bool,
    /// Version transformed classes are cached under
    pub cache_version: u32,
    /// Refuse locale-unsafe substitutes
    pub strict_i18n: bool,
    /// Run original bodies of calls without a substitute
    pub call_through_by_default: bool,
    /// Log disassembly of transformed classes at `trace`
    pub dump_transformed: bool,
    /// Call depth limit of the VM
    pub max_call_depth: usize,
    /// Acquisition policy
    pub policy: PolicyConfig,
}

impl Default for UmbraConfig {
    fn default() -> Self {
        Self {
            class_path: Vec::new(),
            cache_dir: PathBuf::from("./tmp"),
            cache_enabled: true,
            cache_version: CACHE_VERSION,
            strict_i18n: false,
            call_through_by_default: true,
            dump_transformed: false,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            policy: PolicyConfig::default(),
        }
    }
}

impl UmbraConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: UmbraConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Serialize to TOML text
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    /// Check value consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_call_depth == 0 {
            return Err(ConfigError::Invalid("max_call_depth must be positive".to_string()));
        }
        if self.policy.reserved_prefixes.iter().any(String::is_empty) {
            return Err(ConfigError::Invalid(
                "an empty reserved prefix would exclude every class".to_string(),
            ));
        }
        Ok(())
    }

    /// Apply overrides from the process environment
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable lookup
    pub fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(dir) = lookup(CACHE_PATH_ENV).filter(|d| !d.is_empty()) {
            self.cache_dir = PathBuf::from(dir);
        }
        if let Some(flag) = lookup(STRICT_I18N_ENV) {
            self.strict_i18n = parse_flag(&flag);
        }
        self
    }

    /// Directory of the on-disk class cache
    pub fn cache_path(&self) -> PathBuf {
        self.cache_dir.join(CACHE_DIR_NAME)
    }

    /// Options for the default dispatch handler
    pub fn wrangler_options(&self) -> WranglerOptions {
        WranglerOptions {
            strict_i18n: self.strict_i18n,
            call_through_by_default: self.call_through_by_default,
        }
    }

    /// Options for the instrumenting loader
    pub fn loader_options(&self) -> LoaderOptions {
        LoaderOptions {
            dump_transformed: self.dump_transformed,
        }
    }

    /// Options for the VM
    pub fn vm_options(&self) -> VmOptions {
        VmOptions {
            max_call_depth: self.max_call_depth,
        }
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
