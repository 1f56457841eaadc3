//! Handler table build configuration
//!
//! Settings are read from an `ignis.toml` file and can be overridden through
//! `IGNIS_*` environment variables:
//!
//! ```toml
//! parallel = true
//! threads = 8            # 0 = one per CPU
//! verify_references = true
//! opt_level = "speed"    # none | speed | speed_and_size
//! trace_codegen = false
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Deserialize;
use tracing::debug;

/// Code generator optimization level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptLevel {
    None,
    #[default]
    Speed,
    SpeedAndSize,
}

impl OptLevel {
    /// Setting value understood by the code generator
    pub fn as_str(self) -> &'static str {
        match self {
            OptLevel::None => "none",
            OptLevel::Speed => "speed",
            OptLevel::SpeedAndSize => "speed_and_size",
        }
    }
}

impl fmt::Display for OptLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OptLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(OptLevel::None),
            "speed" => Ok(OptLevel::Speed),
            "speed_and_size" => Ok(OptLevel::SpeedAndSize),
            other => Err(format!("unknown optimization level '{}'", other)),
        }
    }
}

/// Options for building a handler table
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BuildConfig {
    /// Generate handlers on a rayon pool when the generator allows it.
    /// Default: false
    pub parallel: bool,

    /// Worker threads for parallel generation, 0 for one per CPU.
    /// Default: 0
    pub threads: usize,

    /// Check every peer reference recorded by the generator during finalization.
    /// Default: true
    pub verify_references: bool,

    /// Optimization level passed to the native code generator.
    /// Default: speed
    pub opt_level: OptLevel,

    /// Log every generated handler.
    /// Default: false
    pub trace_codegen: bool,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            parallel: false,
            threads: 0,
            verify_references: true,
            opt_level: OptLevel::Speed,
            trace_codegen: false,
        }
    }
}

impl BuildConfig {
    /// Sequential build with default settings
    pub fn sequential() -> Self {
        Self::default()
    }

    /// Parallel build on one thread per CPU
    pub fn parallel() -> Self {
        Self {
            parallel: true,
            ..Self::default()
        }
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    pub fn with_opt_level(mut self, opt_level: OptLevel) -> Self {
        self.opt_level = opt_level;
        self
    }

    pub fn with_trace_codegen(mut self, trace: bool) -> Self {
        self.trace_codegen = trace;
        self
    }

    pub fn with_verify_references(mut self, verify: bool) -> Self {
        self.verify_references = verify;
        self
    }

    /// Worker thread count after resolving the 0 default
    pub fn effective_threads(&self) -> usize {
        if self.threads == 0 {
            num_cpus::get()
        } else {
            self.threads
        }
    }

    /// Parse a configuration from TOML content
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(ConfigError::Parse)
    }

    /// Load a configuration file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&content)?;
        debug!(target: "ignis::config", path = %path.display(), ?config, "Loaded build config");
        Ok(config)
    }

    /// Apply `IGNIS_*` overrides from the process environment
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides_from(|name| std::env::var(name).ok())
    }

    /// Apply `IGNIS_*` overrides from an arbitrary variable source
    pub fn with_overrides_from<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("IGNIS_PARALLEL") {
            self.parallel = parse_bool("IGNIS_PARALLEL", &value)?;
        }
        if let Some(value) = lookup("IGNIS_THREADS") {
            self.threads = value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                var: "IGNIS_THREADS",
                value: value.clone(),
            })?;
        }
        if let Some(value) = lookup("IGNIS_VERIFY_REFERENCES") {
            self.verify_references = parse_bool("IGNIS_VERIFY_REFERENCES", &value)?;
        }
        if let Some(value) = lookup("IGNIS_OPT_LEVEL") {
            self.opt_level = value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                var: "IGNIS_OPT_LEVEL",
                value: value.clone(),
            })?;
        }
        if let Some(value) = lookup("IGNIS_TRACE_CODEGEN") {
            self.trace_codegen = parse_bool("IGNIS_TRACE_CODEGEN", &value)?;
        }
        Ok(self)
    }
}

fn parse_bool(var: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidEnv {
            var,
            value: value.to_string(),
        }),
    }
}

/// Errors that can occur while loading configuration
#[derive(Debug)]
pub enum ConfigError {
    /// Configuration file could not be read
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Configuration file is not valid TOML for [`BuildConfig`]
    Parse(toml::de::Error),

    /// Environment override has an invalid value
    InvalidEnv { var: &'static str, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(f, "Failed to read '{}': {}", path.display(), source)
            }
            ConfigError::Parse(err) => write!(f, "Invalid configuration: {}", err),
            ConfigError::InvalidEnv { var, value } => {
                write!(f, "Invalid value for {}: '{}'", var, value)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            ConfigError::Parse(err) => Some(err),
            ConfigError::InvalidEnv { .. } => None,
        }
    }
}
