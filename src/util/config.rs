//! Configuration file support for cmext.
//!
//! cmext supports two configuration file locations:
//! - Global: `~/.cmext/config.toml` - User-wide defaults
//! - Project: `.cmext/config.toml` - Project-specific overrides
//!
//! Project config takes precedence over global config.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Environment variable overriding the CMake executable.
pub const CMAKE_ENV: &str = "CMEXT_CMAKE";

/// Minimum CMake version accepted where version gating applies.
pub const DEFAULT_MINIMUM_CMAKE: &str = "3.1.0";

/// cmext configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Build settings
    pub build: BuildSettings,

    /// CMake settings
    pub cmake: CMakeSettings,
}

/// Build-related configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct BuildSettings {
    /// Default number of parallel extension builds (None = auto-detect)
    pub jobs: Option<usize>,

    /// Interpreter passed to the configure step
    pub interpreter: Option<PathBuf>,
}

/// CMake-related configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CMakeSettings {
    /// Path to the cmake executable
    pub program: Option<PathBuf>,

    /// Minimum accepted CMake version (e.g., "3.18")
    pub minimum_version: Option<String>,

    /// Enforce the minimum version on every platform, not only Windows
    pub enforce_minimum: bool,

    /// Extra arguments appended to every configure invocation
    pub args: Vec<String>,
}

impl Config {
    /// Load configuration from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("failed to parse config file: {}", path.display()))
    }

    /// Load configuration with fallback to defaults if file doesn't exist.
    pub fn load_or_default(path: &Path) -> Self {
        if path.exists() {
            Self::load(path).unwrap_or_else(|e| {
                tracing::warn!("Failed to load config from {}: {:#}", path.display(), e);
                Self::default()
            })
        } else {
            Self::default()
        }
    }

    /// Merge another config into this one (other takes precedence).
    pub fn merge(&mut self, other: Config) {
        // Build settings
        if other.build.jobs.is_some() {
            self.build.jobs = other.build.jobs;
        }
        if other.build.interpreter.is_some() {
            self.build.interpreter = other.build.interpreter;
        }

        // CMake settings
        if other.cmake.program.is_some() {
            self.cmake.program = other.cmake.program;
        }
        if other.cmake.minimum_version.is_some() {
            self.cmake.minimum_version = other.cmake.minimum_version;
        }
        if other.cmake.enforce_minimum {
            self.cmake.enforce_minimum = true;
        }
        if !other.cmake.args.is_empty() {
            self.cmake.args = other.cmake.args;
        }
    }

    /// Minimum CMake version string, falling back to the built-in default.
    pub fn minimum_cmake(&self) -> &str {
        self.cmake
            .minimum_version
            .as_deref()
            .unwrap_or(DEFAULT_MINIMUM_CMAKE)
    }

    /// Resolve the CMake program.
    ///
    /// Order: `CMEXT_CMAKE` env var, configured program, `cmake` on PATH.
    /// When nothing is found the bare name is returned so the probe can
    /// report it as missing.
    pub fn cmake_program(&self) -> PathBuf {
        if let Some(env) = std::env::var_os(CMAKE_ENV).filter(|v| !v.is_empty()) {
            return PathBuf::from(env);
        }
        if let Some(ref program) = self.cmake.program {
            return program.clone();
        }
        crate::util::process::find_cmake().unwrap_or_else(|| PathBuf::from("cmake"))
    }
}

/// Load merged configuration from global and project locations.
///
/// Order of precedence (highest to lowest):
/// 1. Project config (.cmext/config.toml)
/// 2. Global config (~/.cmext/config.toml)
/// 3. Defaults
pub fn load_config(global_path: &Path, project_path: &Path) -> Config {
    let mut config = Config::default();

    if global_path.exists() {
        config.merge(Config::load_or_default(global_path));
    }

    if project_path.exists() {
        config.merge(Config::load_or_default(project_path));
    }

    config
}

/// Get the global cmext config directory (~/.cmext).
pub fn global_config_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|b| b.home_dir().join(".cmext"))
}

/// Get the project config path (.cmext/config.toml).
pub fn project_config_path(project_root: &Path) -> PathBuf {
    project_root.join(".cmext").join("config.toml")
}
