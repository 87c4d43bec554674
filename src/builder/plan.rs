//! Configure/build argument planning.
//!
//! The planner is a pure function of its inputs: the environment is captured
//! once into an [`EnvironmentView`], feature flags are frozen into
//! [`FeatureFlags`], and every [`BuildConfig`] carries its own copy of the
//! environment for the configure phase.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::builder::errors::BuildError;
use crate::core::target::NativeTarget;
use crate::util::fs::{absolutize, with_trailing_separator};

/// Disables the reduced-precision (FP16) compute mode when non-zero.
pub const ENABLE_FP32_ENV: &str = "ENABLE_FP32";

/// Enables the extension's debug mode when non-zero.
pub const ENABLE_DEBUG_ENV: &str = "ENABLE_DEBUG";

/// Compiler flags variable extended with the version define.
pub const CXXFLAGS_ENV: &str = "CXXFLAGS";

/// Build mode passed to CMake. Debug instrumentation is layered on top via
/// `DEBUG_MODE` rather than switching the build type.
pub const BUILD_MODE: &str = "Release";

/// Snapshot of process environment variables.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvironmentView {
    vars: BTreeMap<String, String>,
}

impl EnvironmentView {
    /// Capture the current process environment.
    ///
    /// Variables whose name or value is not valid UTF-8 are skipped here; the
    /// child processes still inherit them untouched.
    pub fn capture() -> Self {
        let vars = std::env::vars_os()
            .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
            .collect();
        EnvironmentView { vars }
    }

    /// Build a view from explicit pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        EnvironmentView {
            vars: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// Read an integer toggle: absent or zero is off, any other integer is on.
    pub fn int_flag(&self, name: &str) -> Result<bool, BuildError> {
        match self.get(name) {
            None => Ok(false),
            Some(value) => parse_int_flag(value).ok_or_else(|| BuildError::InvalidFeatureFlag {
                name: name.to_string(),
                value: value.to_string(),
            }),
        }
    }
}

/// Integer truthiness of `value`, or `None` if it is not an integer.
///
/// Accepts surrounding whitespace and a leading sign; magnitude is unbounded.
fn parse_int_flag(value: &str) -> Option<bool> {
    let trimmed = value.trim();
    let digits = trimmed.strip_prefix(&['+', '-'][..]).unwrap_or(trimmed);

    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(digits.bytes().any(|b| b != b'0'))
}

/// Feature toggles, read once from the environment and frozen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FeatureFlags {
    /// Full precision requested; suppresses `FP16_MODE`
    pub fp32: bool,
    /// Debug instrumentation requested
    pub debug: bool,
}

impl FeatureFlags {
    pub fn from_env(env: &EnvironmentView) -> Result<Self, BuildError> {
        Ok(FeatureFlags {
            fp32: env.int_flag(ENABLE_FP32_ENV)?,
            debug: env.int_flag(ENABLE_DEBUG_ENV)?,
        })
    }
}

/// Platform families with distinct CMake argument conventions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformFamily {
    Windows,
    /// Every non-Windows platform
    Other,
}

impl PlatformFamily {
    /// The family of the platform this binary runs on.
    pub fn host() -> Self {
        Self::from_os(std::env::consts::OS)
    }

    /// Map an OS identifier (`std::env::consts::OS` style) to a family.
    pub fn from_os(os: &str) -> Self {
        if os.eq_ignore_ascii_case("windows") {
            PlatformFamily::Windows
        } else {
            PlatformFamily::Other
        }
    }

    /// Whether the CMake minimum version is enforced on this platform.
    pub fn enforces_version_gate(self) -> bool {
        matches!(self, PlatformFamily::Windows)
    }
}

impl fmt::Display for PlatformFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlatformFamily::Windows => write!(f, "Windows"),
            PlatformFamily::Other => write!(f, "this platform"),
        }
    }
}

/// Directories the planner places outputs in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildLayout {
    /// Base for relative paths
    pub root: PathBuf,
    /// Default artifact directory
    pub lib_dir: PathBuf,
    /// Parent of the per-target build directories
    pub build_root: PathBuf,
}

impl BuildLayout {
    /// Standard layout under `target_dir`: `lib/` and `build/`.
    pub fn new(root: impl Into<PathBuf>, target_dir: &Path) -> Self {
        let root = root.into();
        let target_dir = absolutize(&root, target_dir);
        BuildLayout {
            lib_dir: target_dir.join("lib"),
            build_root: target_dir.join("build"),
            root,
        }
    }
}

/// Everything needed to configure and build one target.
#[derive(Debug, Clone, Serialize)]
pub struct BuildConfig {
    pub target: String,
    pub platform: PlatformFamily,
    pub build_mode: String,
    pub features: FeatureFlags,
    /// Absolute, with exactly one trailing separator
    pub output_dir: PathBuf,
    /// Working directory of both phases
    pub build_dir: PathBuf,
    pub interpreter: PathBuf,
    pub configure_args: Vec<String>,
    pub build_args: Vec<String>,
    /// `CXXFLAGS` for the configure phase, overlaid on the inherited environment
    pub cxxflags: String,
}

/// Derives [`BuildConfig`]s for native targets.
#[derive(Debug, Clone)]
pub struct ConfigurationPlanner {
    layout: BuildLayout,
    interpreter: PathBuf,
    env: EnvironmentView,
    features: FeatureFlags,
    platform: PlatformFamily,
    pointer_width: u32,
    extra_args: Vec<String>,
}

impl ConfigurationPlanner {
    /// Create a planner for the host platform.
    ///
    /// Feature flags are read from `env` here and never again.
    pub fn new(
        layout: BuildLayout,
        interpreter: impl Into<PathBuf>,
        env: EnvironmentView,
    ) -> Result<Self, BuildError> {
        let features = FeatureFlags::from_env(&env)?;
        tracing::debug!(
            "feature flags: fp32={} debug={}",
            features.fp32,
            features.debug
        );

        Ok(ConfigurationPlanner {
            layout,
            interpreter: interpreter.into(),
            env,
            features,
            platform: PlatformFamily::host(),
            pointer_width: usize::BITS,
            extra_args: Vec::new(),
        })
    }

    /// Plan for a specific platform family instead of the host.
    pub fn platform(mut self, platform: PlatformFamily) -> Self {
        self.platform = platform;
        self
    }

    /// Override the pointer width used for the Windows architecture selector.
    pub fn pointer_width(mut self, bits: u32) -> Self {
        self.pointer_width = bits;
        self
    }

    /// Configure arguments appended to every target's plan.
    pub fn extra_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.extra_args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn features(&self) -> FeatureFlags {
        self.features
    }

    pub fn layout(&self) -> &BuildLayout {
        &self.layout
    }

    /// Artifact directory for `target`, with a trailing separator.
    pub fn output_dir(&self, target: &NativeTarget) -> PathBuf {
        let dir = match target.output_dir() {
            Some(dir) => absolutize(&self.layout.root, dir),
            None => self.layout.lib_dir.clone(),
        };
        with_trailing_separator(&dir)
    }

    /// Plan the configure and build phases for `target`.
    pub fn plan(&self, target: &NativeTarget) -> BuildConfig {
        let output_dir = self.output_dir(target);
        let outdir = output_dir.to_string_lossy().into_owned();

        let mut configure_args = vec![
            format!("-DCMAKE_LIBRARY_OUTPUT_DIRECTORY={}", outdir),
            format!("-DPYTHON_EXECUTABLE={}", self.interpreter.display()),
        ];
        let mut build_args = vec!["--config".to_string(), BUILD_MODE.to_string()];

        match self.platform {
            PlatformFamily::Windows => {
                self.windows_args(&outdir, &mut configure_args, &mut build_args)
            }
            PlatformFamily::Other => {
                self.unix_args(target, &mut configure_args, &mut build_args)
            }
        }

        configure_args.extend(self.extra_args.iter().cloned());
        configure_args.extend(target.cmake_args().iter().cloned());

        let cxxflags = version_cxxflags(self.env.get(CXXFLAGS_ENV), target.version());

        BuildConfig {
            target: target.name().to_string(),
            platform: self.platform,
            build_mode: BUILD_MODE.to_string(),
            features: self.features,
            output_dir,
            build_dir: self.layout.build_root.join(target.name()),
            interpreter: self.interpreter.clone(),
            configure_args,
            build_args,
            cxxflags,
        }
    }

    fn windows_args(&self, outdir: &str, configure: &mut Vec<String>, build: &mut Vec<String>) {
        configure.push(format!(
            "-DCMAKE_LIBRARY_OUTPUT_DIRECTORY_{}={}",
            BUILD_MODE.to_uppercase(),
            outdir
        ));
        if self.pointer_width > 32 {
            configure.extend(["-A".to_string(), "x64".to_string()]);
        }
        // MSBuild: use every core
        build.extend(["--".to_string(), "/m".to_string()]);
    }

    fn unix_args(&self, target: &NativeTarget, configure: &mut Vec<String>, build: &mut Vec<String>) {
        configure.push(format!("-DCMAKE_BUILD_TYPE={}", BUILD_MODE));
        if !self.features.fp32 {
            configure.push("-DFP16_MODE=ON".to_string());
        }
        if self.features.debug {
            configure.push("-DDEBUG_MODE=ON".to_string());
        }
        build.extend([
            "--target".to_string(),
            target.cmake_target().to_string(),
            "--".to_string(),
            "-j".to_string(),
        ]);
    }
}

/// Inherited compiler flags followed by `-DVERSION_INFO=\"<version>\"`.
///
/// The escaped quotes survive CMake so the macro expands to a string literal.
pub fn version_cxxflags(inherited: Option<&str>, version: &str) -> String {
    format!(
        "{} -DVERSION_INFO=\\\"{}\\\"",
        inherited.unwrap_or(""),
        version
    )
}
