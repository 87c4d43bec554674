//! Build error types and diagnostics.

use std::fmt;
use std::path::PathBuf;

use miette::Diagnostic as MietteDiagnostic;
use serde::Serialize;
use thiserror::Error;

use crate::builder::plan::PlatformFamily;
use crate::builder::toolchain::ToolVersion;
use crate::util::diagnostic::{suggestions, Diagnostic};

/// The two external-tool phases of a build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Configure,
    Build,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Configure => write!(f, "configure"),
            Phase::Build => write!(f, "build"),
        }
    }
}

/// Render an exit code, or "signal" for a killed process.
pub fn display_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => code.to_string(),
        None => "signal".to_string(),
    }
}

/// Fatal error while gating, planning or building an extension.
#[derive(Debug, Error, MietteDiagnostic)]
pub enum BuildError {
    #[error(
        "CMake must be installed to build the following extensions: {}",
        .required_by.join(", ")
    )]
    #[diagnostic(code(cmext::toolchain::missing))]
    ToolchainMissing {
        program: PathBuf,
        required_by: Vec<String>,
    },

    #[error("CMake >= {required} is required on {platform} (found {found})")]
    #[diagnostic(code(cmext::toolchain::too_old))]
    ToolchainTooOld {
        found: ToolVersion,
        required: ToolVersion,
        platform: PlatformFamily,
    },

    #[error("could not determine the version of `{}` from its --version output", .program.display())]
    #[diagnostic(code(cmext::toolchain::unparseable))]
    ToolchainVersionUnparseable { program: PathBuf, output: String },

    #[error("configure failed for extension `{target}` (exit code {})", display_code(.code))]
    #[diagnostic(code(cmext::build::configure))]
    ConfigureFailed {
        target: String,
        command: String,
        code: Option<i32>,
        build_dir: PathBuf,
    },

    #[error("build failed for extension `{target}` (exit code {})", display_code(.code))]
    #[diagnostic(code(cmext::build::build))]
    BuildFailed {
        target: String,
        command: String,
        code: Option<i32>,
        build_dir: PathBuf,
    },

    #[error("environment variable {name}={value:?} is not an integer")]
    #[diagnostic(code(cmext::plan::feature_flag), help("use 0 to disable or 1 to enable"))]
    InvalidFeatureFlag { name: String, value: String },

    #[error("no interpreter found to pass to the configure step")]
    #[diagnostic(
        code(cmext::plan::interpreter),
        help("install python3, pass --interpreter, or set build.interpreter in .cmext/config.toml")
    )]
    InterpreterMissing,

    #[error("{phase} of extension `{target}` was cancelled")]
    #[diagnostic(code(cmext::build::cancelled))]
    Cancelled { target: String, phase: Phase },

    #[error("failed to run `{command}` for extension `{target}`")]
    #[diagnostic(code(cmext::build::spawn))]
    Spawn {
        target: String,
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to create build directory {}", .path.display())]
    #[diagnostic(code(cmext::build::io))]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to remove stale artifact {}", .path.display())]
    #[diagnostic(code(cmext::build::stale_artifact))]
    StaleArtifact {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl BuildError {
    /// Extension the error belongs to, if it is target-specific.
    pub fn target(&self) -> Option<&str> {
        match self {
            BuildError::ConfigureFailed { target, .. }
            | BuildError::BuildFailed { target, .. }
            | BuildError::Cancelled { target, .. }
            | BuildError::Spawn { target, .. } => Some(target),
            _ => None,
        }
    }

    /// Phase the error occurred in, if any.
    pub fn phase(&self) -> Option<Phase> {
        match self {
            BuildError::ConfigureFailed { .. } => Some(Phase::Configure),
            BuildError::BuildFailed { .. } => Some(Phase::Build),
            BuildError::Cancelled { phase, .. } => Some(*phase),
            _ => None,
        }
    }

    /// Convert to a user-friendly diagnostic.
    pub fn to_diagnostic(&self) -> Diagnostic {
        let diag = Diagnostic::error(self.to_string());

        match self {
            BuildError::ToolchainMissing { program, .. } => diag
                .with_context(format!("tried to run `{} --version`", program.display()))
                .with_suggestion(suggestions::INSTALL_CMAKE),

            BuildError::ToolchainTooOld { .. } => {
                diag.with_suggestion(suggestions::UPGRADE_CMAKE)
            }

            BuildError::ToolchainVersionUnparseable { output, .. } => {
                let first = output.lines().next().unwrap_or("").trim();
                diag.with_context(format!("output began with: {:?}", first))
                    .with_suggestion(suggestions::INSTALL_CMAKE)
            }

            BuildError::ConfigureFailed { command, build_dir, .. }
            | BuildError::BuildFailed { command, build_dir, .. } => diag
                .with_location(build_dir)
                .with_context(format!("command: {}", command))
                .with_suggestion(suggestions::BUILD_FAILED),

            BuildError::Spawn { source, .. }
            | BuildError::Io { source, .. }
            | BuildError::StaleArtifact { source, .. } => {
                diag.with_context(source.to_string())
            }

            BuildError::InvalidFeatureFlag { .. }
            | BuildError::InterpreterMissing
            | BuildError::Cancelled { .. } => {
                match MietteDiagnostic::help(self) {
                    Some(help) => diag.with_suggestion(help.to_string()),
                    None => diag,
                }
            }
        }
    }
}
