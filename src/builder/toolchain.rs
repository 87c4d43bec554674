//! CMake discovery and version gating.

use std::cmp::Ordering;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::builder::errors::BuildError;
use crate::builder::plan::PlatformFamily;
use crate::util::process::{ProcessBuilder, ProcessRunner};

/// First dotted number following the word "version".
static VERSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"version\s*([\d.]+)").expect("version regex is valid"));

/// A dotted numeric tool version, compared component-wise.
///
/// Missing trailing components compare as zero, so `3.1` == `3.1.0`.
#[derive(Debug, Clone, Eq, Serialize)]
#[serde(into = "String")]
pub struct ToolVersion {
    components: Vec<u64>,
}

impl ToolVersion {
    pub fn new(components: impl Into<Vec<u64>>) -> Self {
        ToolVersion {
            components: components.into(),
        }
    }

    pub fn components(&self) -> &[u64] {
        &self.components
    }

    /// Extract the version from a `--version` query output.
    ///
    /// Only the first match is considered.
    pub fn extract(output: &str) -> Option<ToolVersion> {
        let token = VERSION_RE.captures(output)?.get(1)?.as_str();
        token.parse().ok()
    }

    fn component(&self, i: usize) -> u64 {
        self.components.get(i).copied().unwrap_or(0)
    }
}

impl FromStr for ToolVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // A trailing dot ("3.1." in "version 3.1.") is punctuation, not a component.
        let trimmed = s.trim().trim_end_matches('.');
        if trimmed.is_empty() {
            return Err(format!("invalid version `{}`", s));
        }

        trimmed
            .split('.')
            .map(|part| {
                part.parse::<u64>()
                    .map_err(|_| format!("invalid version `{}`", s))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(ToolVersion::new)
    }
}

impl PartialEq for ToolVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl PartialOrd for ToolVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ToolVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.components.len().max(other.components.len());
        (0..len)
            .map(|i| self.component(i).cmp(&other.component(i)))
            .find(|o| o.is_ne())
            .unwrap_or(Ordering::Equal)
    }
}

impl fmt::Display for ToolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.components.iter().map(u64::to_string).collect();
        f.write_str(&parts.join("."))
    }
}

impl From<ToolVersion> for String {
    fn from(v: ToolVersion) -> Self {
        v.to_string()
    }
}

/// Result of a successful probe.
#[derive(Debug, Clone, Serialize)]
pub struct ToolchainInfo {
    /// Program that answered the version query
    pub program: PathBuf,
    /// Reported version, when one could be extracted
    pub version: Option<ToolVersion>,
    /// Whether the minimum version was enforced
    pub gated: bool,
}

/// Verifies the meta-build tool exists and, where required, is recent enough.
pub struct ToolchainProbe<'a> {
    runner: &'a dyn ProcessRunner,
    program: PathBuf,
    platform: PlatformFamily,
    minimum: ToolVersion,
    enforce_everywhere: bool,
    required_by: Vec<String>,
}

impl<'a> ToolchainProbe<'a> {
    /// Create a probe for `program` on `platform` with the given minimum version.
    pub fn new(
        runner: &'a dyn ProcessRunner,
        program: impl Into<PathBuf>,
        platform: PlatformFamily,
        minimum: ToolVersion,
    ) -> Self {
        ToolchainProbe {
            runner,
            program: program.into(),
            platform,
            minimum,
            enforce_everywhere: false,
            required_by: Vec::new(),
        }
    }

    /// Names of the targets that need the tool, reported if it is missing.
    pub fn required_by(mut self, names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.required_by.extend(names.into_iter().map(Into::into));
        self
    }

    /// Gate the version on every platform, not only version-sensitive ones.
    pub fn enforce_everywhere(mut self, enforce: bool) -> Self {
        self.enforce_everywhere = enforce;
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    fn gated(&self) -> bool {
        self.enforce_everywhere || self.platform.enforces_version_gate()
    }

    /// Run the version query and apply the gate.
    pub fn verify(&self) -> Result<ToolchainInfo, BuildError> {
        let cmd = ProcessBuilder::new(&self.program).arg("--version");
        tracing::debug!("checking `{}`", cmd);

        let output = match self.runner.output(&cmd) {
            Ok(output) => output,
            Err(e) => {
                tracing::debug!("`{}` could not be run: {:?}", cmd, e);
                return Err(self.missing());
            }
        };

        // A tool that exists but cannot answer its version query is unusable.
        if !output.status.success() {
            tracing::debug!(
                "`{}` exited with {:?}: {}",
                cmd,
                output.status.code,
                output.stderr.trim()
            );
            return Err(self.missing());
        }

        let version = ToolVersion::extract(&output.stdout);
        let gated = self.gated();

        if gated {
            let Some(found) = version.clone() else {
                return Err(BuildError::ToolchainVersionUnparseable {
                    program: self.program.clone(),
                    output: output.stdout,
                });
            };

            if found < self.minimum {
                return Err(BuildError::ToolchainTooOld {
                    found,
                    required: self.minimum.clone(),
                    platform: self.platform,
                });
            }
        }

        match version {
            Some(ref v) => tracing::info!("Using CMake {} ({})", v, self.program.display()),
            None => tracing::warn!(
                "CMake version could not be determined ({})",
                self.program.display()
            ),
        }

        Ok(ToolchainInfo {
            program: self.program.clone(),
            version,
            gated,
        })
    }

    fn missing(&self) -> BuildError {
        BuildError::ToolchainMissing {
            program: self.program.clone(),
            required_by: self.required_by.clone(),
        }
    }
}
