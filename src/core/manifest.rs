//! `Cmext.toml` manifest parsing.
//!
//! ```toml
//! [package]
//! name = "lightseq"
//! version = "0.1.0"
//!
//! [[extension]]
//! name = "lightseq"
//! source-dir = "."
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use semver::Version;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::target::NativeTarget;
use crate::util::fs::absolutize;

/// Manifest file name.
pub const MANIFEST_NAME: &str = "Cmext.toml";

/// Errors locating a manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("could not find `{}` in `{}` or any parent directory", MANIFEST_NAME, .dir.display())]
    NotFound { dir: PathBuf },
}

/// Package metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageMeta {
    pub name: String,
    pub version: String,
}

/// A declared extension, as written in the manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ExtensionSpec {
    pub name: String,

    /// CMake source directory, relative to the manifest
    #[serde(default = "default_source_dir")]
    pub source_dir: PathBuf,

    /// CMake target built in the build phase (defaults to `name`)
    #[serde(default)]
    pub cmake_target: Option<String>,

    /// Artifact directory (defaults to the shared `target/lib/`)
    #[serde(default)]
    pub output_dir: Option<PathBuf>,

    /// Extra configure arguments
    #[serde(default)]
    pub cmake_args: Vec<String>,
}

fn default_source_dir() -> PathBuf {
    PathBuf::from(".")
}

/// Names become directories under `target/build/`, so each must be a single
/// plain path component.
fn is_valid_extension_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

#[derive(Debug, Deserialize)]
struct RawManifest {
    package: PackageMeta,
    #[serde(default, rename = "extension")]
    extensions: Vec<ExtensionSpec>,
}

/// A parsed and validated manifest.
#[derive(Debug, Clone)]
pub struct Manifest {
    package: PackageMeta,
    version: Version,
    extensions: Vec<ExtensionSpec>,
}

impl Manifest {
    /// Load a manifest from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read manifest: {}", path.display()))?;

        Self::parse(&content)
            .with_context(|| format!("invalid manifest: {}", path.display()))
    }

    /// Parse manifest content.
    pub fn parse(content: &str) -> Result<Self> {
        let raw: RawManifest =
            toml::from_str(content).with_context(|| format!("failed to parse {}", MANIFEST_NAME))?;

        let version = Version::parse(&raw.package.version).with_context(|| {
            format!(
                "package version `{}` is not a valid semantic version",
                raw.package.version
            )
        })?;

        if raw.extensions.is_empty() {
            bail!("no [[extension]] declared for package `{}`", raw.package.name);
        }

        let mut seen = HashSet::new();
        for ext in &raw.extensions {
            if !is_valid_extension_name(&ext.name) {
                bail!(
                    "invalid extension name `{}`: use letters, digits, `_`, `-` and `.`",
                    ext.name
                );
            }
            if !seen.insert(ext.name.as_str()) {
                bail!("extension `{}` is declared more than once", ext.name);
            }
        }

        Ok(Manifest {
            package: raw.package,
            version,
            extensions: raw.extensions,
        })
    }

    pub fn package(&self) -> &PackageMeta {
        &self.package
    }

    pub fn version(&self) -> &Version {
        &self.version
    }

    pub fn extensions(&self) -> &[ExtensionSpec] {
        &self.extensions
    }

    /// Resolve declared extensions into native targets rooted at `root`.
    pub fn native_targets(&self, root: &Path) -> Vec<NativeTarget> {
        let version = self.version.to_string();

        self.extensions
            .iter()
            .map(|ext| {
                let mut target =
                    NativeTarget::new(&ext.name, absolutize(root, &ext.source_dir), &version)
                        .with_cmake_args(ext.cmake_args.iter().cloned());

                if let Some(ref cmake_target) = ext.cmake_target {
                    target = target.with_cmake_target(cmake_target);
                }
                if let Some(ref dir) = ext.output_dir {
                    target = target.with_output_dir(absolutize(root, dir));
                }
                target
            })
            .collect()
    }
}
