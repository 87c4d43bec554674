//! Workspace - the manifest, its root directory and the output layout.

use std::path::{Path, PathBuf};

use anyhow::{bail, Result};

use crate::core::manifest::Manifest;
use crate::core::target::NativeTarget;
use crate::util::fs::normalize_path;
use crate::util::diagnostic::suggestions;

/// A loaded project containing one or more extensions.
#[derive(Debug)]
pub struct Workspace {
    manifest: Manifest,

    /// Directory containing the manifest
    root: PathBuf,

    /// Target directory for build outputs
    target_dir: PathBuf,
}

impl Workspace {
    /// Create a new workspace from a manifest path.
    pub fn new(manifest_path: &Path) -> Result<Self> {
        let manifest = Manifest::load(manifest_path)?;
        let root = normalize_path(manifest_path.parent().unwrap_or(Path::new(".")));
        let target_dir = root.join("target");

        Ok(Workspace {
            manifest,
            root,
            target_dir,
        })
    }

    /// Create a workspace with a custom target directory.
    pub fn with_target_dir(mut self, target_dir: PathBuf) -> Self {
        self.target_dir = target_dir;
        self
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// Get the workspace root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get the target directory.
    pub fn target_dir(&self) -> &Path {
        &self.target_dir
    }

    /// Shared directory the built modules land in unless overridden.
    pub fn lib_dir(&self) -> PathBuf {
        self.target_dir.join("lib")
    }

    /// Root of the per-extension CMake build trees.
    pub fn build_root(&self) -> PathBuf {
        self.target_dir.join("build")
    }

    /// All declared extensions as native targets.
    pub fn native_targets(&self) -> Vec<NativeTarget> {
        self.manifest.native_targets(&self.root)
    }

    /// Declared extensions filtered by name; an empty filter selects all.
    pub fn select_targets(&self, names: &[String]) -> Result<Vec<NativeTarget>> {
        let all = self.native_targets();
        if names.is_empty() {
            return Ok(all);
        }

        for name in names {
            if !all.iter().any(|t| t.name() == name) {
                bail!(
                    "no extension named `{}` in {}\n{}",
                    name,
                    self.root.display(),
                    suggestions::EXTENSION_NOT_FOUND
                );
            }
        }

        Ok(all
            .into_iter()
            .filter(|t| names.iter().any(|n| n == t.name()))
            .collect())
    }
}
