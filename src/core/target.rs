//! Native targets - one CMake project compiled into one loadable module.

use std::path::{Path, PathBuf};

use serde::Serialize;

/// One declared unit of native code built into a loadable binary artifact.
///
/// Immutable once constructed; the planner and invoker only read it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NativeTarget {
    name: String,
    source_dir: PathBuf,
    version: String,
    cmake_target: String,
    output_dir: Option<PathBuf>,
    cmake_args: Vec<String>,
}

impl NativeTarget {
    /// Create a target whose build phase is restricted to a CMake target of the same name.
    pub fn new(
        name: impl Into<String>,
        source_dir: impl Into<PathBuf>,
        version: impl Into<String>,
    ) -> Self {
        let name = name.into();
        NativeTarget {
            cmake_target: name.clone(),
            name,
            source_dir: source_dir.into(),
            version: version.into(),
            output_dir: None,
            cmake_args: Vec::new(),
        }
    }

    /// Set the CMake target built in the build phase.
    pub fn with_cmake_target(mut self, cmake_target: impl Into<String>) -> Self {
        self.cmake_target = cmake_target.into();
        self
    }

    /// Override the directory the artifact is written to.
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    /// Extra configure arguments for this target only.
    pub fn with_cmake_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.cmake_args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source_dir(&self) -> &Path {
        &self.source_dir
    }

    /// Declared version, embedded into the compiled module.
    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn cmake_target(&self) -> &str {
        &self.cmake_target
    }

    pub fn output_dir(&self) -> Option<&Path> {
        self.output_dir.as_deref()
    }

    pub fn cmake_args(&self) -> &[String] {
        &self.cmake_args
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cmake_target_defaults_to_name() {
        let target = NativeTarget::new("lightseq", "/src", "0.1.0");
        assert_eq!(target.cmake_target(), "lightseq");
        assert!(target.output_dir().is_none());
        assert!(target.cmake_args().is_empty());
    }

    #[test]
    fn test_builder_overrides() {
        let target = NativeTarget::new("core", "/src", "1.2.0")
            .with_cmake_target("core_ext")
            .with_output_dir("/out")
            .with_cmake_args(["-DUSE_NEW_ARCH=ON"]);

        assert_eq!(target.name(), "core");
        assert_eq!(target.source_dir(), Path::new("/src"));
        assert_eq!(target.version(), "1.2.0");
        assert_eq!(target.cmake_target(), "core_ext");
        assert_eq!(target.output_dir(), Some(Path::new("/out")));
        assert_eq!(target.cmake_args(), ["-DUSE_NEW_ARCH=ON"]);
    }
}
