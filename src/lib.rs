//! cmext - builds CMake-driven native sources into interpreter extension modules
//!
//! This crate provides the library behind the `cmext` binary: toolchain
//! gating, per-target configuration planning, and the two-phase CMake build.

pub mod builder;
pub mod core;
pub mod ops;
pub mod util;

/// Test utilities and mocks for cmext unit tests.
///
/// This module is only available when compiling with `--cfg test` or
/// running tests. It provides a scriptable process runner.
#[cfg(test)]
pub mod test_support;

pub use builder::BuildError;
pub use core::{Manifest, NativeTarget, Workspace};
pub use util::context::GlobalContext;
