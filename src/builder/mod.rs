//! CMake extension builds.
//!
//! This module gates the CMake toolchain, plans per-target configure and
//! build arguments, and runs the two phases for each extension.

pub mod errors;
pub mod events;
pub mod executor;
pub mod invoker;
pub mod plan;
pub mod toolchain;

pub use errors::{BuildError, Phase};
pub use events::{BuildEvent, EventSink};
pub use executor::{BuildExecutor, TargetOutcome};
pub use invoker::{BuildInvoker, InvocationResult};
pub use plan::{BuildConfig, ConfigurationPlanner, EnvironmentView, FeatureFlags, PlatformFamily};
pub use toolchain::{ToolVersion, ToolchainProbe};
