//! Core data model: manifests, workspaces and native targets.

pub mod manifest;
pub mod target;
pub mod workspace;

pub use manifest::Manifest;
pub use target::NativeTarget;
pub use workspace::Workspace;
