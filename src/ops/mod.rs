//! High-level operations.
//!
//! This module contains the implementation of cmext commands.

pub mod build_ext;
pub mod clean;
pub mod doctor;

pub use build_ext::{resolve_interpreter, BuildOptions, BuildSummary, ExtensionPackager};
pub use clean::{clean, CleanOptions};
pub use doctor::{doctor, format_report, DoctorOptions, DoctorReport};
