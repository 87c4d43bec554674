//! CLI definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;

/// cmext - build CMake projects into interpreter extension modules
#[derive(Parser)]
#[command(name = "cmext")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Path to Cmext.toml (defaults to searching upward from the current directory)
    #[arg(long, global = true, value_name = "PATH")]
    pub manifest_path: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Configure and build extensions
    Build(BuildArgs),

    /// Print the planned CMake invocations as JSON (runs nothing)
    Plan(PlanArgs),

    /// Check CMake, the interpreter and the build environment
    Doctor,

    /// Remove build outputs
    Clean(CleanArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum MessageFormat {
    /// Progress and diagnostics for humans
    #[default]
    Human,
    /// One JSON event per line on stdout
    Json,
}

#[derive(Args)]
pub struct BuildArgs {
    /// Extension to build (repeatable; defaults to all)
    #[arg(short, long = "extension", value_name = "NAME")]
    pub extensions: Vec<String>,

    /// Number of extensions built at once
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Interpreter passed to CMake as PYTHON_EXECUTABLE
    #[arg(long, value_name = "PATH")]
    pub interpreter: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum, default_value_t = MessageFormat::Human)]
    pub message_format: MessageFormat,
}

#[derive(Args)]
pub struct PlanArgs {
    /// Extension to plan (repeatable; defaults to all)
    #[arg(short, long = "extension", value_name = "NAME")]
    pub extensions: Vec<String>,

    /// Interpreter passed to CMake as PYTHON_EXECUTABLE
    #[arg(long, value_name = "PATH")]
    pub interpreter: Option<PathBuf>,
}

#[derive(Args)]
pub struct CleanArgs {
    /// Only remove this extension's build tree (repeatable)
    #[arg(short, long = "extension", value_name = "NAME")]
    pub extensions: Vec<String>,
}

#[derive(Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}
