//! cmext CLI - builds CMake projects into interpreter extension modules

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;

use cli::{Cli, Commands};
use cmext::util::diagnostic::emit;
use cmext::BuildError;

/// Environment variable overriding the log filter.
const LOG_ENV: &str = "CMEXT_LOG";

fn main() {
    let cli = Cli::parse();
    let color = !cli.no_color;

    if let Err(e) = run(cli) {
        match e.downcast_ref::<BuildError>() {
            Some(build_error) => emit(&build_error.to_diagnostic(), color),
            None => eprintln!("error: {:#}", e),
        }
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    // Set up logging
    let default_filter = if cli.verbose {
        "cmext=debug"
    } else {
        "cmext=info"
    };
    let filter =
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_filter));

    // stdout carries JSON events, so logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_ansi(!cli.no_color)
        .with_writer(std::io::stderr)
        .init();

    let global = commands::GlobalArgs {
        verbose: cli.verbose,
        color: !cli.no_color,
        manifest_path: cli.manifest_path,
    };

    // Execute command
    match cli.command {
        Commands::Build(args) => commands::build::execute(args, &global),
        Commands::Plan(args) => commands::plan::execute(args, &global),
        Commands::Doctor => commands::doctor::execute(&global),
        Commands::Clean(args) => commands::clean::execute(args, &global),
        Commands::Completions(args) => commands::completions::execute(args),
    }
}
