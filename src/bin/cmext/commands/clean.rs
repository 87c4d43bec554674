//! `cmext clean` command

use anyhow::Result;

use crate::cli::CleanArgs;
use crate::commands::{load_workspace, GlobalArgs};
use cmext::ops::{clean, CleanOptions};

pub fn execute(args: CleanArgs, global: &GlobalArgs) -> Result<()> {
    let ctx = global.context()?;
    let (ws, _config) = load_workspace(&ctx, global)?;

    let opts = CleanOptions {
        extensions: args.extensions,
    };

    for dir in clean(&ws, &opts)? {
        eprintln!("     Removed {}", dir.display());
    }

    Ok(())
}
