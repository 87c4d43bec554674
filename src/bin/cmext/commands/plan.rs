//! `cmext plan` command

use anyhow::Result;

use crate::cli::PlanArgs;
use crate::commands::{load_workspace, GlobalArgs};
use cmext::ops::{BuildOptions, ExtensionPackager};
use cmext::util::OsProcessRunner;

pub fn execute(args: PlanArgs, global: &GlobalArgs) -> Result<()> {
    let ctx = global.context()?;
    let (ws, config) = load_workspace(&ctx, global)?;

    let opts = BuildOptions {
        extensions: args.extensions,
        interpreter: args.interpreter,
        ..Default::default()
    };

    let runner = OsProcessRunner::new();
    let work = ExtensionPackager::new(&ws, &config, &runner).plan(&opts)?;
    let configs: Vec<_> = work.into_iter().map(|(_, config)| config).collect();

    println!("{}", serde_json::to_string_pretty(&configs)?);
    Ok(())
}
