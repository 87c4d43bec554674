//! Command implementations

use std::path::PathBuf;

use anyhow::{anyhow, Result};

use cmext::util::config::Config;
use cmext::util::diagnostic::suggestions;
use cmext::util::GlobalContext;
use cmext::Workspace;

pub mod build;
pub mod clean;
pub mod completions;
pub mod doctor;
pub mod plan;

/// Options shared by every subcommand.
pub struct GlobalArgs {
    pub verbose: bool,
    pub color: bool,
    pub manifest_path: Option<PathBuf>,
}

impl GlobalArgs {
    pub fn context(&self) -> Result<GlobalContext> {
        let mut ctx = GlobalContext::new()?;
        ctx.set_verbose(self.verbose);
        ctx.set_color(self.color);
        Ok(ctx)
    }
}

/// Locate and load the workspace plus its merged configuration.
pub fn load_workspace(ctx: &GlobalContext, global: &GlobalArgs) -> Result<(Workspace, Config)> {
    let manifest_path = match &global.manifest_path {
        Some(path) => ctx.cwd().join(path),
        None => ctx
            .find_manifest()
            .map_err(|e| anyhow!("{}\n{}", e, suggestions::NO_MANIFEST))?,
    };

    let ws = Workspace::new(&manifest_path)?;
    let config = ctx.load_config(ws.root());
    Ok((ws, config))
}
