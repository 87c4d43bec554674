//! `cmext doctor` command

use anyhow::{bail, Result};

use crate::commands::GlobalArgs;
use cmext::builder::plan::{EnvironmentView, PlatformFamily};
use cmext::ops::{doctor, format_report, DoctorOptions};
use cmext::util::OsProcessRunner;

pub fn execute(global: &GlobalArgs) -> Result<()> {
    let ctx = global.context()?;

    // Project config applies when run inside a project, but is not required
    let root = match &global.manifest_path {
        Some(path) => ctx
            .cwd()
            .join(path)
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| ctx.cwd().to_path_buf()),
        None => ctx
            .find_manifest()
            .ok()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
            .unwrap_or_else(|| ctx.cwd().to_path_buf()),
    };
    let config = ctx.load_config(&root);

    let runner = OsProcessRunner::new();
    let report = doctor(DoctorOptions {
        config: &config,
        runner: &runner,
        env: EnvironmentView::capture(),
        platform: PlatformFamily::host(),
    });

    print!("{}", format_report(&report, global.verbose));

    if !report.all_required_passed() {
        bail!(
            "{} required check(s) failed",
            report.required_failed_count()
        );
    }

    Ok(())
}
