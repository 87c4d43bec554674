//! `cmext build` command

use anyhow::{bail, Result};

use crate::cli::{BuildArgs, MessageFormat};
use crate::commands::{load_workspace, GlobalArgs};
use cmext::builder::events::{EventSink, JsonLinesSink, NullSink};
use cmext::ops::{BuildOptions, ExtensionPackager};
use cmext::util::diagnostic::{emit, Diagnostic};
use cmext::util::OsProcessRunner;

pub fn execute(args: BuildArgs, global: &GlobalArgs) -> Result<()> {
    let ctx = global.context()?;
    let (ws, config) = load_workspace(&ctx, global)?;

    let json = args.message_format == MessageFormat::Json;
    let json_sink = JsonLinesSink::new();
    let events: &dyn EventSink = if json { &json_sink } else { &NullSink };

    let opts = BuildOptions {
        extensions: args.extensions,
        jobs: args.jobs,
        interpreter: args.interpreter,
        progress: !json && !global.verbose,
    };

    let runner = OsProcessRunner::new().stdout_to_stderr(json);
    let summary = ExtensionPackager::new(&ws, &config, &runner)
        .events(events)
        .build(&opts)?;

    if !json {
        for outcome in &summary.outcomes {
            match &outcome.result {
                Ok(built) => {
                    eprintln!(
                        "       Built {} -> {}",
                        outcome.target,
                        built.output_dir.display()
                    );
                    if built.artifacts.is_empty() {
                        let warning = Diagnostic::warning(format!(
                            "no loadable module for `{}` was found",
                            outcome.target
                        ))
                        .with_location(&built.output_dir);
                        emit(&warning, ctx.color());
                    }
                }
                Err(e) => emit(&e.to_diagnostic(), ctx.color()),
            }
        }

        eprintln!(
            "    Finished {} extension(s) in {:.2}s",
            summary.built_count(),
            summary.duration.as_secs_f64()
        );
    }

    if !summary.success() {
        let failed = summary.outcomes.len() - summary.built_count();
        bail!(
            "{} of {} extension(s) failed to build",
            failed,
            summary.outcomes.len()
        );
    }

    Ok(())
}
