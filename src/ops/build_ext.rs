//! Implementation of `cmext build` and `cmext plan`.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};

use crate::builder::errors::BuildError;
use crate::builder::events::{BuildEvent, EventSink, NullSink};
use crate::builder::executor::{BuildExecutor, TargetOutcome};
use crate::builder::plan::{
    BuildConfig, BuildLayout, ConfigurationPlanner, EnvironmentView, PlatformFamily, BUILD_MODE,
};
use crate::builder::toolchain::{ToolVersion, ToolchainInfo, ToolchainProbe};
use crate::core::target::NativeTarget;
use crate::core::Workspace;
use crate::util::config::Config;
use crate::util::process::{find_interpreter, CancelToken, ProcessRunner};

/// Options for the build command.
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// Extensions to build (empty = all declared)
    pub extensions: Vec<String>,

    /// Number of extensions built at once
    pub jobs: Option<usize>,

    /// Interpreter passed to the configure step
    pub interpreter: Option<PathBuf>,

    /// Show a progress bar over extensions
    pub progress: bool,
}

/// What a build run produced.
#[derive(Debug)]
pub struct BuildSummary {
    pub toolchain: ToolchainInfo,
    pub outcomes: Vec<TargetOutcome>,
    pub duration: Duration,
}

impl BuildSummary {
    pub fn success(&self) -> bool {
        self.outcomes.iter().all(TargetOutcome::is_success)
    }

    pub fn built_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    /// Every failed extension's error, in declaration order.
    pub fn failures(&self) -> impl Iterator<Item = &BuildError> {
        self.outcomes.iter().filter_map(|o| o.result.as_ref().err())
    }
}

static NULL_SINK: NullSink = NullSink;

/// Builds the extensions of a workspace.
///
/// The toolchain is probed once for every selected extension; each extension
/// is then planned and built independently.
pub struct ExtensionPackager<'a> {
    workspace: &'a Workspace,
    config: &'a Config,
    runner: &'a dyn ProcessRunner,
    events: &'a dyn EventSink,
    env: EnvironmentView,
    platform: PlatformFamily,
    cancel: CancelToken,
}

impl<'a> ExtensionPackager<'a> {
    pub fn new(workspace: &'a Workspace, config: &'a Config, runner: &'a dyn ProcessRunner) -> Self {
        ExtensionPackager {
            workspace,
            config,
            runner,
            events: &NULL_SINK,
            env: EnvironmentView::capture(),
            platform: PlatformFamily::host(),
            cancel: CancelToken::new(),
        }
    }

    pub fn events(mut self, events: &'a dyn EventSink) -> Self {
        self.events = events;
        self
    }

    /// Use `env` instead of the process environment.
    pub fn env(mut self, env: EnvironmentView) -> Self {
        self.env = env;
        self
    }

    pub fn platform(mut self, platform: PlatformFamily) -> Self {
        self.platform = platform;
        self
    }

    pub fn cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// The CMake program builds run.
    pub fn program(&self) -> PathBuf {
        self.config.cmake_program()
    }

    /// Plan every selected extension without running anything.
    pub fn plan(&self, opts: &BuildOptions) -> Result<Vec<(NativeTarget, BuildConfig)>> {
        let targets = self.workspace.select_targets(&opts.extensions)?;
        let interpreter = resolve_interpreter(opts.interpreter.as_deref(), self.config)?;

        let layout = BuildLayout::new(self.workspace.root(), self.workspace.target_dir());
        let planner = ConfigurationPlanner::new(layout, interpreter, self.env.clone())?
            .platform(self.platform)
            .extra_args(self.config.cmake.args.iter().cloned());

        Ok(targets
            .into_iter()
            .map(|target| {
                let config = planner.plan(&target);
                (target, config)
            })
            .collect())
    }

    /// Check the CMake toolchain on behalf of `targets`.
    pub fn probe(&self, targets: &[NativeTarget]) -> Result<ToolchainInfo> {
        let minimum: ToolVersion = self
            .config
            .minimum_cmake()
            .parse()
            .map_err(|e: String| anyhow::anyhow!(e))
            .context("invalid cmake.minimum-version in config")?;

        let info = ToolchainProbe::new(self.runner, self.program(), self.platform, minimum)
            .required_by(targets.iter().map(|t| t.name().to_string()))
            .enforce_everywhere(self.config.cmake.enforce_minimum)
            .verify()?;

        Ok(info)
    }

    /// Probe, plan and build every selected extension.
    ///
    /// Returns `Ok` even when extensions fail; inspect
    /// [`BuildSummary::failures`]. Errors are reserved for problems that stop
    /// every extension (missing toolchain, bad feature flags, unknown names).
    pub fn build(&self, opts: &BuildOptions) -> Result<BuildSummary> {
        let start = Instant::now();

        let targets = self.workspace.select_targets(&opts.extensions)?;
        let toolchain = self.probe(&targets)?;
        let work = self.plan(opts)?;

        self.events
            .emit(BuildEvent::started(BUILD_MODE, self.platform, work.len()));

        let jobs = opts.jobs.or(self.config.build.jobs);
        let outcomes = BuildExecutor::new(self.runner, &toolchain.program)
            .jobs(jobs)
            .progress(opts.progress)
            .events(self.events)
            .cancel_token(self.cancel.clone())
            .execute(&work);

        let duration = start.elapsed();
        let summary = BuildSummary {
            toolchain,
            outcomes,
            duration,
        };

        self.events.emit(BuildEvent::finished(
            summary.built_count(),
            summary.outcomes.len() - summary.built_count(),
            duration.as_millis() as u64,
        ));

        Ok(summary)
    }
}

/// Interpreter for `-DPYTHON_EXECUTABLE`: CLI, then config, then PATH.
pub fn resolve_interpreter(cli: Option<&Path>, config: &Config) -> Result<PathBuf, BuildError> {
    cli.map(Path::to_path_buf)
        .or_else(|| config.build.interpreter.clone())
        .or_else(find_interpreter)
        .ok_or(BuildError::InterpreterMissing)
}
