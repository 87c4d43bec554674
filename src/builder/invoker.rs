//! Two-phase CMake invocation (configure, then build).

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::builder::errors::{BuildError, Phase};
use crate::builder::events::{BuildEvent, EventSink, NullSink};
use crate::builder::plan::{BuildConfig, CXXFLAGS_ENV};
use crate::core::target::NativeTarget;
use crate::util::fs::ensure_dir;
use crate::util::process::{CancelToken, ProcessBuilder, ProcessRunner, RunError};

/// Outcome of one external-tool call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvocationResult {
    pub phase: Phase,
    pub command: String,
    pub code: Option<i32>,
}

impl InvocationResult {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Runs the configure and build phases for one target.
///
/// Both phases block the calling thread. The build phase never starts unless
/// configure exited with code zero.
pub struct BuildInvoker<'a> {
    runner: &'a dyn ProcessRunner,
    program: PathBuf,
    cancel: CancelToken,
    events: &'a dyn EventSink,
}

static NULL_SINK: NullSink = NullSink;

impl<'a> BuildInvoker<'a> {
    pub fn new(runner: &'a dyn ProcessRunner, program: impl Into<PathBuf>) -> Self {
        BuildInvoker {
            runner,
            program: program.into(),
            cancel: CancelToken::new(),
            events: &NULL_SINK,
        }
    }

    /// Report phase starts and exits to `events`.
    pub fn with_events(mut self, events: &'a dyn EventSink) -> Self {
        self.events = events;
        self
    }

    /// Share a cancellation token with the caller.
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// The configure command for `config`; inherits the process environment
    /// with `CXXFLAGS` replaced.
    pub fn configure_command(&self, config: &BuildConfig, target: &NativeTarget) -> ProcessBuilder {
        ProcessBuilder::new(&self.program)
            .arg(target.source_dir())
            .args(&config.configure_args)
            .cwd(&config.build_dir)
            .env(CXXFLAGS_ENV, &config.cxxflags)
    }

    /// The build command for `config`; runs with the inherited environment.
    pub fn build_command(&self, config: &BuildConfig) -> ProcessBuilder {
        ProcessBuilder::new(&self.program)
            .args(["--build", "."])
            .args(&config.build_args)
            .cwd(&config.build_dir)
    }

    /// Configure then build `target`.
    ///
    /// The build directory is created if missing and left in place afterwards.
    pub fn execute(
        &self,
        config: &BuildConfig,
        target: &NativeTarget,
    ) -> Result<Vec<InvocationResult>, BuildError> {
        create_build_dir(&config.build_dir)?;

        tracing::info!("Configuring `{}`", target.name());
        let configure = self.invoke(
            Phase::Configure,
            target.name(),
            &self.configure_command(config, target),
        )?;
        if !configure.success() {
            return Err(BuildError::ConfigureFailed {
                target: target.name().to_string(),
                command: configure.command,
                code: configure.code,
                build_dir: config.build_dir.clone(),
            });
        }

        tracing::info!("Building `{}`", target.name());
        let build = self.invoke(Phase::Build, target.name(), &self.build_command(config))?;
        if !build.success() {
            return Err(BuildError::BuildFailed {
                target: target.name().to_string(),
                command: build.command,
                code: build.code,
                build_dir: config.build_dir.clone(),
            });
        }

        Ok(vec![configure, build])
    }

    fn invoke(
        &self,
        phase: Phase,
        target: &str,
        cmd: &ProcessBuilder,
    ) -> Result<InvocationResult, BuildError> {
        let command = cmd.display_command();
        tracing::debug!("[{}] {}: {}", target, phase, command);
        self.events
            .emit(BuildEvent::phase_started(target, phase, command.clone()));

        let status = self.runner.run(cmd, &self.cancel).map_err(|e| match e {
            RunError::Cancelled { .. } => BuildError::Cancelled {
                target: target.to_string(),
                phase,
            },
            RunError::Spawn { source, .. } | RunError::Wait { source, .. } => BuildError::Spawn {
                target: target.to_string(),
                command: command.clone(),
                source,
            },
        })?;

        tracing::debug!("[{}] {} exited with {:?}", target, phase, status.code);
        self.events
            .emit(BuildEvent::phase_finished(target, phase, status.code));

        Ok(InvocationResult {
            phase,
            command,
            code: status.code,
        })
    }
}

fn create_build_dir(path: &Path) -> Result<(), BuildError> {
    ensure_dir(path).map_err(|source| BuildError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::plan::{
        BuildLayout, ConfigurationPlanner, EnvironmentView, PlatformFamily, ENABLE_DEBUG_ENV,
    };
    use crate::builder::events::CollectingSink;
    use crate::test_support::{FakeRunner, MockProcessOutput};
    use tempfile::TempDir;

    fn plan_in(tmp: &TempDir, target: &NativeTarget) -> BuildConfig {
        let layout = BuildLayout::new(tmp.path(), Path::new("target"));
        ConfigurationPlanner::new(
            layout,
            "/usr/bin/python3",
            EnvironmentView::from_pairs([(ENABLE_DEBUG_ENV, "1"), ("CXXFLAGS", "-O2")]),
        )
        .unwrap()
        .platform(PlatformFamily::Other)
        .plan(target)
    }

    #[test]
    fn test_configure_then_build() {
        let tmp = TempDir::new().unwrap();
        let target = NativeTarget::new("core", "/src", "0.1.0");
        let config = plan_in(&tmp, &target);
        let runner = FakeRunner::new();

        let results = BuildInvoker::new(&runner, "cmake")
            .execute(&config, &target)
            .unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].phase, Phase::Configure);
        assert_eq!(results[1].phase, Phase::Build);
        assert!(config.build_dir.is_dir());

        let calls = runner.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[0].line.starts_with("cmake /src -DCMAKE_LIBRARY_OUTPUT_DIRECTORY="));
        assert_eq!(
            calls[1].line,
            "cmake --build . --config Release --target core -- -j"
        );
        for call in &calls {
            assert_eq!(call.cwd.as_deref(), Some(config.build_dir.as_path()));
        }
    }

    #[test]
    fn test_configure_overlays_cxxflags_only() {
        let tmp = TempDir::new().unwrap();
        let target = NativeTarget::new("core", "/src", "0.3.1");
        let config = plan_in(&tmp, &target);
        let runner = FakeRunner::new();

        BuildInvoker::new(&runner, "cmake")
            .execute(&config, &target)
            .unwrap();

        let calls = runner.calls();
        assert_eq!(calls[0].env.len(), 1);
        assert_eq!(
            calls[0].env.get("CXXFLAGS").map(String::as_str),
            Some("-O2 -DVERSION_INFO=\\\"0.3.1\\\"")
        );
        // Build phase inherits the untouched process environment
        assert!(calls[1].env.is_empty());
        assert_ne!(
            std::env::var("CXXFLAGS").ok().as_deref(),
            Some("-O2 -DVERSION_INFO=\\\"0.3.1\\\"")
        );
    }

    #[test]
    fn test_configure_failure_skips_build() {
        let tmp = TempDir::new().unwrap();
        let target = NativeTarget::new("core", "/src", "0.1.0");
        let config = plan_in(&tmp, &target);

        let runner = FakeRunner::new();
        runner.expect_prefix("cmake /src", MockProcessOutput::failure(1, ""));

        let err = BuildInvoker::new(&runner, "cmake")
            .execute(&config, &target)
            .unwrap_err();

        match err {
            BuildError::ConfigureFailed {
                target,
                command,
                code,
                build_dir,
            } => {
                assert_eq!(target, "core");
                assert!(command.starts_with("cmake /src "));
                assert_eq!(code, Some(1));
                assert_eq!(build_dir, config.build_dir);
            }
            other => panic!("unexpected error: {other}"),
        }

        assert!(!runner.lines().iter().any(|l| l.starts_with("cmake --build")));
    }

    #[test]
    fn test_build_failure() {
        let tmp = TempDir::new().unwrap();
        let target = NativeTarget::new("core", "/src", "0.1.0");
        let config = plan_in(&tmp, &target);

        let runner = FakeRunner::new();
        runner.expect_prefix("cmake --build", MockProcessOutput::failure(2, ""));

        let err = BuildInvoker::new(&runner, "cmake")
            .execute(&config, &target)
            .unwrap_err();

        match err {
            BuildError::BuildFailed { command, code, .. } => {
                assert_eq!(command, "cmake --build . --config Release --target core -- -j");
                assert_eq!(code, Some(2));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_killed_configure_is_failure() {
        let tmp = TempDir::new().unwrap();
        let target = NativeTarget::new("core", "/src", "0.1.0");
        let config = plan_in(&tmp, &target);

        let runner = FakeRunner::new();
        runner.expect_prefix("cmake /src", MockProcessOutput::killed());

        let err = BuildInvoker::new(&runner, "cmake")
            .execute(&config, &target)
            .unwrap_err();
        assert!(matches!(err, BuildError::ConfigureFailed { code: None, .. }));
    }

    #[test]
    fn test_cancel_during_build() {
        let tmp = TempDir::new().unwrap();
        let target = NativeTarget::new("core", "/src", "0.1.0");
        let config = plan_in(&tmp, &target);

        let runner = FakeRunner::new();
        runner.cancel_on("--build");
        let token = CancelToken::new();

        let err = BuildInvoker::new(&runner, "cmake")
            .with_cancel(token.clone())
            .execute(&config, &target)
            .unwrap_err();

        assert!(matches!(
            err,
            BuildError::Cancelled {
                phase: Phase::Build,
                ..
            }
        ));
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_spawn_failure() {
        let tmp = TempDir::new().unwrap();
        let target = NativeTarget::new("core", "/src", "0.1.0");
        let config = plan_in(&tmp, &target);

        let runner = FakeRunner::new();
        runner.fail_to_spawn("cmake");

        let err = BuildInvoker::new(&runner, "cmake")
            .execute(&config, &target)
            .unwrap_err();
        assert!(matches!(err, BuildError::Spawn { .. }));
        assert_eq!(err.target(), Some("core"));
    }

    #[test]
    fn test_existing_build_dir_is_reused() {
        let tmp = TempDir::new().unwrap();
        let target = NativeTarget::new("core", "/src", "0.1.0");
        let config = plan_in(&tmp, &target);
        std::fs::create_dir_all(&config.build_dir).unwrap();
        std::fs::write(config.build_dir.join("CMakeCache.txt"), "cached").unwrap();

        let runner = FakeRunner::new();
        BuildInvoker::new(&runner, "cmake")
            .execute(&config, &target)
            .unwrap();

        assert!(config.build_dir.join("CMakeCache.txt").exists());
    }

    #[test]
    fn test_phase_events() {
        let tmp = TempDir::new().unwrap();
        let target = NativeTarget::new("core", "/src", "0.1.0");
        let config = plan_in(&tmp, &target);

        let runner = FakeRunner::new();
        runner.expect_prefix("cmake /src", MockProcessOutput::failure(1, ""));
        let sink = CollectingSink::new();

        let _ = BuildInvoker::new(&runner, "cmake")
            .with_events(&sink)
            .execute(&config, &target);

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert!(matches!(
            events[0],
            BuildEvent::PhaseStarted {
                phase: Phase::Configure,
                ..
            }
        ));
        assert!(matches!(
            events[1],
            BuildEvent::PhaseFinished {
                phase: Phase::Configure,
                exit_code: Some(1),
                success: false,
                ..
            }
        ));
    }
}
