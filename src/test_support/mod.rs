//! Test utilities and mocks for cmext unit tests.
//!
//! [`FakeRunner`] stands in for the OS process runner: it records every
//! command it is asked to run and answers with canned outputs.
//!
//! # Example
//!
//! ```rust,ignore
//! use cmext::test_support::{FakeRunner, MockProcessOutput};
//!
//! #[test]
//! fn test_example() {
//!     let runner = FakeRunner::new();
//!     runner.expect("cmake --version", MockProcessOutput::success("cmake version 3.22.1"));
//!     runner.expect_prefix("cmake /src", MockProcessOutput::failure(1, ""));
//!
//!     // Hand `&runner` to a toolchain check or invoker...
//! }
//! ```

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::util::process::{
    CancelToken, CapturedOutput, ProcessBuilder, ProcessRunner, ProcessStatus, RunError,
};

/// Mock process output for testing command execution.
#[derive(Debug, Clone)]
pub struct MockProcessOutput {
    /// Exit status code (0 = success, None = killed by signal).
    pub status: Option<i32>,
    /// Standard output.
    pub stdout: String,
    /// Standard error.
    pub stderr: String,
}

impl MockProcessOutput {
    /// Create a successful output with the given stdout.
    pub fn success(stdout: impl Into<String>) -> Self {
        MockProcessOutput {
            status: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Create a failure output with the given stderr and status code.
    pub fn failure(status: i32, stderr: impl Into<String>) -> Self {
        MockProcessOutput {
            status: Some(status),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// A process terminated by a signal.
    pub fn killed() -> Self {
        MockProcessOutput {
            status: None,
            stdout: String::new(),
            stderr: String::new(),
        }
    }
}

impl Default for MockProcessOutput {
    fn default() -> Self {
        MockProcessOutput::success("")
    }
}

/// Pattern for matching commands in FakeRunner.
#[derive(Debug, Clone)]
pub enum CommandPattern {
    /// Exact match on full command string.
    Exact(String),
    /// Match if command starts with prefix.
    StartsWith(String),
    /// Match if command contains substring.
    Contains(String),
}

impl CommandPattern {
    /// Check if this pattern matches the given command.
    pub fn matches(&self, cmd: &str) -> bool {
        match self {
            CommandPattern::Exact(s) => cmd == s,
            CommandPattern::StartsWith(s) => cmd.starts_with(s),
            CommandPattern::Contains(s) => cmd.contains(s),
        }
    }
}

#[derive(Debug, Clone)]
enum Reply {
    Output(MockProcessOutput),
    SpawnError,
    Cancel,
}

#[derive(Debug, Clone)]
struct Expectation {
    pattern: CommandPattern,
    reply: Reply,
}

/// A command the fake was asked to run.
#[derive(Debug, Clone)]
pub struct RecordedCommand {
    /// Full command line (`program arg...`)
    pub line: String,
    /// Working directory, if set
    pub cwd: Option<PathBuf>,
    /// Variables set on top of the inherited environment
    pub env: BTreeMap<String, String>,
}

#[derive(Debug, Default)]
struct State {
    expectations: Vec<Expectation>,
    calls: Vec<RecordedCommand>,
}

/// Scriptable [`ProcessRunner`] that records commands and returns canned results.
///
/// The first matching expectation wins. Unmatched commands succeed with empty
/// output.
#[derive(Debug, Default)]
pub struct FakeRunner {
    state: Mutex<State>,
}

impl FakeRunner {
    /// Create a new fake runner.
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, pattern: CommandPattern, reply: Reply) -> &Self {
        self.state
            .lock()
            .unwrap()
            .expectations
            .push(Expectation { pattern, reply });
        self
    }

    /// Add an expectation for an exact command match.
    pub fn expect(&self, cmd: &str, output: MockProcessOutput) -> &Self {
        self.push(CommandPattern::Exact(cmd.to_string()), Reply::Output(output))
    }

    /// Add an expectation for a command starting with a prefix.
    pub fn expect_prefix(&self, prefix: &str, output: MockProcessOutput) -> &Self {
        self.push(
            CommandPattern::StartsWith(prefix.to_string()),
            Reply::Output(output),
        )
    }

    /// Make every command starting with `program` fail to spawn.
    pub fn fail_to_spawn(&self, program: &str) -> &Self {
        self.push(CommandPattern::StartsWith(program.to_string()), Reply::SpawnError)
    }

    /// Cancel the running command when a matching command starts.
    pub fn cancel_on(&self, substring: &str) -> &Self {
        self.push(CommandPattern::Contains(substring.to_string()), Reply::Cancel)
    }

    /// Get all commands that were run, in order.
    pub fn calls(&self) -> Vec<RecordedCommand> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Command lines that were run, in order.
    pub fn lines(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.line).collect()
    }

    fn reply_for(&self, cmd: &ProcessBuilder) -> Reply {
        let line = cmd.display_command();
        let mut state = self.state.lock().unwrap();

        state.calls.push(RecordedCommand {
            line: line.clone(),
            cwd: cmd.get_cwd().map(Path::to_path_buf),
            env: cmd.get_env().clone(),
        });

        state
            .expectations
            .iter()
            .find(|e| e.pattern.matches(&line))
            .map(|e| e.reply.clone())
            .unwrap_or_else(|| Reply::Output(MockProcessOutput::default()))
    }
}

impl ProcessRunner for FakeRunner {
    fn run(&self, cmd: &ProcessBuilder, cancel: &CancelToken) -> Result<ProcessStatus, RunError> {
        let program = cmd.get_program().display().to_string();
        if cancel.is_cancelled() {
            return Err(RunError::Cancelled { program });
        }

        match self.reply_for(cmd) {
            Reply::Output(out) => Ok(ProcessStatus { code: out.status }),
            Reply::SpawnError => Err(RunError::Spawn {
                program,
                source: io::Error::new(io::ErrorKind::NotFound, "program not found"),
            }),
            Reply::Cancel => {
                cancel.cancel();
                Err(RunError::Cancelled { program })
            }
        }
    }

    fn output(&self, cmd: &ProcessBuilder) -> Result<CapturedOutput, RunError> {
        let program = cmd.get_program().display().to_string();

        match self.reply_for(cmd) {
            Reply::Output(out) => Ok(CapturedOutput {
                status: ProcessStatus { code: out.status },
                stdout: out.stdout,
                stderr: out.stderr,
            }),
            Reply::SpawnError => Err(RunError::Spawn {
                program,
                source: io::Error::new(io::ErrorKind::NotFound, "program not found"),
            }),
            Reply::Cancel => Err(RunError::Cancelled { program }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fake_runner_records_and_matches() {
        let runner = FakeRunner::new();
        runner.expect("cmake --version", MockProcessOutput::success("cmake version 3.22.1"));
        runner.expect_prefix("cmake --build", MockProcessOutput::failure(2, "make: ***"));

        let out = runner
            .output(&ProcessBuilder::new("cmake").arg("--version"))
            .unwrap();
        assert!(out.status.success());
        assert_eq!(out.stdout, "cmake version 3.22.1");

        let status = runner
            .run(
                &ProcessBuilder::new("cmake").args(["--build", "."]).cwd("/b"),
                &CancelToken::new(),
            )
            .unwrap();
        assert_eq!(status.code, Some(2));

        let calls = runner.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].line, "cmake --build .");
        assert_eq!(calls[1].cwd.as_deref(), Some(Path::new("/b")));
    }

    #[test]
    fn test_fake_runner_default_is_success() {
        let runner = FakeRunner::new();
        let status = runner
            .run(&ProcessBuilder::new("anything"), &CancelToken::new())
            .unwrap();
        assert!(status.success());
    }

    #[test]
    fn test_fake_runner_spawn_error() {
        let runner = FakeRunner::new();
        runner.fail_to_spawn("cmake");
        let err = runner
            .output(&ProcessBuilder::new("cmake").arg("--version"))
            .unwrap_err();
        assert!(matches!(err, RunError::Spawn { .. }));
    }

    #[test]
    fn test_fake_runner_cancel() {
        let runner = FakeRunner::new();
        runner.cancel_on("--build");
        let token = CancelToken::new();

        let err = runner
            .run(&ProcessBuilder::new("cmake").arg("--build"), &token)
            .unwrap_err();
        assert!(matches!(err, RunError::Cancelled { .. }));
        assert!(token.is_cancelled());
    }
}
