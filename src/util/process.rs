//! Subprocess execution utilities.
//!
//! External tools are reached through the [`ProcessRunner`] capability so the
//! build pipeline can be driven by the real OS runner or by a scripted fake.

use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

/// How often a running child is checked for exit or cancellation.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Builder for subprocess execution.
#[derive(Debug, Clone)]
pub struct ProcessBuilder {
    program: PathBuf,
    args: Vec<String>,
    env: BTreeMap<String, String>,
    cwd: Option<PathBuf>,
}

impl ProcessBuilder {
    /// Create a new process builder for the given program.
    pub fn new(program: impl AsRef<Path>) -> Self {
        ProcessBuilder {
            program: program.as_ref().to_path_buf(),
            args: Vec::new(),
            env: BTreeMap::new(),
            cwd: None,
        }
    }

    /// Add a single argument.
    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_string_lossy().into_owned());
        self
    }

    /// Add multiple arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args.extend(
            args.into_iter()
                .map(|s| s.as_ref().to_string_lossy().into_owned()),
        );
        self
    }

    /// Set an environment variable on top of the inherited environment.
    pub fn env(mut self, key: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        self.env
            .insert(key.as_ref().to_string(), value.as_ref().to_string());
        self
    }

    /// Set the working directory.
    pub fn cwd(mut self, cwd: impl AsRef<Path>) -> Self {
        self.cwd = Some(cwd.as_ref().to_path_buf());
        self
    }

    /// Get the program path.
    pub fn get_program(&self) -> &Path {
        &self.program
    }

    /// Get the arguments.
    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    /// Get the explicitly set environment variables.
    pub fn get_env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    /// Get the working directory, if set.
    pub fn get_cwd(&self) -> Option<&Path> {
        self.cwd.as_deref()
    }

    /// Build the Command.
    fn build_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd.envs(&self.env);

        if let Some(ref cwd) = self.cwd {
            cmd.current_dir(cwd);
        }

        cmd
    }

    /// Display the command for error messages.
    pub fn display_command(&self) -> String {
        let mut parts = vec![self.program.display().to_string()];
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }
}

impl fmt::Display for ProcessBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_command())
    }
}

/// Exit status of a finished process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessStatus {
    /// Exit code; `None` when the process was terminated by a signal.
    pub code: Option<i32>,
}

impl ProcessStatus {
    /// Status for a given exit code.
    pub fn from_code(code: i32) -> Self {
        ProcessStatus { code: Some(code) }
    }

    /// Whether the process exited with code zero.
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl From<std::process::ExitStatus> for ProcessStatus {
    fn from(status: std::process::ExitStatus) -> Self {
        ProcessStatus {
            code: status.code(),
        }
    }
}

/// Output captured from a finished process.
#[derive(Debug, Clone)]
pub struct CapturedOutput {
    pub status: ProcessStatus,
    pub stdout: String,
    pub stderr: String,
}

/// Failure to run a process to completion.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("failed to spawn `{program}`")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to wait for `{program}`")]
    Wait {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("`{program}` was cancelled")]
    Cancelled { program: String },
}

/// Shared cancellation signal for running builds.
///
/// Cloning yields a handle to the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; running children are killed at the next poll.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Capability for running external processes.
pub trait ProcessRunner: Send + Sync {
    /// Run with inherited stdio and wait for exit.
    fn run(&self, cmd: &ProcessBuilder, cancel: &CancelToken) -> Result<ProcessStatus, RunError>;

    /// Run with stdout/stderr captured.
    fn output(&self, cmd: &ProcessBuilder) -> Result<CapturedOutput, RunError>;
}

/// Runs real OS processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsProcessRunner {
    stdout_to_stderr: bool,
}

impl OsProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Send children's stdout to our stderr, keeping stdout for JSON events.
    pub fn stdout_to_stderr(mut self, redirect: bool) -> Self {
        self.stdout_to_stderr = redirect;
        self
    }
}

impl ProcessRunner for OsProcessRunner {
    fn run(&self, cmd: &ProcessBuilder, cancel: &CancelToken) -> Result<ProcessStatus, RunError> {
        let program = cmd.get_program().display().to_string();

        if cancel.is_cancelled() {
            return Err(RunError::Cancelled { program });
        }

        let mut command = cmd.build_command();
        command.stdin(Stdio::null());
        if self.stdout_to_stderr {
            command.stdout(Stdio::from(io::stderr()));
        }

        let mut child = command
            .spawn()
            .map_err(|source| RunError::Spawn {
                program: program.clone(),
                source,
            })?;

        loop {
            if cancel.is_cancelled() {
                tracing::debug!("killing `{}` after cancellation", program);
                // The child may already have exited between polls.
                let _ = child.kill();
                let _ = child.wait();
                return Err(RunError::Cancelled { program });
            }

            match child.try_wait() {
                Ok(Some(status)) => return Ok(status.into()),
                Ok(None) => std::thread::sleep(POLL_INTERVAL),
                Err(source) => return Err(RunError::Wait { program, source }),
            }
        }
    }

    fn output(&self, cmd: &ProcessBuilder) -> Result<CapturedOutput, RunError> {
        let program = cmd.get_program().display().to_string();

        let output = cmd
            .build_command()
            .stdin(Stdio::null())
            .output()
            .map_err(|source| RunError::Spawn { program, source })?;

        Ok(CapturedOutput {
            status: output.status.into(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Find an executable in PATH.
pub fn find_executable(name: &str) -> Option<PathBuf> {
    which::which(name).ok()
}

/// Find CMake.
pub fn find_cmake() -> Option<PathBuf> {
    find_executable("cmake")
}

/// Find an interpreter to hand to the configure step.
pub fn find_interpreter() -> Option<PathBuf> {
    ["python3", "python"]
        .iter()
        .find_map(|name| find_executable(name))
}
