//! Parallel build executor with progress reporting.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;

use crate::builder::errors::BuildError;
use crate::builder::events::{BuildEvent, EventSink, NullSink};
use crate::builder::invoker::{BuildInvoker, InvocationResult};
use crate::builder::plan::BuildConfig;
use crate::core::target::NativeTarget;
use crate::util::process::{CancelToken, ProcessRunner};

/// File extensions of loadable modules.
const MODULE_EXTENSIONS: &[&str] = &["so", "pyd", "dylib", "dll"];

/// One mutex per output directory.
///
/// Targets writing to the same directory take the same lock, so they run one
/// after another while disjoint targets proceed in parallel.
#[derive(Debug, Default)]
pub struct OutputLocks {
    locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl OutputLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// The lock guarding `dir`, created on first use.
    pub fn lock_for(&self, dir: &Path) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(dir.to_path_buf()).or_default())
    }
}

/// A successfully built extension.
#[derive(Debug, Clone)]
pub struct BuiltExtension {
    pub output_dir: PathBuf,
    /// Loadable modules named after the target found in the output directory
    pub artifacts: Vec<PathBuf>,
    pub invocations: Vec<InvocationResult>,
}

/// Result of building one target.
#[derive(Debug)]
pub struct TargetOutcome {
    pub target: String,
    pub result: Result<BuiltExtension, BuildError>,
}

impl TargetOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

static NULL_SINK: NullSink = NullSink;

/// Runs configured targets on a worker pool.
pub struct BuildExecutor<'a> {
    runner: &'a dyn ProcessRunner,
    program: PathBuf,
    cancel: CancelToken,
    events: &'a dyn EventSink,
    jobs: Option<usize>,
    progress: bool,
    locks: OutputLocks,
}

impl<'a> BuildExecutor<'a> {
    /// Create a new build executor.
    pub fn new(runner: &'a dyn ProcessRunner, program: impl Into<PathBuf>) -> Self {
        BuildExecutor {
            runner,
            program: program.into(),
            cancel: CancelToken::new(),
            events: &NULL_SINK,
            jobs: None,
            progress: false,
            locks: OutputLocks::new(),
        }
    }

    /// Limit the number of targets built at once.
    pub fn jobs(mut self, jobs: Option<usize>) -> Self {
        self.jobs = jobs.filter(|&j| j > 0);
        self
    }

    /// Show a progress bar over targets.
    pub fn progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    pub fn events(mut self, events: &'a dyn EventSink) -> Self {
        self.events = events;
        self
    }

    pub fn cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Build every `(target, config)` pair.
    ///
    /// Returns one outcome per pair, in input order. A failing target does
    /// not stop the others.
    pub fn execute(&self, work: &[(NativeTarget, BuildConfig)]) -> Vec<TargetOutcome> {
        let pb = self.progress_bar(work.len());

        let run = || {
            work.par_iter()
                .map(|(target, config)| {
                    let outcome = self.build_one(target, config);
                    if let Some(pb) = &pb {
                        pb.set_message(target.name().to_string());
                        pb.inc(1);
                    }
                    outcome
                })
                .collect::<Vec<_>>()
        };

        let outcomes = match self.jobs {
            Some(jobs) => match rayon::ThreadPoolBuilder::new().num_threads(jobs).build() {
                Ok(pool) => pool.install(run),
                Err(e) => {
                    tracing::warn!("could not create a pool of {} workers: {}", jobs, e);
                    run()
                }
            },
            None => run(),
        };

        if let Some(pb) = pb {
            pb.finish_and_clear();
        }

        outcomes
    }

    fn build_one(&self, target: &NativeTarget, config: &BuildConfig) -> TargetOutcome {
        let start = Instant::now();

        let lock = self.locks.lock_for(&config.output_dir);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let invoker = BuildInvoker::new(self.runner, &self.program)
            .with_cancel(self.cancel.clone())
            .with_events(self.events);

        let result = remove_stale_artifacts(&config.output_dir, target.cmake_target())
            .and_then(|()| invoker.execute(config, target))
            .map(|invocations| {
                let artifacts = find_artifacts(&config.output_dir, target.cmake_target());
                BuiltExtension {
                    output_dir: config.output_dir.clone(),
                    artifacts,
                    invocations,
                }
            });

        match &result {
            Ok(built) => {
                tracing::info!(
                    "Built `{}` in {:.2}s",
                    target.name(),
                    start.elapsed().as_secs_f64()
                );
                self.events.emit(BuildEvent::ExtensionBuilt {
                    extension: target.name().to_string(),
                    output_dir: built.output_dir.clone(),
                    filenames: built.artifacts.clone(),
                    duration_ms: start.elapsed().as_millis() as u64,
                });
            }
            Err(e) => {
                tracing::debug!("`{}` failed: {}", target.name(), e);
                self.events
                    .emit(BuildEvent::error(e.to_string(), Some(target.name())));
            }
        }

        TargetOutcome {
            target: target.name().to_string(),
            result,
        }
    }

    fn progress_bar(&self, total: usize) -> Option<ProgressBar> {
        if !self.progress || total < 2 {
            return None;
        }

        let pb = ProgressBar::new(total as u64);
        if let Ok(style) =
            ProgressStyle::default_bar().template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        {
            pb.set_style(style.progress_chars("#>-"));
        }
        Some(pb)
    }
}

/// Loadable modules for `name` in `dir`.
///
/// Matches `name.<anything>.<ext>` and `libname.<ext>`, so `core` does not pick
/// up `core_extra.so` from a shared directory.
pub fn find_artifacts(dir: &Path, name: &str) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };

    let plain = format!("{}.", name);
    let prefixed = format!("lib{}.", name);

    let mut artifacts: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| {
            let ext_ok = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| MODULE_EXTENSIONS.contains(&e));
            let name_ok = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(&plain) || n.starts_with(&prefixed));
            ext_ok && name_ok
        })
        .collect();

    artifacts.sort();
    artifacts
}

/// Delete modules for `name` left in `dir` by an earlier build.
///
/// Must run under the output lock, so whatever [`find_artifacts`] reports
/// afterwards was produced by this build.
fn remove_stale_artifacts(dir: &Path, name: &str) -> Result<(), BuildError> {
    for path in find_artifacts(dir, name) {
        tracing::debug!("removing stale artifact {}", path.display());
        match std::fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(source) => return Err(BuildError::StaleArtifact { path, source }),
        }
    }
    Ok(())
}
