//! Environment and toolchain health checks.
//!
//! The `doctor` command checks everything an extension build needs before
//! any extension is configured.
//!
//! ## Usage
//!
//! ```bash
//! cmext doctor           # Quick check
//! cmext doctor --verbose # Detailed output
//! ```
//!
//! ## Checks Performed
//!
//! - CMake availability and minimum version (enforced on every platform)
//! - Interpreter passed to the configure step
//! - `ENABLE_FP32` / `ENABLE_DEBUG` parse as integers
//! - C++ compiler and native build tool (optional, CMake locates them)

use std::collections::BTreeMap;
use std::fmt::Write;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use crate::builder::plan::{EnvironmentView, FeatureFlags, PlatformFamily};
use crate::builder::toolchain::{ToolVersion, ToolchainProbe};
use crate::ops::build_ext::resolve_interpreter;
use crate::util::config::Config;
use crate::util::process::{find_executable, ProcessBuilder, ProcessRunner};

/// Result of a single health check.
#[derive(Debug, Clone)]
pub struct CheckResult {
    /// Name of the check
    pub name: String,

    /// Whether the check passed
    pub passed: bool,

    /// Human-readable status message
    pub message: String,

    /// Path to the tool (if applicable)
    pub path: Option<PathBuf>,

    /// Version string (if applicable)
    pub version: Option<String>,

    /// How long the check took
    pub duration: Duration,

    /// Whether this check is required or optional
    pub required: bool,
}

impl CheckResult {
    /// Create a passing check result.
    pub fn pass(name: impl Into<String>, message: impl Into<String>) -> Self {
        CheckResult {
            name: name.into(),
            passed: true,
            message: message.into(),
            path: None,
            version: None,
            duration: Duration::ZERO,
            required: true,
        }
    }

    /// Create a failing check result.
    pub fn fail(name: impl Into<String>, message: impl Into<String>) -> Self {
        CheckResult {
            passed: false,
            ..Self::pass(name, message)
        }
    }

    /// Mark this check as optional.
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn with_path(mut self, path: PathBuf) -> Self {
        self.path = Some(path);
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }
}

/// Summary of all health checks.
#[derive(Debug, Clone, Default)]
pub struct DoctorReport {
    pub checks: Vec<CheckResult>,

    /// Total time taken
    pub total_duration: Duration,

    /// Environment information
    pub environment: BTreeMap<String, String>,
}

impl DoctorReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, check: CheckResult) {
        self.checks.push(check);
    }

    /// Check if all required checks passed.
    pub fn all_required_passed(&self) -> bool {
        self.checks.iter().filter(|c| c.required).all(|c| c.passed)
    }

    pub fn passed_count(&self) -> usize {
        self.checks.iter().filter(|c| c.passed).count()
    }

    pub fn failed_count(&self) -> usize {
        self.checks.iter().filter(|c| !c.passed).count()
    }

    pub fn required_failed_count(&self) -> usize {
        self.checks
            .iter()
            .filter(|c| c.required && !c.passed)
            .count()
    }
}

/// Inputs for the doctor command.
pub struct DoctorOptions<'a> {
    pub config: &'a Config,
    pub runner: &'a dyn ProcessRunner,
    pub env: EnvironmentView,
    pub platform: PlatformFamily,
}

/// Run every check.
pub fn doctor(options: DoctorOptions<'_>) -> DoctorReport {
    let start = Instant::now();
    let mut report = DoctorReport::new();

    report
        .environment
        .insert("os".to_string(), std::env::consts::OS.to_string());
    report
        .environment
        .insert("arch".to_string(), std::env::consts::ARCH.to_string());
    report
        .environment
        .insert("platform".to_string(), format!("{:?}", options.platform));

    report.add(check_cmake(&options));
    report.add(check_interpreter(&options));
    report.add(check_feature_flags(&options.env));
    report.add(check_cxx_compiler(options.platform));
    report.add(check_build_tool(options.platform));

    report.total_duration = start.elapsed();
    report
}

fn check_cmake(options: &DoctorOptions<'_>) -> CheckResult {
    let start = Instant::now();
    let program = options.config.cmake_program();

    let minimum = match options.config.minimum_cmake().parse::<ToolVersion>() {
        Ok(v) => v,
        Err(e) => {
            return CheckResult::fail("CMake", format!("cmake.minimum-version: {}", e))
                .with_duration(start.elapsed())
        }
    };

    let probe = ToolchainProbe::new(options.runner, &program, options.platform, minimum.clone())
        .enforce_everywhere(true);

    match probe.verify() {
        Ok(info) => {
            let mut check = CheckResult::pass("CMake", format!("CMake >= {} is available", minimum))
                .with_path(info.program)
                .with_duration(start.elapsed());
            if let Some(version) = info.version {
                check = check.with_version(version.to_string());
            }
            check
        }
        Err(e) => CheckResult::fail("CMake", e.to_string())
            .with_path(program)
            .with_duration(start.elapsed()),
    }
}

fn check_interpreter(options: &DoctorOptions<'_>) -> CheckResult {
    let start = Instant::now();

    let interpreter = match resolve_interpreter(None, options.config) {
        Ok(path) => path,
        Err(e) => return CheckResult::fail("Interpreter", e.to_string()).with_duration(start.elapsed()),
    };

    let cmd = ProcessBuilder::new(&interpreter).arg("--version");
    match options.runner.output(&cmd) {
        Ok(output) if output.status.success() => {
            // Older interpreters print their version on stderr
            let text = if output.stdout.trim().is_empty() {
                output.stderr
            } else {
                output.stdout
            };
            CheckResult::pass("Interpreter", "Interpreter is available")
                .with_version(first_line(&text))
                .with_path(interpreter)
                .with_duration(start.elapsed())
        }
        Ok(output) => CheckResult::fail(
            "Interpreter",
            format!("`{}` exited with {:?}", cmd, output.status.code),
        )
        .with_path(interpreter)
        .with_duration(start.elapsed()),
        Err(e) => CheckResult::fail("Interpreter", e.to_string())
            .with_path(interpreter)
            .with_duration(start.elapsed()),
    }
}

fn check_feature_flags(env: &EnvironmentView) -> CheckResult {
    match FeatureFlags::from_env(env) {
        Ok(flags) => CheckResult::pass(
            "Feature flags",
            format!("fp32={} debug={}", flags.fp32, flags.debug),
        ),
        Err(e) => CheckResult::fail("Feature flags", e.to_string()),
    }
}

fn check_cxx_compiler(platform: PlatformFamily) -> CheckResult {
    let candidates: &[&str] = match platform {
        PlatformFamily::Windows => &["cl", "clang++", "g++"],
        PlatformFamily::Other => &["c++", "clang++", "g++"],
    };
    check_any("C++ Compiler", candidates)
}

fn check_build_tool(platform: PlatformFamily) -> CheckResult {
    let candidates: &[&str] = match platform {
        PlatformFamily::Windows => &["msbuild", "ninja", "nmake"],
        PlatformFamily::Other => &["ninja", "make"],
    };
    check_any("Build Tool", candidates)
}

/// Pass if any of `candidates` is on PATH. Always optional.
fn check_any(name: &str, candidates: &[&str]) -> CheckResult {
    let start = Instant::now();

    for tool in candidates {
        if let Some(path) = find_executable(tool) {
            return CheckResult::pass(name, format!("Found {}", tool))
                .with_path(path)
                .with_duration(start.elapsed())
                .optional();
        }
    }

    CheckResult::fail(
        name,
        format!("None found (tried {}); CMake may still locate one", candidates.join(", ")),
    )
    .with_duration(start.elapsed())
    .optional()
}

fn first_line(text: &str) -> String {
    text.lines().next().unwrap_or("").trim().to_string()
}

/// Format the doctor report for display.
pub fn format_report(report: &DoctorReport, verbose: bool) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "cmext doctor");
    let _ = writeln!(output, "============\n");

    if verbose {
        let get = |key: &str| report.environment.get(key).map(String::as_str).unwrap_or("unknown");
        let _ = writeln!(output, "Environment:");
        let _ = writeln!(output, "  OS: {} ({})", get("os"), get("arch"));
        let _ = writeln!(output);
    }

    let _ = writeln!(output, "Checks:");
    for check in &report.checks {
        let status = if check.passed { "[OK]" } else { "[!!]" };
        let required = if check.required { "" } else { " (optional)" };

        let _ = writeln!(output, "  {} {}{}", status, check.name, required);

        // Failures always explain themselves
        if verbose || !check.passed {
            let _ = writeln!(output, "      {}", check.message);
        }
        if verbose {
            if let Some(path) = &check.path {
                let _ = writeln!(output, "      Path: {}", path.display());
            }
            if let Some(version) = &check.version {
                let _ = writeln!(output, "      Version: {}", version);
            }
        }
    }

    let _ = writeln!(output);

    let passed = report.passed_count();
    let failed = report.failed_count();
    let required_failed = report.required_failed_count();

    let _ = writeln!(output, "Summary: {} passed, {} failed", passed, failed);

    if required_failed > 0 {
        let _ = writeln!(
            output,
            "\n{} required check(s) failed. Extensions cannot be built.",
            required_failed
        );
    } else if failed > 0 {
        let _ = writeln!(
            output,
            "\nAll required checks passed. {} optional check(s) failed.",
            failed
        );
    } else {
        let _ = writeln!(output, "\nAll checks passed.");
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::plan::ENABLE_DEBUG_ENV;
    use crate::test_support::{FakeRunner, MockProcessOutput};

    fn config() -> Config {
        let mut config = Config::default();
        config.cmake.program = Some(PathBuf::from("cmake"));
        config.build.interpreter = Some(PathBuf::from("python3"));
        config
    }

    fn run(runner: &FakeRunner, env: EnvironmentView) -> DoctorReport {
        let config = config();
        doctor(DoctorOptions {
            config: &config,
            runner,
            env,
            platform: PlatformFamily::Other,
        })
    }

    fn check<'r>(report: &'r DoctorReport, name: &str) -> &'r CheckResult {
        report.checks.iter().find(|c| c.name == name).unwrap()
    }

    #[test]
    fn test_check_result_optional() {
        let result = CheckResult::pass("test", "passed").optional();
        assert!(result.passed);
        assert!(!result.required);
    }

    #[test]
    fn test_healthy_environment() {
        let runner = FakeRunner::new();
        runner.expect("cmake --version", MockProcessOutput::success("cmake version 3.27.4\n"));
        runner.expect("python3 --version", MockProcessOutput::success("Python 3.11.6\n"));

        let report = run(&runner, EnvironmentView::default());

        assert!(report.all_required_passed());
        let cmake = check(&report, "CMake");
        assert_eq!(cmake.version.as_deref(), Some("3.27.4"));
        assert_eq!(check(&report, "Interpreter").version.as_deref(), Some("Python 3.11.6"));
    }

    #[test]
    fn test_old_cmake_fails_everywhere() {
        let runner = FakeRunner::new();
        runner.expect("cmake --version", MockProcessOutput::success("cmake version 2.8.12\n"));

        let report = run(&runner, EnvironmentView::default());

        assert!(!check(&report, "CMake").passed);
        assert!(!report.all_required_passed());
    }

    #[test]
    fn test_invalid_feature_flag() {
        let runner = FakeRunner::new();
        runner.expect("cmake --version", MockProcessOutput::success("cmake version 3.27.4\n"));

        let report = run(&runner, EnvironmentView::from_pairs([(ENABLE_DEBUG_ENV, "on")]));

        let flags = check(&report, "Feature flags");
        assert!(!flags.passed);
        assert!(flags.message.contains("ENABLE_DEBUG"));
    }

    #[test]
    fn test_optional_checks_do_not_fail_report() {
        let mut report = DoctorReport::new();
        report.add(CheckResult::pass("CMake", "ok"));
        report.add(CheckResult::fail("Build Tool", "missing").optional());

        assert!(report.all_required_passed());
        assert_eq!(report.failed_count(), 1);
        assert_eq!(report.required_failed_count(), 0);

        let text = format_report(&report, false);
        assert!(text.contains("[!!] Build Tool (optional)"));
        assert!(text.contains("optional check(s) failed"));
    }

    #[test]
    fn test_format_shows_failure_message() {
        let mut report = DoctorReport::new();
        report.add(CheckResult::fail(
            "CMake",
            "CMake must be installed to build the following extensions: core",
        ));

        let text = format_report(&report, false);
        assert!(text.contains("[!!] CMake"));
        assert!(text.contains("CMake must be installed"));
        assert!(text.contains("1 required check(s) failed"));
    }
}
