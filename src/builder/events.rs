//! Build event types for JSON output.
//!
//! This module defines the JSON schema for machine-readable build output.
//! These events are emitted when using `--message-format=json`, one object
//! per line on stdout.
//!
//! # Event Types
//!
//! - `build-started`: Extensions are about to be built
//! - `phase-started`: A configure or build phase began for one extension
//! - `phase-finished`: That phase exited
//! - `extension-built`: Both phases succeeded for one extension
//! - `build-finished`: All extensions finished (success or failure)
//! - `diagnostic`: An error or warning message
//!
//! New fields may be added, but existing fields should not be removed or renamed.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use serde::Serialize;

use crate::builder::errors::Phase;
use crate::builder::plan::PlatformFamily;

/// A build event emitted during the build process.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "reason")]
pub enum BuildEvent {
    #[serde(rename = "build-started")]
    BuildStarted {
        /// Build mode (always "Release")
        mode: String,
        platform: PlatformFamily,
        /// Number of extensions scheduled
        extension_count: usize,
    },

    #[serde(rename = "phase-started")]
    PhaseStarted {
        extension: String,
        phase: Phase,
        command: String,
    },

    #[serde(rename = "phase-finished")]
    PhaseFinished {
        extension: String,
        phase: Phase,
        /// Exit code, absent if the process was killed by a signal
        #[serde(skip_serializing_if = "Option::is_none")]
        exit_code: Option<i32>,
        success: bool,
    },

    /// Both phases succeeded for one extension.
    #[serde(rename = "extension-built")]
    ExtensionBuilt {
        extension: String,
        output_dir: PathBuf,
        /// Loadable modules found in the output directory
        filenames: Vec<PathBuf>,
        duration_ms: u64,
    },

    #[serde(rename = "build-finished")]
    BuildFinished {
        success: bool,
        duration_ms: u64,
        extensions_built: usize,
        extensions_failed: usize,
    },

    /// A generic diagnostic message.
    #[serde(rename = "diagnostic")]
    Diagnostic {
        /// Severity level ("error", "warning")
        level: String,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        extension: Option<String>,
    },
}

impl BuildEvent {
    pub fn started(mode: impl Into<String>, platform: PlatformFamily, extension_count: usize) -> Self {
        BuildEvent::BuildStarted {
            mode: mode.into(),
            platform,
            extension_count,
        }
    }

    pub fn phase_started(extension: &str, phase: Phase, command: impl Into<String>) -> Self {
        BuildEvent::PhaseStarted {
            extension: extension.to_string(),
            phase,
            command: command.into(),
        }
    }

    pub fn phase_finished(extension: &str, phase: Phase, exit_code: Option<i32>) -> Self {
        BuildEvent::PhaseFinished {
            extension: extension.to_string(),
            phase,
            exit_code,
            success: exit_code == Some(0),
        }
    }

    /// Create a build finished event.
    pub fn finished(built: usize, failed: usize, duration_ms: u64) -> Self {
        BuildEvent::BuildFinished {
            success: failed == 0,
            duration_ms,
            extensions_built: built,
            extensions_failed: failed,
        }
    }

    /// Create an error diagnostic, optionally tied to one extension.
    pub fn error(message: impl Into<String>, extension: Option<&str>) -> Self {
        BuildEvent::Diagnostic {
            level: "error".to_string(),
            message: message.into(),
            extension: extension.map(str::to_string),
        }
    }

    /// Serialize this event to a JSON string.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Receiver for build events. Shared across worker threads.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: BuildEvent);
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: BuildEvent) {}
}

/// Writes one JSON object per line to stdout.
#[derive(Debug, Default)]
pub struct JsonLinesSink {
    // Serializes whole lines between workers
    lock: Mutex<()>,
}

impl JsonLinesSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EventSink for JsonLinesSink {
    fn emit(&self, event: BuildEvent) {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut out = std::io::stdout().lock();
        let _ = writeln!(out, "{}", event.to_json());
        let _ = out.flush();
    }
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct CollectingSink {
    events: Mutex<Vec<BuildEvent>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<BuildEvent> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl EventSink for CollectingSink {
    fn emit(&self, event: BuildEvent) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_started_serialization() {
        let json = BuildEvent::started("Release", PlatformFamily::Other, 2).to_json();
        assert!(json.contains("\"reason\":\"build-started\""));
        assert!(json.contains("\"mode\":\"Release\""));
        assert!(json.contains("\"platform\":\"other\""));
        assert!(json.contains("\"extension_count\":2"));
    }

    #[test]
    fn test_phase_finished_serialization() {
        let json = BuildEvent::phase_finished("core", Phase::Configure, Some(1)).to_json();
        assert!(json.contains("\"reason\":\"phase-finished\""));
        assert!(json.contains("\"phase\":\"configure\""));
        assert!(json.contains("\"exit_code\":1"));
        assert!(json.contains("\"success\":false"));

        let killed = BuildEvent::phase_finished("core", Phase::Build, None).to_json();
        assert!(!killed.contains("exit_code"));
    }

    #[test]
    fn test_finished_serialization() {
        let json = BuildEvent::finished(1, 1, 2340).to_json();
        assert!(json.contains("\"reason\":\"build-finished\""));
        assert!(json.contains("\"success\":false"));
        assert!(json.contains("\"duration_ms\":2340"));
        assert!(json.contains("\"extensions_failed\":1"));
    }

    #[test]
    fn test_diagnostic_serialization() {
        let json = BuildEvent::error("configure failed", Some("core")).to_json();
        assert!(json.contains("\"reason\":\"diagnostic\""));
        assert!(json.contains("\"level\":\"error\""));
        assert!(json.contains("\"extension\":\"core\""));

        let json = BuildEvent::error("no cmake", None).to_json();
        assert!(!json.contains("extension"));
    }

    #[test]
    fn test_collecting_sink() {
        let sink = CollectingSink::new();
        sink.emit(BuildEvent::started("Release", PlatformFamily::Windows, 1));
        sink.emit(BuildEvent::finished(1, 0, 10));
        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[1], BuildEvent::BuildFinished { success: true, .. }));
    }
}
