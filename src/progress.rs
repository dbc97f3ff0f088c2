//! Pipeline progress reporting.
//!
//! Reports stage transitions during `adsmith run` and `adsmith research` so
//! users see which stage is running and how long each one took. Progress is
//! emitted on **stderr** so stdout remains parseable for scripts.

use std::io::Write;
use std::time::Duration;

use crate::agents::StageName;

/// A single progress event for a pipeline run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PipelineEvent {
    StageStarted {
        stage: StageName,
    },
    StageFinished {
        stage: StageName,
        elapsed: Duration,
    },
    StageFailed {
        stage: StageName,
        error: String,
    },
}

/// Reports pipeline progress. Implementations write to stderr (human or JSON).
pub trait ProgressReporter: Send + Sync {
    /// Emit a progress event. Called by the pipeline around every stage.
    fn report(&self, event: PipelineEvent);
}

/// Human-friendly progress on stderr: "[2/3] marketing  done in 4.2s".
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn report(&self, event: PipelineEvent) {
        let line = match &event {
            PipelineEvent::StageStarted { stage } => {
                format!("{} {}  running...\n", step(*stage), stage)
            }
            PipelineEvent::StageFinished { stage, elapsed } => format!(
                "{} {}  done in {}\n",
                step(*stage),
                stage,
                format_elapsed(*elapsed)
            ),
            PipelineEvent::StageFailed { stage, error } => {
                format!("{} {}  failed: {}\n", step(*stage), stage, error)
            }
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl ProgressReporter for JsonProgress {
    fn report(&self, event: PipelineEvent) {
        let obj = match &event {
            PipelineEvent::StageStarted { stage } => serde_json::json!({
                "event": "stage_started",
                "stage": stage,
            }),
            PipelineEvent::StageFinished { stage, elapsed } => serde_json::json!({
                "event": "stage_finished",
                "stage": stage,
                "elapsed_ms": elapsed.as_millis() as u64,
            }),
            PipelineEvent::StageFailed { stage, error } => serde_json::json!({
                "event": "stage_failed",
                "stage": stage,
                "error": error,
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _event: PipelineEvent) {}
}

fn step(stage: StageName) -> String {
    format!("[{}/{}]", stage.position() + 1, StageName::ALL.len())
}

fn format_elapsed(d: Duration) -> String {
    let secs = d.as_secs_f64();
    if secs < 1.0 {
        format!("{}ms", d.as_millis())
    } else if secs < 60.0 {
        format!("{:.1}s", secs)
    } else {
        format!("{}m{:02}s", d.as_secs() / 60, d.as_secs() % 60)
    }
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    /// Build a reporter for this mode.
    pub fn reporter(&self) -> Box<dyn ProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
