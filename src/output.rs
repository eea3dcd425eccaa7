// ABOUTME: Terminal reporting for shipnode commands.
// ABOUTME: Renders the same events as human text, terse CI text, or JSON lines.

use serde::Serialize;
use std::time::Instant;

use crate::diagnostics::{Warning, WarningKind};
use crate::remote::PlannedStep;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Progress lines plus results.
    Normal,
    /// Results only, for CI logs.
    Quiet,
    /// One JSON object per line on stdout; problems on stderr.
    Json,
}

/// One reportable moment of a command.
#[derive(Debug, Serialize)]
#[serde(tag = "event", rename_all = "lowercase")]
enum Event<'a> {
    Success {
        message: &'a str,
        #[serde(skip_serializing_if = "Option::is_none")]
        duration_secs: Option<f64>,
    },
    Warning {
        kind: WarningKind,
        message: &'a str,
    },
    Error {
        message: &'a str,
        #[serde(skip_serializing_if = "Option::is_none")]
        duration_secs: Option<f64>,
    },
}

impl Event<'_> {
    fn to_stderr(&self) -> bool {
        !matches!(self, Event::Success { .. })
    }

    fn human(&self) -> String {
        match self {
            Event::Success {
                message,
                duration_secs: Some(secs),
            } => format!("{message} ({secs:.1}s)"),
            Event::Success { message, .. } => message.to_string(),
            Event::Warning { kind, message } => format!("Warning ({}): {message}", kind.label()),
            Event::Error { message, .. } => format!("Error: {message}"),
        }
    }
}

pub struct Output {
    mode: OutputMode,
    started: Option<Instant>,
}

impl Output {
    pub fn new(mode: OutputMode) -> Self {
        Self {
            mode,
            started: None,
        }
    }

    pub fn mode(&self) -> OutputMode {
        self.mode
    }

    /// Start the clock reported with the final result.
    pub fn start_timer(&mut self) {
        self.started = Some(Instant::now());
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.started.map_or(0.0, |t| t.elapsed().as_secs_f64())
    }

    fn duration(&self) -> Option<f64> {
        self.started.map(|t| t.elapsed().as_secs_f64())
    }

    fn emit(&self, event: Event<'_>) {
        let text = match self.mode {
            OutputMode::Json => match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(e) => {
                    tracing::debug!("unserializable output event: {}", e);
                    return;
                }
            },
            // Quiet runs report the outcome without timing noise.
            OutputMode::Quiet => match &event {
                Event::Success { message, .. } => message.to_string(),
                other => other.human(),
            },
            OutputMode::Normal => event.human(),
        };
        if event.to_stderr() {
            eprintln!("{text}");
        } else {
            println!("{text}");
        }
    }

    /// Step-by-step narration. Normal mode only.
    pub fn progress(&self, message: &str) {
        if self.mode == OutputMode::Normal {
            println!("{message}");
        }
    }

    /// A line of human-readable command output; JSON mode reports via [`Output::data`].
    pub fn line(&self, message: &str) {
        if self.mode != OutputMode::Json {
            println!("{message}");
        }
    }

    pub fn success(&self, message: &str) {
        self.emit(Event::Success {
            message,
            duration_secs: self.duration(),
        });
    }

    pub fn warning(&self, warning: &Warning) {
        self.emit(Event::Warning {
            kind: warning.kind,
            message: &warning.message,
        });
    }

    pub fn error(&self, message: &str) {
        self.emit(Event::Error {
            message,
            duration_secs: self.duration(),
        });
    }

    /// Numbered list of what a dry run would do.
    pub fn plan(&self, steps: &[PlannedStep]) {
        if self.mode == OutputMode::Json {
            let steps: Vec<String> = steps.iter().map(ToString::to_string).collect();
            self.data("plan", &steps);
            return;
        }
        for (n, step) in steps.iter().enumerate() {
            println!("{:>3}. {}", n + 1, step);
        }
    }

    /// Structured result payload, printed only in JSON mode.
    pub fn data<T: Serialize>(&self, event: &str, data: &T) {
        if self.mode == OutputMode::Json {
            println!("{}", serde_json::json!({ "event": event, "data": data }));
        }
    }
}
