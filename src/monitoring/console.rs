//! Console Presentation
//!
//! Formats the per-step console lines and keeps the optional per-stage
//! transcript (`.Interceptor-<Stage>-Stage-Output`).
//!
//! Line layout:
//!
//! ```text
//! ❯  [1] Run make build            step started
//!    [1] compiling...              step output
//! ⬤ [1] Run make build [1m 5s]     step ended
//! ```

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

use colored::Colorize;
use log::warn;

use crate::environment::HostOutputs;
use crate::execution::{Outcome, Stage};
use crate::workflow::Step;

/// Title of the group holding interleaved step lines.
pub const CONCURRENT_GROUP_TITLE: &str = "Concurrent logs";

/// Prefix of a "step started" line.
pub fn start_prefix() -> String {
    "❯  ".bright_black().bold().to_string()
}

/// Prefix of a step output line.
pub fn log_prefix() -> String {
    "   ".bright_black().bold().to_string()
}

/// Prefix of a "step ended" line.
///
/// A missing outcome means the step has nothing to run in the stage.
pub fn end_prefix(outcome: Option<Outcome>) -> String {
    match outcome {
        None | Some(Outcome::Success) => "⬤ ".bright_black().bold().to_string(),
        Some(Outcome::Error) => "⬤ ".red().bold().to_string(),
    }
}

/// `[<index>] ` marker identifying a step in interleaved output.
pub fn step_indicator(index: usize) -> String {
    format!("[{}] ", index).bright_black().bold().to_string()
}

/// Formats a duration given in milliseconds as `1h 2m 3s`.
///
/// Hours and minutes are omitted when zero; seconds are always present.
pub fn format_duration(millis: u64) -> String {
    let total_seconds = millis / 1000;
    let seconds = total_seconds % 60;
    let total_minutes = total_seconds / 60;
    let minutes = total_minutes % 60;
    let hours = total_minutes / 60;

    let mut parts = Vec::new();
    if hours > 0 {
        parts.push(format!("{}h", hours));
    }
    if minutes > 0 {
        parts.push(format!("{}m", minutes));
    }
    parts.push(format!("{}s", seconds));
    parts.join(" ")
}

/// Headline of a step: `[<Stage> ]Run <name>[ [<duration>]]`.
///
/// The stage is omitted for the execution stage.
pub fn step_headline(stage: Stage, step: &Step, execution_time_nanos: Option<u64>) -> String {
    let mut headline = String::new();
    if stage != Stage::Execution {
        headline.push_str(stage.engine_name());
        headline.push(' ');
    }
    headline.push_str("Run ");
    headline.push_str(&step.display_name());

    if let Some(nanos) = execution_time_nanos.filter(|n| *n > 0) {
        let duration = format!(" [{}]", format_duration(nanos / 1_000_000));
        headline.push_str(&duration.bright_black().bold().to_string());
    }
    headline
}

/// Console writer for one stage.
pub struct Console {
    echo: bool,
    lines: Vec<String>,
    transcript: Option<File>,
    concurrent_group_open: bool,
}

impl Console {
    /// Console printing to stdout.
    pub fn stdout() -> Self {
        Self {
            echo: true,
            lines: Vec::new(),
            transcript: None,
            concurrent_group_open: false,
        }
    }

    /// Console keeping lines in memory instead of printing them.
    pub fn buffered() -> Self {
        Self {
            echo: false,
            ..Self::stdout()
        }
    }

    /// Additionally appends every line to `path`.
    pub fn with_transcript(mut self, path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        self.transcript = Some(file);
        Ok(self)
    }

    /// Writes one line.
    pub fn line(&mut self, text: &str) {
        if self.echo {
            println!("{}", text);
        } else {
            self.lines.push(text.to_string());
        }

        if let Some(file) = self.transcript.as_mut() {
            if let Err(e) = writeln!(file, "{}", text) {
                warn!("Failed to write console transcript: {}", e);
                self.transcript = None;
            }
        }
    }

    /// Writes one interleaved step line, opening the concurrent group first.
    pub fn concurrent_line<H: HostOutputs>(&mut self, host: &mut H, text: &str) {
        if !self.concurrent_group_open {
            host.start_group(CONCURRENT_GROUP_TITLE);
            self.concurrent_group_open = true;
        }
        self.line(text);
    }

    /// Closes the concurrent group if it is open.
    pub fn close_concurrent_group<H: HostOutputs>(&mut self, host: &mut H) {
        if self.concurrent_group_open {
            host.end_group();
            self.concurrent_group_open = false;
        }
    }

    pub fn is_concurrent_group_open(&self) -> bool {
        self.concurrent_group_open
    }

    /// Lines kept by a buffered console.
    pub fn lines(&self) -> &[String] {
        &self.lines
    }
}
