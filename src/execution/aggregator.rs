//! Step Lifecycle Aggregator
//!
//! Consumes the classified engine events of one stage, in log order, and
//! drives a [`StepResult`] per step:
//!
//! ```text
//! Queued ──Start──▶ InProgress ──End / job failure──▶ Completed
//! ```
//!
//! Once every step is Completed the stage resolves exactly once: the
//! per-step log groups are printed, captured commands are replayed onto
//! the host, and the [`StageOutcome`] is returned.
//!
//! Events are processed by a single consumer, so no locking is involved.
//!
//! # Example
//!
//! ```rust,no_run
//! use parallel_steps::environment::RecordingHost;
//! use parallel_steps::execution::{Aggregator, Event, Outcome, Stage};
//! use parallel_steps::monitoring::Console;
//! use parallel_steps::workflow::{Step, StepBatch};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let steps = StepBatch::from_steps(vec![Step::run("make")]);
//! let mut host = RecordingHost::new();
//! let mut aggregator = Aggregator::new(Stage::Execution, &steps, Console::buffered());
//!
//! aggregator.handle(Event::start(0, "Main"), &mut host)?;
//! let outcome = aggregator.handle(Event::end(0, "Main", Some(Outcome::Success)), &mut host)?;
//! assert!(outcome.unwrap().is_success());
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeSet;
use std::fmt;

use colored::Colorize;
use log::{debug, error, info, warn};
use thiserror::Error;

use crate::environment::{HostError, HostOutputs};
use crate::monitoring::console::{end_prefix, log_prefix, start_prefix, step_headline, step_indicator};
use crate::monitoring::{Console, EventType, ExecutionTimeline};
use crate::workflow::state::FailedSteps;
use crate::workflow::StepBatch;

use super::classifier::{Command, Event, EventKind, Outcome};
use super::replay::{CaptureError, CommandCaptures};
use super::stage::Stage;

/// Lifecycle status of a step within a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum StepStatus {
    Queued,
    InProgress,
    Completed,
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            StepStatus::Queued => "Queued",
            StepStatus::InProgress => "In Progress",
            StepStatus::Completed => "Completed",
        };
        f.write_str(label)
    }
}

/// The engine and the runner disagree about the lifecycle of a step.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolViolation {
    #[error("Unexpected start of step {index} (status: {status})")]
    UnexpectedStart { index: usize, status: StepStatus },

    #[error("Unexpected end of step {index} (status: {status})")]
    UnexpectedEnd { index: usize, status: StepStatus },

    #[error("Unexpected command for step {index} (status: {status})")]
    UnexpectedCommand { index: usize, status: StepStatus },

    #[error("Unexpected result for step {index} (status: {status})")]
    UnexpectedResult { index: usize, status: StepStatus },

    #[error("Unexpected {kind} command for step {index}: missing name")]
    MalformedCommand { index: usize, kind: String },

    #[error("Unexpected step index: {0}")]
    UnknownJob(String),

    #[error("Unexpected stage event: expected {expected}, got {found}")]
    StageMismatch { expected: String, found: String },

    #[error("Step {index} completed twice")]
    DoubleCompletion { index: usize },
}

/// Errors that reject a stage.
#[derive(Debug, Error)]
pub enum AggregatorError {
    #[error(transparent)]
    Protocol(#[from] ProtocolViolation),

    /// The engine rejected the workflow before any step ran
    #[error("{0}")]
    EngineFatal(String),

    #[error("Failed to replay step commands: {0}")]
    Host(#[from] HostError),

    #[error("Failed to record failed step {index}: {source}")]
    FailedSteps {
        index: usize,
        source: std::io::Error,
    },
}

/// Aggregated result of a stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    Success,
    Failed { failed_steps: Vec<usize> },
}

impl StageOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, StageOutcome::Success)
    }
}

/// Mutable lifecycle record of one step.
#[derive(Debug, Clone)]
pub struct StepResult {
    pub status: StepStatus,

    /// Final outcome, set only on completion
    pub outcome: Option<Outcome>,

    /// Engine-reported duration of the step
    pub execution_time_nanos: Option<u64>,

    /// Step output in emission order
    pub output: String,

    pub captures: CommandCaptures,

    /// Outcome reported before completion (result line or fetch failure)
    reported: Option<Outcome>,

    /// Seeded as failed from an earlier stage
    pre_recorded: bool,
}

impl StepResult {
    fn new() -> Self {
        Self {
            status: StepStatus::Queued,
            outcome: None,
            execution_time_nanos: None,
            output: String::new(),
            captures: CommandCaptures::default(),
            reported: None,
            pre_recorded: false,
        }
    }

    /// True when the step was seeded from a failure in an earlier stage.
    pub fn is_pre_recorded(&self) -> bool {
        self.pre_recorded
    }

    fn push_output(&mut self, line: &str) {
        self.output.push_str(line);
        self.output.push('\n');
    }
}

/// Per-stage step lifecycle aggregator.
pub struct Aggregator<'a> {
    stage: Stage,
    steps: &'a StepBatch,
    results: Vec<StepResult>,
    console: Console,
    timeline: ExecutionTimeline,
    failed_steps: Option<FailedSteps>,
    debug: bool,
    resolved: Option<StageOutcome>,
}

impl<'a> Aggregator<'a> {
    /// Creates an aggregator with every step Queued.
    pub fn new(stage: Stage, steps: &'a StepBatch, console: Console) -> Self {
        Self {
            stage,
            steps,
            results: (0..steps.len()).map(|_| StepResult::new()).collect(),
            console,
            timeline: ExecutionTimeline::new(stage),
            failed_steps: None,
            debug: false,
            resolved: None,
        }
    }

    /// Persists every error completion to `failed_steps`.
    pub fn with_failed_steps(mut self, failed_steps: FailedSteps) -> Self {
        self.failed_steps = Some(failed_steps);
        self
    }

    /// Enables protocol debug markers.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn results(&self) -> &[StepResult] {
        &self.results
    }

    pub fn result(&self, index: usize) -> Option<&StepResult> {
        self.results.get(index)
    }

    /// The resolved stage outcome, once every step has completed.
    pub fn outcome(&self) -> Option<&StageOutcome> {
        self.resolved.as_ref()
    }

    pub fn timeline(&self) -> &ExecutionTimeline {
        &self.timeline
    }

    /// Writes a line into the concurrent log group.
    pub fn concurrent_log<H: HostOutputs>(&mut self, host: &mut H, line: &str) {
        self.console.concurrent_line(host, line);
    }

    /// Seeds steps that failed in an earlier stage as Completed/error.
    ///
    /// Later lifecycle events for these steps are absorbed. Returns the
    /// stage outcome when seeding alone completes the stage.
    pub fn seed_failed<H: HostOutputs>(
        &mut self,
        indices: &BTreeSet<usize>,
        host: &mut H,
    ) -> Result<Option<StageOutcome>, AggregatorError> {
        for &index in indices {
            let Some(result) = self.results.get_mut(index) else {
                warn!("Ignoring recorded failure of unknown step {}", index);
                continue;
            };
            if result.pre_recorded {
                continue;
            }
            result.status = StepStatus::Completed;
            result.outcome = Some(Outcome::Error);
            result.pre_recorded = true;
            debug!("Step {} failed in an earlier stage", index);
        }

        self.check_done(host)
    }

    /// Applies one event.
    ///
    /// Returns the stage outcome on the event that completes the stage,
    /// `None` otherwise. Events after resolution are ignored.
    pub fn handle<H: HostOutputs>(
        &mut self,
        event: Event,
        host: &mut H,
    ) -> Result<Option<StageOutcome>, AggregatorError> {
        if self.resolved.is_some() {
            return Ok(None);
        }

        match &event.kind {
            EventKind::Noise => return Ok(None),
            EventKind::EngineFatal(message) => {
                error!("Engine rejected the workflow: {}", message);
                return Err(AggregatorError::EngineFatal(message.clone()));
            }
            EventKind::Untargeted => {
                debug!("engine: {}", event.message);
                return Ok(None);
            }
            _ => {}
        }

        let index = self.step_index(&event)?;

        if self.results[index].pre_recorded {
            debug!("Absorbed event for failed step {}: {:?}", index, event.kind);
            return Ok(None);
        }

        match event.kind {
            EventKind::Start { stage } => {
                self.check_stage(&stage)?;
                self.start_step(index, host)?;
                Ok(None)
            }
            EventKind::End { stage, result } => {
                self.check_stage(&stage)?;
                let status = self.results[index].status;
                if status == StepStatus::Queued {
                    return Err(ProtocolViolation::UnexpectedEnd { index, status }.into());
                }
                self.complete_step(index, result, host)
            }
            EventKind::Announce { stage } => {
                if stage == self.stage.engine_name() {
                    let line = format!(
                        "{}{}{}",
                        start_prefix(),
                        step_indicator(index),
                        self.headline(index)
                    );
                    self.console.concurrent_line(host, &line);
                }
                Ok(None)
            }
            EventKind::Output => {
                let line = format!("{}{}{}", log_prefix(), step_indicator(index), event.message);
                self.console.concurrent_line(host, &line);
                self.results[index].push_output(&event.message);
                Ok(None)
            }
            EventKind::Command(command) => {
                self.capture_command(index, &command)?;
                Ok(None)
            }
            EventKind::Result {
                result,
                execution_time_nanos,
            } => {
                self.record_result(index, result, execution_time_nanos, host)?;
                Ok(None)
            }
            EventKind::FetchFailed(message) => {
                let text = format!("::error::{}", message);
                let line = format!("{}{}{}", log_prefix(), step_indicator(index), text);
                self.console.concurrent_line(host, &line);

                let result = &mut self.results[index];
                result.push_output(&text);
                result.reported = Some(Outcome::Error);
                Ok(None)
            }
            EventKind::JobResult { failed } => {
                if failed && self.results[index].status != StepStatus::Completed {
                    debug!("Job of step {} failed", index);
                    return self.complete_step(index, Some(Outcome::Error), host);
                }
                Ok(None)
            }
            EventKind::Other => Ok(None),
            EventKind::Noise | EventKind::EngineFatal(_) | EventKind::Untargeted => Ok(None),
        }
    }

    /// Completes step `index`, the single authoritative completion path.
    ///
    /// `outcome` falls back to the outcome reported earlier by the engine.
    /// Completing a step twice is a protocol violation.
    pub fn complete_step<H: HostOutputs>(
        &mut self,
        index: usize,
        outcome: Option<Outcome>,
        host: &mut H,
    ) -> Result<Option<StageOutcome>, AggregatorError> {
        let result = self
            .results
            .get_mut(index)
            .ok_or_else(|| ProtocolViolation::UnknownJob(StepBatch::job_id(index)))?;

        if result.status == StepStatus::Completed {
            return Err(ProtocolViolation::DoubleCompletion { index }.into());
        }

        result.status = StepStatus::Completed;
        result.outcome = outcome.or(result.reported);
        let outcome = result.outcome;
        let elapsed = result.execution_time_nanos;

        if outcome == Some(Outcome::Error) {
            self.timeline.add_event(index, EventType::Failed);
            if let Some(failed_steps) = &self.failed_steps {
                failed_steps
                    .record(index)
                    .map_err(|source| AggregatorError::FailedSteps { index, source })?;
            }
        } else {
            self.timeline.add_event(index, EventType::Completed);
        }

        match elapsed {
            Some(nanos) => debug!(
                "Step {} ended: {} ({} ms)",
                index,
                outcome.map_or("none", Outcome::as_str),
                nanos / 1_000_000
            ),
            None => debug!(
                "Step {} ended: {}",
                index,
                outcome.map_or("none", Outcome::as_str)
            ),
        }
        if self.debug {
            self.console
                .concurrent_line(host, &format!("__::Step::End::{}", index));
        }

        self.check_done(host)
    }

    fn step_index(&self, event: &Event) -> Result<usize, ProtocolViolation> {
        let job_id = event.job_id.as_deref().unwrap_or_default();
        job_id
            .trim_start_matches(|c: char| !c.is_ascii_digit())
            .parse::<usize>()
            .ok()
            .filter(|index| *index < self.results.len())
            .ok_or_else(|| ProtocolViolation::UnknownJob(job_id.to_string()))
    }

    fn check_stage(&self, stage: &str) -> Result<(), ProtocolViolation> {
        if stage == self.stage.engine_name() {
            Ok(())
        } else {
            Err(ProtocolViolation::StageMismatch {
                expected: self.stage.engine_name().to_string(),
                found: stage.to_string(),
            })
        }
    }

    fn start_step<H: HostOutputs>(&mut self, index: usize, host: &mut H) -> Result<(), ProtocolViolation> {
        let result = &mut self.results[index];
        if result.status != StepStatus::Queued {
            return Err(ProtocolViolation::UnexpectedStart {
                index,
                status: result.status,
            });
        }

        result.status = StepStatus::InProgress;
        self.timeline.add_event(index, EventType::Started);
        debug!("Step {} started", index);
        if self.debug {
            self.console
                .concurrent_line(host, &format!("__::Step::Start::{}", index));
        }
        Ok(())
    }

    fn capture_command(&mut self, index: usize, command: &Command) -> Result<(), ProtocolViolation> {
        let result = &mut self.results[index];
        if result.status != StepStatus::InProgress {
            return Err(ProtocolViolation::UnexpectedCommand {
                index,
                status: result.status,
            });
        }

        result.captures.apply(command).map_err(|e| match e {
            CaptureError::MissingName => ProtocolViolation::MalformedCommand {
                index,
                kind: command.kind.name().to_string(),
            },
        })
    }

    fn record_result<H: HostOutputs>(
        &mut self,
        index: usize,
        outcome: Option<Outcome>,
        execution_time_nanos: Option<u64>,
        host: &mut H,
    ) -> Result<(), ProtocolViolation> {
        let result = &mut self.results[index];
        if result.status != StepStatus::InProgress {
            return Err(ProtocolViolation::UnexpectedResult {
                index,
                status: result.status,
            });
        }

        if outcome.is_some() {
            result.reported = outcome;
        }
        result.execution_time_nanos = execution_time_nanos;

        let line = format!(
            "{}{}{}",
            end_prefix(outcome),
            step_indicator(index),
            self.headline(index)
        );
        self.console.concurrent_line(host, &line);
        Ok(())
    }

    fn headline(&self, index: usize) -> String {
        match self.steps.get(index) {
            Some(step) => step_headline(self.stage, step, self.results[index].execution_time_nanos),
            None => String::new(),
        }
    }

    /// Resolves the stage once every step is Completed.
    fn check_done<H: HostOutputs>(
        &mut self,
        host: &mut H,
    ) -> Result<Option<StageOutcome>, AggregatorError> {
        if self.resolved.is_some() {
            return Ok(None);
        }
        if !self
            .results
            .iter()
            .all(|result| result.status == StepStatus::Completed)
        {
            return Ok(None);
        }

        self.console.close_concurrent_group(host);

        for (index, step) in self.steps.iter().enumerate() {
            let result = &self.results[index];

            if let Some(outcome) = result.outcome {
                let title = format!(
                    " {}{}",
                    end_prefix(Some(outcome)),
                    step_headline(self.stage, step, result.execution_time_nanos)
                );
                self.console.line("");
                host.start_group(&title);
                self.console.line(result.output.trim_end_matches('\n'));
                host.end_group();
            }

            result.captures.replay(step, host)?;
        }

        let failed_steps: Vec<usize> = self
            .results
            .iter()
            .enumerate()
            .filter(|(_, result)| result.outcome == Some(Outcome::Error))
            .map(|(index, _)| index)
            .collect();

        debug!("{}", self.timeline.gantt_chart());

        let outcome = if failed_steps.is_empty() {
            info!("{} stage completed: {} steps succeeded", self.stage, self.steps.len());
            StageOutcome::Success
        } else {
            warn!(
                "{} stage failed: {} of {} steps failed {:?}",
                self.stage,
                failed_steps.len(),
                self.steps.len(),
                failed_steps
            );
            StageOutcome::Failed { failed_steps }
        };

        self.resolved = Some(outcome.clone());
        Ok(Some(outcome))
    }

    /// Echoes a raw engine line (trace mode).
    pub fn trace_line<H: HostOutputs>(&mut self, host: &mut H, line: &str) {
        let colored = line.cyan().bold().to_string();
        self.console.concurrent_line(host, &colored);
    }
}
