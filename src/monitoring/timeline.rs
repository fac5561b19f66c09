//! Stage Timeline
//!
//! Tracks when each step of a stage started and ended, for the timing
//! summary logged at the end of a stage.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use crate::execution::Stage;

/// Width of the Gantt bars, in characters.
const CHART_WIDTH: f64 = 50.0;

/// Type of timeline event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    /// Step entered the stage
    Started,
    /// Step completed successfully (or had nothing to run)
    Completed,
    /// Step failed
    Failed,
}

/// One recorded lifecycle point of a step.
#[derive(Debug, Clone)]
pub struct TimelineEvent {
    pub step_index: usize,
    pub event_type: EventType,
    pub at: Instant,
}

/// Start and end of one step, in milliseconds since the stage began.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepSpan {
    pub start_ms: u128,
    pub end_ms: Option<u128>,
    pub failed: bool,
}

impl StepSpan {
    pub fn duration_ms(&self) -> Option<u128> {
        self.end_ms.map(|end| end.saturating_sub(self.start_ms))
    }
}

/// Tracks the timeline of one stage.
#[derive(Debug, Clone)]
pub struct ExecutionTimeline {
    stage: Stage,
    began: Instant,
    events: Vec<TimelineEvent>,
}

impl ExecutionTimeline {
    /// Creates a new timeline for `stage` starting now.
    pub fn new(stage: Stage) -> Self {
        Self {
            stage,
            began: Instant::now(),
            events: Vec::new(),
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn add_event(&mut self, step_index: usize, event_type: EventType) {
        self.events.push(TimelineEvent {
            step_index,
            event_type,
            at: Instant::now(),
        });
    }

    pub fn events(&self) -> &[TimelineEvent] {
        &self.events
    }

    /// Time since the stage began.
    pub fn elapsed(&self) -> Duration {
        self.began.elapsed()
    }

    /// Per-step spans keyed by step index.
    ///
    /// Steps that never started in this stage (e.g. failed in an earlier
    /// stage) have no span.
    pub fn spans(&self) -> BTreeMap<usize, StepSpan> {
        let mut spans = BTreeMap::new();

        for event in &self.events {
            let offset = event.at.saturating_duration_since(self.began).as_millis();
            match event.event_type {
                EventType::Started => {
                    spans.insert(
                        event.step_index,
                        StepSpan {
                            start_ms: offset,
                            end_ms: None,
                            failed: false,
                        },
                    );
                }
                EventType::Completed | EventType::Failed => {
                    if let Some(span) = spans.get_mut(&event.step_index) {
                        span.end_ms = Some(offset);
                        span.failed = event.event_type == EventType::Failed;
                    }
                }
            }
        }

        spans
    }

    /// Durations in milliseconds of the steps that started and ended.
    pub fn durations(&self) -> BTreeMap<usize, u128> {
        self.spans()
            .into_iter()
            .filter_map(|(index, span)| span.duration_ms().map(|ms| (index, ms)))
            .collect()
    }

    /// Renders an ASCII Gantt chart of the stage, `x` marking failed steps.
    pub fn gantt_chart(&self) -> String {
        let mut chart = format!("\n{} Timeline:\n\n", self.stage);

        let total_ms = self.elapsed().as_millis();
        if total_ms == 0 {
            return chart;
        }
        let scale = CHART_WIDTH / total_ms as f64;

        let mut rows: Vec<(usize, StepSpan)> = self.spans().into_iter().collect();
        rows.sort_by_key(|(_, span)| span.start_ms);

        for (index, span) in rows {
            let Some(duration) = span.duration_ms() else {
                continue;
            };
            let offset = (span.start_ms as f64 * scale) as usize;
            let width = (duration as f64 * scale).max(1.0) as usize;
            let bar = (if span.failed { "x" } else { "#" }).repeat(width);

            chart.push_str(&format!(
                "{:>8} |{}{}| ({} ms)\n",
                format!("Step{}", index),
                " ".repeat(offset),
                bar,
                duration
            ));
        }

        chart.push_str(&format!("\nStage total: {} ms\n", total_ms));
        chart
    }
}
