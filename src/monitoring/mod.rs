//! Monitoring Module
//!
//! Provides the step console and the per-stage execution timeline.
//!
//! # Components
//!
//! - [`Console`]: Prefixed step lines and the concurrent log group
//! - [`ExecutionTimeline`]: Step start/end timing for Gantt charts

pub mod console;
pub mod timeline;

pub use console::Console;
pub use timeline::{EventType, ExecutionTimeline, StepSpan, TimelineEvent};
