//! Stage Execution Module
//!
//! Runs a step batch through the engine, one stage at a time, and folds
//! the engine log into per-step results.
//!
//! # Architecture
//!
//! - [`stage`]: The three stages and their engine names
//! - [`barrier`]: Sentinel barrier between the orchestrator and the jobs
//! - [`interceptor`]: Job-side hooks that open and close stage windows
//! - [`tail`]: Follows the engine log
//! - [`classifier`]: Decodes and classifies engine log lines
//! - [`aggregator`]: Per-stage step lifecycle state machine
//! - [`replay`]: Captured step commands and their replay onto the host
//! - [`engine`]: Engine process launch and release
//! - [`orchestrator`]: Drives the stages end to end

pub mod aggregator;
pub mod barrier;
pub mod classifier;
pub mod engine;
pub mod interceptor;
pub mod orchestrator;
pub mod replay;
pub mod stage;
pub mod tail;

pub use aggregator::{
    Aggregator, AggregatorError, ProtocolViolation, StageOutcome, StepResult, StepStatus,
};
pub use barrier::{
    output_sink_name, sentinel_name, Barrier, BarrierError, FsBarrier, MemoryBarrier,
};
pub use classifier::{classify_line, Command, CommandKind, Event, EventKind, Outcome};
pub use engine::{ActLauncher, EngineError, EngineHandle, EngineLauncher};
pub use interceptor::{run_hook, Hook, HookInputs, InterceptError};
pub use orchestrator::{Orchestrator, StageError};
pub use replay::CommandCaptures;
pub use stage::Stage;
pub use tail::{LogTail, StartPosition, TailError};
