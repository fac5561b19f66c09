//! Stage Orchestrator
//!
//! Drives the stages of a step batch:
//!
//! 1. Before the first stage: render the engine workflow, write the
//!    interceptor action, launch the engine
//! 2. For each stage: seed earlier failures, signal the stage sentinel,
//!    consume the engine log until every step has completed
//! 3. After the last stage, or on a failure other than failed steps:
//!    release the engine
//!
//! Two modes are supported. [`Orchestrator::run_all`] runs every stage in
//! one process with one continuous log tail. [`Orchestrator::run_stage`]
//! runs a single stage, for hosts that invoke setup, execution and
//! teardown as separate processes; the engine handle is persisted between
//! them.
//!
//! # Example
//!
//! ```rust,no_run
//! use parallel_steps::environment::{GithubHost, RunnerConfig};
//! use parallel_steps::execution::{ActLauncher, FsBarrier, Orchestrator};
//! use parallel_steps::workflow::parse_steps;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let config = RunnerConfig::from_env()?;
//! let steps = parse_steps("- run: make\n- run: make lint\n", config.max_steps)?;
//!
//! let mut orchestrator = Orchestrator::new(
//!     &config,
//!     &steps,
//!     FsBarrier::new(&config.temp_dir),
//!     ActLauncher::new(),
//!     GithubHost::from_env(),
//! );
//! orchestrator.run_all().await?;
//! # Ok(())
//! # }
//! ```

use log::{debug, error, info, warn};
use thiserror::Error;

use crate::environment::{ConfigError, HostOutputs, RunnerConfig};
use crate::monitoring::Console;
use crate::workflow::render::{self, RenderError};
use crate::workflow::state::EngineRecord;
use crate::workflow::StepBatch;

use super::aggregator::{Aggregator, AggregatorError, StageOutcome};
use super::barrier::{output_sink_name, sentinel_name, Barrier, BarrierError};
use super::classifier::classify_line;
use super::engine::{EngineError, EngineHandle, EngineLauncher};
use super::stage::Stage;
use super::tail::{LogTail, StartPosition, TailError};

/// Failure message reported for aggregated step failures.
pub const STEPS_FAILED_MESSAGE: &str = "One or more steps failed";

/// Errors that end a stage run.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("One or more steps failed")]
    StepsFailed {
        stage: Stage,
        failed_steps: Vec<usize>,
    },

    #[error(transparent)]
    Aggregator(#[from] AggregatorError),

    #[error(transparent)]
    Barrier(#[from] BarrierError),

    #[error(transparent)]
    Tail(#[from] TailError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to access run state: {0}")]
    State(#[from] std::io::Error),
}

/// Drives the stages of one step batch.
pub struct Orchestrator<'a, B, L, H> {
    config: &'a RunnerConfig,
    steps: &'a StepBatch,
    barrier: B,
    launcher: L,
    host: H,
    echo: bool,
}

impl<'a, B, L, H> Orchestrator<'a, B, L, H>
where
    B: Barrier,
    L: EngineLauncher,
    H: HostOutputs,
{
    pub fn new(config: &'a RunnerConfig, steps: &'a StepBatch, barrier: B, launcher: L, host: H) -> Self {
        Self {
            config,
            steps,
            barrier,
            launcher,
            host,
            echo: true,
        }
    }

    /// Prints step lines to stdout (default) or keeps them in memory.
    pub fn with_console_echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn into_host(self) -> H {
        self.host
    }

    /// Runs every stage in order within this process.
    pub async fn run_all(&mut self) -> Result<(), StageError> {
        info!("Running {} steps through all stages", self.steps.len());

        let mut engine = match self.start_engine() {
            Ok(engine) => engine,
            Err(e) => return Err(self.fail(e)),
        };

        let result = self.run_stages(&engine).await;
        self.finish_engine(&mut engine);

        result.map_err(|e| self.fail(e))
    }

    async fn run_stages(&mut self, engine: &EngineHandle) -> Result<(), StageError> {
        let mut tail = LogTail::open(
            engine.log_file(),
            StartPosition::Beginning,
            self.config.tail_poll_interval,
        )
        .await?;

        // Failed steps are seeded into the later stages, so the others still
        // get their teardown. The first failure is the one reported.
        let mut failed = None;
        for stage in Stage::ALL {
            match self.consume_stage(stage, &mut tail).await {
                Ok(()) => {}
                Err(e @ StageError::StepsFailed { .. }) => {
                    failed.get_or_insert(e);
                }
                Err(e) => return Err(e),
            }
        }
        failed.map_or(Ok(()), Err)
    }

    /// Runs a single stage.
    ///
    /// Setup launches the engine and persists its handle; later stages
    /// re-attach to it. Failed steps leave the engine running for the next
    /// stage; it is released after teardown and on any other failure.
    pub async fn run_stage(&mut self, stage: Stage) -> Result<(), StageError> {
        info!("Running {} stage for {} steps", stage, self.steps.len());

        let engine = if stage.is_first() {
            self.start_engine().and_then(|engine| {
                engine.persist(&self.config.temp_dir)?;
                Ok(engine)
            })
        } else {
            self.launcher.attach(self.config).map_err(StageError::from)
        };
        let mut engine = match engine {
            Ok(engine) => engine,
            Err(e) => return Err(self.fail(e)),
        };

        let start = if stage.is_first() {
            StartPosition::Beginning
        } else {
            StartPosition::End
        };

        let result = match LogTail::open(engine.log_file(), start, self.config.tail_poll_interval).await {
            Ok(mut tail) => self.consume_stage(stage, &mut tail).await,
            Err(e) => Err(e.into()),
        };

        match result {
            Ok(()) if !stage.is_last() => {
                engine.detach();
                Ok(())
            }
            Ok(()) => {
                self.finish_engine(&mut engine);
                Ok(())
            }
            // Failed steps are seeded into the next stage, which still needs the engine.
            Err(e @ StageError::StepsFailed { .. }) if !stage.is_last() => {
                engine.detach();
                Err(self.fail(e))
            }
            Err(e) => {
                self.finish_engine(&mut engine);
                Err(self.fail(e))
            }
        }
    }

    /// Renders the engine inputs and launches the engine.
    fn start_engine(&mut self) -> Result<EngineHandle, StageError> {
        self.config.prepare_temp_dir()?;
        render::write_workflow(self.steps, self.config)?;
        render::write_interceptor_action(self.config)?;
        self.config.failed_steps().ensure_exists()?;

        Ok(self.launcher.launch(self.config)?)
    }

    fn finish_engine(&mut self, engine: &mut EngineHandle) {
        if let Err(e) = engine.release() {
            warn!("{}", e);
        }
        if let Err(e) = EngineRecord::delete(&self.config.temp_dir) {
            warn!("Failed to delete engine record: {}", e);
        }
    }

    /// Reports a stage error to the host and passes it on.
    fn fail(&mut self, e: StageError) -> StageError {
        error!("{}", e);
        match &e {
            StageError::StepsFailed { .. } => self.host.fail_stage(STEPS_FAILED_MESSAGE),
            other => self.host.fail_stage(&other.to_string()),
        }
        e
    }

    fn console(&self, stage: Stage) -> Console {
        let console = if self.echo {
            Console::stdout()
        } else {
            Console::buffered()
        };

        let transcript = self.config.temp_dir.join(output_sink_name(stage));
        match Console::with_transcript(console, &transcript) {
            Ok(console) => console,
            Err(e) => {
                warn!("Console transcript unavailable ({}): {}", transcript.display(), e);
                if self.echo {
                    Console::stdout()
                } else {
                    Console::buffered()
                }
            }
        }
    }

    /// Consumes the engine log for one stage until it resolves.
    async fn consume_stage(&mut self, stage: Stage, tail: &mut LogTail) -> Result<(), StageError> {
        if self.config.debug {
            println!("__::Action::{}::Start::", stage.engine_name());
        }

        let failed_steps = self.config.failed_steps();
        let pre_recorded = failed_steps.load()?;
        if !pre_recorded.is_empty() {
            info!("Steps failed in an earlier stage: {:?}", pre_recorded);
        }

        let steps = self.steps;
        let mut aggregator = Aggregator::new(stage, steps, self.console(stage))
            .with_failed_steps(failed_steps)
            .with_debug(self.config.debug);

        let mut outcome = aggregator.seed_failed(&pre_recorded, &mut self.host)?;

        self.barrier.signal(&sentinel_name(stage)).await?;
        debug!("{} stage started", stage);

        while outcome.is_none() {
            let line = tail.next_line().await?;
            if line.is_empty() {
                continue;
            }
            if self.config.trace {
                aggregator.trace_line(&mut self.host, &line);
            }
            outcome = aggregator.handle(classify_line(&line), &mut self.host)?;
        }

        if self.config.debug {
            println!("__::Action::{}::End::", stage.engine_name());
        }

        match outcome {
            Some(StageOutcome::Failed { failed_steps }) => Err(StageError::StepsFailed {
                stage,
                failed_steps,
            }),
            _ => Ok(()),
        }
    }
}
