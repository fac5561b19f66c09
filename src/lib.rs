//! ParallelSteps - Concurrent Step Runner for GitHub Actions
//!
//! Runs a batch of workflow steps concurrently through `gh act`, while the
//! hosting workflow keeps its ordinary setup, execution and teardown
//! stages. Each stage is released to the engine jobs through a sentinel
//! barrier, and the engine log is folded back into one result per step.
//!
//! # Architecture
//!
//! The library is organized into four main modules:
//!
//! - [`workflow`]: Step batch parsing, validation and engine workflow rendering
//! - [`execution`]: Stage barrier, log classification and step aggregation
//! - [`environment`]: Runner configuration and the reporting host
//! - [`monitoring`]: Step console and execution timeline
//!
//! # Example
//!
//! ```rust,no_run
//! use parallel_steps::environment::{GithubHost, RunnerConfig};
//! use parallel_steps::execution::{ActLauncher, FsBarrier, Orchestrator};
//! use parallel_steps::parse_steps;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RunnerConfig::from_env()?;
//!     let steps = parse_steps("- run: cargo build\n- run: cargo clippy\n", config.max_steps)?;
//!
//!     let mut orchestrator = Orchestrator::new(
//!         &config,
//!         &steps,
//!         FsBarrier::new(&config.temp_dir),
//!         ActLauncher::new(),
//!         GithubHost::from_env(),
//!     );
//!     orchestrator.run_all().await?;
//!     Ok(())
//! }
//! ```

pub mod environment;
pub mod execution;
pub mod monitoring;
pub mod workflow;

// Re-export commonly used types
pub use environment::RunnerConfig;
pub use execution::{Orchestrator, Stage};
pub use workflow::model::{Step, StepBatch};
pub use workflow::parser::{load_steps, parse_steps};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "ParallelSteps";

/// Executable name, used when the engine calls back into the interceptor
pub const BINARY_NAME: &str = "parallel-steps";
