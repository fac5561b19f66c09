//! Runner Configuration
//!
//! All process-wide settings are collected once at startup into a
//! [`RunnerConfig`] and passed by reference to every component.
//!
//! # Resolution
//!
//! The run temp directory is `$RUNNER_TEMP/$GITHUB_ACTION` unless set
//! explicitly. Debug output is enabled by `RUNNER_DEBUG=1`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::debug;
use thiserror::Error;

use crate::workflow::state::FailedSteps;

/// Default ceiling on the number of concurrently run steps.
pub const DEFAULT_MAX_STEPS: usize = 256;

/// Longest pause at the end of the engine log before it is re-read
/// without a change notification.
const DEFAULT_TAIL_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Interval at which a barrier re-checks sentinel presence while watching.
const DEFAULT_BARRIER_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(
        "RUNNER_TEMP and GITHUB_ACTION environment variables are required \
         to create a temporary directory for an action."
    )]
    MissingTempDir,

    #[error("Failed to prepare temp directory '{path}': {source}")]
    TempDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to resolve process paths: {0}")]
    ProcessPaths(std::io::Error),
}

/// How the external engine is invoked.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Program to execute (e.g. `gh`)
    pub program: String,

    /// Leading arguments selecting the engine (e.g. `act`)
    pub base_args: Vec<String>,

    /// Token passed to the engine as `GITHUB_TOKEN` secret and `GH_TOKEN`
    pub token: Option<String>,

    /// Event payload file forwarded to the engine
    pub event_path: Option<PathBuf>,

    /// Actor forwarded to the engine
    pub actor: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            program: "gh".to_string(),
            base_args: vec!["act".to_string()],
            token: None,
            event_path: None,
            actor: None,
        }
    }
}

/// Explicit runner configuration.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Directory holding sentinels, the engine log and run state
    pub temp_dir: PathBuf,

    /// Host working directory the engine jobs are bound to
    pub working_dir: PathBuf,

    /// Emit protocol debug markers
    pub debug: bool,

    /// Echo every raw engine log line
    pub trace: bool,

    /// Ceiling on the number of steps in one batch
    pub max_steps: usize,

    /// External engine invocation
    pub engine: EngineConfig,

    /// Executable the engine-side interceptor hooks call back into
    pub interceptor_exe: PathBuf,

    pub tail_poll_interval: Duration,
    pub barrier_poll_interval: Duration,
}

impl RunnerConfig {
    /// Creates a configuration rooted at `temp_dir` with defaults.
    pub fn new(temp_dir: impl Into<PathBuf>) -> Self {
        Self {
            temp_dir: temp_dir.into(),
            working_dir: PathBuf::from("."),
            debug: false,
            trace: false,
            max_steps: DEFAULT_MAX_STEPS,
            engine: EngineConfig::default(),
            interceptor_exe: PathBuf::from(crate::BINARY_NAME),
            tail_poll_interval: DEFAULT_TAIL_POLL_INTERVAL,
            barrier_poll_interval: DEFAULT_BARRIER_POLL_INTERVAL,
        }
    }

    /// Builds the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::from_lookup(|key| std::env::var(key).ok())?;
        config.working_dir = std::env::current_dir().map_err(ConfigError::ProcessPaths)?;
        config.interceptor_exe = std::env::current_exe().map_err(ConfigError::ProcessPaths)?;
        Ok(config)
    }

    /// Builds the configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.is_empty());

        let temp_dir = match (non_empty("RUNNER_TEMP"), non_empty("GITHUB_ACTION")) {
            (Some(runner_temp), Some(action)) => Path::new(&runner_temp).join(action),
            _ => return Err(ConfigError::MissingTempDir),
        };

        let mut config = Self::new(temp_dir);
        config.debug = lookup("RUNNER_DEBUG").as_deref() == Some("1");
        config.engine.token = non_empty("INPUT_TOKEN");
        config.engine.event_path = non_empty("GITHUB_EVENT_PATH").map(PathBuf::from);
        config.engine.actor = non_empty("GITHUB_ACTOR");
        Ok(config)
    }

    /// Overrides the temp directory.
    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = dir.into();
        self
    }

    /// Enables or disables debug markers.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Creates the temp directory if needed.
    pub fn prepare_temp_dir(&self) -> Result<(), ConfigError> {
        fs::create_dir_all(&self.temp_dir).map_err(|source| ConfigError::TempDir {
            path: self.temp_dir.clone(),
            source,
        })?;
        debug!("Runner temp dir: {}", self.temp_dir.display());
        Ok(())
    }

    /// Log file the engine writes its records to.
    pub fn engine_log_file(&self) -> PathBuf {
        self.temp_dir.join("act.log")
    }

    /// Rendered engine workflow document.
    pub fn engine_workflow_file(&self) -> PathBuf {
        self.temp_dir.join("steps-workflow.yaml")
    }

    /// Directory of the generated interceptor action.
    pub fn interceptor_action_dir(&self) -> PathBuf {
        self.temp_dir.join("act-interceptor")
    }

    /// Failed step list shared between stages.
    pub fn failed_steps(&self) -> FailedSteps {
        FailedSteps::new(&self.temp_dir)
    }
}
