//! External Engine Process
//!
//! The engine (`gh act`) runs every step job concurrently and writes its
//! records to `act.log`. It is launched once, before the first stage,
//! and lives until the last stage has been consumed.
//!
//! [`EngineHandle`] owns that process. Releasing it terminates the
//! engine's process group; a handle that is dropped without an explicit
//! [`EngineHandle::release`] or [`EngineHandle::detach`] is released
//! from `Drop`.
//!
//! # Example
//!
//! ```rust,no_run
//! use parallel_steps::environment::RunnerConfig;
//! use parallel_steps::execution::{ActLauncher, EngineLauncher};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RunnerConfig::from_env()?;
//!     let mut engine = ActLauncher::new().launch(&config)?;
//!     // ... consume the stages ...
//!     engine.release()?;
//!     Ok(())
//! }
//! ```

use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};

use log::{debug, info, warn};
use thiserror::Error;

use crate::environment::RunnerConfig;
use crate::workflow::state::EngineRecord;

/// Repository of the `act` extension for the GitHub CLI.
const ACT_EXTENSION: &str = "https://github.com/nektos/gh-act";

/// Repository reference the rendered workflow uses for the interceptor.
pub const INTERCEPTOR_ACTION_REF: &str = "__/act-interceptor@local";

/// Engine process errors.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Failed to install the engine extension: {0}")]
    Install(String),

    #[error("Failed to prepare engine log '{path}': {source}")]
    LogFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to launch engine '{program}': {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("Failed to persist engine handle: {0}")]
    Persist(std::io::Error),

    #[error("No running engine recorded in {0}")]
    NotRecorded(PathBuf),

    #[error("Failed to terminate engine (pid {pid}): {reason}")]
    Terminate { pid: u32, reason: String },
}

/// Owned handle to the running engine.
#[derive(Debug)]
pub struct EngineHandle {
    pid: Option<u32>,
    child: Option<Child>,
    log_file: PathBuf,
    released: bool,
}

impl EngineHandle {
    /// Wraps a process spawned by this runner.
    pub fn from_child(child: Child, log_file: impl Into<PathBuf>) -> Self {
        Self {
            pid: Some(child.id()),
            child: Some(child),
            log_file: log_file.into(),
            released: false,
        }
    }

    /// Re-attaches to an engine launched by an earlier stage.
    pub fn from_record(record: EngineRecord) -> Self {
        Self {
            pid: Some(record.pid),
            child: None,
            log_file: record.log_file,
            released: false,
        }
    }

    /// A handle without a process, for engines driven externally.
    pub fn detached(log_file: impl Into<PathBuf>) -> Self {
        Self {
            pid: None,
            child: None,
            log_file: log_file.into(),
            released: false,
        }
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Log file the engine writes its records to.
    pub fn log_file(&self) -> &Path {
        &self.log_file
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Saves the handle so a later stage process can re-attach.
    pub fn persist(&self, temp_dir: &Path) -> Result<(), EngineError> {
        let Some(pid) = self.pid else {
            return Ok(());
        };
        EngineRecord::new(pid, &self.log_file)
            .save(temp_dir)
            .map_err(EngineError::Persist)
    }

    /// Hands the engine over to a later stage process without terminating it.
    pub fn detach(mut self) {
        debug!("Detaching from engine (pid {:?})", self.pid);
        self.released = true;
    }

    /// Terminates the engine process group. Idempotent.
    ///
    /// An engine that already exited is not an error.
    pub fn release(&mut self) -> Result<(), EngineError> {
        if self.released {
            return Ok(());
        }
        self.released = true;

        let Some(pid) = self.pid else {
            return Ok(());
        };

        if let Some(child) = self.child.as_mut() {
            if let Ok(Some(status)) = child.try_wait() {
                debug!("Engine (pid {}) already exited: {}", pid, status);
                return Ok(());
            }
        }

        info!("Terminating engine (pid {})", pid);
        let signaled = terminate_group(pid);

        if let Some(child) = self.child.as_mut() {
            if let Err(reason) = &signaled {
                debug!("Group termination failed ({}), killing engine process", reason);
                child.kill().map_err(|e| EngineError::Terminate {
                    pid,
                    reason: e.to_string(),
                })?;
            }
            let _ = child.wait();
            return Ok(());
        }

        match signaled {
            Ok(()) => Ok(()),
            Err(reason) => {
                debug!("Engine (pid {}) not terminated: {}", pid, reason);
                Ok(())
            }
        }
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        if !self.released {
            if let Err(e) = self.release() {
                warn!("{}", e);
            }
        }
    }
}

/// Sends SIGTERM to the process group led by `pid`.
fn terminate_group(pid: u32) -> Result<(), String> {
    let status = Command::new("kill")
        .arg("-TERM")
        .arg("--")
        .arg(format!("-{}", pid))
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map_err(|e| e.to_string())?;

    if status.success() {
        Ok(())
    } else {
        Err(format!("kill exited with {}", status))
    }
}

/// Starts or re-attaches to the engine.
pub trait EngineLauncher {
    /// Launches the engine for the rendered workflow of `config`.
    fn launch(&self, config: &RunnerConfig) -> Result<EngineHandle, EngineError>;

    /// Re-attaches to the engine launched by an earlier stage process.
    fn attach(&self, config: &RunnerConfig) -> Result<EngineHandle, EngineError> {
        match EngineRecord::load(&config.temp_dir).map_err(EngineError::Persist)? {
            Some(record) => {
                debug!("Attached to engine (pid {})", record.pid);
                Ok(EngineHandle::from_record(record))
            }
            None => Err(EngineError::NotRecorded(config.temp_dir.clone())),
        }
    }
}

/// Launches `gh act` in the background with its output going to the engine log.
#[derive(Debug, Clone, Default)]
pub struct ActLauncher {
    install_extension: bool,
}

impl ActLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs the `act` extension of the GitHub CLI before launching.
    pub fn with_extension_install(mut self, install: bool) -> Self {
        self.install_extension = install;
        self
    }

    /// Arguments passed to the engine program.
    pub fn command_args(config: &RunnerConfig) -> Vec<String> {
        let engine = &config.engine;
        let mut args = engine.base_args.clone();

        args.push("--workflows".to_string());
        args.push(config.engine_workflow_file().display().to_string());
        // bind the working directory instead of copying it
        args.push("--bind".to_string());
        args.push("--platform".to_string());
        args.push("host=-self-hosted".to_string());
        args.push("--local-repository".to_string());
        args.push(format!(
            "{}={}",
            INTERCEPTOR_ACTION_REF,
            config.interceptor_action_dir().display()
        ));

        if let Some(event_path) = &engine.event_path {
            args.push("--eventpath".to_string());
            args.push(event_path.display().to_string());
        }
        if let Some(actor) = &engine.actor {
            args.push("--actor".to_string());
            args.push(actor.clone());
        }

        args.push("--secret".to_string());
        args.push(format!(
            "GITHUB_TOKEN={}",
            engine.token.as_deref().unwrap_or_default()
        ));
        args.push("--action-offline-mode".to_string());
        args.push("--json".to_string());
        args
    }

    fn install(&self, config: &RunnerConfig) -> Result<(), EngineError> {
        info!("Installing engine extension: {}", ACT_EXTENSION);

        let mut command = Command::new(&config.engine.program);
        command.args(["extension", "install", ACT_EXTENSION]);
        if let Some(token) = &config.engine.token {
            command.env("GH_TOKEN", token);
        }

        let status = command
            .status()
            .map_err(|e| EngineError::Install(e.to_string()))?;
        if !status.success() {
            return Err(EngineError::Install(format!("exited with {}", status)));
        }
        Ok(())
    }
}

impl EngineLauncher for ActLauncher {
    fn launch(&self, config: &RunnerConfig) -> Result<EngineHandle, EngineError> {
        if self.install_extension {
            self.install(config)?;
        }

        let log_path = config.engine_log_file();
        let log_error = |source: std::io::Error| EngineError::LogFile {
            path: log_path.clone(),
            source,
        };
        let log = File::create(&log_path).map_err(log_error)?;
        let log_err = log.try_clone().map_err(log_error)?;

        let args = Self::command_args(config);
        debug!("Engine command: {} {}", config.engine.program, args.join(" "));

        let mut command = Command::new(&config.engine.program);
        command
            .args(&args)
            .current_dir(&config.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err));
        if let Some(token) = &config.engine.token {
            command.env("GH_TOKEN", token);
        }

        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }

        let child = command.spawn().map_err(|source| EngineError::Spawn {
            program: config.engine.program.clone(),
            source,
        })?;

        info!("Engine started (pid {}), logging to {}", child.id(), log_path.display());
        Ok(EngineHandle::from_child(child, log_path))
    }
}
