//! Interceptor Hooks
//!
//! The job-side half of the stage barrier. Every engine job runs the
//! interceptor action twice (before and after the user's step), and the
//! engine calls its `pre`, `main` and `post` hooks at the matching points
//! of the job. The hooks announce stage windows on stdout, which the
//! engine forwards to its log:
//!
//! | hook   | position    | behavior                                          |
//! |--------|-------------|---------------------------------------------------|
//! | `pre`  | none        | link working dir, wait `Pre`, print `Pre::Start`  |
//! | `main` | none        | print `Pre::End`, wait `Main`, print `Main::Start`|
//! | `main` | `Main::End` | print `Main::End`, wait `Post`, print `Post::Start`|
//! | `post` | none        | print `Post::End`                                 |
//!
//! Every other hook/position combination does nothing.

use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use log::{debug, info};
use thiserror::Error;

use super::barrier::{sentinel_name, Barrier, BarrierError};
use super::stage::Stage;

/// Position input of the closing interceptor step.
pub const MAIN_END_POSITION: &str = "Main::End";

/// Interceptor errors.
#[derive(Debug, Error)]
pub enum InterceptError {
    #[error("Unexpected sub stage: {0}.")]
    UnexpectedPosition(String),

    #[error("Input required and not supplied: {0}")]
    MissingInput(&'static str),

    #[error("Failed to link job working directory '{job_dir}' to '{host_dir}': {source}")]
    Link {
        job_dir: PathBuf,
        host_dir: PathBuf,
        source: io::Error,
    },

    #[error(transparent)]
    Barrier(#[from] BarrierError),

    #[error("Failed to write marker: {0}")]
    Output(#[from] io::Error),
}

/// Engine hook the interceptor was invoked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hook {
    Pre,
    Main,
    Post,
}

impl FromStr for Hook {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pre" => Ok(Hook::Pre),
            "main" => Ok(Hook::Main),
            "post" => Ok(Hook::Post),
            other => Err(format!("Unknown hook: {}", other)),
        }
    }
}

/// Marker edge of a stage window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker {
    Start,
    End,
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Marker::Start => f.write_str("Start"),
            Marker::End => f.write_str("End"),
        }
    }
}

/// Stage window marker line, e.g. `__::Interceptor::Pre::Start::`.
pub fn marker_line(stage: Stage, marker: Marker) -> String {
    format!("__::Interceptor::{}::{}::", stage.engine_name(), marker)
}

/// Inputs of the interceptor action, as passed by the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct HookInputs {
    pub position: Option<String>,
    pub temp_dir: PathBuf,
    pub host_working_dir: Option<PathBuf>,

    /// Skip linking the job working directory (local runs)
    pub local: bool,
}

impl HookInputs {
    /// Reads the action inputs from the environment.
    pub fn from_env() -> Result<Self, InterceptError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the action inputs from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, InterceptError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let temp_dir = non_empty("INPUT_TEMP-DIR")
            .map(PathBuf::from)
            .ok_or(InterceptError::MissingInput("temp-dir"))?;

        Ok(Self {
            position: non_empty("INPUT_POSITION"),
            temp_dir,
            host_working_dir: non_empty("INPUT_HOST-WORKING-DIRECTORY").map(PathBuf::from),
            local: lookup("RUNNER_LOCAL").as_deref() == Some("1"),
        })
    }
}

/// Runs one interceptor hook.
///
/// # Arguments
///
/// * `hook` - Engine hook being executed
/// * `inputs` - Action inputs
/// * `job_dir` - Working directory of the engine job
/// * `barrier` - Barrier over the run temp directory
/// * `out` - Stream the engine forwards to its log (stdout)
pub async fn run_hook<B: Barrier, W: Write>(
    hook: Hook,
    inputs: &HookInputs,
    job_dir: &Path,
    barrier: &B,
    out: &mut W,
) -> Result<(), InterceptError> {
    debug!("Interceptor hook {:?} (position: {:?})", hook, inputs.position);

    match (hook, inputs.position.as_deref()) {
        (Hook::Pre, None) => {
            if !inputs.local {
                let host_dir = inputs
                    .host_working_dir
                    .as_deref()
                    .ok_or(InterceptError::MissingInput("host-working-directory"))?;
                link_working_directory(job_dir, host_dir)?;
            }
            open_window(Stage::Setup, barrier, out).await
        }
        (Hook::Main, None) => {
            emit(out, &marker_line(Stage::Setup, Marker::End))?;
            open_window(Stage::Execution, barrier, out).await
        }
        (Hook::Main, Some(MAIN_END_POSITION)) => {
            emit(out, &marker_line(Stage::Execution, Marker::End))?;
            open_window(Stage::Teardown, barrier, out).await
        }
        (Hook::Main, Some(other)) => Err(InterceptError::UnexpectedPosition(other.to_string())),
        (Hook::Post, None) => emit(out, &marker_line(Stage::Teardown, Marker::End)),
        (Hook::Pre, Some(_)) | (Hook::Post, Some(_)) => Ok(()),
    }
}

async fn open_window<B: Barrier, W: Write>(
    stage: Stage,
    barrier: &B,
    out: &mut W,
) -> Result<(), InterceptError> {
    barrier.wait(&sentinel_name(stage)).await?;
    emit(out, &marker_line(stage, Marker::Start))
}

fn emit<W: Write>(out: &mut W, line: &str) -> Result<(), InterceptError> {
    writeln!(out, "{}", line)?;
    out.flush()?;
    Ok(())
}

/// Replaces the job working directory with a link to the host working directory.
pub fn link_working_directory(job_dir: &Path, host_dir: &Path) -> Result<(), InterceptError> {
    let to_error = |source: io::Error| InterceptError::Link {
        job_dir: job_dir.to_path_buf(),
        host_dir: host_dir.to_path_buf(),
        source,
    };

    if job_dir.exists() {
        fs::remove_dir_all(job_dir).map_err(to_error)?;
    }

    #[cfg(unix)]
    std::os::unix::fs::symlink(host_dir, job_dir).map_err(to_error)?;
    #[cfg(windows)]
    std::os::windows::fs::symlink_dir(host_dir, job_dir).map_err(to_error)?;

    info!("Linked {} -> {}", job_dir.display(), host_dir.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::MemoryBarrier;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn inputs(position: Option<&str>) -> HookInputs {
        HookInputs {
            position: position.map(str::to_string),
            temp_dir: PathBuf::from("/tmp/run"),
            host_working_dir: None,
            local: true,
        }
    }

    async fn run(hook: Hook, position: Option<&str>, barrier: &MemoryBarrier) -> String {
        let mut out = Vec::new();
        run_hook(hook, &inputs(position), Path::new("."), barrier, &mut out)
            .await
            .unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_marker_line() {
        assert_eq!(
            marker_line(Stage::Execution, Marker::End),
            "__::Interceptor::Main::End::"
        );
    }

    #[tokio::test]
    async fn test_hook_sequence() {
        let barrier = MemoryBarrier::new();
        for stage in Stage::ALL {
            barrier.signal(&sentinel_name(stage)).await.unwrap();
        }

        assert_eq!(
            run(Hook::Pre, None, &barrier).await,
            "__::Interceptor::Pre::Start::\n"
        );
        assert_eq!(run(Hook::Pre, Some(MAIN_END_POSITION), &barrier).await, "");
        assert_eq!(
            run(Hook::Main, None, &barrier).await,
            "__::Interceptor::Pre::End::\n__::Interceptor::Main::Start::\n"
        );
        assert_eq!(
            run(Hook::Main, Some(MAIN_END_POSITION), &barrier).await,
            "__::Interceptor::Main::End::\n__::Interceptor::Post::Start::\n"
        );
        assert_eq!(run(Hook::Post, Some(MAIN_END_POSITION), &barrier).await, "");
        assert_eq!(
            run(Hook::Post, None, &barrier).await,
            "__::Interceptor::Post::End::\n"
        );
    }

    #[tokio::test]
    async fn test_main_hook_waits_for_sentinel() {
        let barrier = MemoryBarrier::new();
        let signaler = barrier.clone();

        let mut out = Vec::new();
        let hook_inputs = inputs(None);
        let hook = run_hook(Hook::Main, &hook_inputs, Path::new("."), &barrier, &mut out);
        let signal = async {
            tokio::task::yield_now().await;
            signaler.signal(&sentinel_name(Stage::Execution)).await
        };

        let (hooked, signaled) = tokio::join!(hook, signal);
        hooked.unwrap();
        signaled.unwrap();
        assert!(String::from_utf8(out).unwrap().ends_with("__::Interceptor::Main::Start::\n"));
    }

    #[tokio::test]
    async fn test_unexpected_position() {
        let barrier = MemoryBarrier::new();
        let mut out = Vec::new();
        let err = run_hook(Hook::Main, &inputs(Some("Other")), Path::new("."), &barrier, &mut out)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Unexpected sub stage: Other.");
    }

    #[test]
    fn test_inputs_from_lookup() {
        let vars: HashMap<&str, &str> = [
            ("INPUT_TEMP-DIR", "/tmp/run"),
            ("INPUT_POSITION", ""),
            ("INPUT_HOST-WORKING-DIRECTORY", "/work"),
        ]
        .into_iter()
        .collect();

        let inputs = HookInputs::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(inputs.position, None);
        assert_eq!(inputs.host_working_dir, Some(PathBuf::from("/work")));
        assert!(!inputs.local);

        let missing = HookInputs::from_lookup(|_| None);
        assert!(matches!(missing, Err(InterceptError::MissingInput("temp-dir"))));
    }

    #[cfg(unix)]
    #[test]
    fn test_link_working_directory() {
        let dir = tempdir().unwrap();
        let host = dir.path().join("host");
        let job = dir.path().join("job");
        fs::create_dir_all(&host).unwrap();
        fs::create_dir_all(job.join("nested")).unwrap();
        fs::write(host.join("file.txt"), "hi").unwrap();

        link_working_directory(&job, &host).unwrap();

        assert!(fs::symlink_metadata(&job).unwrap().file_type().is_symlink());
        assert_eq!(fs::read_to_string(job.join("file.txt")).unwrap(), "hi");
    }
}
