//! Engine Workflow Rendering
//!
//! Turns the step batch into the workflow document the engine runs, and
//! materializes the interceptor action the document refers to.
//!
//! Every step becomes its own job `Step<N>`, wrapped by two interceptor
//! steps:
//!
//! ```yaml
//! on: workflow_dispatch
//! jobs:
//!   Step0:
//!     runs-on: host
//!     steps:
//!       - uses: __/act-interceptor@local
//!         with: { temp-dir: ..., host-working-directory: ... }
//!       - run: make build                # the user's step, verbatim
//!       - if: always()
//!         uses: __/act-interceptor@local
//!         with: { position: Main::End, temp-dir: ... }
//! ```
//!
//! The interceptor opens and closes every stage window for its job; see
//! [`crate::execution::interceptor`].

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};
use serde::Serialize;
use serde_yaml::Mapping;
use thiserror::Error;

use crate::environment::RunnerConfig;
use crate::execution::engine::INTERCEPTOR_ACTION_REF;
use crate::execution::interceptor::MAIN_END_POSITION;

use super::model::{Step, StepBatch};

/// Platform label mapped to the host by the engine command line.
const RUNS_ON: &str = "host";

/// Render errors.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Failed to render engine workflow: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Failed to encode interceptor path: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to write '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Serialize)]
struct EngineWorkflow {
    on: &'static str,
    jobs: Mapping,
}

#[derive(Serialize)]
struct EngineJob<'a> {
    #[serde(rename = "runs-on")]
    runs_on: &'static str,
    steps: Vec<JobStep<'a>>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum JobStep<'a> {
    Interceptor(InterceptorStep),
    User(&'a Step),
}

#[derive(Serialize)]
struct InterceptorStep {
    #[serde(rename = "if", skip_serializing_if = "Option::is_none")]
    condition: Option<&'static str>,
    uses: &'static str,
    with: Mapping,
}

fn with_inputs(inputs: &[(&str, String)]) -> Mapping {
    inputs
        .iter()
        .map(|(key, value)| ((*key).into(), value.clone().into()))
        .collect()
}

/// Renders the engine workflow document.
pub fn render_workflow(steps: &StepBatch, config: &RunnerConfig) -> Result<String, RenderError> {
    let temp_dir = config.temp_dir.display().to_string();
    let working_dir = config.working_dir.display().to_string();

    let mut jobs = Mapping::new();
    for (index, step) in steps.iter().enumerate() {
        let open = InterceptorStep {
            condition: None,
            uses: INTERCEPTOR_ACTION_REF,
            with: with_inputs(&[
                ("temp-dir", temp_dir.clone()),
                ("host-working-directory", working_dir.clone()),
            ]),
        };
        let close = InterceptorStep {
            condition: Some("always()"),
            uses: INTERCEPTOR_ACTION_REF,
            with: with_inputs(&[
                ("position", MAIN_END_POSITION.to_string()),
                ("temp-dir", temp_dir.clone()),
            ]),
        };

        let job = EngineJob {
            runs_on: RUNS_ON,
            steps: vec![
                JobStep::Interceptor(open),
                JobStep::User(step),
                JobStep::Interceptor(close),
            ],
        };
        jobs.insert(
            StepBatch::job_id(index).into(),
            serde_yaml::to_value(job)?,
        );
    }

    let workflow = EngineWorkflow {
        on: "workflow_dispatch",
        jobs,
    };
    Ok(serde_yaml::to_string(&workflow)?)
}

fn write_file(path: &Path, content: &str) -> Result<(), RenderError> {
    fs::write(path, content).map_err(|source| RenderError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Renders and writes the engine workflow to its file in the temp directory.
pub fn write_workflow(steps: &StepBatch, config: &RunnerConfig) -> Result<PathBuf, RenderError> {
    let path = config.engine_workflow_file();
    let document = render_workflow(steps, config)?;
    write_file(&path, &document)?;

    info!("Engine workflow written to {} ({} jobs)", path.display(), steps.len());
    Ok(path)
}

const ACTION_MANIFEST: &str = "\
name: act-interceptor
description: Opens and closes the stage windows of a parallel step job
inputs:
  position:
    required: false
  temp-dir:
    required: true
  host-working-directory:
    required: false
runs:
  using: node20
  pre: pre.js
  main: main.js
  post: post.js
";

/// Node entry point forwarding a hook to the runner executable.
fn hook_script(exe: &Path, hook: &str) -> Result<String, RenderError> {
    let exe = serde_json::to_string(&exe.display().to_string())?;
    Ok(format!(
        "const {{ execFileSync }} = require('child_process');\n\
         execFileSync({}, ['intercept', '{}'], {{ stdio: 'inherit' }});\n",
        exe, hook
    ))
}

/// Writes the interceptor action (manifest plus one script per hook).
pub fn write_interceptor_action(config: &RunnerConfig) -> Result<PathBuf, RenderError> {
    let dir = config.interceptor_action_dir();
    fs::create_dir_all(&dir).map_err(|source| RenderError::Io {
        path: dir.clone(),
        source,
    })?;

    write_file(&dir.join("action.yml"), ACTION_MANIFEST)?;
    for hook in ["pre", "main", "post"] {
        let script = hook_script(&config.interceptor_exe, hook)?;
        write_file(&dir.join(format!("{}.js", hook)), &script)?;
    }

    debug!("Interceptor action written to {}", dir.display());
    Ok(dir)
}
