//! End-to-end stage runs against a simulated engine.
//!
//! The simulated engine runs every job the way `gh act` would: the real
//! interceptor hooks open and close each stage window over the filesystem
//! barrier, and every line the job prints is appended to the engine log as
//! a JSON record.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_json::json;
use tempfile::{tempdir, TempDir};
use tokio::time::timeout;

use parallel_steps::environment::{RecordingHost, RunnerConfig};
use parallel_steps::execution::{
    run_hook, sentinel_name, EngineError, EngineHandle, EngineLauncher, FsBarrier, Hook,
    HookInputs, Orchestrator, Stage, StageError,
};
use parallel_steps::workflow::parse_steps;

const LIMIT: Duration = Duration::from_secs(20);
const POLL: Duration = Duration::from_millis(10);

/// What the user step of a job does during the execution stage.
#[derive(Clone)]
struct UserStep {
    output: Option<(&'static str, &'static str)>,
    fails: bool,
}

struct SimulatedEngine {
    jobs: Vec<UserStep>,
}

impl EngineLauncher for SimulatedEngine {
    fn launch(&self, config: &RunnerConfig) -> Result<EngineHandle, EngineError> {
        let log = config.engine_log_file();
        fs::write(&log, "").map_err(|source| EngineError::LogFile {
            path: log.clone(),
            source,
        })?;

        for (index, user) in self.jobs.iter().enumerate() {
            tokio::spawn(run_job(
                index,
                user.clone(),
                config.temp_dir.clone(),
                log.clone(),
            ));
        }
        Ok(EngineHandle::detached(log))
    }

    fn attach(&self, config: &RunnerConfig) -> Result<EngineHandle, EngineError> {
        Ok(EngineHandle::detached(config.engine_log_file()))
    }
}

fn append(log: &Path, record: serde_json::Value) {
    let mut file = OpenOptions::new().append(true).open(log).unwrap();
    file.write_all(format!("{}\n", record).as_bytes()).unwrap();
}

/// Runs one interceptor hook and forwards what it printed to the engine log.
async fn intercept(index: usize, step_id: &str, hook: Hook, inputs: &HookInputs, log: &Path) {
    let barrier = FsBarrier::new(&inputs.temp_dir).with_poll_interval(POLL);
    let mut out = Vec::new();
    run_hook(hook, inputs, Path::new("."), &barrier, &mut out)
        .await
        .unwrap();

    for line in String::from_utf8(out).unwrap().lines() {
        append(
            log,
            json!({
                "level": "info",
                "msg": line,
                "jobID": format!("Step{}", index),
                "stepID": [step_id],
                "raw_output": true,
            }),
        );
    }
}

async fn run_job(index: usize, user: UserStep, temp_dir: PathBuf, log: PathBuf) {
    let opener = HookInputs {
        position: None,
        temp_dir,
        host_working_dir: None,
        local: true,
    };
    let closer = HookInputs {
        position: Some("Main::End".to_string()),
        ..opener.clone()
    };
    let job_id = format!("Step{}", index);

    intercept(index, "0", Hook::Pre, &opener, &log).await;
    intercept(index, "2", Hook::Pre, &closer, &log).await;
    intercept(index, "0", Hook::Main, &opener, &log).await;

    append(
        &log,
        json!({
            "level": "info",
            "msg": format!("working on step {}", index),
            "jobID": job_id,
            "stepID": ["1"],
            "raw_output": true,
        }),
    );
    if let Some((name, value)) = user.output {
        append(
            &log,
            json!({
                "level": "info",
                "msg": format!("  ⚙  ::set-output:: {}={}", name, value),
                "jobID": job_id,
                "stepID": ["1"],
            }),
        );
    }
    append(
        &log,
        json!({
            "level": "info",
            "msg": "step finished",
            "jobID": job_id,
            "stepID": ["1"],
            "stepResult": if user.fails { "failure" } else { "success" },
            "executionTime": 2_000_000u64,
        }),
    );

    intercept(index, "2", Hook::Main, &closer, &log).await;
    intercept(index, "2", Hook::Post, &closer, &log).await;
    intercept(index, "0", Hook::Post, &opener, &log).await;
}

fn setup() -> (TempDir, RunnerConfig) {
    let dir = tempdir().unwrap();
    let mut config = RunnerConfig::new(dir.path().join("run"));
    config.working_dir = dir.path().to_path_buf();
    config.tail_poll_interval = Duration::from_millis(5);
    config.barrier_poll_interval = POLL;
    (dir, config)
}

fn ok() -> UserStep {
    UserStep {
        output: None,
        fails: false,
    }
}

#[tokio::test]
async fn test_all_stages_in_one_process() {
    let (_dir, config) = setup();
    let steps = parse_steps(
        "- run: make\n- id: version\n  run: ./version.sh\n- run: make lint\n",
        16,
    )
    .unwrap();

    let engine = SimulatedEngine {
        jobs: vec![
            ok(),
            UserStep {
                output: Some(("tag", "v1.4.0")),
                fails: false,
            },
            ok(),
        ],
    };
    let barrier = FsBarrier::new(&config.temp_dir).with_poll_interval(POLL);
    let mut orchestrator = Orchestrator::new(&config, &steps, barrier, engine, RecordingHost::new())
        .with_console_echo(false);

    timeout(LIMIT, orchestrator.run_all()).await.unwrap().unwrap();

    let host = orchestrator.into_host();
    assert!(host.failures().is_empty());
    assert_eq!(
        host.outputs(),
        vec![
            ("tag".to_string(), "v1.4.0".to_string()),
            ("version-tag".to_string(), "v1.4.0".to_string()),
        ]
    );

    for stage in Stage::ALL {
        assert!(config.temp_dir.join(sentinel_name(stage)).exists());
    }
    let transcript =
        fs::read_to_string(config.temp_dir.join(".Interceptor-Main-Stage-Output")).unwrap();
    assert!(transcript.contains("working on step 1"));
    assert!(config.failed_steps().load().unwrap().is_empty());
}

fn failing() -> UserStep {
    UserStep {
        output: None,
        fails: true,
    }
}

#[tokio::test]
async fn test_failed_step_still_gets_teardown() {
    let (_dir, config) = setup();
    let steps = parse_steps("- run: a\n- run: b\n- run: c\n", 16).unwrap();

    let engine = SimulatedEngine {
        jobs: vec![ok(), ok(), failing()],
    };
    let barrier = FsBarrier::new(&config.temp_dir).with_poll_interval(POLL);
    let mut orchestrator = Orchestrator::new(&config, &steps, barrier, engine, RecordingHost::new())
        .with_console_echo(false);

    let result = timeout(LIMIT, orchestrator.run_all()).await.unwrap();
    match result {
        Err(StageError::StepsFailed {
            stage,
            failed_steps,
        }) => {
            assert_eq!(stage, Stage::Execution);
            assert_eq!(failed_steps, vec![2]);
        }
        other => panic!("unexpected result: {:?}", other),
    }

    assert_eq!(
        orchestrator.host().failures(),
        vec!["One or more steps failed".to_string()]
    );
    assert!(config.temp_dir.join(sentinel_name(Stage::Teardown)).exists());
    assert_eq!(
        config.failed_steps().load().unwrap().into_iter().collect::<Vec<_>>(),
        vec![2]
    );
}

#[tokio::test]
async fn test_teardown_invocation_after_failed_execution() {
    let (_dir, config) = setup();
    let steps = parse_steps("- run: a\n- run: b\n", 16).unwrap();
    let jobs = vec![failing(), ok()];

    let mut results = Vec::new();
    for stage in Stage::ALL {
        let barrier = FsBarrier::new(&config.temp_dir).with_poll_interval(POLL);
        let engine = SimulatedEngine { jobs: jobs.clone() };
        let mut orchestrator =
            Orchestrator::new(&config, &steps, barrier, engine, RecordingHost::new())
                .with_console_echo(false);

        let result = timeout(LIMIT, orchestrator.run_stage(stage)).await.unwrap();
        results.push((stage, result, orchestrator.into_host().failures()));
    }

    let (_, setup_result, _) = &results[0];
    assert!(setup_result.is_ok());

    for (stage, result, failures) in &results[1..] {
        match result {
            Err(StageError::StepsFailed { failed_steps, .. }) => {
                assert_eq!(failed_steps, &vec![0], "{} stage", stage)
            }
            other => panic!("unexpected {} result: {:?}", stage, other),
        }
        assert_eq!(failures, &vec!["One or more steps failed".to_string()]);
    }

    assert!(config.temp_dir.join(sentinel_name(Stage::Teardown)).exists());
    assert_eq!(
        config.failed_steps().load().unwrap().into_iter().collect::<Vec<_>>(),
        vec![0]
    );
}

#[tokio::test]
async fn test_one_stage_per_invocation() {
    let (_dir, config) = setup();
    let steps = parse_steps("- run: a\n- id: b\n  run: b\n", 16).unwrap();

    let jobs = vec![
        ok(),
        UserStep {
            output: Some(("answer", "42")),
            fails: false,
        },
    ];

    let mut outputs = Vec::new();
    for stage in Stage::ALL {
        let barrier = FsBarrier::new(&config.temp_dir).with_poll_interval(POLL);
        let engine = SimulatedEngine { jobs: jobs.clone() };
        let mut orchestrator =
            Orchestrator::new(&config, &steps, barrier, engine, RecordingHost::new())
                .with_console_echo(false);

        timeout(LIMIT, orchestrator.run_stage(stage))
            .await
            .unwrap()
            .unwrap();
        outputs.extend(orchestrator.into_host().outputs());
    }

    assert_eq!(
        outputs,
        vec![
            ("answer".to_string(), "42".to_string()),
            ("b-answer".to_string(), "42".to_string()),
        ]
    );
}

#[test]
fn test_invalid_steps_input_is_rejected_before_any_stage() {
    let (_dir, config) = setup();
    assert!(parse_steps("run: not-a-list\n", 16).is_err());
    assert!(parse_steps("- run: a\n- 42\n", 16).is_err());
    assert!(!config.temp_dir.exists());
}
