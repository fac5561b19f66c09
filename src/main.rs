//! ParallelSteps CLI Entry Point
//!
//! Provides the command-line interface for the stage runner and for the
//! interceptor hooks the engine calls back into.
//!
//! # Usage
//!
//! ```bash
//! # Run every stage in one process (steps from INPUT_STEPS)
//! parallel-steps run
//!
//! # Run a single stage, as invoked by the pre/main/post action hooks
//! parallel-steps run --stage pre
//!
//! # Read the steps from a file and choose the temp directory
//! parallel-steps run --steps steps.yaml --temp-dir /tmp/parallel-steps
//!
//! # Interceptor hook (called by the engine jobs)
//! parallel-steps intercept main
//! ```

use std::env;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use log::{error, info};

use parallel_steps::environment::{GithubHost, HostOutputs, RunnerConfig};
use parallel_steps::execution::{
    run_hook, ActLauncher, FsBarrier, Hook, HookInputs, Orchestrator, Stage,
};
use parallel_steps::workflow::{load_steps, parse_steps, StepBatch};
use parallel_steps::{APP_NAME, BINARY_NAME, VERSION};

/// Environment variable carrying the inline steps input.
const STEPS_INPUT: &str = "INPUT_STEPS";

/// Parsed command line.
#[derive(Debug)]
enum Command {
    Run(RunArgs),
    Intercept(Hook),
}

/// Options of the `run` command.
#[derive(Debug, Default)]
struct RunArgs {
    stage: Option<Stage>,
    steps_file: Option<String>,
    temp_dir: Option<PathBuf>,
    trace: bool,
    verbose: bool,
}

/// Configures the logging system with appropriate formatting.
fn setup_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format(|buf, record| {
            use std::io::Write;

            match record.level() {
                log::Level::Warn | log::Level::Error => {
                    writeln!(buf, "[{}] {}", record.level(), record.args())
                }
                _ => writeln!(buf, "{}", record.args()),
            }
        })
        .init();
}

/// Prints the application banner with version information.
fn print_banner() {
    println!();
    println!("{} v{}", APP_NAME, VERSION);
    println!("Concurrent Step Runner");
    println!();
}

/// Prints usage information.
fn print_usage() {
    println!("Usage: {} <COMMAND> [OPTIONS]", BINARY_NAME);
    println!();
    println!("Commands:");
    println!("  run                 Run the steps through the engine");
    println!("  intercept <HOOK>    Interceptor hook (pre, main or post), called by engine jobs");
    println!();
    println!("Run options:");
    println!("  --stage STAGE       Run a single stage (pre, main or post)");
    println!("  --steps FILE        Read the steps from a YAML file instead of {}", STEPS_INPUT);
    println!("  --temp-dir DIR      Override the run temp directory");
    println!("  --trace             Echo every engine log line into the concurrent log");
    println!("  --verbose           Enable debug logging");
    println!();
    println!("Options:");
    println!("  --help              Show this help message");
    println!("  --version           Show version information");
    println!();
    println!("Examples:");
    println!("  {} run", BINARY_NAME);
    println!("  {} run --stage main", BINARY_NAME);
    println!("  {} run --steps steps.yaml --temp-dir /tmp/steps", BINARY_NAME);
}

/// Parses command-line arguments into a Command.
fn parse_arguments(args: &[String]) -> Result<Command, String> {
    let Some(command) = args.get(1) else {
        return Err("Missing command".to_string());
    };

    match command.as_str() {
        "--help" | "-h" => {
            print_usage();
            std::process::exit(0);
        }
        "--version" | "-V" => {
            println!("{} {}", APP_NAME, VERSION);
            std::process::exit(0);
        }
        "intercept" => {
            let hook = args
                .get(2)
                .ok_or_else(|| "intercept requires a hook argument".to_string())?;
            if let Some(extra) = args.get(3) {
                return Err(format!("Unexpected argument: {}", extra));
            }
            Ok(Command::Intercept(hook.parse()?))
        }
        "run" => parse_run_arguments(&args[2..]).map(Command::Run),
        other => Err(format!("Unknown command: {}", other)),
    }
}

fn parse_run_arguments(args: &[String]) -> Result<RunArgs, String> {
    let mut run = RunArgs::default();
    let mut i = 0;

    while i < args.len() {
        let arg = &args[i];

        match arg.as_str() {
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            "--verbose" | "-v" => {
                run.verbose = true;
            }
            "--trace" => {
                run.trace = true;
            }
            "--stage" => {
                i += 1;
                let value = args
                    .get(i)
                    .ok_or_else(|| "--stage requires a stage argument".to_string())?;
                run.stage = Some(value.parse()?);
            }
            "--steps" => {
                i += 1;
                let value = args
                    .get(i)
                    .ok_or_else(|| "--steps requires a path argument".to_string())?;
                run.steps_file = Some(value.clone());
            }
            "--temp-dir" => {
                i += 1;
                let value = args
                    .get(i)
                    .ok_or_else(|| "--temp-dir requires a path argument".to_string())?;
                run.temp_dir = Some(PathBuf::from(value));
            }
            other => {
                return Err(format!("Unknown option: {}", other));
            }
        }
        i += 1;
    }

    Ok(run)
}

/// Reads the steps from the file given on the command line or from the action input.
fn read_steps(run: &RunArgs, max_steps: usize) -> Result<StepBatch, Box<dyn std::error::Error>> {
    if let Some(path) = &run.steps_file {
        return load_steps(path, max_steps);
    }

    let input = env::var(STEPS_INPUT)
        .map_err(|_| format!("Input required and not supplied: steps ({})", STEPS_INPUT))?;
    Ok(parse_steps(&input, max_steps)?)
}

/// Runs the steps through one or all stages.
fn run_steps(run: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = RunnerConfig::from_env()?;
    if let Some(dir) = run.temp_dir.clone() {
        config = config.with_temp_dir(dir);
    }
    config.trace = run.trace;

    setup_logging(run.verbose || config.debug);
    print_banner();

    let mut host = GithubHost::from_env();
    let steps = match read_steps(&run, config.max_steps) {
        Ok(steps) => steps,
        Err(e) => {
            host.fail_stage(&e.to_string());
            return Err(e);
        }
    };

    info!("Steps loaded: {}", steps.len());
    info!("Temp directory: {}", config.temp_dir.display());

    let barrier = FsBarrier::new(&config.temp_dir).with_poll_interval(config.barrier_poll_interval);
    let launcher = ActLauncher::new().with_extension_install(true);
    let mut orchestrator = Orchestrator::new(&config, &steps, barrier, launcher, host);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    match run.stage {
        Some(stage) => runtime.block_on(orchestrator.run_stage(stage))?,
        None => runtime.block_on(orchestrator.run_all())?,
    }

    Ok(())
}

/// Runs one interceptor hook inside an engine job.
fn intercept(hook: Hook) -> Result<(), Box<dyn std::error::Error>> {
    setup_logging(env::var("RUNNER_DEBUG").as_deref() == Ok("1"));

    let inputs = HookInputs::from_env()?;
    let job_dir = env::current_dir()?;
    let barrier = FsBarrier::new(&inputs.temp_dir);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    let mut stdout = io::stdout();
    runtime.block_on(run_hook(hook, &inputs, &job_dir, &barrier, &mut stdout))?;
    Ok(())
}

/// Main application entry point.
fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    let command = parse_arguments(&args).map_err(|e| {
        eprintln!("Error: {}", e);
        eprintln!();
        print_usage();
        e
    })?;

    match command {
        Command::Run(run) => run_steps(run),
        Command::Intercept(hook) => intercept(hook).map_err(|e| {
            error!("Interceptor hook {:?} failed: {}", hook, e);
            e
        }),
    }
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!();
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
