//! Engine Log Line Classifier
//!
//! Turns one raw engine log line into one [`Event`]. Everything here is
//! pure: no I/O, no shared state.
//!
//! Decoding is layered, first match wins:
//! 1. Structured JSON record
//! 2. `level=<level> msg=<text>`
//! 3. `Error: <text>`, optionally `<msg> for job:<jobID> step:<n>`
//! 4. The whole line as an `error` level message
//!
//! The decoded record is then sub-classified by plain prefix matching.

use serde::de::{self, Deserializer};
use serde::Deserialize;
use serde_json::Value;

/// Step position, inside an engine job, of the user's step.
const USER_STEP_POSITION: &str = "1";

/// Prefix of interceptor stage-window markers.
const INTERCEPTOR_MARKER_PREFIX: &str = "__::Interceptor::";

/// Prefix of engine run announcements (`⭐ Run <Stage> <step>`).
const RUN_ANNOUNCEMENT_PREFIX: &str = "⭐ Run ";

/// Prefix of in-band command markers.
const COMMAND_MARKER_PREFIX: &str = "  ⚙  ::";

/// Prefix of engine errors for rejected workflows.
const INVALID_WORKFLOW_PREFIX: &str = "workflow is not valid.";

/// Known-benign engine diagnostics, matched as message suffixes.
const IGNORED_MESSAGE_SUFFIXES: &[&str] = &[
    "not located inside a git repository",
    "unable to get git ref: repository does not exist",
    "unable to get git revision: repository does not exist",
];

/// One decoded engine log record.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LogRecord {
    #[serde(default = "default_level")]
    pub level: String,

    #[serde(default)]
    pub msg: String,

    #[serde(default, rename = "jobID")]
    pub job_id: Option<String>,

    #[serde(default, rename = "stepID", deserialize_with = "single_or_vec")]
    pub step_id: Vec<String>,

    #[serde(default)]
    pub raw_output: bool,

    #[serde(default, rename = "stepResult")]
    pub step_result: Option<String>,

    #[serde(default, rename = "jobResult")]
    pub job_result: Option<String>,

    /// Engine-native duration (nanoseconds)
    #[serde(default, rename = "executionTime")]
    pub execution_time: Option<u64>,
}

fn default_level() -> String {
    "info".to_string()
}

/// Deserializes either a single string or array of strings into Vec<String>
fn single_or_vec<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let val = Value::deserialize(deserializer)?;
    match val {
        Value::Null => Ok(Vec::new()),
        Value::String(s) => Ok(vec![s]),
        Value::Array(arr) => arr
            .into_iter()
            .map(|v| match v {
                Value::String(s) => Ok(s),
                Value::Number(n) => Ok(n.to_string()),
                _ => Err(de::Error::custom("Expected string in array")),
            })
            .collect(),
        _ => Err(de::Error::custom("Expected string or array of strings")),
    }
}

impl LogRecord {
    /// Creates a record with only a level and message.
    pub fn message(level: impl Into<String>, msg: impl Into<String>) -> Self {
        Self {
            level: level.into(),
            msg: msg.into(),
            job_id: None,
            step_id: Vec::new(),
            raw_output: false,
            step_result: None,
            job_result: None,
            execution_time: None,
        }
    }
}

/// Final state of a step as reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Error,
}

impl Outcome {
    /// Maps an engine `stepResult` value.
    ///
    /// `skipped` carries no outcome; anything that is not `success` is an error.
    pub fn from_step_result(value: &str) -> Option<Outcome> {
        match value {
            "success" => Some(Outcome::Success),
            "skipped" => None,
            _ => Some(Outcome::Error),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Error => "error",
        }
    }
}

/// Kind of an in-band command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandKind {
    SetOutput,
    SetEnv,
    AddPath,
    Unknown(String),
}

impl CommandKind {
    fn parse(kind: &str) -> Self {
        match kind {
            "set-output" => CommandKind::SetOutput,
            "set-env" => CommandKind::SetEnv,
            "add-path" => CommandKind::AddPath,
            other => CommandKind::Unknown(other.to_string()),
        }
    }

    /// Marker name of the command kind.
    pub fn name(&self) -> &str {
        match self {
            CommandKind::SetOutput => "set-output",
            CommandKind::SetEnv => "set-env",
            CommandKind::AddPath => "add-path",
            CommandKind::Unknown(kind) => kind,
        }
    }
}

/// A parsed command marker: `<kind>:: <name>=<value>` or `<kind>:: <value>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub kind: CommandKind,
    pub name: Option<String>,
    pub value: String,
}

impl Command {
    pub fn set_output(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            kind: CommandKind::SetOutput,
            name: Some(name.into()),
            value: value.into(),
        }
    }

    pub fn set_env(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            kind: CommandKind::SetEnv,
            name: Some(name.into()),
            value: value.into(),
        }
    }

    pub fn add_path(value: impl Into<String>) -> Self {
        Self {
            kind: CommandKind::AddPath,
            name: None,
            value: value.into(),
        }
    }
}

/// Classification of a log line.
#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    /// Known-benign engine diagnostic, dropped
    Noise,
    /// The engine rejected the whole workflow
    EngineFatal(String),
    /// Line not addressed to any job
    Untargeted,
    /// Stage-window open marker from the interceptor
    Start { stage: String },
    /// Stage-window close marker, or an explicit end with a result
    End {
        stage: String,
        result: Option<Outcome>,
    },
    /// Raw output of the user's step
    Output,
    /// Engine announcement that the user's step runs in a stage
    Announce { stage: String },
    /// Command marker emitted by the user's step
    Command(Command),
    /// Step-level result record
    Result {
        result: Option<Outcome>,
        execution_time_nanos: Option<u64>,
    },
    /// The engine failed to fetch the step's action
    FetchFailed(String),
    /// Job-level result record
    JobResult { failed: bool },
    /// Addressed to a job but irrelevant to the lifecycle
    Other,
}

/// One classified log line.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub level: String,
    pub message: String,
    pub job_id: Option<String>,
    pub step_id: Option<String>,
    pub raw_output: bool,
    pub kind: EventKind,
}

impl Event {
    fn for_step(index: usize, kind: EventKind) -> Self {
        Self {
            level: "info".to_string(),
            message: String::new(),
            job_id: Some(format!("Step{}", index)),
            step_id: None,
            raw_output: false,
            kind,
        }
    }

    /// Stage-window open event for a step.
    pub fn start(index: usize, stage: &str) -> Self {
        Self::for_step(
            index,
            EventKind::Start {
                stage: stage.to_string(),
            },
        )
    }

    /// Stage-window close event for a step.
    pub fn end(index: usize, stage: &str, result: Option<Outcome>) -> Self {
        Self::for_step(
            index,
            EventKind::End {
                stage: stage.to_string(),
                result,
            },
        )
    }

    /// Command event for a step.
    pub fn command(index: usize, command: Command) -> Self {
        Self::for_step(index, EventKind::Command(command))
    }

    /// Step result event.
    pub fn result(index: usize, result: Option<Outcome>, execution_time_nanos: Option<u64>) -> Self {
        Self::for_step(
            index,
            EventKind::Result {
                result,
                execution_time_nanos,
            },
        )
    }

    /// Job-level failure signal for a step.
    pub fn job_failed(index: usize) -> Self {
        Self::for_step(index, EventKind::JobResult { failed: true })
    }

    /// Step output line.
    pub fn output(index: usize, message: impl Into<String>) -> Self {
        let mut event = Self::for_step(index, EventKind::Output);
        event.message = message.into();
        event.raw_output = true;
        event
    }
}

/// Decodes a structured JSON record.
pub fn decode_structured(line: &str) -> Option<LogRecord> {
    serde_json::from_str::<LogRecord>(line).ok()
}

/// Decodes `level=<level> msg=<text>`.
pub fn decode_level_msg(line: &str) -> Option<LogRecord> {
    let rest = line.strip_prefix("level=")?;
    let level_len = rest
        .find(|c: char| !(c.is_alphanumeric() || c == '_' || c == '-'))
        .unwrap_or(rest.len());
    if level_len == 0 {
        return None;
    }

    let (level, rest) = rest.split_at(level_len);
    let mut chars = rest.chars();
    if !chars.next()?.is_whitespace() {
        return None;
    }
    let msg = chars.as_str().strip_prefix("msg=")?;

    Some(LogRecord::message(level, msg))
}

/// Decodes `Error: <text>` and the optional `for job:<jobID> step:<n>` suffix.
pub fn decode_error_line(line: &str) -> Option<LogRecord> {
    let text = line.strip_prefix("Error: ")?;

    if let Some((msg, job_id, step)) = split_job_suffix(text) {
        let mut record = LogRecord::message("error", msg);
        record.job_id = Some(job_id.to_string());
        record.step_id = vec![step.to_string()];
        return Some(record);
    }

    Some(LogRecord::message("error", text))
}

/// Splits `<msg>for job:<jobID> step:<n>` at the last `for job:`.
fn split_job_suffix(text: &str) -> Option<(&str, &str, &str)> {
    let at = text.rfind("for job:")?;
    let (msg, suffix) = text.split_at(at);
    let (job_id, step) = suffix.strip_prefix("for job:")?.split_once(" step:")?;

    let is_word = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_alphanumeric() || c == '_');
    let is_digits = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit());
    if !is_word(job_id) || !is_digits(step) {
        return None;
    }

    Some((msg, job_id, step))
}

/// Decodes one raw line. Never fails: unrecognized lines become `error` messages.
pub fn parse_line(line: &str) -> LogRecord {
    let mut record = decode_structured(line)
        .or_else(|| decode_level_msg(line))
        .or_else(|| decode_error_line(line))
        .unwrap_or_else(|| LogRecord::message("error", line));

    let trimmed_len = record.msg.trim_end().len();
    record.msg.truncate(trimmed_len);

    if record.level == "warn" {
        record.level = "warning".to_string();
    }

    record
}

/// Returns true for known-benign engine diagnostics.
pub fn is_ignored_noise(msg: &str) -> bool {
    IGNORED_MESSAGE_SUFFIXES
        .iter()
        .any(|suffix| msg.ends_with(suffix))
}

/// Parses an interceptor marker `__::Interceptor::<Stage>::<Type>::`.
fn parse_interceptor_marker(msg: &str) -> Option<(&str, &str)> {
    let rest = msg.strip_prefix(INTERCEPTOR_MARKER_PREFIX)?;
    let (stage, rest) = rest.split_once("::")?;
    let (marker, _) = rest.split_once("::")?;
    if stage.is_empty() || marker.is_empty() {
        return None;
    }
    Some((stage, marker))
}

/// Parses a command marker body `<kind>:: <parameter>`.
fn parse_command(msg: &str) -> Option<Command> {
    let rest = msg.strip_prefix(COMMAND_MARKER_PREFIX)?;
    let (kind, parameter) = rest.split_once("::")?;
    let parameter = parameter.strip_prefix(' ')?;
    if kind.is_empty() || kind.contains(':') {
        return None;
    }

    let kind = CommandKind::parse(kind);
    let command = match kind {
        CommandKind::SetOutput | CommandKind::SetEnv => match parameter.split_once('=') {
            Some((name, value)) if !name.is_empty() => Command {
                kind,
                name: Some(name.to_string()),
                value: value.to_string(),
            },
            _ => Command {
                kind,
                name: None,
                value: parameter.to_string(),
            },
        },
        _ => Command {
            kind,
            name: None,
            value: parameter.to_string(),
        },
    };
    Some(command)
}

/// Reduces a fetch failure to `failed to fetch <x> with ref <y>` when possible.
fn fetch_failure_message(msg: &str) -> String {
    if let Some(at) = msg.find("GoGitActionCache failed to fetch ") {
        let tokens: Vec<&str> = msg[at..].split_whitespace().skip(1).take(7).collect();
        if tokens.len() == 7 && tokens[4] == "with" && tokens[5] == "ref" {
            return tokens.join(" ");
        }
    }
    msg.to_string()
}

/// Extracts the reason from an invalid-workflow error.
fn invalid_workflow_message(msg: &str) -> String {
    const RUN_STEP_MARKER: &str = "Failed to match run-step: Line: ";

    let detail = msg.find(RUN_STEP_MARKER).and_then(|at| {
        let rest = &msg[at + RUN_STEP_MARKER.len()..];
        let (line_no, rest) = rest.split_once(" Column ")?;
        let (column, detail) = rest.split_once(": ")?;
        let numeric = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit());
        (numeric(line_no) && numeric(column)).then_some(detail)
    });

    format!("Invalid steps input - {}", detail.unwrap_or(msg))
}

/// Sub-classifies a decoded record.
pub fn classify(record: LogRecord) -> Event {
    let kind = classify_kind(&record);
    Event {
        level: record.level,
        message: record.msg,
        job_id: record.job_id,
        step_id: record.step_id.into_iter().next(),
        raw_output: record.raw_output,
        kind,
    }
}

fn classify_kind(record: &LogRecord) -> EventKind {
    let msg = record.msg.as_str();

    if is_ignored_noise(msg) {
        return EventKind::Noise;
    }

    if record.level == "error" && msg.starts_with(INVALID_WORKFLOW_PREFIX) {
        return EventKind::EngineFatal(invalid_workflow_message(msg));
    }

    if record.job_id.is_none() {
        return EventKind::Untargeted;
    }

    if record.step_id.first().map(String::as_str) == Some(USER_STEP_POSITION) {
        return classify_user_step(record);
    }

    if let Some(job_result) = &record.job_result {
        return EventKind::JobResult {
            failed: job_result == "failure",
        };
    }

    if record.raw_output {
        if let Some((stage, marker)) = parse_interceptor_marker(msg) {
            let stage = stage.to_string();
            return match marker {
                "Start" => EventKind::Start { stage },
                "End" => EventKind::End {
                    stage,
                    result: None,
                },
                _ => EventKind::Other,
            };
        }
    }

    EventKind::Other
}

fn classify_user_step(record: &LogRecord) -> EventKind {
    let msg = record.msg.as_str();

    if record.raw_output {
        return EventKind::Output;
    }

    if let Some(step_result) = &record.step_result {
        return EventKind::Result {
            result: Outcome::from_step_result(step_result),
            execution_time_nanos: record.execution_time,
        };
    }

    if record.level == "error" {
        if msg.starts_with("failed to fetch ") {
            return EventKind::FetchFailed(fetch_failure_message(msg));
        }
        return EventKind::Other;
    }

    if let Some(rest) = msg.strip_prefix(RUN_ANNOUNCEMENT_PREFIX) {
        if let Some((stage, _)) = rest.split_once(' ') {
            return EventKind::Announce {
                stage: stage.to_string(),
            };
        }
    }

    if msg.starts_with(COMMAND_MARKER_PREFIX) {
        return match parse_command(msg) {
            Some(command) => EventKind::Command(command),
            None => EventKind::Output,
        };
    }

    EventKind::Other
}

/// Decodes and classifies one raw line.
pub fn classify_line(line: &str) -> Event {
    classify(parse_line(line))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn json_line(fields: &str) -> String {
        format!("{{\"level\":\"info\",{}}}", fields)
    }

    #[test]
    fn test_parse_structured_record() {
        let record = parse_line(
            r#"{"level":"info","msg":"hello  ","jobID":"Step0","stepID":["1"],"raw_output":true}"#,
        );
        assert_eq!(record.level, "info");
        assert_eq!(record.msg, "hello");
        assert_eq!(record.job_id.as_deref(), Some("Step0"));
        assert_eq!(record.step_id, vec!["1".to_string()]);
        assert!(record.raw_output);
    }

    #[test]
    fn test_parse_normalizes_warn() {
        let record = parse_line(r#"{"level":"warn","msg":"careful"}"#);
        assert_eq!(record.level, "warning");

        let record = parse_line("level=warn msg=careful");
        assert_eq!(record.level, "warning");
        assert_eq!(record.msg, "careful");
    }

    #[test]
    fn test_parse_level_msg_line() {
        let record = parse_line("level=debug msg=Loading workflow ");
        assert_eq!(record.level, "debug");
        assert_eq!(record.msg, "Loading workflow");
        assert!(record.job_id.is_none());
    }

    #[test]
    fn test_parse_error_line() {
        let record = parse_line("Error: something broke");
        assert_eq!(record.level, "error");
        assert_eq!(record.msg, "something broke");
    }

    #[test]
    fn test_parse_error_line_with_job() {
        let record = parse_line("Error: exit status 1 for job:Step2 step:1");
        assert_eq!(record.level, "error");
        assert_eq!(record.msg, "exit status 1");
        assert_eq!(record.job_id.as_deref(), Some("Step2"));
        assert_eq!(record.step_id, vec!["1".to_string()]);
    }

    #[test]
    fn test_parse_fallback_is_error() {
        let record = parse_line("some unstructured output");
        assert_eq!(record.level, "error");
        assert_eq!(record.msg, "some unstructured output");

        let record = parse_line("42");
        assert_eq!(record.level, "error");
        assert_eq!(record.msg, "42");
    }

    #[test]
    fn test_step_id_accepts_single_string() {
        let record = parse_line(r#"{"msg":"x","jobID":"Step0","stepID":"1"}"#);
        assert_eq!(record.step_id, vec!["1".to_string()]);
    }

    #[test]
    fn test_classify_interceptor_markers() {
        let line = json_line(r#""msg":"__::Interceptor::Pre::Start::","jobID":"Step3","stepID":["0"],"raw_output":true"#);
        let event = classify_line(&line);
        assert_eq!(
            event.kind,
            EventKind::Start {
                stage: "Pre".to_string()
            }
        );
        assert_eq!(event.job_id.as_deref(), Some("Step3"));

        let line = json_line(r#""msg":"__::Interceptor::Main::End::","jobID":"Step0","stepID":["2"],"raw_output":true"#);
        assert_eq!(
            classify_line(&line).kind,
            EventKind::End {
                stage: "Main".to_string(),
                result: None
            }
        );
    }

    #[test]
    fn test_classify_marker_requires_raw_output() {
        let line = json_line(r#""msg":"__::Interceptor::Pre::Start::","jobID":"Step0","stepID":["0"]"#);
        assert_eq!(classify_line(&line).kind, EventKind::Other);
    }

    #[test]
    fn test_classify_step_output() {
        let line = json_line(r#""msg":"compiling...","jobID":"Step1","stepID":["1"],"raw_output":true"#);
        let event = classify_line(&line);
        assert_eq!(event.kind, EventKind::Output);
        assert_eq!(event.message, "compiling...");
    }

    #[test]
    fn test_classify_commands() {
        let line = json_line(r#""msg":"  ⚙  ::set-output:: version=1.2.3","jobID":"Step1","stepID":["1"]"#);
        assert_eq!(
            classify_line(&line).kind,
            EventKind::Command(Command::set_output("version", "1.2.3"))
        );

        let line = json_line(r#""msg":"  ⚙  ::set-env:: A=b=c","jobID":"Step1","stepID":["1"]"#);
        assert_eq!(
            classify_line(&line).kind,
            EventKind::Command(Command::set_env("A", "b=c"))
        );

        let line = json_line(r#""msg":"  ⚙  ::add-path:: /opt/tool/bin","jobID":"Step1","stepID":["1"]"#);
        assert_eq!(
            classify_line(&line).kind,
            EventKind::Command(Command::add_path("/opt/tool/bin"))
        );
    }

    #[test]
    fn test_classify_unknown_and_malformed_commands() {
        let line = json_line(r#""msg":"  ⚙  ::add-mask:: secret","jobID":"Step1","stepID":["1"]"#);
        let EventKind::Command(command) = classify_line(&line).kind else {
            panic!("expected command");
        };
        assert_eq!(command.kind, CommandKind::Unknown("add-mask".to_string()));

        let line = json_line(r#""msg":"  ⚙  ::set-output:: novalue","jobID":"Step1","stepID":["1"]"#);
        let EventKind::Command(command) = classify_line(&line).kind else {
            panic!("expected command");
        };
        assert_eq!(command.name, None);

        let line = json_line(r#""msg":"  ⚙  ::broken","jobID":"Step1","stepID":["1"]"#);
        assert_eq!(classify_line(&line).kind, EventKind::Output);
    }

    #[test]
    fn test_classify_step_result() {
        let line = json_line(r#""msg":"  ✅  Success - Main make","jobID":"Step0","stepID":["1"],"stepResult":"success","executionTime":1500000000"#);
        assert_eq!(
            classify_line(&line).kind,
            EventKind::Result {
                result: Some(Outcome::Success),
                execution_time_nanos: Some(1_500_000_000)
            }
        );

        let line = r#"{"level":"error","msg":"  ❌  Failure - Main make","jobID":"Step0","stepID":["1"],"stepResult":"failure"}"#;
        assert!(matches!(
            classify_line(line).kind,
            EventKind::Result {
                result: Some(Outcome::Error),
                ..
            }
        ));
    }

    #[test]
    fn test_classify_skipped_result_has_no_outcome() {
        let line = json_line(r#""msg":"skipped","jobID":"Step0","stepID":["1"],"stepResult":"skipped""#);
        assert!(matches!(
            classify_line(&line).kind,
            EventKind::Result { result: None, .. }
        ));
    }

    #[test]
    fn test_classify_announcement() {
        let line = json_line(r#""msg":"⭐ Run Main make build","jobID":"Step0","stepID":["1"]"#);
        assert_eq!(
            classify_line(&line).kind,
            EventKind::Announce {
                stage: "Main".to_string()
            }
        );
    }

    #[test]
    fn test_classify_job_result() {
        let line = json_line(r#""msg":"🏁  Job failed","jobID":"Step2","jobResult":"failure""#);
        assert_eq!(classify_line(&line).kind, EventKind::JobResult { failed: true });

        let line = json_line(r#""msg":"🏁  Job succeeded","jobID":"Step2","jobResult":"success""#);
        assert_eq!(classify_line(&line).kind, EventKind::JobResult { failed: false });
    }

    #[test]
    fn test_classify_fetch_failure() {
        let line = r#"{"level":"error","msg":"GoGitActionCache failed to fetch https://github.com/x/y with ref v1: not found","jobID":"Step0","stepID":["1"]}"#;
        // message does not start with the prefix, so it is not a fetch failure
        assert_eq!(classify_line(line).kind, EventKind::Other);

        let line = r#"{"level":"error","msg":"failed to fetch action: GoGitActionCache failed to fetch https://github.com/x/y with ref v1: not found","jobID":"Step0","stepID":["1"]}"#;
        assert_eq!(
            classify_line(line).kind,
            EventKind::FetchFailed("failed to fetch https://github.com/x/y with ref v1:".to_string())
        );
    }

    #[test]
    fn test_classify_invalid_workflow() {
        let line = r#"{"level":"error","msg":"workflow is not valid. 'steps-workflow.yaml': Failed to match run-step: Line: 12 Column 9: Unknown Property foo"}"#;
        assert_eq!(
            classify_line(line).kind,
            EventKind::EngineFatal("Invalid steps input - Unknown Property foo".to_string())
        );

        let line = r#"{"level":"error","msg":"workflow is not valid. broken"}"#;
        assert_eq!(
            classify_line(line).kind,
            EventKind::EngineFatal("Invalid steps input - workflow is not valid. broken".to_string())
        );
    }

    #[test]
    fn test_classify_noise() {
        let line = r#"{"level":"error","msg":"/work is not located inside a git repository","jobID":"Step0"}"#;
        assert_eq!(classify_line(line).kind, EventKind::Noise);

        let line = "level=warning msg=unable to get git ref: repository does not exist";
        assert_eq!(classify_line(line).kind, EventKind::Noise);
    }

    #[test]
    fn test_classify_untargeted() {
        assert_eq!(classify_line("plain text").kind, EventKind::Untargeted);
    }

    #[test]
    fn test_outcome_mapping() {
        assert_eq!(Outcome::from_step_result("success"), Some(Outcome::Success));
        assert_eq!(Outcome::from_step_result("failure"), Some(Outcome::Error));
        assert_eq!(Outcome::from_step_result("skipped"), None);
        assert_eq!(Outcome::Error.as_str(), "error");
    }
}
