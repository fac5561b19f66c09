//! Host-Facing Outputs
//!
//! The only operations the runner performs against its caller: set an
//! output, export a variable, add a path entry, fail the stage, and
//! group console lines.
//!
//! [`GithubHost`] writes the runner command files named by
//! `GITHUB_OUTPUT`, `GITHUB_ENV` and `GITHUB_PATH`, and falls back to
//! workflow commands on stdout when a file is not configured.
//! [`RecordingHost`] keeps every call in memory.

use std::env;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use log::debug;
use thiserror::Error;

/// Host output errors.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("Failed to write command file '{path}': {source}")]
    CommandFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Value of '{name}' contains the delimiter '{delimiter}'")]
    DelimiterCollision { name: String, delimiter: String },
}

/// Operations exposed to the caller of a stage.
pub trait HostOutputs {
    /// Sets a step output visible to downstream consumers.
    fn set_output(&mut self, name: &str, value: &str) -> Result<(), HostError>;

    /// Exports an environment variable for subsequent steps.
    fn export_variable(&mut self, name: &str, value: &str) -> Result<(), HostError>;

    /// Prepends a path entry for subsequent steps.
    fn add_path(&mut self, path: &str) -> Result<(), HostError>;

    /// Marks the stage as failed with a message.
    fn fail_stage(&mut self, message: &str);

    /// Opens a collapsible console group.
    fn start_group(&mut self, title: &str);

    /// Closes the current console group.
    fn end_group(&mut self);
}

/// GitHub Actions runner host.
#[derive(Debug, Clone, Default)]
pub struct GithubHost {
    output_file: Option<PathBuf>,
    env_file: Option<PathBuf>,
    path_file: Option<PathBuf>,
}

impl GithubHost {
    /// Creates a host from `GITHUB_OUTPUT`, `GITHUB_ENV` and `GITHUB_PATH`.
    pub fn from_env() -> Self {
        let file = |key: &str| {
            env::var(key)
                .ok()
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
        };
        Self {
            output_file: file("GITHUB_OUTPUT"),
            env_file: file("GITHUB_ENV"),
            path_file: file("GITHUB_PATH"),
        }
    }

    /// Creates a host with explicit command files.
    pub fn with_files(
        output_file: impl Into<PathBuf>,
        env_file: impl Into<PathBuf>,
        path_file: impl Into<PathBuf>,
    ) -> Self {
        Self {
            output_file: Some(output_file.into()),
            env_file: Some(env_file.into()),
            path_file: Some(path_file.into()),
        }
    }
}

impl HostOutputs for GithubHost {
    fn set_output(&mut self, name: &str, value: &str) -> Result<(), HostError> {
        debug!("Set output: {}={}", name, value);
        match &self.output_file {
            Some(path) => append_key_value(path, name, value),
            None => {
                println!();
                println!("::set-output name={}::{}", name, escape_data(value));
                Ok(())
            }
        }
    }

    fn export_variable(&mut self, name: &str, value: &str) -> Result<(), HostError> {
        debug!("Export variable: {}={}", name, value);
        env::set_var(name, value);
        match &self.env_file {
            Some(path) => append_key_value(path, name, value),
            None => {
                println!("::set-env name={}::{}", name, escape_data(value));
                Ok(())
            }
        }
    }

    fn add_path(&mut self, path: &str) -> Result<(), HostError> {
        debug!("Add path: {}", path);
        match &self.path_file {
            Some(file) => append_line(file, path)?,
            None => println!("::add-path::{}", path),
        }

        let current = env::var("PATH").unwrap_or_default();
        let updated = if current.is_empty() {
            path.to_string()
        } else {
            format!("{}:{}", path, current)
        };
        env::set_var("PATH", updated);
        Ok(())
    }

    fn fail_stage(&mut self, message: &str) {
        println!("::error::{}", escape_data(message));
    }

    fn start_group(&mut self, title: &str) {
        println!("::group::{}", title);
    }

    fn end_group(&mut self) {
        println!("::endgroup::");
    }
}

/// Escapes a workflow command payload.
fn escape_data(value: &str) -> String {
    value
        .replace('%', "%25")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}

/// Appends `name<<delimiter\nvalue\ndelimiter` to a command file.
fn append_key_value(path: &Path, name: &str, value: &str) -> Result<(), HostError> {
    let delimiter = format!(
        "ghadelimiter_{}",
        Utc::now().timestamp_nanos_opt().unwrap_or_default()
    );

    if name.contains(&delimiter) || value.contains(&delimiter) {
        return Err(HostError::DelimiterCollision {
            name: name.to_string(),
            delimiter,
        });
    }

    append_line(path, &format!("{}<<{}\n{}\n{}", name, delimiter, value, delimiter))
}

fn append_line(path: &Path, line: &str) -> Result<(), HostError> {
    let to_error = |source: std::io::Error| HostError::CommandFile {
        path: path.to_path_buf(),
        source,
    };
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(to_error)?;
    writeln!(file, "{}", line).map_err(to_error)
}

/// One recorded host call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostCall {
    SetOutput(String, String),
    ExportVariable(String, String),
    AddPath(String),
    FailStage(String),
    StartGroup(String),
    EndGroup,
}

/// In-memory host used by tests and dry runs.
#[derive(Debug, Clone, Default)]
pub struct RecordingHost {
    pub calls: Vec<HostCall>,
}

impl RecordingHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recorded `set_output` calls in call order.
    pub fn outputs(&self) -> Vec<(String, String)> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                HostCall::SetOutput(name, value) => Some((name.clone(), value.clone())),
                _ => None,
            })
            .collect()
    }

    /// Recorded `add_path` calls in call order.
    pub fn paths(&self) -> Vec<String> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                HostCall::AddPath(path) => Some(path.clone()),
                _ => None,
            })
            .collect()
    }

    /// Recorded `fail_stage` messages.
    pub fn failures(&self) -> Vec<String> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                HostCall::FailStage(message) => Some(message.clone()),
                _ => None,
            })
            .collect()
    }
}

impl HostOutputs for RecordingHost {
    fn set_output(&mut self, name: &str, value: &str) -> Result<(), HostError> {
        self.calls
            .push(HostCall::SetOutput(name.to_string(), value.to_string()));
        Ok(())
    }

    fn export_variable(&mut self, name: &str, value: &str) -> Result<(), HostError> {
        self.calls
            .push(HostCall::ExportVariable(name.to_string(), value.to_string()));
        Ok(())
    }

    fn add_path(&mut self, path: &str) -> Result<(), HostError> {
        self.calls.push(HostCall::AddPath(path.to_string()));
        Ok(())
    }

    fn fail_stage(&mut self, message: &str) {
        self.calls.push(HostCall::FailStage(message.to_string()));
    }

    fn start_group(&mut self, title: &str) {
        self.calls.push(HostCall::StartGroup(title.to_string()));
    }

    fn end_group(&mut self) {
        self.calls.push(HostCall::EndGroup);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_github_host_writes_heredoc_outputs() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("output");
        let mut host = GithubHost::with_files(
            &output,
            dir.path().join("env"),
            dir.path().join("path"),
        );

        host.set_output("version", "1.2.3").unwrap();
        host.set_output("notes", "line one\nline two").unwrap();

        let content = fs::read_to_string(&output).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert!(lines[0].starts_with("version<<ghadelimiter_"));
        assert_eq!(lines[1], "1.2.3");
        assert_eq!(lines[2], &lines[0]["version<<".len()..]);
        assert!(lines[3].starts_with("notes<<ghadelimiter_"));
        assert_eq!(lines[4], "line one");
        assert_eq!(lines[5], "line two");
    }

    #[test]
    fn test_github_host_appends_paths_in_order() {
        let dir = tempdir().unwrap();
        let path_file = dir.path().join("path");
        let mut host = GithubHost::with_files(
            dir.path().join("output"),
            dir.path().join("env"),
            &path_file,
        );

        host.add_path("/opt/a/bin").unwrap();
        host.add_path("/opt/b/bin").unwrap();

        assert_eq!(
            fs::read_to_string(&path_file).unwrap(),
            "/opt/a/bin\n/opt/b/bin\n"
        );
    }

    #[test]
    fn test_escape_data() {
        assert_eq!(escape_data("50%\nnext"), "50%25%0Anext");
    }

    #[test]
    fn test_recording_host() {
        let mut host = RecordingHost::new();
        host.set_output("a", "1").unwrap();
        host.add_path("/bin").unwrap();
        host.fail_stage("boom");

        assert_eq!(host.outputs(), vec![("a".to_string(), "1".to_string())]);
        assert_eq!(host.paths(), vec!["/bin".to_string()]);
        assert_eq!(host.failures(), vec!["boom".to_string()]);
        assert_eq!(host.calls.len(), 3);
    }
}
