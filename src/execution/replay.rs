//! Command Capture & Replay
//!
//! Commands emitted by a step are captured per step while the stage runs
//! and replayed onto the host once the whole stage has completed.

use std::collections::BTreeMap;

use log::{debug, warn};

use crate::environment::{HostError, HostOutputs};
use crate::workflow::Step;

use super::classifier::{Command, CommandKind};

/// Why a command could not be captured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    /// `set-output` / `set-env` without a `name=value` payload
    MissingName,
}

/// Values captured from one step's commands.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandCaptures {
    /// `set-output` values, last write wins
    pub outputs: BTreeMap<String, String>,
    /// `set-env` values, last write wins
    pub env: BTreeMap<String, String>,
    /// `add-path` entries in emission order
    pub paths: Vec<String>,
}

impl CommandCaptures {
    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty() && self.env.is_empty() && self.paths.is_empty()
    }

    /// Records one command.
    ///
    /// Unknown command kinds are logged and ignored.
    pub fn apply(&mut self, command: &Command) -> Result<(), CaptureError> {
        match &command.kind {
            CommandKind::SetOutput => {
                let name = command.name.as_ref().ok_or(CaptureError::MissingName)?;
                self.outputs.insert(name.clone(), command.value.clone());
            }
            CommandKind::SetEnv => {
                let name = command.name.as_ref().ok_or(CaptureError::MissingName)?;
                self.env.insert(name.clone(), command.value.clone());
            }
            CommandKind::AddPath => {
                self.paths.push(command.value.clone());
            }
            CommandKind::Unknown(_) => {
                warn!("Unexpected command: {}", command.kind.name());
            }
        }
        Ok(())
    }

    /// Replays the captures of `step` onto the host.
    ///
    /// Every output is set under its own name and, when the step has an
    /// id, again under `<id>-<name>`. Paths keep their emission order.
    pub fn replay<H: HostOutputs>(&self, step: &Step, host: &mut H) -> Result<(), HostError> {
        for (name, value) in &self.outputs {
            host.set_output(name, value)?;
            if let Some(id) = &step.id {
                let scoped = format!("{}-{}", id, name);
                debug!("Set scoped output: {}={}", scoped, value);
                host.set_output(&scoped, value)?;
            }
        }

        for (name, value) in &self.env {
            host.export_variable(name, value)?;
        }

        for path in &self.paths {
            host.add_path(path)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::{HostCall, RecordingHost};

    #[test]
    fn test_last_write_wins() {
        let mut captures = CommandCaptures::default();
        captures.apply(&Command::set_output("v", "1")).unwrap();
        captures.apply(&Command::set_output("v", "2")).unwrap();
        captures.apply(&Command::set_env("E", "a")).unwrap();
        captures.apply(&Command::set_env("E", "b")).unwrap();

        assert_eq!(captures.outputs.get("v").map(String::as_str), Some("2"));
        assert_eq!(captures.env.get("E").map(String::as_str), Some("b"));
    }

    #[test]
    fn test_missing_name_is_rejected() {
        let mut captures = CommandCaptures::default();
        let command = Command {
            kind: CommandKind::SetOutput,
            name: None,
            value: "novalue".to_string(),
        };
        assert_eq!(captures.apply(&command), Err(CaptureError::MissingName));
        assert!(captures.is_empty());
    }

    #[test]
    fn test_unknown_command_is_ignored() {
        let mut captures = CommandCaptures::default();
        let command = Command {
            kind: CommandKind::Unknown("add-mask".to_string()),
            name: None,
            value: "secret".to_string(),
        };
        assert!(captures.apply(&command).is_ok());
        assert!(captures.is_empty());
    }

    #[test]
    fn test_replay_with_scoped_alias_and_path_order() {
        let mut captures = CommandCaptures::default();
        captures.apply(&Command::set_output("version", "1.2.3")).unwrap();
        captures.apply(&Command::set_env("MODE", "ci")).unwrap();
        captures.apply(&Command::add_path("/z/bin")).unwrap();
        captures.apply(&Command::add_path("/a/bin")).unwrap();

        let step = Step::run("make").with_id("build");
        let mut host = RecordingHost::new();
        captures.replay(&step, &mut host).unwrap();

        assert_eq!(
            host.calls,
            vec![
                HostCall::SetOutput("version".to_string(), "1.2.3".to_string()),
                HostCall::SetOutput("build-version".to_string(), "1.2.3".to_string()),
                HostCall::ExportVariable("MODE".to_string(), "ci".to_string()),
                HostCall::AddPath("/z/bin".to_string()),
                HostCall::AddPath("/a/bin".to_string()),
            ]
        );
    }

    #[test]
    fn test_replay_without_id_has_no_alias() {
        let mut captures = CommandCaptures::default();
        captures.apply(&Command::set_output("k", "v")).unwrap();

        let mut host = RecordingHost::new();
        captures.replay(&Step::run("true"), &mut host).unwrap();
        assert_eq!(host.outputs(), vec![("k".to_string(), "v".to_string())]);
    }
}
