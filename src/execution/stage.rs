//! Lifecycle Stages
//!
//! Every step passes through the same three ordered stages. On the wire
//! (sentinel names, interceptor markers, engine run announcements) a
//! stage is always referred to by its engine-native name.

use std::fmt;
use std::str::FromStr;

/// One of the three ordered lifecycle stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
    /// Engine `Pre` stage
    Setup,
    /// Engine `Main` stage
    Execution,
    /// Engine `Post` stage
    Teardown,
}

impl Stage {
    /// All stages in execution order.
    pub const ALL: [Stage; 3] = [Stage::Setup, Stage::Execution, Stage::Teardown];

    /// Engine-native stage name.
    pub fn engine_name(self) -> &'static str {
        match self {
            Stage::Setup => "Pre",
            Stage::Execution => "Main",
            Stage::Teardown => "Post",
        }
    }

    /// Resolves an engine-native stage name.
    pub fn from_engine_name(name: &str) -> Option<Stage> {
        Self::ALL.into_iter().find(|stage| stage.engine_name() == name)
    }

    /// The stage following this one, if any.
    pub fn next(self) -> Option<Stage> {
        match self {
            Stage::Setup => Some(Stage::Execution),
            Stage::Execution => Some(Stage::Teardown),
            Stage::Teardown => None,
        }
    }

    pub fn is_first(self) -> bool {
        self == Stage::Setup
    }

    pub fn is_last(self) -> bool {
        self == Stage::Teardown
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Stage::Setup => "Setup",
            Stage::Execution => "Execution",
            Stage::Teardown => "Teardown",
        };
        f.write_str(label)
    }
}

impl FromStr for Stage {
    type Err = String;

    /// Accepts either the stage label or the engine-native name.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "setup" | "pre" => Ok(Stage::Setup),
            "execution" | "main" => Ok(Stage::Execution),
            "teardown" | "post" => Ok(Stage::Teardown),
            other => Err(format!("Unknown stage: {}", other)),
        }
    }
}
