//! Step Data Model
//!
//! Core data structures representing the steps handed to the engine.
//! A step is an opaque job step definition: only `id`, `name`, `uses`
//! and `run` are interpreted here, every other key is carried verbatim
//! into the rendered engine workflow.
//!
//! # Example YAML Format
//!
//! ```yaml
//! - id: build
//!   run: make build
//!
//! - name: Lint
//!   uses: ./actions/lint
//!   with:
//!     strict: true
//! ```

use serde::{Deserialize, Serialize};
use serde_yaml::Mapping;

/// Display name used when a step has neither `name`, `uses` nor `run`.
const INVALID_STEP_NAME: &str = "INVALID STEP";

/// A single step definition.
///
/// Steps are created once from validated input and never mutated while a
/// stage runs. Their position in the batch is the stable key used by the
/// engine job naming (`Step<N>`).
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Step {
    /// Optional identifier used for id-scoped output aliases
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Human readable name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Action reference (e.g. `actions/checkout@v4`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uses: Option<String>,

    /// Shell script body
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run: Option<String>,

    /// Every other key of the step definition (`with`, `env`, `shell`, ...)
    #[serde(flatten)]
    pub extra: Mapping,
}

impl Step {
    /// Creates a `run` step.
    ///
    /// # Example
    ///
    /// ```
    /// use parallel_steps::workflow::Step;
    ///
    /// let step = Step::run("make build").with_id("build");
    /// assert_eq!(step.display_name(), "make build");
    /// ```
    pub fn run(script: impl Into<String>) -> Self {
        Self {
            run: Some(script.into()),
            ..Self::default()
        }
    }

    /// Creates a `uses` step.
    pub fn uses(action: impl Into<String>) -> Self {
        Self {
            uses: Some(action.into()),
            ..Self::default()
        }
    }

    /// Sets the step id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Sets the step name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Name shown in step headlines.
    ///
    /// Resolution order: `name`, `uses`, first line of `run`.
    pub fn display_name(&self) -> &str {
        if let Some(name) = &self.name {
            return name;
        }
        if let Some(uses) = &self.uses {
            return uses;
        }
        if let Some(run) = &self.run {
            return run.lines().next().unwrap_or_default();
        }
        INVALID_STEP_NAME
    }
}

/// An ordered batch of steps.
///
/// The index of a step in the batch is its identity for the whole run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepBatch {
    steps: Vec<Step>,
}

impl StepBatch {
    /// Creates a batch from already validated steps.
    pub fn from_steps(steps: Vec<Step>) -> Self {
        Self { steps }
    }

    /// Returns the step at `index`.
    pub fn get(&self, index: usize) -> Option<&Step> {
        self.steps.get(index)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Iterates steps in index order.
    pub fn iter(&self) -> impl Iterator<Item = &Step> {
        self.steps.iter()
    }

    /// Engine job id for the step at `index`.
    pub fn job_id(index: usize) -> String {
        format!("Step{}", index)
    }
}
