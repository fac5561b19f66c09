//! Steps Input Validation
//!
//! Fast, local validation of a step batch before any stage begins:
//! - Non-empty batch within the concurrency ceiling
//! - Step ids match `^[A-Za-z_][A-Za-z0-9_-]{1,100}$`
//! - Step ids are unique

use std::collections::HashSet;

use log::{debug, info};
use thiserror::Error;

use super::model::{Step, StepBatch};

/// Maximum number of characters after the first one in a step id.
const MAX_ID_TAIL_LEN: usize = 100;

/// Validation error types for user-facing error messages.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Invalid steps input - Invalid YAML - {0}")]
    InvalidYaml(String),

    #[error("Invalid steps input - Must be an YAML array")]
    NotAnArray,

    #[error("Invalid steps input - Must contain at least one step")]
    EmptyBatch,

    #[error("Invalid steps input - Step {index} is not a valid step definition: {reason}")]
    InvalidStep { index: usize, reason: String },

    #[error("Invalid steps input - Step {index} has an invalid id '{id}'")]
    InvalidId { index: usize, id: String },

    #[error("Invalid steps input - Duplicate step id '{0}'")]
    DuplicateId(String),

    #[error("Invalid steps input - {count} steps exceed the limit of {max} concurrent steps")]
    TooManySteps { count: usize, max: usize },
}

/// Checks a step id against `^[A-Za-z_][A-Za-z0-9_-]{1,100}$`.
pub fn is_valid_step_id(id: &str) -> bool {
    let mut chars = id.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    if !(first.is_ascii_alphabetic() || first == '_') {
        return false;
    }

    let mut tail_len = 0;
    for c in chars {
        if !(c.is_ascii_alphanumeric() || c == '_' || c == '-') {
            return false;
        }
        tail_len += 1;
    }

    (1..=MAX_ID_TAIL_LEN).contains(&tail_len)
}

/// Validates a parsed step list and turns it into a [`StepBatch`].
///
/// Performs the following checks:
/// 1. The batch is not empty
/// 2. The batch does not exceed `max_steps`
/// 3. Every present id is well formed
/// 4. No id is used twice
pub fn validate_steps(steps: Vec<Step>, max_steps: usize) -> Result<StepBatch, ValidationError> {
    info!("Validating {} steps", steps.len());

    if steps.is_empty() {
        return Err(ValidationError::EmptyBatch);
    }

    if steps.len() > max_steps {
        return Err(ValidationError::TooManySteps {
            count: steps.len(),
            max: max_steps,
        });
    }

    let mut seen_ids: HashSet<&str> = HashSet::new();
    for (index, step) in steps.iter().enumerate() {
        let Some(id) = step.id.as_deref() else {
            debug!("Step {} has no id", index);
            continue;
        };

        if !is_valid_step_id(id) {
            return Err(ValidationError::InvalidId {
                index,
                id: id.to_string(),
            });
        }

        if !seen_ids.insert(id) {
            return Err(ValidationError::DuplicateId(id.to_string()));
        }
    }

    Ok(StepBatch::from_steps(steps))
}
