//! Steps Parser
//!
//! Handles loading and parsing the `steps` input. The input is a YAML
//! sequence of step definitions, given either inline (action input) or
//! as a file path (CLI).

use std::error::Error;
use std::fs;

use log::{debug, info};
use serde_yaml::Value;

use super::model::{Step, StepBatch};
use super::validator::{validate_steps, ValidationError};

/// Parses and validates a YAML step list.
///
/// # Arguments
///
/// * `yaml` - The raw `steps` input
/// * `max_steps` - Concurrency ceiling for the batch
///
/// # Example
///
/// ```
/// use parallel_steps::workflow::parse_steps;
///
/// let batch = parse_steps("- run: echo one\n- id: two\n  run: echo two\n", 16).unwrap();
/// assert_eq!(batch.len(), 2);
/// ```
pub fn parse_steps(yaml: &str, max_steps: usize) -> Result<StepBatch, ValidationError> {
    let value: Value =
        serde_yaml::from_str(yaml).map_err(|e| ValidationError::InvalidYaml(e.to_string()))?;

    let Value::Sequence(items) = value else {
        return Err(ValidationError::NotAnArray);
    };

    debug!("Parsed steps input with {} entries", items.len());

    let steps = items
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            if !item.is_mapping() {
                return Err(ValidationError::InvalidStep {
                    index,
                    reason: "expected a mapping".to_string(),
                });
            }
            serde_yaml::from_value::<Step>(item).map_err(|e| ValidationError::InvalidStep {
                index,
                reason: e.to_string(),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    validate_steps(steps, max_steps)
}

/// Loads steps from a YAML file.
pub fn load_steps(path: &str, max_steps: usize) -> Result<StepBatch, Box<dyn Error>> {
    info!("Loading steps from: {}", path);

    let yaml_content = fs::read_to_string(path).map_err(|e| {
        format!(
            "Failed to read steps file '{}': {}. Check that the file exists and is readable.",
            path, e
        )
    })?;

    Ok(parse_steps(&yaml_content, max_steps)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_parse_steps() {
        let yaml = r#"
- id: build
  run: make
- uses: actions/setup-node@v4
  with:
    node-version: 20
"#;
        let batch = parse_steps(yaml, 16).unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.get(0).unwrap().id.as_deref(), Some("build"));
        assert!(batch.get(1).unwrap().extra.contains_key("with"));
    }

    #[test]
    fn test_not_an_array() {
        assert_eq!(parse_steps("not-an-array", 16), Err(ValidationError::NotAnArray));
        assert_eq!(parse_steps("run: echo", 16), Err(ValidationError::NotAnArray));
    }

    #[test]
    fn test_invalid_yaml() {
        let result = parse_steps("- run: [unclosed", 16);
        assert!(matches!(result, Err(ValidationError::InvalidYaml(_))));
    }

    #[test]
    fn test_scalar_entry_is_rejected() {
        let result = parse_steps("- echo hello\n", 16);
        assert!(matches!(result, Err(ValidationError::InvalidStep { index: 0, .. })));
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let yaml = "- id: same\n  run: a\n- id: same\n  run: b\n";
        assert_eq!(
            parse_steps(yaml, 16),
            Err(ValidationError::DuplicateId("same".to_string()))
        );
    }

    #[test]
    fn test_load_steps_from_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("steps.yaml");
        fs::write(&path, "- run: echo hi\n").unwrap();

        let batch = load_steps(path.to_str().unwrap(), 16).unwrap();
        assert_eq!(batch.len(), 1);
    }

    #[test]
    fn test_load_steps_missing_file() {
        let result = load_steps("/nonexistent/steps.yaml", 16);
        assert!(result.is_err());
    }
}
