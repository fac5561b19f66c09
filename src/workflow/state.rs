//! Run State Persistence
//!
//! Stages may run in separate processes, so everything a later stage
//! needs to know about earlier ones lives in the run temp directory:
//!
//! - `.steps-error`: indices of steps that failed, one per line, append-only
//! - `engine.json`: the running engine process, for re-attaching

use std::collections::BTreeSet;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

/// File name of the failed step index list.
pub const FAILED_STEPS_FILE: &str = ".steps-error";

/// File name of the persisted engine record.
pub const ENGINE_RECORD_FILE: &str = "engine.json";

/// Append-only list of steps that failed in an earlier stage.
#[derive(Debug, Clone)]
pub struct FailedSteps {
    path: PathBuf,
}

impl FailedSteps {
    /// Creates the handle for `<temp_dir>/.steps-error`.
    pub fn new(temp_dir: &Path) -> Self {
        Self {
            path: temp_dir.join(FAILED_STEPS_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Creates the file if it does not exist yet.
    pub fn ensure_exists(&self) -> io::Result<()> {
        OpenOptions::new().create(true).append(true).open(&self.path)?;
        Ok(())
    }

    /// Appends a failed step index.
    pub fn record(&self, index: usize) -> io::Result<()> {
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        writeln!(file, "{}", index)?;
        debug!("Recorded failed step {} in {}", index, self.path.display());
        Ok(())
    }

    /// Loads the recorded indices, deduplicated and sorted.
    ///
    /// A missing file means no step has failed yet.
    pub fn load(&self) -> io::Result<BTreeSet<usize>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(BTreeSet::new()),
            Err(e) => return Err(e),
        };

        let mut indices = BTreeSet::new();
        for line in content.lines().map(str::trim).filter(|l| !l.is_empty()) {
            match line.parse::<usize>() {
                Ok(index) => {
                    indices.insert(index);
                }
                Err(_) => warn!("Ignoring malformed failed step entry: '{}'", line),
            }
        }
        Ok(indices)
    }
}

/// Persisted description of a launched engine process.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct EngineRecord {
    /// Process id of the engine
    pub pid: u32,

    /// Log file the engine writes to
    pub log_file: PathBuf,

    /// When the engine was launched
    pub started_at: DateTime<Utc>,
}

impl EngineRecord {
    pub fn new(pid: u32, log_file: impl Into<PathBuf>) -> Self {
        Self {
            pid,
            log_file: log_file.into(),
            started_at: Utc::now(),
        }
    }

    /// Saves the record to `<temp_dir>/engine.json`.
    pub fn save(&self, temp_dir: &Path) -> io::Result<()> {
        let path = temp_dir.join(ENGINE_RECORD_FILE);
        let json = serde_json::to_string_pretty(self)?;
        fs::write(&path, json)?;

        info!("Saved engine record to {}", path.display());
        Ok(())
    }

    /// Loads the record from `<temp_dir>/engine.json`.
    ///
    /// Returns `Ok(None)` when no engine was recorded.
    pub fn load(temp_dir: &Path) -> io::Result<Option<Self>> {
        let path = temp_dir.join(ENGINE_RECORD_FILE);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };

        let record: EngineRecord = serde_json::from_str(&content)?;
        debug!("Loaded engine record (pid {}) from {}", record.pid, path.display());
        Ok(Some(record))
    }

    /// Deletes the record file, if present.
    pub fn delete(temp_dir: &Path) -> io::Result<()> {
        let path = temp_dir.join(ENGINE_RECORD_FILE);
        if path.exists() {
            fs::remove_file(&path)?;
            debug!("Deleted engine record: {}", path.display());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_failed_steps_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let failed = FailedSteps::new(dir.path());
        assert!(failed.load().unwrap().is_empty());
    }

    #[test]
    fn test_failed_steps_record_and_load() {
        let dir = tempdir().unwrap();
        let failed = FailedSteps::new(dir.path());
        failed.ensure_exists().unwrap();

        failed.record(2).unwrap();
        failed.record(0).unwrap();
        failed.record(2).unwrap();

        let loaded: Vec<usize> = failed.load().unwrap().into_iter().collect();
        assert_eq!(loaded, vec![0, 2]);
    }

    #[test]
    fn test_failed_steps_ignores_malformed_lines() {
        let dir = tempdir().unwrap();
        let failed = FailedSteps::new(dir.path());
        fs::write(failed.path(), "1\n\nabc\n3\n").unwrap();

        let loaded: Vec<usize> = failed.load().unwrap().into_iter().collect();
        assert_eq!(loaded, vec![1, 3]);
    }

    #[test]
    fn test_engine_record_roundtrip() {
        let dir = tempdir().unwrap();
        let record = EngineRecord::new(4242, dir.path().join("act.log"));
        record.save(dir.path()).unwrap();

        let loaded = EngineRecord::load(dir.path()).unwrap();
        assert_eq!(loaded, Some(record));

        EngineRecord::delete(dir.path()).unwrap();
        assert_eq!(EngineRecord::load(dir.path()).unwrap(), None);
    }

    #[test]
    fn test_engine_record_delete_nonexistent() {
        let dir = tempdir().unwrap();
        assert!(EngineRecord::delete(dir.path()).is_ok());
    }
}
