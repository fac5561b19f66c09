//! Stage Barrier
//!
//! One-shot, presence-based signals used for the rendezvous between the
//! runner process and the interceptor hooks running inside engine jobs.
//! A signal is a named marker; once raised it stays raised.
//!
//! Two implementations:
//! - [`FsBarrier`]: marker files in a shared directory, observed with a
//!   directory watch plus a presence re-check
//! - [`MemoryBarrier`]: an in-process fake for deterministic tests
//!
//! # Example
//!
//! ```rust,no_run
//! use parallel_steps::execution::{sentinel_name, Barrier, FsBarrier, Stage};
//!
//! # async fn demo() -> Result<(), parallel_steps::execution::BarrierError> {
//! let barrier = FsBarrier::new("/tmp/run");
//! barrier.signal(&sentinel_name(Stage::Setup)).await?;
//! barrier.wait(&sentinel_name(Stage::Setup)).await?;
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeSet;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use notify::event::ModifyKind;
use notify::{EventKind, RecursiveMode, Watcher};
use thiserror::Error;
use tokio::sync::{mpsc, watch};

use super::stage::Stage;

/// Prefix shared by every sentinel file.
const SENTINEL_PREFIX: &str = ".Interceptor";

/// Default interval of the presence re-check while watching.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Name of the sentinel that opens `stage`.
pub fn sentinel_name(stage: Stage) -> String {
    format!("{}-{}-Stage", SENTINEL_PREFIX, stage.engine_name())
}

/// Name of the per-stage console transcript written next to the sentinel.
pub fn output_sink_name(stage: Stage) -> String {
    format!("{}-Output", sentinel_name(stage))
}

/// Barrier errors.
#[derive(Debug, Error)]
pub enum BarrierError {
    #[error("Failed to write sentinel '{path}': {source}")]
    Signal {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to watch sentinel directory '{path}': {source}")]
    Watch {
        path: PathBuf,
        source: notify::Error,
    },

    #[error("Invalid sentinel name: '{0}'")]
    InvalidName(String),

    #[error("Barrier closed while waiting for '{0}'")]
    Closed(String),
}

/// A named one-shot signal shared between cooperating parties.
///
/// `signal` is idempotent. `wait` returns immediately when the signal was
/// raised before the call. Neither carries a timeout; callers needing a
/// deadline wrap `wait` in `tokio::time::timeout`.
#[allow(async_fn_in_trait)]
pub trait Barrier {
    /// Raises the signal `name`.
    async fn signal(&self, name: &str) -> Result<(), BarrierError>;

    /// Suspends until the signal `name` is raised.
    async fn wait(&self, name: &str) -> Result<(), BarrierError>;
}

fn check_name(name: &str) -> Result<(), BarrierError> {
    let is_plain = !name.is_empty()
        && Path::new(name).file_name() == Some(OsStr::new(name))
        && name != "."
        && name != "..";
    if is_plain {
        Ok(())
    } else {
        Err(BarrierError::InvalidName(name.to_string()))
    }
}

/// Filesystem barrier: a signal is the existence of `<dir>/<name>`.
#[derive(Debug, Clone)]
pub struct FsBarrier {
    dir: PathBuf,
    poll_interval: Duration,
}

impl FsBarrier {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Sets the interval of the presence re-check that backs up the watch.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_of(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }
}

impl Barrier for FsBarrier {
    async fn signal(&self, name: &str) -> Result<(), BarrierError> {
        check_name(name)?;
        let path = self.path_of(name);

        tokio::fs::write(&path, b"")
            .await
            .map_err(|source| BarrierError::Signal {
                path: path.clone(),
                source,
            })?;

        debug!("Signaled {}", path.display());
        Ok(())
    }

    async fn wait(&self, name: &str) -> Result<(), BarrierError> {
        check_name(name)?;
        let path = self.path_of(name);

        if path.exists() {
            debug!("Sentinel {} already present", path.display());
            return Ok(());
        }

        // Ok wakes the re-check; Err ends the wait.
        let (tx, mut rx) = mpsc::unbounded_channel::<notify::Result<()>>();
        let target = name.to_string();
        let watched = self.dir.clone();
        let mut watcher =
            notify::recommended_watcher(move |res: notify::Result<notify::Event>| match res {
                Ok(event) => {
                    let created = matches!(
                        event.kind,
                        EventKind::Create(_) | EventKind::Modify(ModifyKind::Name(_))
                    ) && event
                        .paths
                        .iter()
                        .any(|p| p.file_name() == Some(OsStr::new(&target)));
                    let dir_removed = matches!(event.kind, EventKind::Remove(_))
                        && event.paths.iter().any(|p| p == &watched);
                    if created || dir_removed {
                        let _ = tx.send(Ok(()));
                    }
                }
                Err(e) => {
                    let _ = tx.send(Err(e));
                }
            })
            .map_err(|source| BarrierError::Watch {
                path: self.dir.clone(),
                source,
            })?;

        watcher
            .watch(&self.dir, RecursiveMode::NonRecursive)
            .map_err(|source| BarrierError::Watch {
                path: self.dir.clone(),
                source,
            })?;

        // the signal may have landed between the first check and the watch
        if path.exists() {
            return Ok(());
        }

        debug!("Waiting for sentinel {}", path.display());

        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                Some(res) = rx.recv() => {
                    res.map_err(|source| {
                        warn!("Sentinel watch on {} failed: {}", self.dir.display(), source);
                        BarrierError::Watch {
                            path: self.dir.clone(),
                            source,
                        }
                    })?;
                }
                _ = ticker.tick() => {}
            }

            if path.exists() {
                debug!("Sentinel {} present", path.display());
                return Ok(());
            }

            // a removed directory can never be signaled again
            if !self.dir.is_dir() {
                return Err(BarrierError::Watch {
                    path: self.dir.clone(),
                    source: notify::Error::path_not_found(),
                });
            }
        }
    }
}

/// In-memory barrier for tests. Clones share the same signals.
#[derive(Debug, Clone)]
pub struct MemoryBarrier {
    signals: Arc<watch::Sender<BTreeSet<String>>>,
}

impl Default for MemoryBarrier {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBarrier {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(BTreeSet::new());
        Self {
            signals: Arc::new(tx),
        }
    }

    /// Returns true when `name` has been signaled.
    pub fn is_signaled(&self, name: &str) -> bool {
        self.signals.borrow().contains(name)
    }

    /// All raised signals, sorted.
    pub fn signaled(&self) -> Vec<String> {
        self.signals.borrow().iter().cloned().collect()
    }
}

impl Barrier for MemoryBarrier {
    async fn signal(&self, name: &str) -> Result<(), BarrierError> {
        check_name(name)?;
        self.signals.send_modify(|signals| {
            signals.insert(name.to_string());
        });
        Ok(())
    }

    async fn wait(&self, name: &str) -> Result<(), BarrierError> {
        check_name(name)?;
        let mut rx = self.signals.subscribe();
        rx.wait_for(|signals| signals.contains(name))
            .await
            .map_err(|_| BarrierError::Closed(name.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;
    use tokio::time::timeout;

    const WAIT_LIMIT: Duration = Duration::from_secs(5);

    #[test]
    fn test_sentinel_names() {
        assert_eq!(sentinel_name(Stage::Setup), ".Interceptor-Pre-Stage");
        assert_eq!(sentinel_name(Stage::Teardown), ".Interceptor-Post-Stage");
        assert_eq!(
            output_sink_name(Stage::Execution),
            ".Interceptor-Main-Stage-Output"
        );
    }

    #[test]
    fn test_invalid_names() {
        assert!(check_name("").is_err());
        assert!(check_name("a/b").is_err());
        assert!(check_name("..").is_err());
        assert!(check_name(".Interceptor-Pre-Stage").is_ok());
    }

    #[tokio::test]
    async fn test_fs_signal_is_idempotent() {
        let dir = tempdir().unwrap();
        let barrier = FsBarrier::new(dir.path());

        barrier.signal("go").await.unwrap();
        fs::write(dir.path().join("go"), "content").unwrap();
        barrier.signal("go").await.unwrap();

        assert!(dir.path().join("go").exists());
        assert_eq!(fs::read_to_string(dir.path().join("go")).unwrap(), "");
    }

    #[tokio::test]
    async fn test_fs_wait_returns_when_already_signaled() {
        let dir = tempdir().unwrap();
        let barrier = FsBarrier::new(dir.path());
        barrier.signal("go").await.unwrap();

        timeout(WAIT_LIMIT, barrier.wait("go"))
            .await
            .expect("wait should return immediately")
            .unwrap();
    }

    #[tokio::test]
    async fn test_fs_wait_fails_when_directory_is_removed() {
        let dir = tempdir().unwrap();
        let run_dir = dir.path().join("run");
        fs::create_dir(&run_dir).unwrap();
        let barrier = FsBarrier::new(&run_dir).with_poll_interval(Duration::from_millis(20));

        let remove = async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            fs::remove_dir_all(&run_dir).unwrap();
        };

        let (waited, ()) = tokio::join!(timeout(WAIT_LIMIT, barrier.wait("never")), remove);
        let err = waited.expect("wait should not hang").unwrap_err();
        assert!(matches!(err, BarrierError::Watch { ref path, .. } if path == &run_dir));
    }

    #[tokio::test]
    async fn test_fs_wait_observes_later_signal() {
        let dir = tempdir().unwrap();
        let waiter = FsBarrier::new(dir.path()).with_poll_interval(Duration::from_millis(50));
        let signaler = waiter.clone();

        let signal = async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            signaler.signal("later").await
        };

        let (waited, signaled) = tokio::join!(timeout(WAIT_LIMIT, waiter.wait("later")), signal);
        signaled.unwrap();
        waited.expect("wait should observe the signal").unwrap();
    }

    #[tokio::test]
    async fn test_fs_wait_on_missing_directory_fails() {
        let dir = tempdir().unwrap();
        let barrier = FsBarrier::new(dir.path().join("missing"));

        let result = barrier.wait("never").await;
        assert!(matches!(result, Err(BarrierError::Watch { .. })));
    }

    #[tokio::test]
    async fn test_memory_barrier() {
        let barrier = MemoryBarrier::new();
        let other = barrier.clone();

        assert!(!barrier.is_signaled("a"));

        let signal = async {
            tokio::task::yield_now().await;
            other.signal("a").await
        };
        let (waited, signaled) = tokio::join!(timeout(WAIT_LIMIT, barrier.wait("a")), signal);
        signaled.unwrap();
        waited.unwrap().unwrap();

        barrier.signal("a").await.unwrap();
        assert_eq!(barrier.signaled(), vec!["a".to_string()]);

        // already raised: returns at once
        timeout(WAIT_LIMIT, barrier.wait("a")).await.unwrap().unwrap();
    }
}
