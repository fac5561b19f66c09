//! Engine Log Tail
//!
//! Follows an append-only log file and yields complete lines in file
//! order. A trailing partial line is held back until its newline arrives.
//! At the end of the file the tail sleeps until the file changes, with the
//! poll interval as a fallback for missed or unavailable notifications.

use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{debug, warn};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use thiserror::Error;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, SeekFrom};
use tokio::sync::mpsc;

/// Size of a single read from the log file.
const READ_CHUNK_SIZE: usize = 64 * 1024;

/// Tail errors.
#[derive(Debug, Error)]
pub enum TailError {
    #[error("Failed to open log '{path}': {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to read log '{path}': {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Where a new tail starts reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartPosition {
    /// From the first byte
    Beginning,
    /// From the current end of the file
    End,
    /// From a byte offset
    Offset(u64),
}

/// Change notifications for the tailed file.
struct FileWatch {
    _watcher: RecommendedWatcher,
    changes: mpsc::UnboundedReceiver<()>,
}

impl FileWatch {
    fn new(path: &Path) -> notify::Result<Self> {
        let (tx, changes) = mpsc::unbounded_channel();
        let mut watcher =
            notify::recommended_watcher(move |res: notify::Result<notify::Event>| match res {
                Ok(event) if matches!(event.kind, EventKind::Access(_)) => {}
                // errors wake the reader too; the next read reports real failures
                _ => {
                    let _ = tx.send(());
                }
            })?;
        watcher.watch(path, RecursiveMode::NonRecursive)?;
        Ok(Self {
            _watcher: watcher,
            changes,
        })
    }
}

/// Line reader over a growing file.
pub struct LogTail {
    path: PathBuf,
    file: File,
    offset: u64,
    pending: Vec<u8>,
    poll_interval: Duration,
    watch: Option<FileWatch>,
}

impl LogTail {
    /// Opens `path` and positions the tail.
    ///
    /// # Arguments
    ///
    /// * `path` - Log file, which must exist
    /// * `start` - Initial read position
    /// * `poll_interval` - Longest pause at the end of the file
    pub async fn open(
        path: impl AsRef<Path>,
        start: StartPosition,
        poll_interval: Duration,
    ) -> Result<Self, TailError> {
        let path = path.as_ref().to_path_buf();
        let mut file = File::open(&path).await.map_err(|source| TailError::Open {
            path: path.clone(),
            source,
        })?;

        let seek_to = match start {
            StartPosition::Beginning => SeekFrom::Start(0),
            StartPosition::End => SeekFrom::End(0),
            StartPosition::Offset(offset) => SeekFrom::Start(offset),
        };
        let offset = file.seek(seek_to).await.map_err(|source| TailError::Read {
            path: path.clone(),
            source,
        })?;

        let watch = match FileWatch::new(&path) {
            Ok(watch) => Some(watch),
            Err(e) => {
                warn!("Cannot watch {} ({}), polling instead", path.display(), e);
                None
            }
        };

        debug!("Tailing {} from offset {}", path.display(), offset);

        Ok(Self {
            path,
            file,
            offset,
            pending: Vec::new(),
            poll_interval,
            watch,
        })
    }

    /// True when the tail wakes on file change notifications.
    pub fn is_watching(&self) -> bool {
        self.watch.is_some()
    }

    /// Byte offset of the first byte not yet returned as part of a line.
    pub fn offset(&self) -> u64 {
        self.offset - self.pending.len() as u64
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the next complete line without its line terminator.
    ///
    /// Suspends while the file has no complete line available.
    pub async fn next_line(&mut self) -> Result<String, TailError> {
        loop {
            if let Some(line) = self.take_line() {
                return Ok(line);
            }

            let read = self.fill().await?;
            if read == 0 {
                self.wait_for_change().await;
            }
        }
    }

    async fn wait_for_change(&mut self) {
        let Some(watch) = self.watch.as_mut() else {
            tokio::time::sleep(self.poll_interval).await;
            return;
        };

        let _ = tokio::time::timeout(self.poll_interval, watch.changes.recv()).await;
        // notifications for data this read will already cover
        while watch.changes.try_recv().is_ok() {}
    }

    /// Returns the next complete line if one is available right now.
    pub async fn try_next_line(&mut self) -> Result<Option<String>, TailError> {
        if let Some(line) = self.take_line() {
            return Ok(Some(line));
        }
        self.fill().await?;
        Ok(self.take_line())
    }

    fn take_line(&mut self) -> Option<String> {
        let newline = self.pending.iter().position(|b| *b == b'\n')?;
        let mut line: Vec<u8> = self.pending.drain(..=newline).collect();
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        Some(String::from_utf8_lossy(&line).into_owned())
    }

    async fn fill(&mut self) -> Result<usize, TailError> {
        let len = self
            .file
            .metadata()
            .await
            .map_err(|source| self.read_error(source))?
            .len();

        if len < self.offset {
            warn!(
                "Log {} was truncated ({} < {}), restarting from the beginning",
                self.path.display(),
                len,
                self.offset
            );
            self.file
                .seek(SeekFrom::Start(0))
                .await
                .map_err(|source| self.read_error(source))?;
            self.offset = 0;
            self.pending.clear();
        }

        let mut chunk = vec![0u8; READ_CHUNK_SIZE];
        let read = self
            .file
            .read(&mut chunk)
            .await
            .map_err(|source| self.read_error(source))?;

        self.offset += read as u64;
        self.pending.extend_from_slice(&chunk[..read]);
        Ok(read)
    }

    fn read_error(&self, source: std::io::Error) -> TailError {
        TailError::Read {
            path: self.path.clone(),
            source,
        }
    }
}
