//! Recording observer.
//!
//! Keeps an ordered, timestamped log of every notification it receives,
//! across the environment and all files opened under it. The log can be
//! exported as JSON for offline inspection.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{EnvObserver, WritableFileObserver};

/// One observed operation.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EnvEvent {
    NewWritableFile { path: PathBuf },
    DeleteFile { path: PathBuf },
    DeleteDir { path: PathBuf },
    RenameFile { src: PathBuf, target: PathBuf },
    LinkFile { src: PathBuf, target: PathBuf },
    EnvReleased,
    Append {
        path: PathBuf,
        len: usize,
        /// Appended bytes, when payload capture is enabled.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<Vec<u8>>,
    },
    Close { path: PathBuf },
    Sync { path: PathBuf },
    Fsync { path: PathBuf },
    RangeSync {
        path: PathBuf,
        offset: u64,
        nbytes: u64,
    },
    FileReleased { path: PathBuf },
}

/// An event plus its position in the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedEvent {
    /// 1-based, monotonically increasing.
    pub sequence: u64,
    /// When the notification was received.
    pub timestamp: DateTime<Utc>,
    /// The operation.
    pub event: EnvEvent,
}

#[derive(Debug, Default)]
struct Log {
    records: Mutex<Vec<RecordedEvent>>,
}

impl Log {
    fn lock(&self) -> MutexGuard<'_, Vec<RecordedEvent>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push(&self, event: EnvEvent) {
        let mut records = self.lock();
        let sequence = records.len() as u64 + 1;
        records.push(RecordedEvent {
            sequence,
            timestamp: Utc::now(),
            event,
        });
    }
}

/// [`EnvObserver`] that appends every notification to a shared log.
///
/// Clones share the same log, so keep one clone to inspect what the
/// registered copy saw.
#[derive(Debug, Clone, Default)]
pub struct RecordingObserver {
    log: Arc<Log>,
    capture_payloads: bool,
}

impl RecordingObserver {
    /// Records append lengths only.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records appended bytes as well as their length.
    #[must_use]
    pub fn with_payloads() -> Self {
        Self {
            log: Arc::default(),
            capture_payloads: true,
        }
    }

    /// Events in the order they were received.
    #[must_use]
    pub fn events(&self) -> Vec<EnvEvent> {
        self.log.lock().iter().map(|r| r.event.clone()).collect()
    }

    /// Events with sequence numbers and timestamps.
    #[must_use]
    pub fn records(&self) -> Vec<RecordedEvent> {
        self.log.lock().clone()
    }

    /// Number of events recorded so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.log.lock().len()
    }

    /// Returns true if nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Serializes the log as pretty-printed JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&*self.log.lock())
    }
}

impl EnvObserver for RecordingObserver {
    fn new_writable_file(&self, path: &Path) -> Arc<dyn WritableFileObserver> {
        self.log.push(EnvEvent::NewWritableFile {
            path: path.to_path_buf(),
        });
        Arc::new(RecordingFileObserver {
            path: path.to_path_buf(),
            log: Arc::clone(&self.log),
            capture_payloads: self.capture_payloads,
        })
    }

    fn delete_file(&self, path: &Path) {
        self.log.push(EnvEvent::DeleteFile {
            path: path.to_path_buf(),
        });
    }

    fn delete_dir(&self, path: &Path) {
        self.log.push(EnvEvent::DeleteDir {
            path: path.to_path_buf(),
        });
    }

    fn rename_file(&self, src: &Path, target: &Path) {
        self.log.push(EnvEvent::RenameFile {
            src: src.to_path_buf(),
            target: target.to_path_buf(),
        });
    }

    fn link_file(&self, src: &Path, target: &Path) {
        self.log.push(EnvEvent::LinkFile {
            src: src.to_path_buf(),
            target: target.to_path_buf(),
        });
    }

    fn released(&self) {
        self.log.push(EnvEvent::EnvReleased);
    }
}

struct RecordingFileObserver {
    path: PathBuf,
    log: Arc<Log>,
    capture_payloads: bool,
}

impl WritableFileObserver for RecordingFileObserver {
    fn append(&self, data: &[u8]) {
        self.log.push(EnvEvent::Append {
            path: self.path.clone(),
            len: data.len(),
            data: self.capture_payloads.then(|| data.to_vec()),
        });
    }

    fn close(&self) {
        self.log.push(EnvEvent::Close {
            path: self.path.clone(),
        });
    }

    fn sync(&self) {
        self.log.push(EnvEvent::Sync {
            path: self.path.clone(),
        });
    }

    fn fsync(&self) {
        self.log.push(EnvEvent::Fsync {
            path: self.path.clone(),
        });
    }

    fn range_sync(&self, offset: u64, nbytes: u64) {
        self.log.push(EnvEvent::RangeSync {
            path: self.path.clone(),
            offset,
            nbytes,
        });
    }

    fn released(&self) {
        self.log.push(EnvEvent::FileReleased {
            path: self.path.clone(),
        });
    }
}
