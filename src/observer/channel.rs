//! Channel observer.
//!
//! Forwards notifications as [`EnvEvent`]s onto a bounded crossbeam channel
//! so a consumer thread can process them off the engine's I/O path. Sending
//! uses `try_send` and never blocks the engine: when the queue is full (or
//! the receiver is gone) the event is dropped and counted.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

use super::recording::EnvEvent;
use super::{EnvObserver, WritableFileObserver};

/// Configuration for a [`ChannelObserver`].
#[derive(Debug, Clone)]
pub struct ChannelObserverConfig {
    /// Max queued events before new ones are dropped.
    pub capacity: usize,
    /// Forward appended bytes, not just their length.
    pub capture_payloads: bool,
}

impl Default for ChannelObserverConfig {
    fn default() -> Self {
        Self {
            capacity: 4096,
            capture_payloads: false,
        }
    }
}

#[derive(Debug)]
struct Outlet {
    tx: Sender<EnvEvent>,
    dropped: AtomicU64,
    capture_payloads: bool,
}

impl Outlet {
    fn send(&self, event: EnvEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

/// [`EnvObserver`] that forwards events to a bounded channel.
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    outlet: Arc<Outlet>,
}

impl ChannelObserver {
    /// Creates the observer and the receiving end of its queue.
    #[must_use]
    pub fn new(cfg: ChannelObserverConfig) -> (Self, Receiver<EnvEvent>) {
        let (tx, rx) = bounded(cfg.capacity.max(1));
        let observer = Self {
            outlet: Arc::new(Outlet {
                tx,
                dropped: AtomicU64::new(0),
                capture_payloads: cfg.capture_payloads,
            }),
        };
        (observer, rx)
    }

    /// Events discarded because the queue was full or disconnected.
    #[must_use]
    pub fn dropped_events(&self) -> u64 {
        self.outlet.dropped.load(Ordering::Relaxed)
    }
}

impl EnvObserver for ChannelObserver {
    fn new_writable_file(&self, path: &Path) -> Arc<dyn WritableFileObserver> {
        self.outlet.send(EnvEvent::NewWritableFile {
            path: path.to_path_buf(),
        });
        Arc::new(ChannelFileObserver {
            path: path.to_path_buf(),
            outlet: Arc::clone(&self.outlet),
        })
    }

    fn delete_file(&self, path: &Path) {
        self.outlet.send(EnvEvent::DeleteFile {
            path: path.to_path_buf(),
        });
    }

    fn delete_dir(&self, path: &Path) {
        self.outlet.send(EnvEvent::DeleteDir {
            path: path.to_path_buf(),
        });
    }

    fn rename_file(&self, src: &Path, target: &Path) {
        self.outlet.send(EnvEvent::RenameFile {
            src: src.to_path_buf(),
            target: target.to_path_buf(),
        });
    }

    fn link_file(&self, src: &Path, target: &Path) {
        self.outlet.send(EnvEvent::LinkFile {
            src: src.to_path_buf(),
            target: target.to_path_buf(),
        });
    }

    fn released(&self) {
        self.outlet.send(EnvEvent::EnvReleased);
    }
}

struct ChannelFileObserver {
    path: PathBuf,
    outlet: Arc<Outlet>,
}

impl WritableFileObserver for ChannelFileObserver {
    fn append(&self, data: &[u8]) {
        self.outlet.send(EnvEvent::Append {
            path: self.path.clone(),
            len: data.len(),
            data: self.outlet.capture_payloads.then(|| data.to_vec()),
        });
    }

    fn close(&self) {
        self.outlet.send(EnvEvent::Close {
            path: self.path.clone(),
        });
    }

    fn sync(&self) {
        self.outlet.send(EnvEvent::Sync {
            path: self.path.clone(),
        });
    }

    fn fsync(&self) {
        self.outlet.send(EnvEvent::Fsync {
            path: self.path.clone(),
        });
    }

    fn range_sync(&self, offset: u64, nbytes: u64) {
        self.outlet.send(EnvEvent::RangeSync {
            path: self.path.clone(),
            offset,
            nbytes,
        });
    }

    fn released(&self) {
        self.outlet.send(EnvEvent::FileReleased {
            path: self.path.clone(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_are_forwarded_in_order() {
        let (observer, rx) = ChannelObserver::new(ChannelObserverConfig::default());
        let file = observer.new_writable_file(Path::new("000010.log"));
        file.append(b"abcd");
        file.fsync();

        let events: Vec<EnvEvent> = rx.try_iter().collect();
        assert_eq!(
            events,
            vec![
                EnvEvent::NewWritableFile {
                    path: PathBuf::from("000010.log"),
                },
                EnvEvent::Append {
                    path: PathBuf::from("000010.log"),
                    len: 4,
                    data: None,
                },
                EnvEvent::Fsync {
                    path: PathBuf::from("000010.log"),
                },
            ]
        );
        assert_eq!(observer.dropped_events(), 0);
    }

    #[test]
    fn test_full_queue_drops_without_blocking() {
        let (observer, rx) = ChannelObserver::new(ChannelObserverConfig {
            capacity: 2,
            capture_payloads: false,
        });
        for i in 0..5 {
            observer.delete_file(Path::new(&format!("{i}.sst")));
        }
        assert_eq!(rx.len(), 2);
        assert_eq!(observer.dropped_events(), 3);
    }

    #[test]
    fn test_disconnected_receiver_counts_drops() {
        let (observer, rx) = ChannelObserver::new(ChannelObserverConfig::default());
        drop(rx);
        observer.delete_dir(Path::new("/db/archive"));
        assert_eq!(observer.dropped_events(), 1);
    }
}
