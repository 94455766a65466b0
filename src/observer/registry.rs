//! Live-observer registry.
//!
//! Handles handed to interceptors are slot indexes into a table of retained
//! observers. The table keeps every observer alive until the matching
//! `*_released` notification arrives, reuses the lowest free slot, and doubles
//! in size when full.

use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::warn;

use super::{EnvObserver, NoopFileObserver, NotificationSink, ObserverHandle, WritableFileObserver};

enum Slot {
    Env(Arc<dyn EnvObserver>),
    File(Arc<dyn WritableFileObserver>),
}

/// In-process [`NotificationSink`] dispatching to retained observers.
///
/// The table lock is held only while a slot is looked up; observer callbacks
/// run without it, so an observer may call back into the registry.
pub struct ObserverRegistry {
    slots: Mutex<Vec<Option<Slot>>>,
}

impl ObserverRegistry {
    /// Default number of slots allocated up front.
    pub const DEFAULT_CAPACITY: usize = 16;

    /// Creates a registry with [`Self::DEFAULT_CAPACITY`] slots.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }

    /// Creates a registry with `capacity` slots (at least one).
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let mut slots = Vec::new();
        slots.resize_with(capacity.max(1), || None);
        Self {
            slots: Mutex::new(slots),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Option<Slot>>> {
        // Slots are replaced whole, so a poisoned table is still consistent.
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn retain(&self, slot: Slot) -> ObserverHandle {
        let mut slots = self.lock();
        let idx = match slots.iter().position(Option::is_none) {
            Some(idx) => idx,
            None => {
                let idx = slots.len();
                slots.resize_with(idx * 2, || None);
                idx
            }
        };
        slots[idx] = Some(slot);
        ObserverHandle::from_raw(idx)
    }

    /// Retains an environment observer and returns its handle.
    pub fn retain_env(&self, observer: Arc<dyn EnvObserver>) -> ObserverHandle {
        self.retain(Slot::Env(observer))
    }

    /// Retains a file observer and returns its handle.
    pub fn retain_file(&self, observer: Arc<dyn WritableFileObserver>) -> ObserverHandle {
        self.retain(Slot::File(observer))
    }

    /// Current number of slots, live or free.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.lock().len()
    }

    /// Number of retained observers.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.lock().iter().filter(|s| s.is_some()).count()
    }

    /// Returns true if `handle` refers to a retained observer.
    #[must_use]
    pub fn is_live(&self, handle: ObserverHandle) -> bool {
        matches!(self.lock().get(handle.as_raw()), Some(Some(_)))
    }

    fn env(&self, handle: ObserverHandle) -> Option<Arc<dyn EnvObserver>> {
        match self.lock().get(handle.as_raw()) {
            Some(Some(Slot::Env(observer))) => Some(Arc::clone(observer)),
            _ => {
                warn!("Dropping notification for unknown environment {}", handle);
                None
            }
        }
    }

    fn file(&self, handle: ObserverHandle) -> Option<Arc<dyn WritableFileObserver>> {
        match self.lock().get(handle.as_raw()) {
            Some(Some(Slot::File(observer))) => Some(Arc::clone(observer)),
            _ => {
                warn!("Dropping notification for unknown file {}", handle);
                None
            }
        }
    }

    fn take_env(&self, handle: ObserverHandle) -> Option<Arc<dyn EnvObserver>> {
        let mut slots = self.lock();
        let slot = slots.get_mut(handle.as_raw())?;
        match slot.take() {
            Some(Slot::Env(observer)) => Some(observer),
            other => {
                *slot = other;
                None
            }
        }
    }

    fn take_file(&self, handle: ObserverHandle) -> Option<Arc<dyn WritableFileObserver>> {
        let mut slots = self.lock();
        let slot = slots.get_mut(handle.as_raw())?;
        match slot.take() {
            Some(Slot::File(observer)) => Some(observer),
            other => {
                *slot = other;
                None
            }
        }
    }
}

impl Default for ObserverRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ObserverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverRegistry")
            .field("capacity", &self.capacity())
            .field("live", &self.live_count())
            .finish()
    }
}

impl NotificationSink for ObserverRegistry {
    fn env_new_writable_file(&self, env: ObserverHandle, path: &Path) -> ObserverHandle {
        // A handle is always minted so the file interceptor's release stays paired.
        let observer = match self.env(env) {
            Some(env_observer) => env_observer.new_writable_file(path),
            None => Arc::new(NoopFileObserver),
        };
        self.retain_file(observer)
    }

    fn env_delete_file(&self, env: ObserverHandle, path: &Path) {
        if let Some(observer) = self.env(env) {
            observer.delete_file(path);
        }
    }

    fn env_delete_dir(&self, env: ObserverHandle, path: &Path) {
        if let Some(observer) = self.env(env) {
            observer.delete_dir(path);
        }
    }

    fn env_rename_file(&self, env: ObserverHandle, src: &Path, target: &Path) {
        if let Some(observer) = self.env(env) {
            observer.rename_file(src, target);
        }
    }

    fn env_link_file(&self, env: ObserverHandle, src: &Path, target: &Path) {
        if let Some(observer) = self.env(env) {
            observer.link_file(src, target);
        }
    }

    fn env_released(&self, env: ObserverHandle) {
        match self.take_env(env) {
            Some(observer) => observer.released(),
            None => warn!("Release of unknown environment {}", env),
        }
    }

    fn file_append(&self, file: ObserverHandle, data: &[u8]) {
        if let Some(observer) = self.file(file) {
            observer.append(data);
        }
    }

    fn file_close(&self, file: ObserverHandle) {
        if let Some(observer) = self.file(file) {
            observer.close();
        }
    }

    fn file_sync(&self, file: ObserverHandle) {
        if let Some(observer) = self.file(file) {
            observer.sync();
        }
    }

    fn file_fsync(&self, file: ObserverHandle) {
        if let Some(observer) = self.file(file) {
            observer.fsync();
        }
    }

    fn file_range_sync(&self, file: ObserverHandle, offset: u64, nbytes: u64) {
        if let Some(observer) = self.file(file) {
            observer.range_sync(offset, nbytes);
        }
    }

    fn file_released(&self, file: ObserverHandle) {
        match self.take_file(file) {
            Some(observer) => observer.released(),
            None => warn!("Release of unknown file {}", file),
        }
    }
}
