//! Observer-facing side of the interception layer.
//!
//! Interceptors never call observers directly. They hold an opaque
//! [`ObserverHandle`] and emit notifications through a [`NotificationSink`],
//! the contract any transport (in-process registry, foreign call, RPC) has to
//! satisfy. [`ObserverRegistry`] is the in-process implementation: it maps
//! handles to retained [`EnvObserver`] / [`WritableFileObserver`] objects.
//!
//! ```text
//! HookedEnv ──┐                     ┌──► EnvObserver
//!             ├─► NotificationSink ─┤
//! HookedFile ─┘   (ObserverRegistry)└──► WritableFileObserver
//! ```

/// Non-blocking forwarding of events onto a bounded channel.
pub mod channel;
/// Ordered in-memory event log.
pub mod recording;
/// Handle → observer slot table.
pub mod registry;

pub use channel::{ChannelObserver, ChannelObserverConfig};
pub use recording::{EnvEvent, RecordedEvent, RecordingObserver};
pub use registry::ObserverRegistry;

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Opaque token correlating an interceptor with its observer-side counterpart.
///
/// Handles are created by the observer side and released through the
/// matching `*_released` notification exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObserverHandle(usize);

impl ObserverHandle {
    /// Wraps a raw token received from a transport.
    #[must_use]
    pub const fn from_raw(raw: usize) -> Self {
        Self(raw)
    }

    /// The raw token, for handing across a transport.
    #[must_use]
    pub const fn as_raw(self) -> usize {
        self.0
    }
}

impl fmt::Display for ObserverHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "observer#{}", self.0)
    }
}

/// Notification surface exposed to the external observer.
///
/// One entry point per intercepted operation plus the lifecycle calls. All
/// calls are fire-and-forget: nothing an implementation does can change the
/// outcome of the intercepted operation. Implementations must be callable
/// from any thread; serializing delivery, if needed, is their business.
pub trait NotificationSink: Send + Sync {
    /// A writable file is being (or has been) created under `env`.
    /// Returns the handle the new file interceptor will use.
    fn env_new_writable_file(&self, env: ObserverHandle, path: &Path) -> ObserverHandle;

    /// `path` is being (or has been) deleted.
    fn env_delete_file(&self, env: ObserverHandle, path: &Path);

    /// Directory `path` is being (or has been) deleted.
    fn env_delete_dir(&self, env: ObserverHandle, path: &Path);

    /// `src` is being (or has been) renamed to `target`.
    fn env_rename_file(&self, env: ObserverHandle, src: &Path, target: &Path);

    /// `src` is being (or has been) hard-linked to `target`.
    fn env_link_file(&self, env: ObserverHandle, src: &Path, target: &Path);

    /// The environment interceptor owning `env` was dropped. `env` is dead afterwards.
    fn env_released(&self, env: ObserverHandle);

    /// `data` was appended. The slice is only valid for the duration of the call.
    fn file_append(&self, file: ObserverHandle, data: &[u8]);

    /// The file is being (or has been) closed.
    fn file_close(&self, file: ObserverHandle);

    /// The file is being (or has been) synced.
    fn file_sync(&self, file: ObserverHandle);

    /// The file is being (or has been) fsync'd.
    fn file_fsync(&self, file: ObserverHandle);

    /// `[offset, offset + nbytes)` is being (or has been) synced.
    fn file_range_sync(&self, file: ObserverHandle, offset: u64, nbytes: u64);

    /// The file interceptor owning `file` was dropped. `file` is dead afterwards.
    fn file_released(&self, file: ObserverHandle);
}

/// Observes mutating environment operations.
///
/// Whether a call arrives before or after the real operation depends on the
/// hooked environment's [`NotifyPolicy`](crate::NotifyPolicy).
pub trait EnvObserver: Send + Sync {
    /// A new writable file at `path`. The returned observer receives that
    /// file's notifications.
    fn new_writable_file(&self, path: &Path) -> Arc<dyn WritableFileObserver>;

    /// `path` is deleted.
    fn delete_file(&self, path: &Path);

    /// Directory `path` is deleted.
    fn delete_dir(&self, path: &Path);

    /// `src` is renamed to `target`.
    fn rename_file(&self, src: &Path, target: &Path);

    /// `src` is linked to `target`.
    fn link_file(&self, src: &Path, target: &Path);

    /// The hooked environment was dropped.
    fn released(&self) {}
}

/// Observes mutating operations on one writable file.
pub trait WritableFileObserver: Send + Sync {
    /// `data` was appended. It is owned by the engine and must not be retained.
    fn append(&self, data: &[u8]);

    /// The file is closed.
    fn close(&self);

    /// The file is synced.
    fn sync(&self);

    /// The file is fsync'd.
    fn fsync(&self);

    /// A range of the file is synced.
    fn range_sync(&self, offset: u64, nbytes: u64);

    /// The file interceptor was dropped.
    fn released(&self) {}
}

/// File observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopFileObserver;

impl WritableFileObserver for NoopFileObserver {
    fn append(&self, _data: &[u8]) {}
    fn close(&self) {}
    fn sync(&self) {}
    fn fsync(&self) {}
    fn range_sync(&self, _offset: u64, _nbytes: u64) {}
}
