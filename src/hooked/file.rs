//! File interceptor.

use std::fmt;
use std::sync::Arc;

use tracing::trace;

use crate::config::NotifyPolicy;
use crate::env::WritableFile;
use crate::error::EnvResult;
use crate::observer::{NotificationSink, ObserverHandle};

/// [`WritableFile`] that forwards to an owned delegate and notifies a sink.
///
/// The delegate is exclusively owned: it is reachable only through this
/// wrapper and is dropped right after the wrapper's release notification.
pub struct HookedWritableFile {
    handle: ObserverHandle,
    sink: Arc<dyn NotificationSink>,
    policy: NotifyPolicy,
    delegate: Box<dyn WritableFile>,
}

impl HookedWritableFile {
    /// Wraps `delegate`. `handle` must be a fresh file handle minted by
    /// `sink`; this wrapper releases it when dropped.
    #[must_use]
    pub fn new(
        handle: ObserverHandle,
        sink: Arc<dyn NotificationSink>,
        policy: NotifyPolicy,
        delegate: Box<dyn WritableFile>,
    ) -> Self {
        Self {
            handle,
            sink,
            policy,
            delegate,
        }
    }

    /// Observer handle of this file.
    #[must_use]
    pub const fn handle(&self) -> ObserverHandle {
        self.handle
    }

    /// Notification ordering, inherited from the creating environment.
    #[must_use]
    pub const fn policy(&self) -> NotifyPolicy {
        self.policy
    }
}

impl WritableFile for HookedWritableFile {
    fn append(&mut self, data: &[u8]) -> EnvResult<()> {
        trace!(file = %self.handle, len = data.len(), "append");
        let (delegate, sink, handle) = (&mut self.delegate, &self.sink, self.handle);
        self.policy.apply(|| delegate.append(data), || sink.file_append(handle, data))
    }

    fn close(&mut self) -> EnvResult<()> {
        trace!(file = %self.handle, "close");
        let (delegate, sink, handle) = (&mut self.delegate, &self.sink, self.handle);
        self.policy.apply(|| delegate.close(), || sink.file_close(handle))
    }

    fn flush(&mut self) -> EnvResult<()> {
        self.delegate.flush()
    }

    fn sync(&mut self) -> EnvResult<()> {
        trace!(file = %self.handle, "sync");
        let (delegate, sink, handle) = (&mut self.delegate, &self.sink, self.handle);
        self.policy.apply(|| delegate.sync(), || sink.file_sync(handle))
    }

    fn fsync(&mut self) -> EnvResult<()> {
        trace!(file = %self.handle, "fsync");
        let (delegate, sink, handle) = (&mut self.delegate, &self.sink, self.handle);
        self.policy.apply(|| delegate.fsync(), || sink.file_fsync(handle))
    }

    fn range_sync(&mut self, offset: u64, nbytes: u64) -> EnvResult<()> {
        trace!(file = %self.handle, offset, nbytes, "range_sync");
        let (delegate, sink, handle) = (&mut self.delegate, &self.sink, self.handle);
        self.policy.apply(
            || delegate.range_sync(offset, nbytes),
            || sink.file_range_sync(handle, offset, nbytes),
        )
    }

    fn file_size(&self) -> u64 {
        self.delegate.file_size()
    }
}

impl Drop for HookedWritableFile {
    fn drop(&mut self) {
        trace!(file = %self.handle, "release");
        // Runs before the delegate field is dropped, so the release is sent
        // even if the delegate's own drop panics.
        self.sink.file_released(self.handle);
    }
}

impl fmt::Debug for HookedWritableFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookedWritableFile")
            .field("handle", &self.handle)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}
