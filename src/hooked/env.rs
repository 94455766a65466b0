//! Environment interceptor.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, trace};

use super::HookedWritableFile;
use crate::config::NotifyPolicy;
use crate::env::{Env, EnvOptions, WritableFile};
use crate::error::EnvResult;
use crate::observer::{NotificationSink, ObserverHandle};

/// [`Env`] that forwards to a shared base environment and notifies a sink of
/// every mutating call.
///
/// Intercepted: `new_writable_file`, `delete_file`, `delete_dir`,
/// `rename_file`, `link_file`. Everything else is forwarded untouched.
/// Results always come from the base environment.
pub struct HookedEnv {
    base: Arc<dyn Env>,
    sink: Arc<dyn NotificationSink>,
    handle: ObserverHandle,
    policy: NotifyPolicy,
}

impl HookedEnv {
    /// Wraps `base`. `handle` is the environment's observer handle; it is
    /// released through `sink` when this value is dropped.
    #[must_use]
    pub fn new(
        base: Arc<dyn Env>,
        sink: Arc<dyn NotificationSink>,
        handle: ObserverHandle,
        policy: NotifyPolicy,
    ) -> Self {
        debug!(env = %handle, ?policy, "Created hooked environment");
        Self {
            base,
            sink,
            handle,
            policy,
        }
    }

    /// Observer handle of this environment.
    #[must_use]
    pub const fn handle(&self) -> ObserverHandle {
        self.handle
    }

    /// Notification ordering for this environment and its files.
    #[must_use]
    pub const fn policy(&self) -> NotifyPolicy {
        self.policy
    }

    /// The wrapped environment.
    #[must_use]
    pub fn base(&self) -> &Arc<dyn Env> {
        &self.base
    }

    fn wrap(
        &self,
        file_handle: ObserverHandle,
        delegate: Box<dyn WritableFile>,
    ) -> Box<dyn WritableFile> {
        Box::new(HookedWritableFile::new(
            file_handle,
            Arc::clone(&self.sink),
            self.policy,
            delegate,
        ))
    }
}

impl Env for HookedEnv {
    fn new_writable_file(
        &self,
        path: &Path,
        options: &EnvOptions,
    ) -> EnvResult<Box<dyn WritableFile>> {
        match self.policy {
            NotifyPolicy::NotifyBefore => {
                let file_handle = self.sink.env_new_writable_file(self.handle, path);
                match self.base.new_writable_file(path, options) {
                    Ok(delegate) => {
                        debug!(
                            env = %self.handle,
                            file = %file_handle,
                            path = %path.display(),
                            "Opened hooked file"
                        );
                        Ok(self.wrap(file_handle, delegate))
                    }
                    Err(e) => {
                        // No interceptor will own the handle, so release it here.
                        self.sink.file_released(file_handle);
                        Err(e)
                    }
                }
            }
            NotifyPolicy::NotifyAfterSuccess => {
                let delegate = self.base.new_writable_file(path, options)?;
                let file_handle = self.sink.env_new_writable_file(self.handle, path);
                debug!(
                    env = %self.handle,
                    file = %file_handle,
                    path = %path.display(),
                    "Opened hooked file"
                );
                Ok(self.wrap(file_handle, delegate))
            }
        }
    }

    fn delete_file(&self, path: &Path) -> EnvResult<()> {
        trace!(env = %self.handle, path = %path.display(), "delete_file");
        self.policy.apply(
            || self.base.delete_file(path),
            || self.sink.env_delete_file(self.handle, path),
        )
    }

    fn delete_dir(&self, path: &Path) -> EnvResult<()> {
        trace!(env = %self.handle, path = %path.display(), "delete_dir");
        self.policy.apply(
            || self.base.delete_dir(path),
            || self.sink.env_delete_dir(self.handle, path),
        )
    }

    fn rename_file(&self, src: &Path, target: &Path) -> EnvResult<()> {
        trace!(env = %self.handle, src = %src.display(), target = %target.display(), "rename_file");
        self.policy.apply(
            || self.base.rename_file(src, target),
            || self.sink.env_rename_file(self.handle, src, target),
        )
    }

    fn link_file(&self, src: &Path, target: &Path) -> EnvResult<()> {
        trace!(env = %self.handle, src = %src.display(), target = %target.display(), "link_file");
        self.policy.apply(
            || self.base.link_file(src, target),
            || self.sink.env_link_file(self.handle, src, target),
        )
    }

    fn file_exists(&self, path: &Path) -> bool {
        self.base.file_exists(path)
    }

    fn get_file_size(&self, path: &Path) -> EnvResult<u64> {
        self.base.get_file_size(path)
    }

    fn get_children(&self, dir: &Path) -> EnvResult<Vec<String>> {
        self.base.get_children(dir)
    }

    fn create_dir(&self, path: &Path) -> EnvResult<()> {
        self.base.create_dir(path)
    }

    fn create_dir_if_missing(&self, path: &Path) -> EnvResult<()> {
        self.base.create_dir_if_missing(path)
    }

    fn read_file(&self, path: &Path) -> EnvResult<Vec<u8>> {
        self.base.read_file(path)
    }

    fn set_background_threads(&self, threads: usize) {
        self.base.set_background_threads(threads);
    }
}

impl Drop for HookedEnv {
    fn drop(&mut self) {
        debug!(env = %self.handle, "Releasing hooked environment");
        self.sink.env_released(self.handle);
    }
}

impl fmt::Debug for HookedEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookedEnv")
            .field("handle", &self.handle)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}
