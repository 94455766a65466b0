//! Registration entrypoint.
//!
//! Builds hooked environments and hands them to the engine's configuration
//! layer as an opaque [`EnvHandle`].
//!
//! ```rust,ignore
//! use observed_env::{EnvHandle, RecordingObserver};
//!
//! let recorder = RecordingObserver::new();
//! let env = EnvHandle::observed(Arc::new(recorder.clone()));
//! engine_options.set_env(env.env());
//! ```

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::config::HookConfig;
use crate::env::{Env, PosixEnv};
use crate::error::ConfigError;
use crate::hooked::HookedEnv;
use crate::observer::{EnvObserver, NotificationSink, ObserverHandle, ObserverRegistry};

/// Wraps the process-wide default environment in a [`HookedEnv`].
///
/// `observer` is the caller-supplied handle identifying the environment on
/// the observer side; it is released through `sink` when the hooked
/// environment is dropped.
#[must_use]
pub fn create_hooked_env(
    observer: ObserverHandle,
    sink: Arc<dyn NotificationSink>,
    config: &HookConfig,
) -> EnvHandle {
    create_hooked_env_with_base(PosixEnv::shared(), observer, sink, config)
}

/// Like [`create_hooked_env`], over an explicit base environment.
#[must_use]
pub fn create_hooked_env_with_base(
    base: Arc<dyn Env>,
    observer: ObserverHandle,
    sink: Arc<dyn NotificationSink>,
    config: &HookConfig,
) -> EnvHandle {
    EnvHandle {
        rep: Arc::new(HookedEnv::new(base, sink, observer, config.policy)),
        is_default: false,
        registry: None,
    }
}

/// Opaque environment handle consumed by the engine's configuration.
///
/// The engine may clone [`EnvHandle::env`] freely; the hooked environment is
/// dropped, and its observer released, once the handle and every clone are gone.
pub struct EnvHandle {
    rep: Arc<dyn Env>,
    is_default: bool,
    registry: Option<Arc<ObserverRegistry>>,
}

impl EnvHandle {
    /// Handle onto the unhooked process-wide default environment.
    #[must_use]
    pub fn default_env() -> Self {
        Self {
            rep: PosixEnv::shared(),
            is_default: true,
            registry: None,
        }
    }

    /// Hooks the default environment, dispatching to `observer` through a
    /// private [`ObserverRegistry`].
    #[must_use]
    pub fn observed(observer: Arc<dyn EnvObserver>) -> Self {
        let config = HookConfig::default();
        Self::observed_parts(PosixEnv::shared(), observer, &config)
    }

    /// [`EnvHandle::observed`] with explicit configuration.
    ///
    /// # Errors
    /// Returns an error if the configuration does not validate.
    pub fn observed_with_config(
        observer: Arc<dyn EnvObserver>,
        config: HookConfig,
    ) -> Result<Self, ConfigError> {
        let config = config.validate()?;
        Ok(Self::observed_parts(PosixEnv::shared(), observer, &config))
    }

    /// [`EnvHandle::observed_with_config`] over an explicit base environment.
    ///
    /// # Errors
    /// Returns an error if the configuration does not validate.
    pub fn observed_with_base(
        base: Arc<dyn Env>,
        observer: Arc<dyn EnvObserver>,
        config: HookConfig,
    ) -> Result<Self, ConfigError> {
        let config = config.validate()?;
        Ok(Self::observed_parts(base, observer, &config))
    }

    fn observed_parts(
        base: Arc<dyn Env>,
        observer: Arc<dyn EnvObserver>,
        config: &HookConfig,
    ) -> Self {
        let registry = Arc::new(ObserverRegistry::with_capacity(config.registry_capacity));
        let handle = registry.retain_env(observer);
        let sink: Arc<dyn NotificationSink> = Arc::clone(&registry) as Arc<dyn NotificationSink>;

        let mut env = create_hooked_env_with_base(base, handle, sink, config);
        env.registry = Some(registry);
        env
    }

    /// The environment to install in the engine's options.
    #[must_use]
    pub fn env(&self) -> Arc<dyn Env> {
        Arc::clone(&self.rep)
    }

    /// Returns true for the unhooked default environment.
    #[must_use]
    pub const fn is_default(&self) -> bool {
        self.is_default
    }

    /// The registry backing an environment built by one of the `observed*`
    /// constructors.
    #[must_use]
    pub fn registry(&self) -> Option<&Arc<ObserverRegistry>> {
        self.registry.as_ref()
    }

    /// Gives up this handle. The default environment is never destroyed.
    pub fn destroy(self) {
        debug!(is_default = self.is_default, "Destroying environment handle");
    }
}

impl fmt::Debug for EnvHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvHandle")
            .field("is_default", &self.is_default)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}
