//! Configuration for hooked environments.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// When the observer hears about an operation relative to the real call.
///
/// A hooked environment and every file it opens share one policy; there is
/// no way to mix them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifyPolicy {
    /// Notify unconditionally, then perform the operation. The observer sees
    /// every attempt, including ones that go on to fail.
    NotifyBefore,
    /// Perform the operation and notify only if it succeeded. The observer
    /// sees confirmed effects only.
    #[default]
    NotifyAfterSuccess,
}

impl NotifyPolicy {
    /// Runs `op` and emits `notify` according to the policy.
    ///
    /// The result of `op` is returned unchanged in every case.
    pub(crate) fn apply<T, E>(
        self,
        op: impl FnOnce() -> Result<T, E>,
        notify: impl FnOnce(),
    ) -> Result<T, E> {
        match self {
            Self::NotifyBefore => {
                notify();
                op()
            }
            Self::NotifyAfterSuccess => {
                let result = op();
                if result.is_ok() {
                    notify();
                }
                result
            }
        }
    }
}

/// Configuration for a hooked environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HookConfig {
    /// Notification ordering for the environment and all of its files.
    pub policy: NotifyPolicy,
    /// Initial slot count of the observer registry. The registry doubles when full.
    pub registry_capacity: usize,
}

impl Default for HookConfig {
    fn default() -> Self {
        Self {
            policy: NotifyPolicy::default(),
            registry_capacity: 16,
        }
    }
}

impl HookConfig {
    const MIN_REGISTRY_CAPACITY: usize = 1;

    /// Rejects configurations the registry cannot work with.
    pub fn validate(self) -> Result<Self, ConfigError> {
        if self.registry_capacity < Self::MIN_REGISTRY_CAPACITY {
            return Err(ConfigError::RegistryCapacityTooSmall {
                min: Self::MIN_REGISTRY_CAPACITY,
                actual: self.registry_capacity,
            });
        }
        Ok(self)
    }

    /// Parses and validates a JSON document. Missing fields take their defaults.
    ///
    /// ```rust,ignore
    /// let cfg = HookConfig::from_json_str(r#"{"policy": "notify_before"}"#)?;
    /// ```
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let cfg: Self = serde_json::from_str(json).map_err(|e| ConfigError::Parse {
            message: e.to_string(),
        })?;
        cfg.validate()
    }
}
