//! # observed-env - Observable storage-engine environments
//!
//! An embedded storage engine performs all filesystem work through a pluggable
//! environment. This crate provides a drop-in decorator for that environment
//! which reports every filesystem-affecting operation to an external observer,
//! without the engine knowing the observer exists.
//!
//! ## Core Concepts
//!
//! - **Env / WritableFile**: the engine-facing filesystem traits
//! - **HookedEnv / HookedWritableFile**: decorators that delegate to a base
//!   implementation and emit notifications
//! - **NotificationSink**: the observer-facing notification contract, keyed by
//!   opaque `ObserverHandle`s
//! - **ObserverRegistry**: in-process sink that dispatches to `EnvObserver`s
//! - **NotifyPolicy**: notify before the operation, or only after it succeeded
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use observed_env::{EnvHandle, EnvOptions, RecordingObserver};
//!
//! let recorder = RecordingObserver::new();
//! let handle = EnvHandle::observed(Arc::new(recorder.clone()));
//! let env = handle.env();
//!
//! let mut file = env.new_writable_file("a.log".as_ref(), &EnvOptions::default())?;
//! file.append(b"hello")?;
//! file.fsync()?;
//! file.close()?;
//! drop(file);
//!
//! println!("{}", recorder.to_json()?);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod env;
pub mod error;
pub mod hooked;
pub mod observer;
pub mod registration;

// Re-export primary types at crate root for convenience
pub use config::{HookConfig, NotifyPolicy};
pub use env::{Env, EnvOptions, MemEnv, PosixEnv, WritableFile};
pub use error::{ConfigError, EnvError, EnvResult};
pub use hooked::{HookedEnv, HookedWritableFile};
pub use observer::{
    ChannelObserver, ChannelObserverConfig, EnvEvent, EnvObserver, NotificationSink,
    ObserverHandle, ObserverRegistry, RecordedEvent, RecordingObserver, WritableFileObserver,
};
pub use registration::{create_hooked_env, create_hooked_env_with_base, EnvHandle};
