//! The interceptor pair.
//!
//! [`HookedEnv`] decorates an [`Env`](crate::Env) and wraps every file it
//! opens in a [`HookedWritableFile`]. Both emit notifications through the same
//! [`NotificationSink`](crate::NotificationSink) and share one
//! [`NotifyPolicy`](crate::NotifyPolicy).

mod env;
mod file;

pub use env::HookedEnv;
pub use file::HookedWritableFile;
