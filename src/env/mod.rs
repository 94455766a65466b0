//! Environment traits consumed by the storage engine.
//!
//! An [`Env`] is the single path through which an engine touches the
//! filesystem. Substituting it (for an in-memory backend, or for the hooked
//! decorator in [`crate::hooked`]) changes where and how files are written
//! without the engine noticing.
//!
//! Backends provided here:
//! - [`PosixEnv`]: the process-wide default, backed by the OS filesystem
//! - [`MemEnv`]: in-memory reference implementation with durability tracking

mod memory;
mod posix;

pub use memory::MemEnv;
pub use posix::{PosixEnv, PosixWritableFile};

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::EnvResult;

/// Options applied when opening a writable file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvOptions {
    /// Capacity of the user-space write buffer (bytes).
    pub writable_file_max_buffer_size: usize,
    /// Hint for how often the engine issues `range_sync`. Carried for the
    /// engine; environments do not act on it.
    pub bytes_per_sync: u64,
}

impl Default for EnvOptions {
    fn default() -> Self {
        Self {
            writable_file_max_buffer_size: 1024 * 1024, // 1 MiB
            bytes_per_sync: 0,
        }
    }
}

/// Filesystem abstraction used by the storage engine.
///
/// # Thread Safety
/// Implementations are shared between engine threads and must tolerate
/// concurrent calls on different paths. The same path is never mutated
/// concurrently by a well-behaved engine.
pub trait Env: Send + Sync {
    /// Create a new append-only file, truncating any existing file at `path`.
    fn new_writable_file(
        &self,
        path: &Path,
        options: &EnvOptions,
    ) -> EnvResult<Box<dyn WritableFile>>;

    /// Delete the named file.
    fn delete_file(&self, path: &Path) -> EnvResult<()>;

    /// Delete the named directory. The directory must be empty.
    fn delete_dir(&self, path: &Path) -> EnvResult<()>;

    /// Rename `src` to `target`, replacing `target` if it exists.
    fn rename_file(&self, src: &Path, target: &Path) -> EnvResult<()>;

    /// Hard-link `src` to `target`. Fails if `target` exists.
    fn link_file(&self, src: &Path, target: &Path) -> EnvResult<()>;

    /// Returns true if `path` names an existing file or directory.
    fn file_exists(&self, path: &Path) -> bool;

    /// Size of the named file in bytes.
    fn get_file_size(&self, path: &Path) -> EnvResult<u64>;

    /// Names (not paths) of the direct children of `dir`, sorted.
    fn get_children(&self, dir: &Path) -> EnvResult<Vec<String>>;

    /// Create a directory. Fails if it already exists.
    fn create_dir(&self, path: &Path) -> EnvResult<()>;

    /// Create a directory unless it already exists.
    fn create_dir_if_missing(&self, path: &Path) -> EnvResult<()>;

    /// Read the entire contents of a file.
    fn read_file(&self, path: &Path) -> EnvResult<Vec<u8>>;

    /// Size the pool of background threads used for flushes and compactions.
    ///
    /// Environments without a pool ignore the request.
    fn set_background_threads(&self, threads: usize) {
        let _ = threads;
    }
}

/// One open, append-only output file.
///
/// Mutating methods take `&mut self`: the engine serializes operations on a
/// single file, and the borrow checker makes that explicit.
pub trait WritableFile: Send {
    /// Append `data` to the end of the file.
    fn append(&mut self, data: &[u8]) -> EnvResult<()>;

    /// Flush and close the file. Later writes fail.
    fn close(&mut self) -> EnvResult<()>;

    /// Push buffered data to the OS.
    fn flush(&mut self) -> EnvResult<()>;

    /// Flush file data to the storage driver.
    fn sync(&mut self) -> EnvResult<()>;

    /// Flush file data and metadata to stable storage.
    fn fsync(&mut self) -> EnvResult<()>;

    /// Hint that `[offset, offset + nbytes)` should be made durable.
    ///
    /// The default does nothing, which is always a correct implementation.
    fn range_sync(&mut self, offset: u64, nbytes: u64) -> EnvResult<()> {
        let _ = (offset, nbytes);
        Ok(())
    }

    /// Number of bytes appended so far.
    fn file_size(&self) -> u64;
}
