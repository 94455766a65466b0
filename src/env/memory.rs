//! In-memory environment.
//!
//! This module provides a thread-safe in-memory implementation of [`Env`].
//! It is intended for embedded usage, tests, and as a reference implementation.
//!
//! Unlike a plain map of byte vectors it tracks, per file, how many bytes have
//! been made durable by `sync`/`fsync`/`range_sync`, so crash behaviour can be
//! simulated with [`MemEnv::drop_unsynced_data`]. Parent directories are not
//! required to exist when a file is created.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::{Env, EnvOptions, WritableFile};
use crate::error::{EnvError, EnvResult};

#[derive(Debug, Default)]
struct MemFile {
    data: Vec<u8>,
    /// Prefix of `data` that survives a simulated crash.
    synced_len: usize,
}

// Hard links share the same MemFile.
type SharedFile = Arc<Mutex<MemFile>>;

#[derive(Debug, Default)]
struct State {
    files: HashMap<PathBuf, SharedFile>,
    dirs: BTreeSet<PathBuf>,
}

impl State {
    fn exists(&self, path: &Path) -> bool {
        self.files.contains_key(path) || self.dirs.contains(path)
    }

    fn has_children(&self, dir: &Path) -> bool {
        self.files.keys().any(|p| p.parent() == Some(dir))
            || self.dirs.iter().any(|p| p.parent() == Some(dir))
    }
}

fn is_a_directory(path: &Path) -> EnvError {
    EnvError::invalid_argument(format!("{} is a directory", path.display()))
}

fn lock_file(file: &SharedFile) -> MutexGuard<'_, MemFile> {
    file.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Thread-safe in-memory [`Env`].
#[derive(Debug, Default)]
pub struct MemEnv {
    state: RwLock<State>,
}

impl MemEnv {
    /// Creates an empty environment.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn file(&self, path: &Path) -> EnvResult<SharedFile> {
        self.read()
            .files
            .get(path)
            .cloned()
            .ok_or_else(|| EnvError::NotFound {
                path: path.to_path_buf(),
            })
    }

    /// Number of bytes of `path` that have been synced, if the file exists.
    #[must_use]
    pub fn synced_len(&self, path: &Path) -> Option<usize> {
        self.file(path).ok().map(|f| lock_file(&f).synced_len)
    }

    /// Simulates a crash: every file loses the bytes appended after its last sync.
    pub fn drop_unsynced_data(&self) {
        for file in self.read().files.values() {
            let mut file = lock_file(file);
            let keep = file.synced_len;
            file.data.truncate(keep);
        }
    }
}

impl Env for MemEnv {
    fn new_writable_file(
        &self,
        path: &Path,
        _options: &EnvOptions,
    ) -> EnvResult<Box<dyn WritableFile>> {
        let mut state = self.write();
        if state.dirs.contains(path) {
            return Err(is_a_directory(path));
        }

        let file = if let Some(existing) = state.files.get(path).cloned() {
            // Truncate in place so existing hard links observe it.
            {
                let mut f = lock_file(&existing);
                f.data.clear();
                f.synced_len = 0;
            }
            existing
        } else {
            let created = SharedFile::default();
            state.files.insert(path.to_path_buf(), Arc::clone(&created));
            created
        };

        Ok(Box::new(MemWritableFile {
            path: path.to_path_buf(),
            file,
            closed: false,
        }))
    }

    fn delete_file(&self, path: &Path) -> EnvResult<()> {
        let mut state = self.write();
        if state.dirs.contains(path) {
            return Err(is_a_directory(path));
        }
        state
            .files
            .remove(path)
            .map(drop)
            .ok_or_else(|| EnvError::NotFound {
                path: path.to_path_buf(),
            })
    }

    fn delete_dir(&self, path: &Path) -> EnvResult<()> {
        let mut state = self.write();
        if !state.dirs.contains(path) {
            return Err(EnvError::NotFound {
                path: path.to_path_buf(),
            });
        }
        if state.has_children(path) {
            return Err(EnvError::DirectoryNotEmpty {
                path: path.to_path_buf(),
            });
        }
        state.dirs.remove(path);
        Ok(())
    }

    fn rename_file(&self, src: &Path, target: &Path) -> EnvResult<()> {
        let mut state = self.write();
        if state.dirs.contains(src) {
            return Err(EnvError::NotSupported {
                operation: "rename_file on a directory",
            });
        }
        if !state.files.contains_key(src) {
            return Err(EnvError::NotFound {
                path: src.to_path_buf(),
            });
        }
        if state.dirs.contains(target) {
            return Err(is_a_directory(target));
        }
        if let Some(file) = state.files.remove(src) {
            state.files.insert(target.to_path_buf(), file);
        }
        Ok(())
    }

    fn link_file(&self, src: &Path, target: &Path) -> EnvResult<()> {
        let mut state = self.write();
        let file = state
            .files
            .get(src)
            .cloned()
            .ok_or_else(|| EnvError::NotFound {
                path: src.to_path_buf(),
            })?;
        if state.exists(target) {
            return Err(EnvError::AlreadyExists {
                path: target.to_path_buf(),
            });
        }
        state.files.insert(target.to_path_buf(), file);
        Ok(())
    }

    fn file_exists(&self, path: &Path) -> bool {
        self.read().exists(path)
    }

    fn get_file_size(&self, path: &Path) -> EnvResult<u64> {
        let file = self.file(path)?;
        let len = lock_file(&file).data.len();
        Ok(len as u64)
    }

    fn get_children(&self, dir: &Path) -> EnvResult<Vec<String>> {
        let state = self.read();
        if !state.dirs.contains(dir) && !state.has_children(dir) {
            return Err(EnvError::NotFound {
                path: dir.to_path_buf(),
            });
        }

        let mut names: Vec<String> = state
            .files
            .keys()
            .chain(state.dirs.iter())
            .filter(|p| p.parent() == Some(dir))
            .filter_map(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .collect();
        names.sort();
        Ok(names)
    }

    fn create_dir(&self, path: &Path) -> EnvResult<()> {
        let mut state = self.write();
        if state.exists(path) {
            return Err(EnvError::AlreadyExists {
                path: path.to_path_buf(),
            });
        }
        state.dirs.insert(path.to_path_buf());
        Ok(())
    }

    fn create_dir_if_missing(&self, path: &Path) -> EnvResult<()> {
        let mut state = self.write();
        if state.files.contains_key(path) {
            return Err(EnvError::AlreadyExists {
                path: path.to_path_buf(),
            });
        }
        state.dirs.insert(path.to_path_buf());
        Ok(())
    }

    fn read_file(&self, path: &Path) -> EnvResult<Vec<u8>> {
        let file = self.file(path)?;
        let data = lock_file(&file).data.clone();
        Ok(data)
    }
}

/// Writable handle onto a [`MemEnv`] file.
#[derive(Debug)]
struct MemWritableFile {
    path: PathBuf,
    file: SharedFile,
    closed: bool,
}

impl MemWritableFile {
    fn open_file(&self) -> EnvResult<MutexGuard<'_, MemFile>> {
        if self.closed {
            return Err(EnvError::Closed {
                path: self.path.clone(),
            });
        }
        Ok(lock_file(&self.file))
    }
}

impl WritableFile for MemWritableFile {
    fn append(&mut self, data: &[u8]) -> EnvResult<()> {
        self.open_file()?.data.extend_from_slice(data);
        Ok(())
    }

    fn close(&mut self) -> EnvResult<()> {
        self.open_file().map(drop)?;
        self.closed = true;
        Ok(())
    }

    fn flush(&mut self) -> EnvResult<()> {
        self.open_file().map(drop)
    }

    fn sync(&mut self) -> EnvResult<()> {
        let mut file = self.open_file()?;
        file.synced_len = file.data.len();
        Ok(())
    }

    fn fsync(&mut self) -> EnvResult<()> {
        self.sync()
    }

    fn range_sync(&mut self, offset: u64, nbytes: u64) -> EnvResult<()> {
        let mut file = self.open_file()?;
        let len = file.data.len();
        let start = usize::try_from(offset).unwrap_or(usize::MAX);
        // Only a range contiguous with the durable prefix extends it.
        if start <= file.synced_len {
            let end = usize::try_from(offset.saturating_add(nbytes))
                .unwrap_or(usize::MAX)
                .min(len);
            file.synced_len = file.synced_len.max(end);
        }
        Ok(())
    }

    fn file_size(&self) -> u64 {
        lock_file(&self.file).data.len() as u64
    }
}
