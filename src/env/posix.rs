//! Default environment backed by the OS filesystem.
//!
//! [`PosixEnv::shared`] returns the process-wide instance. It is stateless,
//! so sharing it between any number of engines and interceptors is safe.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use tracing::warn;

use super::{Env, EnvOptions, WritableFile};
use crate::error::{EnvError, EnvResult};

static DEFAULT_ENV: OnceLock<Arc<PosixEnv>> = OnceLock::new();

/// Environment that delegates every call to `std::fs`.
#[derive(Debug, Default, Clone, Copy)]
pub struct PosixEnv;

impl PosixEnv {
    /// Creates a standalone instance.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// The process-wide default environment.
    ///
    /// Every call returns a clone of the same `Arc`; it lives until process exit.
    #[must_use]
    pub fn shared() -> Arc<Self> {
        Arc::clone(DEFAULT_ENV.get_or_init(|| Arc::new(Self::new())))
    }
}

fn map_remove_dir_err(path: &Path, err: io::Error) -> EnvError {
    #[cfg(unix)]
    {
        if err.raw_os_error() == Some(libc::ENOTEMPTY) {
            return EnvError::DirectoryNotEmpty {
                path: path.to_path_buf(),
            };
        }
    }
    EnvError::from_io("delete_dir", path, err)
}

impl Env for PosixEnv {
    fn new_writable_file(
        &self,
        path: &Path,
        options: &EnvOptions,
    ) -> EnvResult<Box<dyn WritableFile>> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .map_err(|e| EnvError::from_io("new_writable_file", path, e))?;

        Ok(Box::new(PosixWritableFile::new(
            path.to_path_buf(),
            file,
            options.writable_file_max_buffer_size,
        )))
    }

    fn delete_file(&self, path: &Path) -> EnvResult<()> {
        fs::remove_file(path).map_err(|e| EnvError::from_io("delete_file", path, e))
    }

    fn delete_dir(&self, path: &Path) -> EnvResult<()> {
        fs::remove_dir(path).map_err(|e| map_remove_dir_err(path, e))
    }

    fn rename_file(&self, src: &Path, target: &Path) -> EnvResult<()> {
        fs::rename(src, target).map_err(|e| EnvError::from_io("rename_file", src, e))
    }

    fn link_file(&self, src: &Path, target: &Path) -> EnvResult<()> {
        fs::hard_link(src, target).map_err(|e| match e.kind() {
            // Attribute the failure to the path that caused it.
            io::ErrorKind::AlreadyExists => EnvError::from_io("link_file", target, e),
            _ => EnvError::from_io("link_file", src, e),
        })
    }

    fn file_exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn get_file_size(&self, path: &Path) -> EnvResult<u64> {
        fs::metadata(path)
            .map(|m| m.len())
            .map_err(|e| EnvError::from_io("get_file_size", path, e))
    }

    fn get_children(&self, dir: &Path) -> EnvResult<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(dir).map_err(|e| EnvError::from_io("get_children", dir, e))? {
            let entry = entry.map_err(|e| EnvError::from_io("get_children", dir, e))?;
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }

    fn create_dir(&self, path: &Path) -> EnvResult<()> {
        fs::create_dir(path).map_err(|e| EnvError::from_io("create_dir", path, e))
    }

    fn create_dir_if_missing(&self, path: &Path) -> EnvResult<()> {
        match fs::create_dir(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists && path.is_dir() => Ok(()),
            Err(e) => Err(EnvError::from_io("create_dir_if_missing", path, e)),
        }
    }

    fn read_file(&self, path: &Path) -> EnvResult<Vec<u8>> {
        fs::read(path).map_err(|e| EnvError::from_io("read_file", path, e))
    }
}

/// Buffered append-only file over a `std::fs::File`.
#[derive(Debug)]
pub struct PosixWritableFile {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    filesize: u64,
}

impl PosixWritableFile {
    fn new(path: PathBuf, file: File, buffer_size: usize) -> Self {
        Self {
            path,
            writer: Some(BufWriter::with_capacity(buffer_size, file)),
            filesize: 0,
        }
    }

    /// Path this file was opened at.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn writer(&mut self) -> EnvResult<&mut BufWriter<File>> {
        match self.writer.as_mut() {
            Some(writer) => Ok(writer),
            None => Err(EnvError::Closed {
                path: self.path.clone(),
            }),
        }
    }

    fn flushed_file(&mut self, operation: &'static str) -> EnvResult<&File> {
        let path = self.path.clone();
        let writer = self.writer()?;
        writer
            .flush()
            .map_err(|e| EnvError::from_io(operation, &path, e))?;
        Ok(writer.get_ref())
    }
}

impl WritableFile for PosixWritableFile {
    fn append(&mut self, data: &[u8]) -> EnvResult<()> {
        let path = self.path.clone();
        self.writer()?
            .write_all(data)
            .map_err(|e| EnvError::from_io("append", &path, e))?;
        self.filesize += data.len() as u64;
        Ok(())
    }

    fn close(&mut self) -> EnvResult<()> {
        let Some(writer) = self.writer.take() else {
            return Err(EnvError::Closed {
                path: self.path.clone(),
            });
        };
        // The File is dropped (and its descriptor closed) here.
        writer
            .into_inner()
            .map(drop)
            .map_err(|e| EnvError::from_io("close", &self.path, e.into_error()))
    }

    fn flush(&mut self) -> EnvResult<()> {
        self.flushed_file("flush").map(|_| ())
    }

    fn sync(&mut self) -> EnvResult<()> {
        let path = self.path.clone();
        self.flushed_file("sync")?
            .sync_data()
            .map_err(|e| EnvError::from_io("sync", &path, e))
    }

    fn fsync(&mut self) -> EnvResult<()> {
        let path = self.path.clone();
        self.flushed_file("fsync")?
            .sync_all()
            .map_err(|e| EnvError::from_io("fsync", &path, e))
    }

    #[cfg(target_os = "linux")]
    fn range_sync(&mut self, offset: u64, nbytes: u64) -> EnvResult<()> {
        use std::os::unix::io::AsRawFd;

        let offset = i64::try_from(offset).map_err(|_| {
            EnvError::invalid_argument(format!("range_sync offset {offset} out of range"))
        })?;
        let nbytes = i64::try_from(nbytes).map_err(|_| {
            EnvError::invalid_argument(format!("range_sync length {nbytes} out of range"))
        })?;

        let path = self.path.clone();
        let fd = self.flushed_file("range_sync")?.as_raw_fd();
        let result =
            unsafe { libc::sync_file_range(fd, offset, nbytes, libc::SYNC_FILE_RANGE_WRITE) };
        if result != 0 {
            return Err(EnvError::from_io(
                "range_sync",
                &path,
                io::Error::last_os_error(),
            ));
        }
        Ok(())
    }

    #[cfg(not(target_os = "linux"))]
    fn range_sync(&mut self, _offset: u64, _nbytes: u64) -> EnvResult<()> {
        // No partial-range primitive; pushing the buffer to the OS is the best we can do.
        self.flushed_file("range_sync").map(|_| ())
    }

    fn file_size(&self) -> u64 {
        self.filesize
    }
}

impl Drop for PosixWritableFile {
    fn drop(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            if let Err(e) = writer.flush() {
                warn!("Failed to flush {} on drop: {}", self.path.display(), e);
            }
        }
    }
}
