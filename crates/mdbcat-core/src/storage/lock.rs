use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::error::StorageError;

/// An advisory lock (`flock(2)` on Unix) guarding a checkpoint file.
///
/// The lock lives in a sibling `<name>.lock` file so the checkpoint itself
/// can be replaced by rename while the lock is held. It is released when
/// this struct is dropped.
#[derive(Debug)]
pub struct FileLock {
    _file: File,
}

impl FileLock {
    /// Path of the lock file guarding `path`.
    pub fn lock_path(path: &Path) -> PathBuf {
        let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(".lock");
        path.with_file_name(name)
    }

    fn open(path: &Path) -> Result<File, StorageError> {
        Ok(OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(Self::lock_path(path))?)
    }

    /// Acquire an exclusive lock for writing `path`. Blocks until acquired.
    pub fn exclusive(path: &Path) -> Result<Self, StorageError> {
        let file = Self::open(path)?;
        file.lock_exclusive().map_err(|_| StorageError::FileLocked)?;
        Ok(Self { _file: file })
    }

    /// Acquire a shared lock for reading `path`. Blocks until acquired.
    pub fn shared(path: &Path) -> Result<Self, StorageError> {
        let file = Self::open(path)?;
        file.lock_shared().map_err(|_| StorageError::FileLocked)?;
        Ok(Self { _file: file })
    }

    /// Try to acquire an exclusive lock without blocking.
    /// Returns `Err(StorageError::FileLocked)` if the lock is held.
    pub fn try_exclusive(path: &Path) -> Result<Self, StorageError> {
        let file = Self::open(path)?;
        file.try_lock_exclusive()
            .map_err(|_| StorageError::FileLocked)?;
        Ok(Self { _file: file })
    }
}
