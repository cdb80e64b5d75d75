//! # Data Directory Locking
//!
//! Prevents two node processes from appending to the same state journal.
//!
//! Uses `fs2` for cross-platform file locking (flock on Unix, LockFile on Windows).

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use thiserror::Error;

/// Errors from data directory locking.
#[derive(Debug, Error)]
pub enum LockError {
    #[error("Failed to create lock file: {0}")]
    CreateFailed(io::Error),

    #[error("Data directory already in use by pid {pid:?} ({})", .path.display())]
    AlreadyLocked { pid: Option<u32>, path: PathBuf },

    #[error("Failed to write PID to lock file: {0}")]
    WriteFailed(io::Error),
}

/// Exclusive lock on a data directory, released on drop.
#[derive(Debug)]
pub struct DataDirLock {
    file: File,
    path: PathBuf,
}

impl DataDirLock {
    pub const LOCK_FILE: &'static str = "LOCK";

    /// Acquire the lock without blocking.
    pub fn acquire(data_dir: &Path) -> Result<Self, LockError> {
        let lock_path = data_dir.join(Self::LOCK_FILE);

        // Do not truncate before locking: the holder's PID must survive.
        let mut file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&lock_path)
            .map_err(LockError::CreateFailed)?;

        if file.try_lock_exclusive().is_err() {
            return Err(LockError::AlreadyLocked {
                pid: Self::read_existing_pid(&lock_path),
                path: lock_path,
            });
        }

        file.set_len(0).map_err(LockError::WriteFailed)?;
        writeln!(file, "{}", std::process::id()).map_err(LockError::WriteFailed)?;
        file.sync_all().map_err(LockError::WriteFailed)?;

        Ok(Self {
            file,
            path: lock_path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_existing_pid(path: &Path) -> Option<u32> {
        std::fs::read_to_string(path)
            .ok()
            .and_then(|s| s.trim().parse().ok())
    }
}

impl Drop for DataDirLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
        let _ = std::fs::remove_file(&self.path);
    }
}
