//! Directory-lifetime exclusive lock, held for as long as the owning `Engine` is open.

use std::fs::{File, OpenOptions};
use std::path::Path;

use fs4::FileExt;

use crate::error::{Error, Result};
use crate::segment::LOCK_FILE_NAME;

/// An exclusive, non-blocking advisory lock on the data directory's `flock` file.
///
/// Dropping this releases the lock (via the OS closing the file descriptor).
pub struct DirLock {
    _file: File,
}

impl DirLock {
    /// Try to acquire the lock, returning `Error::DirectoryInUse` if another process holds it.
    pub fn acquire(dir: impl AsRef<Path>) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(dir.as_ref().join(LOCK_FILE_NAME))?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Self { _file: file }),
            Err(_) => Err(Error::DirectoryInUse),
        }
    }
}
