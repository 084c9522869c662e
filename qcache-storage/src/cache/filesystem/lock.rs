//! Advisory locks on cache file handles.
//!
//! A lock lives exactly as long as its [`FileLock`] guard: acquired, used,
//! released within one store operation. There is no upgrade or downgrade.

use std::fs::File;
use std::path::Path;

use fs2::FileExt;
use qcache_core::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// Held by readers; blocks only while a writer holds the file.
    Shared,
    /// Held by writers; serializes all access to the file.
    Exclusive,
}

/// RAII guard over an advisory lock. Unlocks on drop.
#[derive(Debug)]
pub struct FileLock<'a> {
    file: &'a File,
    mode: LockMode,
}

impl<'a> FileLock<'a> {
    /// Block until the lock is granted or the OS reports an error.
    pub fn acquire(file: &'a File, path: &Path, mode: LockMode) -> Result<Self, StoreError> {
        let result = match mode {
            LockMode::Shared => FileExt::lock_shared(file),
            LockMode::Exclusive => FileExt::lock_exclusive(file),
        };
        result.map_err(|e| StoreError::LockFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Ok(Self { file, mode })
    }

    pub fn mode(&self) -> LockMode {
        self.mode
    }

    pub fn file(&self) -> &'a File {
        self.file
    }
}

impl Drop for FileLock<'_> {
    fn drop(&mut self) {
        let _ = FileExt::unlock(self.file);
    }
}
