//! Mapping from keys to the sharded file tree.
//!
//! ```text
//! <root>/<first two hex chars of key>/adodb_<key>.cache
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use qcache_core::{CacheKey, StoreError};

pub const ENTRY_PREFIX: &str = "adodb_";
pub const ENTRY_SUFFIX: &str = ".cache";

/// Pure path arithmetic plus the directory bootstrap for one cache root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheLayout {
    root: PathBuf,
    directory_permissions: u32,
}

/// What a scan of the tree found.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LayoutScan {
    pub shards: u64,
    pub entries: u64,
    pub bytes: u64,
}

impl CacheLayout {
    pub fn new(root: impl Into<PathBuf>, directory_permissions: u32) -> Self {
        Self {
            root: root.into(),
            directory_permissions,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn shard_dir(&self, key: &CacheKey) -> PathBuf {
        self.root.join(key.shard())
    }

    pub fn entry_path(&self, key: &CacheKey) -> PathBuf {
        self.shard_dir(key).join(entry_file_name(key))
    }

    /// Create the root (and any missing parents) if it is absent.
    pub fn ensure_root(&self) -> Result<(), StoreError> {
        ensure_dir(&self.root, self.directory_permissions, true)
    }

    /// Create the shard directory for `key` if it is absent and return it.
    ///
    /// Losing a creation race to another writer is success.
    pub fn ensure_shard(&self, key: &CacheKey) -> Result<PathBuf, StoreError> {
        let dir = self.shard_dir(key);
        ensure_dir(&dir, self.directory_permissions, false)?;
        Ok(dir)
    }

    /// Count shard directories, entry files and their total size.
    pub fn scan(&self) -> io::Result<LayoutScan> {
        let mut scan = LayoutScan::default();
        if !self.root.is_dir() {
            return Ok(scan);
        }
        for shard in fs::read_dir(&self.root)? {
            let shard = shard?;
            if !shard.file_type()?.is_dir() {
                continue;
            }
            scan.shards += 1;
            for entry in fs::read_dir(shard.path())? {
                let entry = entry?;
                if entry.file_type()?.is_file() && is_entry_file(&entry.file_name().to_string_lossy())
                {
                    scan.entries += 1;
                    scan.bytes += entry.metadata()?.len();
                }
            }
        }
        Ok(scan)
    }
}

pub fn entry_file_name(key: &CacheKey) -> String {
    format!("{}{}{}", ENTRY_PREFIX, key.as_str(), ENTRY_SUFFIX)
}

pub fn is_entry_file(name: &str) -> bool {
    name.strip_prefix(ENTRY_PREFIX)
        .and_then(|rest| rest.strip_suffix(ENTRY_SUFFIX))
        .is_some_and(|key| CacheKey::parse(key).is_ok())
}

fn ensure_dir(path: &Path, mode: u32, recursive: bool) -> Result<(), StoreError> {
    if path.is_dir() {
        return Ok(());
    }

    let mut builder = fs::DirBuilder::new();
    builder.recursive(recursive);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(mode);
    }

    match builder.create(path) {
        Ok(()) => {
            // The process umask may have masked bits off the requested mode.
            if let Err(e) = set_mode(path, mode) {
                tracing::warn!(path = %path.display(), error = %e, "could not set directory permissions");
            }
            Ok(())
        }
        Err(_) if path.is_dir() => Ok(()),
        Err(e) => Err(StoreError::DirectoryCreate {
            path: path.to_path_buf(),
            reason: e.to_string(),
        }),
    }
}

#[cfg(unix)]
pub(crate) fn set_mode(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
pub(crate) fn set_mode(_path: &Path, _mode: u32) -> io::Result<()> {
    Ok(())
}
