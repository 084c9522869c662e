//! Bulk removal of the shard tree.

use std::fs;
use std::path::Path;

use crate::cache::traits::FlushSummary;

/// Remove everything below `root`, keeping `root` itself.
///
/// Symlinks are unlinked, never followed. Each failed removal is logged and
/// counted; the walk always continues.
pub(crate) fn flush_tree(root: &Path) -> FlushSummary {
    let mut summary = FlushSummary::default();
    if root.is_dir() {
        remove_children(root, &mut summary);
    }
    summary
}

fn remove_children(dir: &Path, summary: &mut FlushSummary) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::error!(path = %dir.display(), error = %e, "could not list cache directory");
            summary.failures += 1;
            return;
        }
    };

    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::error!(path = %dir.display(), error = %e, "could not read directory entry");
                summary.failures += 1;
                continue;
            }
        };
        let path = entry.path();
        let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);

        if is_dir {
            remove_children(&path, summary);
            match fs::remove_dir(&path) {
                Ok(()) => summary.dirs_removed += 1,
                Err(e) => {
                    tracing::error!(path = %path.display(), error = %e, "could not remove cache directory");
                    summary.failures += 1;
                }
            }
        } else {
            match fs::remove_file(&path) {
                Ok(()) => summary.files_removed += 1,
                Err(e) => {
                    tracing::error!(path = %path.display(), error = %e, "could not remove cache file");
                    summary.failures += 1;
                }
            }
        }
    }
}
