//! Discovery of raw export files inside a source directory

use crate::error::{DatasetError, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// List the files of `dir` whose name starts with `prefix` and ends with
/// `suffix`, sorted by file name.
///
/// Anything else in the directory (sub-directories, other sources' exports,
/// the `processed/` folder) is ignored. A missing or unreadable directory
/// is an error.
pub fn discover_files(dir: &Path, prefix: &str, suffix: &str) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).map_err(|e| DatasetError::io(dir, e))?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| DatasetError::io(dir, e))?;
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !(name.starts_with(prefix) && name.ends_with(suffix)) {
            continue;
        }
        if path.is_file() {
            files.push(path);
        } else {
            debug!(path = %path.display(), "Skipping non-file entry");
        }
    }

    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}
