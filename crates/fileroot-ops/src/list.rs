//! Directory listing.

use std::cmp::Ordering;
use std::fs;

use fileroot_core::{DirectoryEntry, FileError, ResolvedPath, Result, is_hidden};
use tracing::warn;

use crate::blocking;

/// List the entries of a directory.
///
/// Dot-files are left out unless `show_hidden` is set. Directories come first,
/// then everything is ordered by name, ignoring case.
pub async fn list(path: &ResolvedPath, show_hidden: bool) -> Result<Vec<DirectoryEntry>> {
    let dir = path.as_path().to_path_buf();
    blocking(path.as_path(), move || {
        let metadata = fs::metadata(&dir).map_err(|e| FileError::io(&dir, e))?;
        if !metadata.is_dir() {
            return Err(FileError::NotADirectory { path: dir });
        }

        let mut entries = Vec::new();
        for entry in fs::read_dir(&dir).map_err(|e| FileError::io(&dir, e))? {
            let entry = entry.map_err(|e| FileError::io(&dir, e))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if !show_hidden && is_hidden(&name) {
                continue;
            }

            // Follows symlinks, so a dangling link fails here.
            match fs::metadata(entry.path()) {
                Ok(metadata) => entries.push(DirectoryEntry::from_metadata(name, &metadata)),
                Err(e) => {
                    warn!(path = %entry.path().display(), error = %e, "skipping unreadable entry");
                }
            }
        }

        entries.sort_by(compare_entries);
        Ok(entries)
    })
    .await
}

fn compare_entries(a: &DirectoryEntry, b: &DirectoryEntry) -> Ordering {
    b.is_dir()
        .cmp(&a.is_dir())
        .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
        .then_with(|| a.name.cmp(&b.name))
}
