//! Recursive delete.

use std::fs;

use fileroot_core::{FileError, ResolvedPath, Result};
use tracing::info;

use crate::blocking;

/// Delete a file or a whole directory tree.
///
/// Symlinks are removed themselves, never followed.
pub async fn remove(path: &ResolvedPath) -> Result<()> {
    if path.is_root() {
        return Err(FileError::RootProtected);
    }

    let target = path.as_path().to_path_buf();
    blocking(path.as_path(), move || {
        let metadata = fs::symlink_metadata(&target).map_err(|e| FileError::io(&target, e))?;
        let result = if metadata.is_dir() {
            fs::remove_dir_all(&target)
        } else {
            fs::remove_file(&target)
        };
        result.map_err(|e| FileError::io(&target, e))
    })
    .await?;

    info!(path = %path, "removed");
    Ok(())
}
