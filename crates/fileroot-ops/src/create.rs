//! Directory creation.

use std::fs;
use std::io;

use fileroot_core::{FileError, ResolvedPath, Result};
use tracing::info;

use crate::blocking;
use crate::rename::validate_filename;

/// Create a directory and any missing parents.
///
/// An existing directory is fine; an existing file at `path` (or at one of
/// its parents) is a [`FileError::Conflict`].
pub async fn mkdirs(path: &ResolvedPath) -> Result<()> {
    if let Some(name) = path.file_name() {
        validate_filename(&name.to_string_lossy())?;
    }

    let dir = path.as_path().to_path_buf();
    let created = blocking(path.as_path(), move || match fs::metadata(&dir) {
        Ok(metadata) if metadata.is_dir() => Ok(false),
        Ok(_) => Err(FileError::Conflict { path: dir }),
        Err(e) if e.kind() == io::ErrorKind::NotFound => match fs::create_dir_all(&dir) {
            Ok(()) => Ok(true),
            Err(e) if matches!(
                e.kind(),
                io::ErrorKind::AlreadyExists | io::ErrorKind::NotADirectory
            ) =>
            {
                Err(FileError::Conflict { path: dir })
            }
            Err(e) => Err(FileError::io(&dir, e)),
        },
        // A parent component is a file.
        Err(e) if e.kind() == io::ErrorKind::NotADirectory => {
            Err(FileError::Conflict { path: dir })
        }
        Err(e) => Err(FileError::io(&dir, e)),
    })
    .await?;

    if created {
        info!(path = %path, "directory created");
    }
    Ok(())
}
