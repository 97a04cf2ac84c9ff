//! Move operation.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use fileroot_core::{FileError, ResolvedPath, Result};
use tracing::{debug, info};

use crate::blocking;

/// Move each source into `destination`, keeping its base name.
///
/// Sources are moved one after another. The first failure stops the run:
/// earlier sources stay moved, later ones are not touched. When something
/// was already moved the failure is reported as
/// [`FileError::MoveInterrupted`] listing the moved sources.
///
/// Returns the new locations in source order.
pub async fn move_to(
    sources: &[ResolvedPath],
    destination: &ResolvedPath,
) -> Result<Vec<ResolvedPath>> {
    let dest_dir = destination.as_path().to_path_buf();
    blocking(destination.as_path(), move || {
        let metadata = fs::metadata(&dest_dir).map_err(|e| FileError::io(&dest_dir, e))?;
        if metadata.is_dir() {
            Ok(())
        } else {
            Err(FileError::NotADirectory { path: dest_dir })
        }
    })
    .await?;

    let mut moved = Vec::with_capacity(sources.len());
    for source in sources {
        match move_one(source, destination).await {
            Ok(dest) => {
                info!(from = %source, to = %dest, "moved");
                moved.push((source.as_path().to_path_buf(), dest));
            }
            Err(e) if moved.is_empty() => return Err(e),
            Err(e) => {
                return Err(FileError::MoveInterrupted {
                    moved: moved.into_iter().map(|(from, _)| from).collect(),
                    source: Box::new(e),
                });
            }
        }
    }

    Ok(moved.into_iter().map(|(_, dest)| dest).collect())
}

async fn move_one(source: &ResolvedPath, destination: &ResolvedPath) -> Result<ResolvedPath> {
    let name = source.file_name().ok_or(FileError::RootProtected)?;
    let dest = destination.child(name)?;

    // Already in the destination directory
    if dest == *source {
        return Err(FileError::Conflict {
            path: dest.as_path().to_path_buf(),
        });
    }

    // Moving a directory into itself
    if dest.starts_with(source) {
        return Err(FileError::invalid_source(
            source.as_path(),
            "cannot move a directory into itself",
        ));
    }

    let from = source.as_path().to_path_buf();
    let to = dest.as_path().to_path_buf();
    blocking(source.as_path(), move || {
        fs::symlink_metadata(&from).map_err(|e| FileError::io(&from, e))?;
        if fs::symlink_metadata(&to).is_ok() {
            return Err(FileError::Conflict { path: to });
        }
        move_item(&from, &to)
    })
    .await?;

    Ok(dest)
}

/// Move a single item (file or directory).
fn move_item(source: &Path, dest: &Path) -> Result<()> {
    match fs::rename(source, dest) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            debug!(
                from = %source.display(),
                to = %dest.display(),
                "rename crosses devices, copying instead"
            );
            copy_then_delete(source, dest)
        }
        Err(e) => Err(FileError::io(source, e)),
    }
}

/// Fallback for moves across filesystems.
fn copy_then_delete(source: &Path, dest: &Path) -> Result<()> {
    if source.is_dir() {
        copy_dir_recursive(source, dest)?;
        fs::remove_dir_all(source).map_err(|e| FileError::io(source, e))
    } else {
        fs::copy(source, dest).map_err(|e| FileError::io(dest, e))?;
        fs::remove_file(source).map_err(|e| FileError::io(source, e))
    }
}

fn copy_dir_recursive(source: &Path, dest: &Path) -> Result<()> {
    fs::create_dir_all(dest).map_err(|e| FileError::io(dest, e))?;

    for entry in fs::read_dir(source).map_err(|e| FileError::io(source, e))? {
        let entry = entry.map_err(|e| FileError::io(source, e))?;
        let path = entry.path();
        let dest_path: PathBuf = dest.join(entry.file_name());

        if path.is_dir() {
            copy_dir_recursive(&path, &dest_path)?;
        } else {
            fs::copy(&path, &dest_path).map_err(|e| FileError::io(&dest_path, e))?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use fileroot_core::PathResolver;
    use tempfile::TempDir;

    fn setup() -> (TempDir, PathResolver) {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("dest")).unwrap();
        std::fs::create_dir_all(dir.path().join("folder/inner")).unwrap();
        std::fs::write(dir.path().join("folder/inner/x.txt"), b"x").unwrap();
        std::fs::write(dir.path().join("a.txt"), b"a").unwrap();
        let resolver = PathResolver::new(dir.path()).unwrap();
        (dir, resolver)
    }

    #[tokio::test]
    async fn test_move_files_and_directories() {
        let (dir, resolver) = setup();
        let sources = resolver.resolve_all(&["a.txt", "folder"], false).unwrap();
        let dest = resolver.resolve("dest", false).unwrap();

        let moved = move_to(&sources, &dest).await.unwrap();
        let relative: Vec<_> = moved.iter().map(|p| p.relative()).collect();
        assert_eq!(relative, ["dest/a.txt", "dest/folder"]);
        assert!(dir.path().join("dest/folder/inner/x.txt").exists());
        assert!(!dir.path().join("a.txt").exists());
    }

    #[tokio::test]
    async fn test_move_into_itself() {
        let (_dir, resolver) = setup();
        let sources = resolver.resolve_all(&["folder"], false).unwrap();
        let dest = resolver.resolve("folder/inner", false).unwrap();

        assert!(matches!(
            move_to(&sources, &dest).await,
            Err(FileError::InvalidSource { .. })
        ));
    }

    #[tokio::test]
    async fn test_move_into_own_parent_is_conflict() {
        let (dir, resolver) = setup();
        let sources = resolver.resolve_all(&["a.txt"], false).unwrap();
        let dest = resolver.resolve("", false).unwrap();

        match move_to(&sources, &dest).await {
            Err(FileError::Conflict { path }) => assert_eq!(path, sources[0].as_path()),
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(std::fs::read(dir.path().join("a.txt")).unwrap(), b"a");
    }

    #[tokio::test]
    async fn test_move_destination_must_be_directory() {
        let (_dir, resolver) = setup();
        let sources = resolver.resolve_all(&["folder"], false).unwrap();
        let dest = resolver.resolve("a.txt", false).unwrap();

        assert!(matches!(
            move_to(&sources, &dest).await,
            Err(FileError::NotADirectory { .. })
        ));
    }

    #[tokio::test]
    async fn test_move_conflict_first_item_is_plain_error() {
        let (dir, resolver) = setup();
        std::fs::write(dir.path().join("dest/a.txt"), b"taken").unwrap();
        let sources = resolver.resolve_all(&["a.txt"], false).unwrap();
        let dest = resolver.resolve("dest", false).unwrap();

        assert!(matches!(
            move_to(&sources, &dest).await,
            Err(FileError::Conflict { .. })
        ));
        assert_eq!(std::fs::read(dir.path().join("dest/a.txt")).unwrap(), b"taken");
    }
}
