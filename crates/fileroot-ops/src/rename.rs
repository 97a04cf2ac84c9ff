//! Rename operation.

use std::fs;

use fileroot_core::{FileError, ResolvedPath, Result};
use tracing::info;

use crate::blocking;

/// Rename `from` to `to`, both inside the root.
///
/// Unlike a move, `to` is the complete new path and may live in another
/// directory. An existing `to` is a [`FileError::Conflict`]; the existence
/// check and the rename are not atomic, so a concurrent writer can still win
/// the race.
pub async fn rename(from: &ResolvedPath, to: &ResolvedPath) -> Result<()> {
    if from.is_root() || to.is_root() {
        return Err(FileError::RootProtected);
    }
    if let Some(name) = to.file_name() {
        validate_filename(&name.to_string_lossy())?;
    }
    if to.starts_with(from) && to != from {
        return Err(FileError::invalid_source(
            from.as_path(),
            "cannot rename a directory into itself",
        ));
    }

    let source = from.as_path().to_path_buf();
    let target = to.as_path().to_path_buf();
    blocking(from.as_path(), move || {
        fs::symlink_metadata(&source).map_err(|e| FileError::io(&source, e))?;
        if fs::symlink_metadata(&target).is_ok() {
            return Err(FileError::Conflict { path: target });
        }
        fs::rename(&source, &target).map_err(|e| FileError::io(&source, e))
    })
    .await?;

    info!(from = %from, to = %to, "renamed");
    Ok(())
}

/// Validate a file name for cross-platform compatibility.
pub fn validate_filename(name: &str) -> Result<()> {
    let reason = if name.is_empty() {
        "Name cannot be empty"
    } else if name.len() > 255 {
        "Name is too long (max 255 bytes)"
    } else if name.contains(['/', '\0']) {
        "Name cannot contain '/' or NUL"
    } else if name == "." || name == ".." {
        "'.' and '..' are reserved names"
    } else if name.starts_with(' ') || name.ends_with(' ') {
        "Name cannot start or end with spaces"
    } else if name.ends_with('.') {
        "Name cannot end with a dot"
    } else {
        return Ok(());
    };
    Err(FileError::invalid_request(format!("{reason}: {name:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use fileroot_core::PathResolver;
    use tempfile::TempDir;

    #[test]
    fn test_validate_filename_valid() {
        assert!(validate_filename("test.txt").is_ok());
        assert!(validate_filename("my-file").is_ok());
        assert!(validate_filename(".hidden").is_ok());
        assert!(validate_filename("file with spaces").is_ok());
    }

    #[test]
    fn test_validate_filename_invalid() {
        assert!(validate_filename("").is_err());
        assert!(validate_filename("test/file").is_err());
        assert!(validate_filename(".").is_err());
        assert!(validate_filename("..").is_err());
        assert!(validate_filename("file ").is_err());
        assert!(validate_filename(" file").is_err());
        assert!(validate_filename("file.").is_err());
        assert!(validate_filename(&"x".repeat(256)).is_err());
    }

    #[tokio::test]
    async fn test_rename_across_directories() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("docs")).unwrap();
        std::fs::write(dir.path().join("draft.txt"), b"v1").unwrap();
        let resolver = PathResolver::new(dir.path()).unwrap();

        let from = resolver.resolve("draft.txt", false).unwrap();
        let to = resolver.resolve("docs/final.txt", true).unwrap();
        rename(&from, &to).await.unwrap();

        assert_eq!(std::fs::read(dir.path().join("docs/final.txt")).unwrap(), b"v1");
        assert!(!dir.path().join("draft.txt").exists());
    }

    #[tokio::test]
    async fn test_rename_root_is_protected() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a"), b"").unwrap();
        let resolver = PathResolver::new(dir.path()).unwrap();

        let root = resolver.root_path();
        let a = resolver.resolve("a", false).unwrap();
        assert!(matches!(rename(&root, &a).await, Err(FileError::RootProtected)));
        assert!(matches!(rename(&a, &root).await, Err(FileError::RootProtected)));
    }
}
