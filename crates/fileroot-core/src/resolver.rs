//! Sandboxed path resolution.
//!
//! Every client-supplied path goes through [`PathResolver`] before the engine
//! touches the filesystem. The resolver normalizes the path lexically, roots
//! it at the configured directory and refuses anything that would climb out.

use std::ffi::OsStr;
use std::fmt;
use std::path::{Component, Path, PathBuf};

use crate::error::{FileError, Result};

/// Maps untrusted relative paths onto locations inside a fixed root.
#[derive(Debug, Clone)]
pub struct PathResolver {
    root: PathBuf,
}

impl PathResolver {
    /// Create a resolver for `root`.
    ///
    /// The root is canonicalized once here; it must exist and be a directory.
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        let root = root.canonicalize().map_err(|e| FileError::io(root, e))?;
        if !root.is_dir() {
            return Err(FileError::NotADirectory { path: root });
        }
        Ok(Self { root })
    }

    /// The canonical root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The root itself as a resolved path.
    pub fn root_path(&self) -> ResolvedPath {
        ResolvedPath {
            absolute: self.root.clone(),
            relative: String::new(),
        }
    }

    /// Resolve a client path, optionally requiring that it exists.
    ///
    /// With `allow_create` set the target may be missing (upload and create
    /// targets); otherwise a missing target fails with [`FileError::NotFound`].
    pub fn resolve(&self, relative: &str, allow_create: bool) -> Result<ResolvedPath> {
        let resolved = self.resolve_lexical(relative)?;
        if !allow_create {
            let exists = resolved
                .absolute
                .try_exists()
                .map_err(|e| FileError::io(&resolved.absolute, e))?;
            if !exists {
                return Err(FileError::NotFound {
                    path: resolved.absolute,
                });
            }
        }
        Ok(resolved)
    }

    /// Resolve several client paths, failing on the first bad one.
    pub fn resolve_all<S: AsRef<str>>(
        &self,
        relatives: &[S],
        allow_create: bool,
    ) -> Result<Vec<ResolvedPath>> {
        relatives
            .iter()
            .map(|r| self.resolve(r.as_ref(), allow_create))
            .collect()
    }

    /// Resolve a client path without touching the filesystem.
    pub fn resolve_lexical(&self, relative: &str) -> Result<ResolvedPath> {
        if relative.contains('\0') {
            return Err(FileError::invalid_request("path contains a NUL byte"));
        }

        let unified = relative.replace('\\', "/");
        let mut segments: Vec<&str> = Vec::new();
        for segment in unified.split('/') {
            match segment {
                "" | "." => {}
                ".." => {
                    if segments.pop().is_none() {
                        return Err(self.escape(relative));
                    }
                }
                name => {
                    if !is_plain_segment(OsStr::new(name)) {
                        return Err(self.escape(relative));
                    }
                    segments.push(name);
                }
            }
        }

        let mut absolute = self.root.clone();
        absolute.extend(&segments);
        if !absolute.starts_with(&self.root) {
            return Err(self.escape(relative));
        }

        Ok(ResolvedPath {
            absolute,
            relative: segments.join("/"),
        })
    }

    fn escape(&self, relative: &str) -> FileError {
        tracing::error!(
            target: "security",
            path = relative,
            root = %self.root.display(),
            "rejected path outside the root directory"
        );
        FileError::PathEscape {
            path: relative.to_string(),
        }
    }
}

/// An absolute path known to lie inside the resolver's root.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResolvedPath {
    absolute: PathBuf,
    relative: String,
}

impl ResolvedPath {
    /// The absolute filesystem path.
    pub fn as_path(&self) -> &Path {
        &self.absolute
    }

    /// The normalized path relative to the root, `/`-separated, no leading slash.
    pub fn relative(&self) -> &str {
        &self.relative
    }

    /// Whether this is the root directory itself.
    pub fn is_root(&self) -> bool {
        self.relative.is_empty()
    }

    /// The last path segment, or `None` for the root.
    pub fn file_name(&self) -> Option<&OsStr> {
        if self.is_root() {
            None
        } else {
            self.absolute.file_name()
        }
    }

    /// The containing directory, or `None` for the root.
    pub fn parent(&self) -> Option<ResolvedPath> {
        if self.is_root() {
            return None;
        }
        let absolute = self.absolute.parent()?.to_path_buf();
        let relative = match self.relative.rsplit_once('/') {
            Some((parent, _)) => parent.to_string(),
            None => String::new(),
        };
        Some(ResolvedPath { absolute, relative })
    }

    /// Descend into a single named entry.
    ///
    /// `name` must be one plain path segment; separators, `.` and `..` are
    /// rejected with [`FileError::PathEscape`].
    pub fn child(&self, name: &OsStr) -> Result<ResolvedPath> {
        if !is_plain_segment(name) {
            return Err(FileError::PathEscape {
                path: name.to_string_lossy().into_owned(),
            });
        }
        let name_str = name.to_string_lossy();
        let relative = if self.is_root() {
            name_str.into_owned()
        } else {
            format!("{}/{}", self.relative, name_str)
        };
        Ok(ResolvedPath {
            absolute: self.absolute.join(name),
            relative,
        })
    }

    /// A sibling whose name is this path's name plus `suffix`.
    ///
    /// Used for the temporary names of an upload (`report.pdf.uploading`).
    pub fn with_suffix(&self, suffix: &str) -> Result<ResolvedPath> {
        let name = self.file_name().ok_or(FileError::RootProtected)?;
        let mut sibling = name.to_os_string();
        sibling.push(suffix);
        match self.parent() {
            Some(parent) => parent.child(&sibling),
            None => Err(FileError::RootProtected),
        }
    }

    /// Whether `self` is `other` or lies beneath it.
    pub fn starts_with(&self, other: &ResolvedPath) -> bool {
        self.absolute.starts_with(&other.absolute)
    }
}

impl AsRef<Path> for ResolvedPath {
    fn as_ref(&self) -> &Path {
        &self.absolute
    }
}

impl fmt::Display for ResolvedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.relative)
    }
}

/// A single normal component with no separators.
fn is_plain_segment(name: &OsStr) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(c)), None) if c == name
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn resolver() -> (TempDir, PathResolver) {
        let dir = TempDir::new().unwrap();
        let resolver = PathResolver::new(dir.path()).unwrap();
        (dir, resolver)
    }

    #[test]
    fn test_resolve_plain_path() {
        let (_dir, resolver) = resolver();
        let resolved = resolver.resolve_lexical("docs/report.pdf").unwrap();
        assert_eq!(resolved.relative(), "docs/report.pdf");
        assert_eq!(resolved.as_path(), resolver.root().join("docs/report.pdf"));
        assert_eq!(resolved.to_string(), "/docs/report.pdf");
    }

    #[test]
    fn test_resolve_collapses_dots_and_separators() {
        let (_dir, resolver) = resolver();
        let resolved = resolver
            .resolve_lexical("./docs//old/../report.pdf")
            .unwrap();
        assert_eq!(resolved.relative(), "docs/report.pdf");

        let resolved = resolver.resolve_lexical("docs\\sub\\file.txt").unwrap();
        assert_eq!(resolved.relative(), "docs/sub/file.txt");
    }

    #[test]
    fn test_absolute_prefix_is_rooted() {
        let (_dir, resolver) = resolver();
        let resolved = resolver.resolve_lexical("/etc/passwd").unwrap();
        assert!(resolved.as_path().starts_with(resolver.root()));
        assert_eq!(resolved.relative(), "etc/passwd");
    }

    #[test]
    fn test_parent_traversal_is_rejected() {
        let (_dir, resolver) = resolver();
        for input in ["../../etc/passwd", "..", "a/../../b", "..\\secret", "a/b/../../../c"] {
            let err = resolver.resolve_lexical(input).unwrap_err();
            assert!(
                matches!(err, FileError::PathEscape { .. }),
                "{input} should escape"
            );
        }
    }

    #[test]
    fn test_empty_path_is_root() {
        let (_dir, resolver) = resolver();
        for input in ["", "/", ".", "a/.."] {
            let resolved = resolver.resolve_lexical(input).unwrap();
            assert!(resolved.is_root());
            assert_eq!(resolved.as_path(), resolver.root());
        }
    }

    #[test]
    fn test_resolve_requires_existence_unless_creating() {
        let (dir, resolver) = resolver();
        std::fs::write(dir.path().join("present.txt"), b"x").unwrap();

        assert!(resolver.resolve("present.txt", false).is_ok());
        assert!(matches!(
            resolver.resolve("missing.txt", false),
            Err(FileError::NotFound { .. })
        ));
        assert!(resolver.resolve("missing.txt", true).is_ok());
    }

    #[test]
    fn test_nul_byte_rejected() {
        let (_dir, resolver) = resolver();
        assert!(matches!(
            resolver.resolve_lexical("bad\0name"),
            Err(FileError::InvalidRequest { .. })
        ));
    }

    #[test]
    fn test_child_and_parent() {
        let (_dir, resolver) = resolver();
        let root = resolver.root_path();
        let docs = root.child(OsStr::new("docs")).unwrap();
        let file = docs.child(OsStr::new("a.txt")).unwrap();
        assert_eq!(file.relative(), "docs/a.txt");
        assert_eq!(file.parent().unwrap(), docs);
        assert_eq!(docs.parent().unwrap(), root);
        assert!(root.parent().is_none());

        assert!(root.child(OsStr::new("..")).is_err());
        assert!(root.child(OsStr::new("a/b")).is_err());
        assert!(root.child(OsStr::new(".")).is_err());
    }

    #[test]
    fn test_with_suffix() {
        let (_dir, resolver) = resolver();
        let target = resolver.resolve_lexical("docs/report.pdf").unwrap();
        let tmp = target.with_suffix(".uploading").unwrap();
        assert_eq!(tmp.relative(), "docs/report.pdf.uploading");
        assert!(matches!(
            resolver.root_path().with_suffix(".uploading"),
            Err(FileError::RootProtected)
        ));
    }
}
