//! Directory listing entry types.

use std::fs::Metadata;
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use compact_str::CompactString;
use serde::{Deserialize, Serialize};

/// Whether an entry is a file or a directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
}

impl EntryKind {
    /// Check if this is a directory.
    pub fn is_dir(&self) -> bool {
        matches!(self, Self::Directory)
    }
}

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    /// File name (single path segment).
    pub name: CompactString,
    /// File or directory.
    pub kind: EntryKind,
    /// Size in bytes (as reported by the filesystem for directories).
    pub size: u64,
    /// Last modification time.
    pub modified: DateTime<Utc>,
    /// Dot-file.
    pub hidden: bool,
}

impl DirectoryEntry {
    /// Build an entry from a name and its (symlink-followed) metadata.
    pub fn from_metadata(name: impl Into<CompactString>, metadata: &Metadata) -> Self {
        let name = name.into();
        let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        Self {
            hidden: is_hidden(&name),
            kind: if metadata.is_dir() {
                EntryKind::Directory
            } else {
                EntryKind::File
            },
            size: metadata.len(),
            modified: DateTime::<Utc>::from(modified),
            name,
        }
    }

    /// Check if this entry is a directory.
    pub fn is_dir(&self) -> bool {
        self.kind.is_dir()
    }
}

/// Dot-files are hidden.
pub fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_hidden() {
        assert!(is_hidden(".env"));
        assert!(!is_hidden("env"));
        assert!(!is_hidden("report.pdf.uploading"));
    }

    #[test]
    fn test_entry_from_metadata() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join(".secret");
        std::fs::write(&path, b"12345").unwrap();

        let entry = DirectoryEntry::from_metadata(".secret", &std::fs::metadata(&path).unwrap());
        assert_eq!(entry.kind, EntryKind::File);
        assert_eq!(entry.size, 5);
        assert!(entry.hidden);

        let entry = DirectoryEntry::from_metadata("sub", &std::fs::metadata(dir.path()).unwrap());
        assert!(entry.is_dir());
        assert!(!entry.hidden);
    }

    #[test]
    fn test_entry_kind_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&EntryKind::Directory).unwrap(),
            "\"directory\""
        );
    }
}
