//! Archive creation (zip and tar.gz).

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, Seek, Write};
use std::path::{Component, Path, PathBuf};

use flate2::Compression;
use flate2::write::GzEncoder;
use fileroot_core::{FileError, ResolvedPath, Result};
use serde::Serialize;
use strum::Display;
use tar::Builder as TarBuilder;
use tempfile::NamedTempFile;
use tracing::{info, warn};
use zip::write::SimpleFileOptions as ZipFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::blocking;

/// Container format of an archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
pub enum ArchiveFormat {
    #[strum(to_string = "zip")]
    #[serde(rename = "zip")]
    Zip,
    #[strum(to_string = "tar.gz")]
    #[serde(rename = "tar.gz")]
    TarGz,
}

impl ArchiveFormat {
    /// Pick the format from the destination name: `.tar.gz` and `.tgz` give a
    /// gzip-compressed tar, anything else a zip.
    pub fn from_path(path: &Path) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Self::TarGz
        } else {
            Self::Zip
        }
    }
}

/// What to pack and where.
#[derive(Debug, Clone)]
pub struct ArchiveRequest {
    /// Files and directories to include, in order.
    pub sources: Vec<ResolvedPath>,
    /// Archive file to write.
    pub destination: ResolvedPath,
    /// Entry names are relative to this directory.
    pub base_root: ResolvedPath,
    /// Keep each source's parent directories in its entry name. When off,
    /// every selected source lands at the top level of the archive.
    pub embed_dirs: bool,
}

/// Result of a finished archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchiveSummary {
    pub format: ArchiveFormat,
    /// Entries written, directories included.
    pub entries: usize,
    /// Uncompressed bytes of all file entries.
    pub bytes: u64,
}

struct ArchiveItem {
    source: PathBuf,
    name: String,
    is_dir: bool,
    size: u64,
}

/// Pack `request.sources` into `request.destination`.
///
/// The archive is written to a temporary file next to the destination and
/// only renamed into place once complete. An existing destination is
/// replaced.
pub async fn archive(request: &ArchiveRequest) -> Result<ArchiveSummary> {
    let mut roots = Vec::with_capacity(request.sources.len());
    for source in &request.sources {
        if !source.starts_with(&request.base_root) {
            return Err(FileError::invalid_source(
                source.as_path(),
                format!("not under {}", request.base_root),
            ));
        }
        let name = if request.embed_dirs {
            relative_name(source.as_path(), request.base_root.as_path())
        } else {
            source
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
        };
        roots.push((source.as_path().to_path_buf(), name));
    }

    let destination = request.destination.as_path().to_path_buf();
    let dest_dir = request
        .destination
        .parent()
        .ok_or(FileError::RootProtected)?
        .as_path()
        .to_path_buf();
    let format = ArchiveFormat::from_path(&destination);

    let summary = blocking(request.destination.as_path(), move || {
        let items = collect_items(&roots)?;
        let mut tmp = NamedTempFile::new_in(&dest_dir).map_err(|e| FileError::io(&dest_dir, e))?;
        let written = match format {
            ArchiveFormat::Zip => write_zip(tmp.as_file_mut(), &items),
            ArchiveFormat::TarGz => write_tar_gz(tmp.as_file_mut(), &items),
        };
        written.map_err(|message| FileError::Archive {
            path: destination.clone(),
            message,
        })?;
        tmp.as_file()
            .sync_all()
            .map_err(|e| FileError::io(tmp.path(), e))?;
        tmp.persist(&destination)
            .map_err(|e| FileError::io(&destination, e.error))?;

        Ok(ArchiveSummary {
            format,
            entries: items.len(),
            bytes: items.iter().map(|item| item.size).sum(),
        })
    })
    .await?;

    info!(
        path = %request.destination,
        %format,
        entries = summary.entries,
        bytes = summary.bytes,
        "archive created"
    );
    Ok(summary)
}

/// `path` relative to `base`, `/`-separated.
fn relative_name(path: &Path, base: &Path) -> String {
    path.strip_prefix(base)
        .unwrap_or(path)
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn collect_items(roots: &[(PathBuf, String)]) -> Result<Vec<ArchiveItem>> {
    let mut items = Vec::new();
    let mut seen = HashSet::new();
    for (source, name) in roots {
        collect_recursive(source, name, &mut items, &mut seen)?;
    }
    Ok(items)
}

fn collect_recursive(
    source: &Path,
    name: &str,
    out: &mut Vec<ArchiveItem>,
    seen: &mut HashSet<String>,
) -> Result<()> {
    let meta = fs::symlink_metadata(source).map_err(|e| FileError::io(source, e))?;
    if meta.file_type().is_symlink() {
        warn!(path = %source.display(), "symlink not archived");
        return Ok(());
    }

    // An empty name is the base root itself; its children go to the top level.
    if !name.is_empty() && !seen.insert(name.to_string()) {
        warn!(path = %source.display(), name, "duplicate archive entry skipped");
        return Ok(());
    }

    if meta.is_dir() {
        if !name.is_empty() {
            out.push(ArchiveItem {
                source: source.to_path_buf(),
                name: format!("{name}/"),
                is_dir: true,
                size: 0,
            });
        }
        let mut children: Vec<_> = fs::read_dir(source)
            .map_err(|e| FileError::io(source, e))?
            .collect::<io::Result<_>>()
            .map_err(|e| FileError::io(source, e))?;
        children.sort_by_key(|entry| entry.file_name());
        for entry in children {
            let child = entry.file_name().to_string_lossy().into_owned();
            let child_name = if name.is_empty() {
                child
            } else {
                format!("{name}/{child}")
            };
            collect_recursive(&entry.path(), &child_name, out, seen)?;
        }
    } else {
        out.push(ArchiveItem {
            source: source.to_path_buf(),
            name: name.to_string(),
            is_dir: false,
            size: meta.len(),
        });
    }
    Ok(())
}

fn write_zip<W: Write + Seek>(file: W, items: &[ArchiveItem]) -> std::result::Result<(), String> {
    let mut writer = ZipWriter::new(file);
    let options = ZipFileOptions::default().compression_method(CompressionMethod::Deflated);

    for item in items {
        if item.is_dir {
            writer
                .add_directory(item.name.as_str(), options)
                .map_err(|e| format!("{}: {e}", item.name))?;
        } else {
            writer
                .start_file(item.name.as_str(), options.large_file(needs_zip64(item.size)))
                .map_err(|e| format!("{}: {e}", item.name))?;
            let mut src = File::open(&item.source).map_err(|e| format!("{}: {e}", item.name))?;
            io::copy(&mut src, &mut writer).map_err(|e| format!("{}: {e}", item.name))?;
        }
    }

    writer.finish().map_err(|e| e.to_string())?;
    Ok(())
}

/// Entries this large only fit with zip64 headers.
fn needs_zip64(size: u64) -> bool {
    size >= u64::from(u32::MAX)
}

fn write_tar_gz<W: Write>(file: W, items: &[ArchiveItem]) -> std::result::Result<(), String> {
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = TarBuilder::new(encoder);

    for item in items {
        if item.is_dir {
            builder
                .append_dir(item.name.trim_end_matches('/'), &item.source)
                .map_err(|e| format!("{}: {e}", item.name))?;
        } else {
            let mut src = File::open(&item.source).map_err(|e| format!("{}: {e}", item.name))?;
            builder
                .append_file(&item.name, &mut src)
                .map_err(|e| format!("{}: {e}", item.name))?;
        }
    }

    let encoder = builder.into_inner().map_err(|e| e.to_string())?;
    encoder.finish().map_err(|e| e.to_string())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_path() {
        assert_eq!(ArchiveFormat::from_path(Path::new("/x/a.zip")), ArchiveFormat::Zip);
        assert_eq!(ArchiveFormat::from_path(Path::new("/x/a.TAR.GZ")), ArchiveFormat::TarGz);
        assert_eq!(ArchiveFormat::from_path(Path::new("/x/a.tgz")), ArchiveFormat::TarGz);
        assert_eq!(ArchiveFormat::from_path(Path::new("/x/a.gz")), ArchiveFormat::Zip);
        assert_eq!(ArchiveFormat::from_path(Path::new("/x/backup")), ArchiveFormat::Zip);
    }

    #[test]
    fn test_relative_name() {
        assert_eq!(
            relative_name(Path::new("/data/photos/2020/a.jpg"), Path::new("/data")),
            "photos/2020/a.jpg"
        );
        assert_eq!(relative_name(Path::new("/data"), Path::new("/data")), "");
    }

    #[test]
    fn test_zip64_threshold() {
        assert!(!needs_zip64(0));
        assert!(!needs_zip64(u64::from(u32::MAX) - 1));
        assert!(needs_zip64(u64::from(u32::MAX)));
        assert!(needs_zip64(5 * 1024 * 1024 * 1024));
    }

    #[tokio::test]
    async fn test_source_outside_base_root_is_rejected() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("photos")).unwrap();
        std::fs::create_dir_all(dir.path().join("other")).unwrap();
        std::fs::write(dir.path().join("other/a.txt"), b"a").unwrap();
        let resolver = fileroot_core::PathResolver::new(dir.path()).unwrap();

        let request = ArchiveRequest {
            sources: vec![resolver.resolve("other/a.txt", false).unwrap()],
            destination: resolver.resolve("photos/out.zip", true).unwrap(),
            base_root: resolver.resolve("photos", false).unwrap(),
            embed_dirs: true,
        };
        let err = archive(&request).await.unwrap_err();
        assert!(matches!(err, FileError::InvalidSource { .. }));

        assert!(!request.destination.as_path().exists());
        assert_eq!(std::fs::read_dir(dir.path().join("photos")).unwrap().count(), 0);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 2);
    }

    #[test]
    fn test_collect_nested_directory() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("docs/sub")).unwrap();
        std::fs::write(dir.path().join("docs/sub/b.txt"), b"bb").unwrap();
        std::fs::write(dir.path().join("docs/a.txt"), b"a").unwrap();

        let roots = vec![(dir.path().join("docs"), "docs".to_string())];
        let items = collect_items(&roots).unwrap();
        let names: Vec<_> = items.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, ["docs/", "docs/a.txt", "docs/sub/", "docs/sub/b.txt"]);
        assert_eq!(items.iter().map(|i| i.size).sum::<u64>(), 3);
    }
}
