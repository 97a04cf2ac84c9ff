//! High-level executor speaking the file manager's request vocabulary.

use std::io;
use std::sync::Arc;

use fileroot_core::{DirectoryEntry, FileError, ManagerConfig, PathResolver, ResolvedPath, Result};
use fileroot_upload::{
    FeedSubscription, StatusFeed, UploadPipeline, UploadReceipt, UploadRegistry,
};
use tokio_stream::Stream;
use tracing::debug;

use crate::archive::{ArchiveRequest, ArchiveSummary, archive};
use crate::create::mkdirs;
use crate::list::list;
use crate::move_op::move_to;
use crate::operation::{FileOperation, MutationBody, OperationType, OptionResponse};
use crate::remove::remove;
use crate::rename::rename;
use crate::visibility::HiddenFiles;

/// What a path points at.
#[derive(Debug, Clone, PartialEq)]
pub enum Resource {
    /// Directory contents, already filtered and sorted.
    Directory(Vec<DirectoryEntry>),
    /// A regular file the caller can stream from `path`.
    File { path: ResolvedPath, size: u64 },
}

/// Every operation of the engine behind one sandbox root.
///
/// Paths arrive as untrusted relative strings and are resolved before
/// anything touches the filesystem.
#[derive(Debug)]
pub struct OperationExecutor {
    config: ManagerConfig,
    resolver: PathResolver,
    pipeline: UploadPipeline,
    feed: StatusFeed,
    hidden: HiddenFiles,
}

impl OperationExecutor {
    /// Build an executor for `config.root`.
    pub fn new(config: ManagerConfig) -> Result<Self> {
        let resolver = PathResolver::new(&config.root)?;
        let registry = Arc::new(UploadRegistry::new());
        let pipeline = UploadPipeline::new(Arc::clone(&registry), config.max_upload_size);
        let feed = StatusFeed::new(registry, config.feed_tick()).with_retry(config.feed_retry_ms);
        let hidden = HiddenFiles::new(config.show_hidden);

        debug!(root = %resolver.root().display(), "executor ready");
        Ok(Self {
            config,
            resolver,
            pipeline,
            feed,
            hidden,
        })
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    /// The in-flight upload registry.
    pub fn registry(&self) -> &Arc<UploadRegistry> {
        self.pipeline.registry()
    }

    pub fn hidden_files(&self) -> &HiddenFiles {
        &self.hidden
    }

    /// Start a status feed observer. Requires a tokio runtime.
    pub fn subscribe_feed(&self) -> FeedSubscription {
        self.feed.subscribe()
    }

    /// Directory listing or file details for `path`.
    pub async fn get(&self, path: &str) -> Result<Resource> {
        let resolved = self.resolver.resolve(path, false)?;
        let metadata = tokio::fs::metadata(resolved.as_path())
            .await
            .map_err(|e| FileError::io(resolved.as_path(), e))?;

        if metadata.is_dir() {
            Ok(Resource::Directory(list(&resolved, self.hidden.get()).await?))
        } else {
            Ok(Resource::File {
                path: resolved,
                size: metadata.len(),
            })
        }
    }

    /// Delete `path` and forget any upload entry recorded under it.
    pub async fn delete(&self, path: &str) -> Result<()> {
        let resolved = self.resolver.resolve(path, false)?;
        remove(&resolved).await?;
        self.registry().remove(resolved.relative());
        Ok(())
    }

    /// MOVE sources into `path`, or RENAME `path` to the body's target.
    ///
    /// Returns the new locations.
    pub async fn update(
        &self,
        path: &str,
        selector: Option<&str>,
        body: &MutationBody,
    ) -> Result<Vec<ResolvedPath>> {
        let operation = FileOperation::parse(selector, body)?;
        debug!(kind = %operation.kind(), path, "update");
        let resolved = self.resolver.resolve(path, false)?;

        match operation {
            FileOperation::Move { sources } => {
                let sources = self.resolver.resolve_all(&sources, false)?;
                move_to(&sources, &resolved).await
            }
            FileOperation::Rename { target } => {
                let target = self.resolver.resolve(&target, true)?;
                rename(&resolved, &target).await?;
                Ok(vec![target])
            }
            other => Err(unsupported(other.kind())),
        }
    }

    /// CREATE_FOLDER at `path`, or CREATE_ARCHIVE of the body's sources to
    /// `path`. The path must not exist yet.
    ///
    /// Archive entry names are relative to the root.
    pub async fn create(
        &self,
        path: &str,
        selector: Option<&str>,
        body: &MutationBody,
    ) -> Result<Option<ArchiveSummary>> {
        let operation = FileOperation::parse(selector, body)?;
        debug!(kind = %operation.kind(), path, "create");
        let resolved = self.resolve_absent(path).await?;

        match operation {
            FileOperation::CreateFolder => {
                mkdirs(&resolved).await?;
                Ok(None)
            }
            FileOperation::CreateArchive {
                sources,
                embed_dirs,
            } => {
                let request = ArchiveRequest {
                    sources: self.resolver.resolve_all(&sources, false)?,
                    destination: resolved,
                    base_root: self.resolver.root_path(),
                    embed_dirs,
                };
                archive(&request).await.map(Some)
            }
            other => Err(unsupported(other.kind())),
        }
    }

    /// UPLOAD_FILE: stream `body` to `path`, which must not exist yet.
    pub async fn upload<S, B>(
        &self,
        path: &str,
        declared_size: Option<u64>,
        body: S,
    ) -> Result<UploadReceipt>
    where
        S: Stream<Item = io::Result<B>>,
        B: AsRef<[u8]>,
    {
        self.pipeline.check_declared(declared_size)?;
        let resolved = self.resolve_absent(path).await?;
        self.pipeline.receive(&resolved, declared_size, body).await
    }

    /// Hidden-files switch and filter queries.
    pub fn options(&self, selector: Option<&str>) -> Result<OptionResponse> {
        let kind = OperationType::parse(selector)?;
        let response = match kind {
            OperationType::ToggleShowAllFiles => {
                OptionResponse::ShowAllFiles(self.hidden.toggle(None))
            }
            OperationType::GetShowAllFiles => OptionResponse::ShowAllFiles(self.hidden.get()),
            OperationType::ShowAllFilesOn => {
                OptionResponse::ShowAllFiles(self.hidden.toggle(Some(true)))
            }
            OperationType::ShowAllFilesOff => {
                OptionResponse::ShowAllFiles(self.hidden.toggle(Some(false)))
            }
            OperationType::GetFileFilter => OptionResponse::FileFilter(self.config.filters()),
            other => return Err(unsupported(other)),
        };
        Ok(response)
    }

    async fn resolve_absent(&self, path: &str) -> Result<ResolvedPath> {
        let resolved = self.resolver.resolve(path, true)?;
        match tokio::fs::try_exists(resolved.as_path()).await {
            Ok(false) => Ok(resolved),
            Ok(true) => Err(FileError::Conflict {
                path: resolved.as_path().to_path_buf(),
            }),
            // A file sits where a parent directory would be.
            Err(e) if e.kind() == io::ErrorKind::NotADirectory => Err(FileError::Conflict {
                path: resolved.as_path().to_path_buf(),
            }),
            Err(e) => Err(FileError::io(resolved.as_path(), e)),
        }
    }
}

fn unsupported(kind: OperationType) -> FileError {
    FileError::invalid_request(format!("operation type {kind} not allowed here"))
}
