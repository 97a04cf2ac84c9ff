//! Streaming upload with two-step atomic commit.
//!
//! Bytes land in `<target>.uploading`. A clean end of stream renames it to
//! `<target>.done` and then to the target, so the final name only ever
//! refers to a complete file. A `.done` leftover means "fully received, commit
//! failed"; an `.uploading` leftover means "never finished receiving". Stream
//! errors, over-limit bodies and dropped futures all end in `<target>.error`
//! with the registry entry moved to the matching error id.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, info, warn};

use fileroot_core::{FileError, ResolvedPath, Result};

use crate::registry::{
    DONE_SUFFIX, ERROR_SUFFIX, UPLOADING_SUFFIX, UploadEntry, UploadRegistry,
};

/// Outcome of a committed upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReceipt {
    /// Where the file now lives.
    pub path: ResolvedPath,
    /// Bytes written.
    pub bytes: u64,
}

/// Receives upload streams and tracks them in a shared registry.
#[derive(Debug, Clone)]
pub struct UploadPipeline {
    registry: Arc<UploadRegistry>,
    max_upload_size: u64,
}

impl UploadPipeline {
    /// Create a pipeline reporting into `registry`.
    pub fn new(registry: Arc<UploadRegistry>, max_upload_size: u64) -> Self {
        Self {
            registry,
            max_upload_size,
        }
    }

    /// The registry this pipeline reports into.
    pub fn registry(&self) -> &Arc<UploadRegistry> {
        &self.registry
    }

    /// Largest accepted upload in bytes.
    pub fn max_upload_size(&self) -> u64 {
        self.max_upload_size
    }

    /// Reject a declared size above the limit before any body is accepted.
    pub fn check_declared(&self, declared_size: Option<u64>) -> Result<()> {
        match declared_size {
            Some(size) if size > self.max_upload_size => Err(FileError::LimitExceeded {
                size,
                limit: self.max_upload_size,
            }),
            _ => Ok(()),
        }
    }

    /// Stream `body` into `target` and commit it.
    ///
    /// An existing file at `target` is replaced by the final rename. Only one
    /// upload per target can be in flight: a second one fails with
    /// [`FileError::Conflict`] and leaves the first untouched. Dropping the
    /// returned future before it completes is handled like a stream error.
    pub async fn receive<S, B>(
        &self,
        target: &ResolvedPath,
        declared_size: Option<u64>,
        body: S,
    ) -> Result<UploadReceipt>
    where
        S: Stream<Item = io::Result<B>>,
        B: AsRef<[u8]>,
    {
        self.check_declared(declared_size)?;

        let uploading = target.with_suffix(UPLOADING_SUFFIX)?;
        let done = target.with_suffix(DONE_SUFFIX)?;
        let failed = target.with_suffix(ERROR_SUFFIX)?;

        let file = match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(uploading.as_path())
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                debug!(path = %target, "upload already in flight");
                return Err(FileError::Conflict {
                    path: uploading.as_path().to_path_buf(),
                });
            }
            Err(e) => return Err(upload_failed(target, e)),
        };

        let id = uploading.relative().to_string();
        if !self.registry.try_put(id.clone(), UploadEntry::new(declared_size)) {
            // Another upload still owns the id while committing.
            drop(file);
            if let Err(e) = fs::remove_file(uploading.as_path()).await {
                warn!(path = %uploading, error = %e, "could not remove duplicate upload file");
            }
            return Err(FileError::Conflict {
                path: uploading.as_path().to_path_buf(),
            });
        }
        debug!(path = %target, ?declared_size, "upload started");

        let mut guard = UploadGuard {
            registry: &self.registry,
            id,
            file: Some(file),
            uploading: uploading.as_path().to_path_buf(),
            done: done.as_path().to_path_buf(),
            failed: failed.as_path().to_path_buf(),
            target: target.as_path().to_path_buf(),
            stage: Stage::Receiving,
        };

        let mut received = 0u64;
        tokio::pin!(body);
        while let Some(chunk) = body.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => return Err(guard.fail(e).await),
            };
            let bytes = chunk.as_ref();
            if bytes.is_empty() {
                continue;
            }

            let len = bytes.len() as u64;
            received += len;
            if received > self.max_upload_size {
                let cause = io::Error::new(
                    io::ErrorKind::FileTooLarge,
                    "upload exceeded the size limit",
                );
                let _ = guard.fail(cause).await;
                return Err(FileError::LimitExceeded {
                    size: received,
                    limit: self.max_upload_size,
                });
            }

            if let Err(e) = guard.write(bytes).await {
                return Err(guard.fail(e).await);
            }
            self.registry.update(&guard.id, len);
        }

        debug!(path = %target, bytes = received, "upload: all bytes received");
        if let Err(e) = guard.finish_file().await {
            return Err(guard.fail(e).await);
        }
        if let Some(declared) = declared_size {
            if declared != received {
                debug!(path = %target, declared, received, "upload size differs from declaration");
            }
        }

        guard.commit().await?;
        info!(path = %target, bytes = received, "upload finished");

        Ok(UploadReceipt {
            path: target.clone(),
            bytes: received,
        })
    }
}

fn upload_failed(target: impl AsRef<Path>, source: io::Error) -> FileError {
    FileError::UploadFailed {
        path: target.as_ref().to_path_buf(),
        source,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Receiving,
    Committing,
    Finished,
}

/// Owns the temporary file and registry entry of one upload until it either
/// commits or fails. Dropped while still receiving or committing, it fails the
/// upload synchronously.
struct UploadGuard<'a> {
    registry: &'a UploadRegistry,
    id: String,
    file: Option<File>,
    uploading: PathBuf,
    done: PathBuf,
    failed: PathBuf,
    target: PathBuf,
    stage: Stage,
}

impl UploadGuard<'_> {
    async fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        match self.file.as_mut() {
            Some(file) => file.write_all(bytes).await,
            None => Err(io::Error::other("upload file already closed")),
        }
    }

    /// Flush, sync and close the temporary file.
    async fn finish_file(&mut self) -> io::Result<()> {
        if let Some(mut file) = self.file.take() {
            file.flush().await?;
            file.sync_all().await?;
        }
        Ok(())
    }

    /// Move the partial file aside and the registry entry to its error id.
    async fn fail(&mut self, cause: io::Error) -> FileError {
        self.file.take();
        if let Err(e) = fs::rename(&self.uploading, &self.failed).await {
            warn!(path = %self.uploading.display(), error = %e, "could not mark upload as failed");
        }
        self.stage = Stage::Finished;
        let failed_id = self.registry.mark_error(&self.id);
        warn!(
            path = %self.target.display(),
            id = ?failed_id,
            error = %cause,
            "upload failed"
        );
        upload_failed(&self.target, cause)
    }

    /// `.uploading` → `.done` → target, then forget the registry entry.
    async fn commit(&mut self) -> Result<()> {
        if let Err(e) = fs::rename(&self.uploading, &self.done).await {
            return Err(self.fail(e).await);
        }

        self.stage = Stage::Committing;
        self.registry.mark_done(&self.id);

        if let Err(e) = fs::rename(&self.done, &self.target).await {
            self.stage = Stage::Finished;
            self.registry.mark_error(&self.id);
            warn!(
                path = %self.done.display(),
                error = %e,
                "upload received but commit failed"
            );
            return Err(upload_failed(&self.target, e));
        }

        self.stage = Stage::Finished;
        self.registry.remove(&self.id);
        Ok(())
    }
}

impl Drop for UploadGuard<'_> {
    fn drop(&mut self) {
        match self.stage {
            Stage::Finished => {}
            Stage::Receiving => {
                self.file.take();
                if let Err(e) = std::fs::rename(&self.uploading, &self.failed) {
                    debug!(path = %self.uploading.display(), error = %e, "abandoned upload not renamed");
                }
                self.registry.mark_error(&self.id);
                warn!(path = %self.target.display(), "upload abandoned before completion");
            }
            Stage::Committing => {
                self.registry.mark_error(&self.id);
                warn!(path = %self.target.display(), "upload abandoned during commit");
            }
        }
    }
}
