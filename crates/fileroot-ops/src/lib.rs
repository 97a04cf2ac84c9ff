//! File operations engine for fileroot.
//!
//! Every operation takes [`ResolvedPath`]s, so nothing here can touch the
//! filesystem outside the configured root. Blocking filesystem work runs on
//! tokio's blocking pool. [`OperationExecutor`] ties the operations, the
//! upload pipeline and the hidden-files toggle together behind the request
//! vocabulary of the file manager API.
//!
//! [`ResolvedPath`]: fileroot_core::ResolvedPath

mod archive;
mod create;
mod executor;
mod list;
mod move_op;
mod operation;
mod remove;
mod rename;
mod visibility;

use std::path::{Path, PathBuf};

use fileroot_core::{FileError, Result};

pub use archive::{ArchiveFormat, ArchiveRequest, ArchiveSummary, archive};
pub use create::mkdirs;
pub use executor::{OperationExecutor, Resource};
pub use list::list;
pub use move_op::move_to;
pub use operation::{FileOperation, MutationBody, OperationType, OptionResponse};
pub use remove::remove;
pub use rename::{rename, validate_filename};
pub use visibility::HiddenFiles;

/// Run blocking filesystem work for `path` on the blocking pool.
pub(crate) async fn blocking<T, F>(path: &Path, work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let path: PathBuf = path.to_path_buf();
    match tokio::task::spawn_blocking(work).await {
        Ok(result) => result,
        Err(e) => Err(FileError::Io {
            path,
            source: std::io::Error::other(format!("Task failed: {e}")),
        }),
    }
}
