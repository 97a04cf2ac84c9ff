//! Upload handling for fileroot.
//!
//! - [`UploadPipeline`] streams a request body to disk and commits it with a
//!   two-step rename.
//! - [`UploadRegistry`] tracks in-flight uploads and their progress.
//! - [`StatusFeed`] pushes registry changes to observers.

mod feed;
mod pipeline;
mod registry;

pub use feed::{DEFAULT_RETRY_MS, FeedEvent, FeedSubscription, StatusFeed};
pub use pipeline::{UploadPipeline, UploadReceipt};
pub use registry::{
    DONE_SUFFIX, ERROR_SUFFIX, RegistrySnapshot, UPLOADING_SUFFIX, UploadEntry, UploadRegistry,
    UploadState, error_id, uploading_id,
};
