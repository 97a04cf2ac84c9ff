//! Core types for fileroot.
//!
//! This crate provides the pieces every other fileroot crate builds on: the
//! sandboxing [`PathResolver`], the [`FileError`] taxonomy, listing entry types
//! and the engine configuration.

mod config;
mod entry;
mod error;
mod resolver;

pub use config::{
    DEFAULT_FILE_FILTER, DEFAULT_MAX_UPLOAD_SIZE, DEFAULT_MIME_FILTER, FileFilter,
    ManagerConfig, ManagerConfigBuilder,
};
pub use entry::{DirectoryEntry, EntryKind, is_hidden};
pub use error::{ErrorKind, FileError, Result};
pub use resolver::{PathResolver, ResolvedPath};
