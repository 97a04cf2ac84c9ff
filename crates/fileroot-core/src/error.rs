//! Error types for file resource operations.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display};
use thiserror::Error;

/// Convenience alias used throughout the fileroot crates.
pub type Result<T, E = FileError> = std::result::Result<T, E>;

/// Errors that can occur while resolving paths or operating on files.
#[derive(Debug, Error)]
pub enum FileError {
    /// A client path tried to leave the configured root.
    #[error("Path escapes the root directory: {path}")]
    PathEscape { path: String },

    /// Path not found.
    #[error("Path not found: {path}")]
    NotFound { path: PathBuf },

    /// A directory was expected.
    #[error("Not a directory: {path}")]
    NotADirectory { path: PathBuf },

    /// The destination already exists and may not be overwritten.
    #[error("Destination already exists: {path}")]
    Conflict { path: PathBuf },

    /// A source cannot be used for the requested operation.
    #[error("Invalid source {path}: {reason}")]
    InvalidSource { path: PathBuf, reason: String },

    /// The upload stream failed; the partial file was moved aside.
    #[error("Upload of {path} failed: {source}")]
    UploadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Declared or received upload size is above the configured maximum.
    #[error("Upload size {size} exceeds the limit of {limit} bytes")]
    LimitExceeded { size: u64, limit: u64 },

    /// The request was missing a selector or a required field.
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    /// The root directory itself cannot be removed, moved or renamed.
    #[error("Refusing to modify the root directory")]
    RootProtected,

    /// A multi-source move stopped part way through.
    #[error("Move interrupted after {} item(s): {source}", moved.len())]
    MoveInterrupted {
        moved: Vec<PathBuf>,
        #[source]
        source: Box<FileError>,
    },

    /// The archive writer failed.
    #[error("Failed to write archive {path}: {message}")]
    Archive { path: PathBuf, message: String },

    /// Generic I/O error.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl FileError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound { path },
            std::io::ErrorKind::NotADirectory => Self::NotADirectory { path },
            std::io::ErrorKind::AlreadyExists => Self::Conflict { path },
            _ => Self::Io { path, source },
        }
    }

    /// Create an invalid request error.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// Create an invalid source error.
    pub fn invalid_source(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::InvalidSource {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// The category of this error, for mapping onto transport status codes.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::PathEscape { .. } => ErrorKind::PathEscape,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::NotADirectory { .. } => ErrorKind::NotADirectory,
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::InvalidSource { .. } => ErrorKind::InvalidSource,
            Self::UploadFailed { .. } => ErrorKind::UploadFailed,
            Self::LimitExceeded { .. } => ErrorKind::LimitExceeded,
            Self::InvalidRequest { .. } => ErrorKind::InvalidRequest,
            Self::RootProtected => ErrorKind::RootProtected,
            Self::MoveInterrupted { .. } => ErrorKind::MoveInterrupted,
            Self::Archive { .. } | Self::Io { .. } => ErrorKind::Io,
        }
    }
}

/// Kind of error, without payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    PathEscape,
    NotFound,
    NotADirectory,
    Conflict,
    InvalidSource,
    UploadFailed,
    LimitExceeded,
    InvalidRequest,
    RootProtected,
    MoveInterrupted,
    Io,
}

impl ErrorKind {
    /// Whether this kind indicates a problem with the caller's input rather
    /// than with the server.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, Self::UploadFailed | Self::Io)
    }
}
