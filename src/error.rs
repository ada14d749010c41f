//! Unified error type for the reelvault core.
//!
//! Repository operations fail with a small closed set of domain errors; the
//! HTTP layer derives its wire-level error payloads from these via
//! [`Error::kind`].

use std::path::PathBuf;

/// Unified error type covering all failure modes in the repository stack.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A media or repository ID does not match `^[a-z0-9-_]+$`.
    #[error("invalid id {id:?}, expected ^[a-z0-9-_]+$")]
    InvalidId {
        /// The offending ID.
        id: String,
    },

    /// A media path cannot be made relative to the repository root.
    #[error("invalid media path {}, outside of repository root {}", path.display(), root.display())]
    InvalidMediaPath {
        /// The offending path.
        path: PathBuf,
        /// The repository root directory.
        root: PathBuf,
    },

    /// A media file's MIME top-level group is neither `video` nor `audio`.
    #[error("invalid media MIME type {mime} for {}", path.display())]
    InvalidMediaType {
        /// The offending media path.
        path: PathBuf,
        /// The detected MIME type.
        mime: String,
    },

    /// A media ID is already present in the repository.
    #[error("duplicate media id {id} in repository {repo}")]
    DuplicateId {
        /// The offending ID.
        id: String,
        /// The repository ID.
        repo: String,
    },

    /// A media path is already present in the repository.
    #[error("duplicate media path {} in repository {repo}", path.display())]
    DuplicatePath {
        /// The offending repository-relative path.
        path: PathBuf,
        /// The repository ID.
        repo: String,
    },

    /// A remux or transcode was requested for a format with no engine.
    #[error("unsupported format {format} for {operation}")]
    UnsupportedFormat {
        /// The offending format name.
        format: String,
        /// The unsupported operation.
        operation: &'static str,
    },

    /// The repository does not carry the capability for the operation.
    #[error("unsupported operation {operation}")]
    UnsupportedOperation {
        /// The unsupported operation.
        operation: &'static str,
    },

    /// A metadata query is malformed.
    #[error("invalid metadata query {query:?}")]
    InvalidQuery {
        /// The query text.
        query: String,
    },

    /// A remote metadata lookup failed.
    #[error("metadata source error: {0}")]
    Source(String),

    /// An external tool (ffmpeg, ffprobe) failed.
    #[error("tool error [{tool}]: {message}")]
    Tool {
        /// Name of the tool that failed.
        tool: String,
        /// Human-readable error description.
        message: String,
    },

    /// Filesystem watcher error.
    #[error("filesystem watch error: {0}")]
    Watch(#[from] notify::Error),

    /// Index (de)serialization failed.
    #[error("index serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// An I/O operation failed.
    #[error("io error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },
}

/// Coarse error classification used by the HTTP layer's error payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    MissingCapability,
    UnknownFormat,
    BadRequest,
    Internal,
}

impl Error {
    /// Classify this error for wire-level reporting.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidId { .. }
            | Error::InvalidMediaPath { .. }
            | Error::InvalidMediaType { .. }
            | Error::DuplicateId { .. }
            | Error::DuplicatePath { .. }
            | Error::InvalidQuery { .. } => ErrorKind::BadRequest,
            Error::UnsupportedFormat { .. } => ErrorKind::UnknownFormat,
            Error::UnsupportedOperation { .. } => ErrorKind::MissingCapability,
            Error::Source(_)
            | Error::Tool { .. }
            | Error::Watch(_)
            | Error::Json(_)
            | Error::Io { .. } => ErrorKind::Internal,
        }
    }

    /// Convenience constructor for [`Error::Tool`].
    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Tool {
            tool: tool.into(),
            message: message.into(),
        }
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
