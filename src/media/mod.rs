//! Media value types and ID handling.

pub mod format;
pub mod mime;

use std::path::{Path, PathBuf};

use crate::meta::Metadata;
use format::Format;

/// Check whether the supplied string is a valid media or repository ID
/// (`^[a-z0-9-_]+$`).
pub fn valid_id(s: &str) -> bool {
    !s.is_empty()
        && s.bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-' || b == b'_')
}

/// Sanitize a string into a valid ID.
///
/// Lowercases, maps spaces and dots to `-` and drops anything else outside
/// `[a-z0-9-_]`. Example: `"Test.mkv"` -> `"test-mkv"`.
pub fn sanitize_id(s: &str) -> String {
    s.chars()
        .filter_map(|c| match c {
            ' ' | '.' => Some('-'),
            _ => {
                let c = c.to_ascii_lowercase();
                (c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_').then_some(c)
            }
        })
        .collect()
}

/// A media file known to a repository.
///
/// The path is absolute while the media lives in a repository; the index
/// decorator relativizes it on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct Media {
    /// Media ID, unique per repository (`[a-z0-9-_]`).
    pub id: String,
    /// Absolute path of the media file.
    pub path: PathBuf,
    /// MIME type of the media file.
    pub mime: String,
    /// Resolved metadata, if any source produced a match.
    pub meta: Option<Metadata>,
}

impl Media {
    /// Create a media value.
    pub fn new(
        id: impl Into<String>,
        path: impl Into<PathBuf>,
        mime: impl Into<String>,
        meta: Option<Metadata>,
    ) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
            mime: mime.into(),
            meta,
        }
    }

    /// The container format of this media, resolved through the registry.
    ///
    /// Unregistered MIME types yield an unsupported placeholder named after
    /// the file extension.
    pub fn format(&self) -> Format {
        let ext = self
            .path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        format::find_or_unsupported(&self.mime, ext)
    }

    /// A copy of this media relocated to a different path and MIME type,
    /// used by the mux cache to point at converted outputs.
    pub fn relocated(&self, path: impl Into<PathBuf>, mime: impl Into<String>) -> Self {
        Self {
            id: self.id.clone(),
            path: path.into(),
            mime: mime.into(),
            meta: self.meta.clone(),
        }
    }
}

/// Whether a path's file name is dot-prefixed and therefore excluded from
/// all repository handling.
pub fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('.'))
}
