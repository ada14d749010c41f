//! Container format registry.
//!
//! Formats are compared by value; the registered ones are statics so the rest
//! of the crate can pass around `&'static Format` references.

use std::borrow::Cow;

use serde::Serialize;

/// A media container format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Format {
    /// Container format name, e.g. `"MP4"`.
    pub name: Cow<'static, str>,
    /// Format MIME type, e.g. `"video/mp4"`.
    pub mime: Cow<'static, str>,
    /// Preferred file extension, without a leading dot.
    pub extension: Cow<'static, str>,
    /// Whether the format is registered (false for placeholders built by
    /// [`find_or_unsupported`]).
    pub supported: bool,
}

/// The MP4 container format (.mp4, video/mp4).
pub static MP4: Format = Format {
    name: Cow::Borrowed("MP4"),
    mime: Cow::Borrowed("video/mp4"),
    extension: Cow::Borrowed("mp4"),
    supported: true,
};

/// The Matroska container format (.mkv, video/x-matroska).
pub static MKV: Format = Format {
    name: Cow::Borrowed("MKV"),
    mime: Cow::Borrowed("video/x-matroska"),
    extension: Cow::Borrowed("mkv"),
    supported: true,
};

static FORMATS: [&Format; 2] = [&MP4, &MKV];

/// All registered formats.
pub fn formats() -> impl Iterator<Item = &'static Format> {
    FORMATS.iter().copied()
}

/// Look up a registered format by name, case-insensitively.
pub fn find_by_name(name: &str) -> Option<&'static Format> {
    formats().find(|f| f.name.eq_ignore_ascii_case(name))
}

/// Look up a registered format by MIME type.
pub fn find_by_mime(mime: &str) -> Option<&'static Format> {
    formats().find(|f| f.mime == mime)
}

/// Look up a registered format by MIME type, falling back to an unsupported
/// placeholder built from the MIME type and extension.
pub fn find_or_unsupported(mime: &str, extension: &str) -> Format {
    match find_by_mime(mime) {
        Some(f) => f.clone(),
        None => Format {
            name: Cow::Owned(extension.to_ascii_uppercase()),
            mime: Cow::Owned(mime.to_string()),
            extension: Cow::Owned(extension.to_ascii_lowercase()),
            supported: false,
        },
    }
}
