//! MIME type detection for media files.
//!
//! Detection is content-first: the common audio/video containers all carry a
//! distinctive signature in their first bytes (EBML header, `ftyp` box, OggS
//! capture pattern, ...). Files without a recognizable signature fall back to
//! an extension table.

use std::io::Read;
use std::path::Path;

/// MIME top-level groups accepted into a repository.
const ALLOWED_GROUPS: [&str; 2] = ["video", "audio"];

/// Fallback MIME type for undetectable content.
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Detect the MIME type of a file from its content, falling back to the
/// extension table for formats without a distinctive signature.
pub fn detect_file(path: &Path) -> std::io::Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut magic = [0u8; 16];
    let mut read = 0;
    while read < magic.len() {
        let n = file.read(&mut magic[read..])?;
        if n == 0 {
            break;
        }
        read += n;
    }

    let ext = extension_of(path);
    if let Some(mime) = sniff(&magic[..read], &ext) {
        return Ok(mime.to_string());
    }

    Ok(by_extension(&ext).unwrap_or(OCTET_STREAM).to_string())
}

/// The top-level group of a MIME type (`"video/mp4"` -> `"video"`).
pub fn group(mime: &str) -> &str {
    mime.split('/').next().unwrap_or(mime)
}

/// Whether the MIME type belongs to a group a repository accepts.
pub fn is_media(mime: &str) -> bool {
    ALLOWED_GROUPS.contains(&group(mime))
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default()
}

/// Match magic bytes against known container signatures.
///
/// The extension only disambiguates within a detected family (e.g. Matroska
/// vs. WebM share the EBML header).
fn sniff(magic: &[u8], ext: &str) -> Option<&'static str> {
    if magic.len() < 12 {
        return None;
    }

    // EBML header: Matroska and WebM.
    if magic[0..4] == [0x1A, 0x45, 0xDF, 0xA3] {
        return Some(match ext {
            "webm" => "video/webm",
            "mka" => "audio/x-matroska",
            _ => "video/x-matroska",
        });
    }

    // ISO base media: ftyp box at offset 4, or a bare top-level box.
    if &magic[4..8] == b"ftyp" {
        return Some(match &magic[8..11] {
            b"M4A" | b"M4B" => "audio/mp4",
            _ => "video/mp4",
        });
    }
    if &magic[4..8] == b"moov" || &magic[4..8] == b"mdat" || &magic[4..8] == b"free" {
        return Some("video/mp4");
    }

    if &magic[0..4] == b"OggS" {
        return Some(if ext == "ogv" { "video/ogg" } else { "audio/ogg" });
    }

    if &magic[0..4] == b"fLaC" {
        return Some("audio/flac");
    }

    // MP3: ID3 tag or a bare MPEG audio frame sync.
    if &magic[0..3] == b"ID3" || (magic[0] == 0xFF && magic[1] & 0xE0 == 0xE0) {
        return Some("audio/mpeg");
    }

    if &magic[0..4] == b"RIFF" {
        return match &magic[8..12] {
            b"WAVE" => Some("audio/wav"),
            b"AVI " => Some("video/x-msvideo"),
            _ => None,
        };
    }

    // MPEG program stream / transport stream.
    if magic[0..4] == [0x00, 0x00, 0x01, 0xBA] {
        return Some("video/mpeg");
    }
    if magic[0] == 0x47 && matches!(ext, "ts" | "m2ts" | "mts") {
        return Some("video/MP2T");
    }

    None
}

/// Extension fallback table for containers without a usable signature.
fn by_extension(ext: &str) -> Option<&'static str> {
    let mime = match ext {
        "mp4" | "m4v" => "video/mp4",
        "mkv" => "video/x-matroska",
        "webm" => "video/webm",
        "avi" => "video/x-msvideo",
        "mov" => "video/quicktime",
        "ts" | "m2ts" | "mts" => "video/MP2T",
        "mpg" | "mpeg" => "video/mpeg",
        "wmv" => "video/x-ms-wmv",
        "ogv" => "video/ogg",
        "mp3" => "audio/mpeg",
        "flac" => "audio/flac",
        "wav" => "audio/wav",
        "m4a" | "m4b" => "audio/mp4",
        "aac" => "audio/aac",
        "ogg" | "oga" => "audio/ogg",
        "mka" => "audio/x-matroska",
        "wma" => "audio/x-ms-wma",
        _ => return None,
    };

    Some(mime)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn detect_bytes(name: &str, bytes: &[u8]) -> String {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(bytes).unwrap();
        detect_file(&path).unwrap()
    }

    #[test]
    fn ebml_magic_is_matroska() {
        let mut bytes = vec![0x1A, 0x45, 0xDF, 0xA3];
        bytes.extend_from_slice(&[0u8; 32]);
        assert_eq!(detect_bytes("a.mkv", &bytes), "video/x-matroska");
        assert_eq!(detect_bytes("a.webm", &bytes), "video/webm");
    }

    #[test]
    fn ftyp_is_mp4() {
        let mut bytes = vec![0, 0, 0, 0x20];
        bytes.extend_from_slice(b"ftypisom");
        bytes.extend_from_slice(&[0u8; 16]);
        assert_eq!(detect_bytes("a.mp4", &bytes), "video/mp4");
    }

    #[test]
    fn plain_text_is_not_media() {
        let mime = detect_bytes("notes.txt", b"just some notes, nothing more");
        assert_eq!(mime, OCTET_STREAM);
        assert!(!is_media(&mime));
    }

    #[test]
    fn extension_fallback_without_signature() {
        // Arbitrary payload with a media extension still classifies.
        let mime = detect_bytes("b.mkv", &[0u8; 64]);
        assert_eq!(mime, "video/x-matroska");
        assert!(is_media(&mime));
    }

    #[test]
    fn groups() {
        assert_eq!(group("video/mp4"), "video");
        assert!(is_media("audio/flac"));
        assert!(!is_media("text/plain"));
    }
}
