//! Container remuxing via the `ffmpeg` CLI.
//!
//! A remux is a stream copy: the input is probed, streams whose codec the
//! target container cannot carry are dropped (logged), the rest are mapped
//! into the output with `-c copy`. The output is written to a temporary
//! `.part` file and renamed into place only on success, so the cache never
//! holds truncated conversions.

use std::path::Path;

use async_trait::async_trait;

use crate::av::command::ToolCommand;
use crate::av::probe::{probe_streams, StreamInfo};
use crate::av::tools::ToolRegistry;
use crate::error::{Error, Result};
use crate::media::format::Format;

/// A remux engine converting media files between container formats.
#[async_trait]
pub trait Remuxer: Send + Sync {
    /// Whether this engine can produce the given target format.
    fn supports(&self, format: &Format) -> bool;

    /// Stream-copy `src` into `dst` using the target container format.
    async fn remux(&self, src: &Path, dst: &Path, format: &Format) -> Result<()>;
}

/// [`Remuxer`] backed by ffmpeg and ffprobe.
#[derive(Debug, Clone)]
pub struct FfmpegRemuxer {
    tools: ToolRegistry,
}

impl FfmpegRemuxer {
    pub fn new(tools: ToolRegistry) -> Self {
        Self { tools }
    }
}

/// The ffmpeg muxer name for a registered format.
fn muxer_name(format: &Format) -> Option<&'static str> {
    match format.extension.as_ref() {
        "mp4" => Some("mp4"),
        "mkv" => Some("matroska"),
        _ => None,
    }
}

/// Whether the target container can carry a stream's codec without
/// re-encoding.
fn container_supports(format: &Format, stream: &StreamInfo) -> bool {
    let codec = stream.codec_name.as_str();
    match format.extension.as_ref() {
        "mp4" => match stream.codec_type.as_str() {
            "video" => matches!(codec, "h264" | "hevc" | "av1" | "vp9" | "mpeg4" | "mpeg2video"),
            "audio" => matches!(codec, "aac" | "mp3" | "ac3" | "eac3" | "opus" | "flac" | "alac"),
            "subtitle" => codec == "mov_text",
            _ => false,
        },
        // Matroska carries nearly everything except MP4 timed text.
        "mkv" => match stream.codec_type.as_str() {
            "video" | "audio" | "attachment" => true,
            "subtitle" => codec != "mov_text",
            _ => false,
        },
        _ => false,
    }
}

#[async_trait]
impl Remuxer for FfmpegRemuxer {
    fn supports(&self, format: &Format) -> bool {
        format.supported
            && muxer_name(format).is_some()
            && self.tools.available("ffmpeg")
            && self.tools.available("ffprobe")
    }

    async fn remux(&self, src: &Path, dst: &Path, format: &Format) -> Result<()> {
        let muxer = muxer_name(format).ok_or_else(|| Error::UnsupportedFormat {
            format: format.name.to_string(),
            operation: "muxing",
        })?;

        let ffprobe = self.tools.require("ffprobe")?;
        let ffmpeg = self.tools.require("ffmpeg")?;

        let streams = probe_streams(ffprobe, src).await?;
        let mut kept = Vec::new();
        for stream in &streams {
            if container_supports(format, stream) {
                kept.push(stream.index);
            } else {
                tracing::warn!(
                    codec = %stream.codec_name,
                    stream = stream.index,
                    format = %format.name,
                    src = %src.display(),
                    "skipping codec unsupported by target container"
                );
            }
        }

        if kept.is_empty() {
            return Err(Error::tool(
                "ffmpeg",
                format!("no stream of {} fits into {}", src.display(), format.name),
            ));
        }

        let mut part = dst.as_os_str().to_owned();
        part.push(".part");
        let part = std::path::PathBuf::from(part);

        let mut cmd = ToolCommand::new(ffmpeg);
        cmd.args(["-y", "-i"]);
        cmd.arg(src.to_string_lossy());
        for index in kept {
            cmd.arg("-map");
            cmd.arg(format!("0:{index}"));
        }
        cmd.args(["-c", "copy"]);
        if muxer == "mp4" {
            cmd.args(["-movflags", "+faststart"]);
        }
        cmd.args(["-f", muxer]);
        cmd.arg(part.to_string_lossy());

        if let Err(e) = cmd.execute().await {
            let _ = tokio::fs::remove_file(&part).await;
            return Err(e);
        }

        tokio::fs::rename(&part, dst).await?;
        Ok(())
    }
}
