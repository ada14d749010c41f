//! Stream probing via the `ffprobe` CLI.
//!
//! Shells out to `ffprobe -v quiet -print_format json -show_streams` and maps
//! the JSON output into [`StreamInfo`] records for the remux stream mapper.

use std::path::Path;

use serde::Deserialize;

use crate::av::command::ToolCommand;
use crate::error::{Error, Result};

/// A single stream of a media container.
#[derive(Debug, Clone)]
pub struct StreamInfo {
    /// Stream index within the container.
    pub index: u32,
    /// Stream type: `video`, `audio`, `subtitle`, `data`, `attachment`.
    pub codec_type: String,
    /// Codec name as reported by ffprobe, e.g. `h264`.
    pub codec_name: String,
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default = "Vec::new")]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    index: u32,
    codec_type: Option<String>,
    codec_name: Option<String>,
}

/// Probe the streams of a media file.
pub async fn probe_streams(ffprobe: &Path, path: &Path) -> Result<Vec<StreamInfo>> {
    let mut cmd = ToolCommand::new(ffprobe);
    cmd.args(["-v", "quiet", "-print_format", "json", "-show_streams"]);
    cmd.arg(path.to_string_lossy());

    let output = cmd.execute().await?;
    let parsed: FfprobeOutput = serde_json::from_str(&output.stdout)
        .map_err(|e| Error::tool("ffprobe", format!("JSON parse error: {e}")))?;

    Ok(parsed
        .streams
        .into_iter()
        .map(|s| StreamInfo {
            index: s.index,
            codec_type: s.codec_type.unwrap_or_default(),
            codec_name: s.codec_name.unwrap_or_default(),
        })
        .collect())
}
