//! Media probe: writes the first streamed chunk of a file to a scratch
//! path, runs the `mediainfo` CLI over it, and derives the quality
//! label and track summary for the quality variant.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;
use tokio_stream::StreamExt;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::upstream::pool::StreamLease;
use crate::upstream::streamer::ByteStreamer;
use crate::upstream::wire::FileLocator;

use super::title::quality_label;

/// One aligned chunk is enough for container headers.
const SAMPLE_CHUNK: u32 = 1024 * 1024;

const SAMPLE_ID_LEN: usize = 12;

/// Track summary extracted from the container headers. Missing tracks
/// degrade to "N/A" rather than failing the probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaTracks {
    pub file_type: String,
    pub video_codec: String,
    pub audio: String,
    pub subtitle: String,
}

impl Default for MediaTracks {
    fn default() -> Self {
        Self {
            file_type: "N/A".to_string(),
            video_codec: "N/A".to_string(),
            audio: "N/A".to_string(),
            subtitle: "N/A".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub quality: Option<String>,
    pub tracks: MediaTracks,
}

/// Sample file removed on every exit path, including cancellation.
struct ScopedSample {
    path: PathBuf,
}

impl Drop for ScopedSample {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), "failed to remove probe sample: {e}");
            }
        }
    }
}

pub struct MediaProbe {
    dir: PathBuf,
}

impl MediaProbe {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Probe the file behind `locator` using one streamed chunk fetched
    /// through `streamer` on the leased slot.
    pub async fn probe(
        &self,
        streamer: &Arc<ByteStreamer>,
        lease: StreamLease,
        locator: &FileLocator,
    ) -> Result<ProbeOutcome> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| Error::Internal(format!("failed to create probe dir: {e}")))?;

        let id_prefix: String = locator.unique_id.chars().take(SAMPLE_ID_LEN).collect();
        let sample = ScopedSample {
            path: self.dir.join(format!("sample_{id_prefix}")),
        };

        let mut stream = streamer.yield_file(
            locator.clone(),
            lease,
            0,
            0,
            SAMPLE_CHUNK as usize,
            1,
            SAMPLE_CHUNK,
        );
        let first_chunk = match stream.next().await {
            Some(chunk) => chunk?,
            None => return Err(Error::NotFound("file has no content to probe".to_string())),
        };
        drop(stream);

        tokio::fs::write(&sample.path, &first_chunk)
            .await
            .map_err(|e| Error::Internal(format!("failed to write probe sample: {e}")))?;

        let (height, tracks) = inspect_sample(&sample.path).await?;
        debug!(?height, ?tracks, "probed media sample");

        Ok(ProbeOutcome {
            quality: height.map(|h| quality_label(h).to_string()),
            tracks,
        })
    }
}

/// Run `mediainfo --Output=JSON` over the sample and parse the tracks.
async fn inspect_sample(path: &Path) -> Result<(Option<u32>, MediaTracks)> {
    let output = tokio::process::Command::new("mediainfo")
        .arg("--Output=JSON")
        .arg(path)
        .output()
        .await
        .map_err(|e| Error::Internal(format!("failed to run mediainfo: {e}")))?;

    if !output.status.success() {
        return Err(Error::Internal(format!(
            "mediainfo exited with {}",
            output.status
        )));
    }

    let raw = String::from_utf8_lossy(&output.stdout);
    Ok(parse_mediainfo_json(&raw))
}

/// Extract frame height and the track summary from mediainfo JSON.
/// Tolerates missing sections and both string and numeric heights.
#[must_use]
pub fn parse_mediainfo_json(raw: &str) -> (Option<u32>, MediaTracks) {
    let mut tracks = MediaTracks::default();
    let mut height = None;

    let parsed: Value = match serde_json::from_str(raw) {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!("unparseable mediainfo output: {e}");
            return (None, tracks);
        }
    };

    let track_list = parsed
        .get("media")
        .and_then(|m| m.get("track"))
        .and_then(Value::as_array);
    let Some(track_list) = track_list else {
        return (None, tracks);
    };

    for track in track_list {
        match track.get("@type").and_then(Value::as_str) {
            Some("General") => {
                if let Some(format) = track.get("Format").and_then(Value::as_str) {
                    tracks.file_type = format.to_lowercase();
                }
                if let Some(audio) = track.get("Audio_Language_List").and_then(Value::as_str) {
                    tracks.audio = audio.to_string();
                }
            }
            Some("Video") => {
                if let Some(codec) = track.get("Encoded_Library_Name").and_then(Value::as_str) {
                    tracks.video_codec = codec.to_string();
                }
                height = height.or_else(|| numeric_field(track.get("Height")));
            }
            Some("Text") | Some("Subtitle") => {
                if let Some(format) = track.get("Format").and_then(Value::as_str) {
                    tracks.subtitle = format.to_string();
                }
            }
            _ => {}
        }
    }

    (height, tracks)
}

fn numeric_field(value: Option<&Value>) -> Option<u32> {
    match value? {
        Value::Number(n) => n.as_u64().map(|v| v as u32),
        Value::String(s) => s.parse::<u32>().ok(),
        _ => None,
    }
}
