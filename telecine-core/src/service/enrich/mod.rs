//! Enrichment: turn a derived title plus a media attachment into a
//! validated catalog record.

pub mod probe;
pub mod title;
pub mod tmdb;

use std::sync::Arc;

use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::models::{MovieRecord, QualityVariant, ShowRecord};
use crate::upstream::pool::StreamLease;
use crate::upstream::streamer::ByteStreamer;
use crate::upstream::wire::ChatMessage;

pub use probe::{MediaProbe, MediaTracks, ProbeOutcome};
pub use title::{parse_title, quality_label, readable_file_size, sanitize_title, ParsedTitle};
pub use tmdb::{MetadataProvider, TmdbClient};

/// Quality label used when the probe cannot determine one.
const UNKNOWN_QUALITY: &str = "N/A";

const FILE_HASH_LEN: usize = 6;

#[derive(Debug, Clone, PartialEq)]
pub enum EnrichedRecord {
    Movie(MovieRecord),
    Show(ShowRecord),
}

impl EnrichedRecord {
    #[must_use]
    pub fn title(&self) -> &str {
        match self {
            Self::Movie(record) => &record.title,
            Self::Show(record) => &record.title,
        }
    }
}

pub struct EnrichmentClient {
    provider: Arc<dyn MetadataProvider>,
    probe: MediaProbe,
}

impl EnrichmentClient {
    #[must_use]
    pub fn new(provider: Arc<dyn MetadataProvider>, probe: MediaProbe) -> Self {
        Self { provider, probe }
    }

    /// Resolve one ingest item: parse the derived title, route to the
    /// movie or episode lookup, probe the file for its quality variant,
    /// and validate the composed record.
    pub async fn resolve(
        &self,
        derived_title: &str,
        streamer: &Arc<ByteStreamer>,
        lease: StreamLease,
        message: &ChatMessage,
    ) -> Result<EnrichedRecord> {
        info!(derived_title, "processing content");

        let attachment = message
            .ingestible_media()
            .ok_or_else(|| Error::Validation("Message has no streamable media".to_string()))?;

        let parsed = parse_title(derived_title);
        if parsed.title.is_empty() {
            return Err(Error::Validation(
                "Could not parse title from filename".to_string(),
            ));
        }

        let probe_outcome = match self
            .probe
            .probe(streamer, lease, &attachment.locator)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("media probe failed, continuing with defaults: {e}");
                ProbeOutcome {
                    quality: None,
                    tracks: MediaTracks::default(),
                }
            }
        };

        match (parsed.season, parsed.episode) {
            (None, _) => {
                let mut record = self.provider.movie(&parsed.title, parsed.year).await?;
                record.quality = vec![build_variant(message, &probe_outcome, None)];
                validate_movie(&record)?;
                Ok(EnrichedRecord::Movie(record))
            }
            (Some(_), None) => Err(Error::Validation(
                "Episode number not found in filename".to_string(),
            )),
            (Some(season), Some(episode)) => {
                let mut record = self.provider.episode(&parsed.title, season, episode).await?;
                let runtime = record
                    .extra
                    .get("episode_runtime")
                    .and_then(serde_json::Value::as_i64);
                let variant = build_variant(message, &probe_outcome, runtime);
                let episode_slot = record
                    .season
                    .first_mut()
                    .and_then(|s| s.episodes.first_mut())
                    .ok_or_else(|| {
                        Error::Validation("Provider returned no episode entry".to_string())
                    })?;
                episode_slot.quality = vec![variant];
                validate_show(&record)?;
                Ok(EnrichedRecord::Show(record))
            }
        }
    }
}

fn build_variant(
    message: &ChatMessage,
    probe: &ProbeOutcome,
    runtime: Option<i64>,
) -> QualityVariant {
    let locator = match &message.media {
        Some(attachment) => &attachment.locator,
        None => unreachable!("caller checked the attachment"),
    };
    QualityVariant {
        kind: probe
            .quality
            .clone()
            .unwrap_or_else(|| UNKNOWN_QUALITY.to_string()),
        size: readable_file_size(locator.file_size),
        audio: probe.tracks.audio.clone(),
        video_codec: probe.tracks.video_codec.clone(),
        file_type: probe.tracks.file_type.clone(),
        subtitle: probe.tracks.subtitle.clone(),
        file_hash: locator.unique_id.chars().take(FILE_HASH_LEN).collect(),
        msg_id: message.id,
        chat_id: message.chat_id,
        runtime,
    }
}

/// Required ids and a non-empty quality list.
fn validate_movie(record: &MovieRecord) -> Result<()> {
    if record.mid == 0 {
        return Err(Error::Validation("Movie record is missing mid".to_string()));
    }
    if record.quality.is_empty() {
        return Err(Error::Validation(
            "Movie record has no quality variants".to_string(),
        ));
    }
    Ok(())
}

fn validate_show(record: &ShowRecord) -> Result<()> {
    if record.sid == 0 {
        return Err(Error::Validation("Show record is missing sid".to_string()));
    }
    let has_quality = record
        .season
        .iter()
        .flat_map(|s| s.episodes.iter())
        .any(|e| !e.quality.is_empty());
    if !has_quality {
        return Err(Error::Validation(
            "Show record has no quality variants".to_string(),
        ));
    }
    Ok(())
}
