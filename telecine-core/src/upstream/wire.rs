//! Wire-level types and traits for the upstream messaging platform.
//!
//! Everything the streaming pipeline and the bot surface need from the
//! platform is expressed here; the concrete codec lives on the other
//! side of [`Connector`].

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type DcId = i32;

#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WireError {
    /// Rate limit: retry after the given number of seconds.
    #[error("flood wait: {0}s")]
    FloodWait(u64),

    /// Imported authorization bytes were rejected by the target DC.
    #[error("authorization bytes invalid")]
    AuthBytesInvalid,

    #[error("request timed out")]
    Timeout,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("connection lost")]
    Disconnected,

    #[error("rpc error: {0}")]
    Rpc(String),

    #[error("io error: {0}")]
    Io(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    Photo,
    Document,
    ChatPhoto,
}

/// Upstream-opaque coordinates of one stored file, decoded from a media
/// message. Immutable once obtained; cached entries are flushed on the
/// periodic clean interval, so holders must tolerate staleness.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileLocator {
    pub dc_id: DcId,
    pub media_id: i64,
    pub access_hash: i64,
    pub file_reference: Vec<u8>,
    pub kind: FileKind,
    pub unique_id: String,
    #[serde(default)]
    pub file_name: Option<String>,
    pub file_size: u64,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub thumb_size: String,
    /// Chat-photo locators address the peer instead of a media id.
    #[serde(default)]
    pub chat_id: Option<i64>,
    #[serde(default)]
    pub chat_access_hash: Option<i64>,
    #[serde(default)]
    pub big_photo: bool,
}

/// The `GetFile` location variant derived from a locator's kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "variant")]
pub enum Location {
    Document {
        id: i64,
        access_hash: i64,
        file_reference: Vec<u8>,
    },
    Photo {
        id: i64,
        access_hash: i64,
        file_reference: Vec<u8>,
        thumb_size: String,
    },
    ChatPhoto {
        chat_id: i64,
        access_hash: i64,
        big: bool,
    },
}

impl Location {
    #[must_use]
    pub fn for_locator(locator: &FileLocator) -> Self {
        match locator.kind {
            FileKind::ChatPhoto => Self::ChatPhoto {
                chat_id: locator.chat_id.unwrap_or_default(),
                access_hash: locator.chat_access_hash.unwrap_or_default(),
                big: locator.big_photo,
            },
            FileKind::Photo => Self::Photo {
                id: locator.media_id,
                access_hash: locator.access_hash,
                file_reference: locator.file_reference.clone(),
                thumb_size: locator.thumb_size.clone(),
            },
            FileKind::Document => Self::Document {
                id: locator.media_id,
                access_hash: locator.access_hash,
                file_reference: locator.file_reference.clone(),
            },
        }
    }
}

/// Authorization exported from the primary session for bootstrapping a
/// media session on a foreign DC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportedAuthorization {
    pub id: i64,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Video,
    Document,
    Animation,
    Photo,
    Audio,
    Voice,
    VideoNote,
    Sticker,
}

impl MediaKind {
    /// Media kinds the ingestion pipeline accepts.
    #[must_use]
    pub fn is_ingestible(&self) -> bool {
        matches!(self, Self::Video | Self::Document | Self::Animation)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaAttachment {
    pub kind: MediaKind,
    pub locator: FileLocator,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: i64,
    pub chat_id: i64,
    #[serde(default)]
    pub from_user: Option<i64>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub media: Option<MediaAttachment>,
}

impl ChatMessage {
    /// The attachment, if it is one the ingestion pipeline accepts.
    #[must_use]
    pub fn ingestible_media(&self) -> Option<&MediaAttachment> {
        self.media.as_ref().filter(|m| m.kind.is_ingestible())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Update {
    Message { message: ChatMessage },
}

/// One authenticated session bound to a specific DC, used exclusively
/// for file reads.
#[async_trait]
pub trait MediaSession: Send + Sync + std::fmt::Debug {
    async fn import_authorization(&self, auth: &ExportedAuthorization) -> Result<(), WireError>;

    /// Fetch up to `limit` bytes starting at `offset`. An empty reply
    /// signals end of file.
    async fn get_file(&self, location: &Location, offset: u64, limit: u32)
        -> Result<Bytes, WireError>;

    async fn stop(&self);
}

/// One authenticated worker client on its home DC.
#[async_trait]
pub trait Connection: Send + Sync {
    fn slot_id(&self) -> usize;

    /// The client's home data center.
    fn dc_id(&self) -> DcId;

    async fn export_authorization(&self, dc_id: DcId) -> Result<ExportedAuthorization, WireError>;

    /// Open a media session bound to `dc_id`. With `fresh_auth` the
    /// session starts on a newly created auth key (foreign DCs);
    /// otherwise the client's primary auth key is reused.
    async fn open_media_session(
        &self,
        dc_id: DcId,
        fresh_auth: bool,
    ) -> Result<Arc<dyn MediaSession>, WireError>;

    /// Resolve a public chat username to its numeric id.
    async fn resolve_chat(&self, username: &str) -> Result<i64, WireError>;

    async fn get_messages(
        &self,
        chat_id: i64,
        message_id: i64,
    ) -> Result<Option<ChatMessage>, WireError>;

    async fn send_message(&self, chat_id: i64, text: &str) -> Result<i64, WireError>;

    async fn send_photo(
        &self,
        chat_id: i64,
        photo_url: &str,
        caption: &str,
    ) -> Result<i64, WireError>;

    async fn forward_message(
        &self,
        to_chat_id: i64,
        from_chat_id: i64,
        message_id: i64,
        drop_author: bool,
    ) -> Result<i64, WireError>;

    async fn delete_message(&self, chat_id: i64, message_id: i64) -> Result<(), WireError>;

    /// Next update pushed by the platform. Only the primary client
    /// receives updates; auxiliary clients never resolve.
    async fn next_update(&self) -> Result<Update, WireError>;

    async fn disconnect(&self);
}

/// Factory for authenticated worker connections.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Slot 0 is the primary, update-enabled client; slots >= 1 are
    /// auxiliary and update-disabled.
    async fn connect(
        &self,
        slot_id: usize,
        bot_token: &str,
        receive_updates: bool,
    ) -> Result<Arc<dyn Connection>, WireError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn locator(kind: FileKind) -> FileLocator {
        FileLocator {
            dc_id: 4,
            media_id: 555,
            access_hash: -77,
            file_reference: vec![1, 2, 3],
            kind,
            unique_id: "AgADBQADcc".to_string(),
            file_name: Some("movie.mkv".to_string()),
            file_size: 1024,
            mime_type: Some("video/x-matroska".to_string()),
            thumb_size: String::new(),
            chat_id: Some(-100123),
            chat_access_hash: Some(99),
            big_photo: true,
        }
    }

    #[test]
    fn location_follows_kind() {
        match Location::for_locator(&locator(FileKind::Document)) {
            Location::Document { id, .. } => assert_eq!(id, 555),
            other => panic!("unexpected location {other:?}"),
        }
        match Location::for_locator(&locator(FileKind::Photo)) {
            Location::Photo { access_hash, .. } => assert_eq!(access_hash, -77),
            other => panic!("unexpected location {other:?}"),
        }
        match Location::for_locator(&locator(FileKind::ChatPhoto)) {
            Location::ChatPhoto { chat_id, big, .. } => {
                assert_eq!(chat_id, -100123);
                assert!(big);
            }
            other => panic!("unexpected location {other:?}"),
        }
    }

    #[test]
    fn ingestible_media_filter() {
        let mut message = ChatMessage {
            id: 1,
            chat_id: 2,
            from_user: None,
            text: None,
            caption: None,
            media: Some(MediaAttachment {
                kind: MediaKind::Video,
                locator: locator(FileKind::Document),
            }),
        };
        assert!(message.ingestible_media().is_some());

        message.media.as_mut().expect("media").kind = MediaKind::Sticker;
        assert!(message.ingestible_media().is_none());

        message.media = None;
        assert!(message.ingestible_media().is_none());
    }
}
