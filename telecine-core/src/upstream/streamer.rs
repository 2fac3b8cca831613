//! Chunked byte streamer over a worker client.
//!
//! Resolves `(chat, message)` to a file locator, then yields aligned
//! chunks fetched over the client's media session, trimmed at both ends
//! so the concatenated output equals the requested byte window.

use std::sync::{Arc, Weak};
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use bytes::Bytes;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};

use super::client::WorkerClient;
use super::pool::StreamLease;
use super::wire::{FileLocator, Location, WireError};

/// Full flush interval for the locator caches.
const CLEAN_INTERVAL: Duration = Duration::from_secs(30 * 60);

/// `GetFile` timeout retry budget: 1s, 2s, 4s, then fail.
const GET_FILE_RETRIES: usize = 3;

pub struct ByteStreamer {
    client: Arc<WorkerClient>,
    cached_locators: DashMap<i64, FileLocator>,
    properties: DashMap<(i64, i64), FileLocator>,
}

impl ByteStreamer {
    #[must_use]
    pub fn new(client: Arc<WorkerClient>) -> Arc<Self> {
        let streamer = Arc::new(Self {
            client,
            cached_locators: DashMap::new(),
            properties: DashMap::new(),
        });

        let weak: Weak<Self> = Arc::downgrade(&streamer);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(CLEAN_INTERVAL).await;
                match weak.upgrade() {
                    Some(streamer) => streamer.clean_cache(),
                    None => break,
                }
            }
        });

        streamer
    }

    #[must_use]
    pub fn client(&self) -> &Arc<WorkerClient> {
        &self.client
    }

    /// Resolve a `(chat, message)` pair to its file locator, memoized
    /// until the next cache flush.
    pub async fn get_file_properties(&self, chat_id: i64, message_id: i64) -> Result<FileLocator> {
        let cache_key = (chat_id, message_id);
        if let Some(locator) = self.properties.get(&cache_key) {
            return Ok(locator.clone());
        }

        let locator = match self.cached_locators.get(&message_id) {
            Some(locator) => locator.clone(),
            None => {
                let message = self
                    .client
                    .connection()
                    .get_messages(chat_id, message_id)
                    .await
                    .map_err(Error::from)?;
                let media = message.and_then(|m| m.media).ok_or_else(|| {
                    info!(message_id, "message not found or has no media");
                    Error::NotFound("file not found".to_string())
                })?;
                self.cached_locators
                    .insert(message_id, media.locator.clone());
                media.locator
            }
        };

        self.properties.insert(cache_key, locator.clone());
        Ok(locator)
    }

    /// Yield the aligned chunk sequence for one streaming request.
    ///
    /// The spawned producer owns the slot lease; it is released on every
    /// exit path, including the HTTP client disconnecting (the receiver
    /// side of the channel is dropped and the next send fails).
    #[allow(clippy::too_many_arguments)]
    pub fn yield_file(
        self: &Arc<Self>,
        locator: FileLocator,
        lease: StreamLease,
        offset: u64,
        first_cut: usize,
        last_cut: usize,
        part_count: u32,
        chunk_size: u32,
    ) -> ReceiverStream<Result<Bytes>> {
        let (tx, rx) = mpsc::channel::<Result<Bytes>>(2);
        let streamer = Arc::clone(self);

        tokio::spawn(async move {
            let slot_id = lease.slot_id();
            let _lease = lease;
            debug!(slot_id, "starting to yield file");

            let outcome = streamer
                .stream_parts(
                    &locator, &tx, offset, first_cut, last_cut, part_count, chunk_size,
                )
                .await;
            if let Err(e) = outcome {
                error!(slot_id, "error while streaming file: {e}");
                let _ = tx.send(Err(e)).await;
            }
            debug!(slot_id, "finished yielding file");
        });

        ReceiverStream::new(rx)
    }

    #[allow(clippy::too_many_arguments)]
    async fn stream_parts(
        &self,
        locator: &FileLocator,
        tx: &mpsc::Sender<Result<Bytes>>,
        mut offset: u64,
        first_cut: usize,
        last_cut: usize,
        part_count: u32,
        chunk_size: u32,
    ) -> Result<()> {
        let session = self
            .client
            .media_session(locator.dc_id)
            .await
            .map_err(Error::from)?;
        let location = Location::for_locator(locator);

        let mut current_part = 1u32;
        while current_part <= part_count {
            let fetch = || async { session.get_file(&location, offset, chunk_size).await };
            let chunk = fetch
                .retry(
                    ExponentialBuilder::default()
                        .with_min_delay(Duration::from_secs(1))
                        .with_factor(2.0)
                        .with_max_times(GET_FILE_RETRIES),
                )
                .when(|e: &WireError| matches!(e, WireError::Timeout))
                .notify(|_, delay| {
                    warn!(offset, "get_file timed out, retrying in {delay:?}");
                })
                .await
                .map_err(Error::from)?;

            if chunk.is_empty() {
                break;
            }

            let piece = if part_count == 1 {
                cut(chunk, first_cut, last_cut)
            } else if current_part == 1 {
                let len = chunk.len();
                cut(chunk, first_cut, len)
            } else if current_part == part_count {
                cut(chunk, 0, last_cut)
            } else {
                chunk
            };

            if tx.send(Ok(piece)).await.is_err() {
                debug!("receiver dropped, stopping stream");
                return Ok(());
            }

            current_part += 1;
            offset += u64::from(chunk_size);
            debug!(
                part = current_part - 1,
                part_count, offset, "yielded file part"
            );
        }

        Ok(())
    }

    /// Drop one cached locator, so the next request refetches it.
    /// Used when a served locator turns out to be stale (hash
    /// mismatch against the stored entry).
    pub fn invalidate(&self, chat_id: i64, message_id: i64) {
        self.properties.remove(&(chat_id, message_id));
        self.cached_locators.remove(&message_id);
    }

    /// Flush both locator caches.
    pub fn clean_cache(&self) {
        self.cached_locators.clear();
        self.properties.clear();
        debug!("cleaned file-properties caches");
    }
}

/// Slice with clamped bounds: the final part of a file is usually
/// shorter than `chunk_size`.
fn cut(chunk: Bytes, start: usize, end: usize) -> Bytes {
    let len = chunk.len();
    let start = start.min(len);
    let end = end.clamp(start, len);
    chunk.slice(start..end)
}

/// One streamer per worker slot, created on first use.
#[derive(Default)]
pub struct StreamerHub {
    streamers: DashMap<usize, Arc<ByteStreamer>>,
}

impl StreamerHub {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn streamer_for(&self, client: &Arc<WorkerClient>) -> Arc<ByteStreamer> {
        self.streamers
            .entry(client.slot_id())
            .or_insert_with(|| {
                debug!(slot_id = client.slot_id(), "creating byte streamer");
                ByteStreamer::new(client.clone())
            })
            .clone()
    }
}
