//! Ingestion pipeline: a single in-memory queue feeding one worker
//! that enriches inbound media messages and upserts catalog records.

pub mod queue;

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::error::{Error, Result};
use crate::service::catalog::{CacheRefresher, CatalogWriter};
use crate::service::enrich::{sanitize_title, EnrichedRecord, EnrichmentClient};
use crate::service::notifier::{ChatNotifier, Poster};
use crate::repository::UpsertStatus;
use crate::upstream::pool::WorkerPool;
use crate::upstream::streamer::StreamerHub;
use crate::upstream::wire::ChatMessage;

pub use queue::MessageQueue;

/// One queued inbound media message.
pub type IngestItem = ChatMessage;

/// Pause between processed items.
const ITEM_PACING: Duration = Duration::from_secs(1);

struct Inner {
    queue: Arc<MessageQueue<IngestItem>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    enrichment: Arc<EnrichmentClient>,
    pool: Arc<WorkerPool>,
    streamers: Arc<StreamerHub>,
    writer: Arc<dyn CatalogWriter>,
    refresher: Arc<dyn CacheRefresher>,
    notifier: Arc<ChatNotifier>,
    poster: Option<Arc<Poster>>,
    use_caption: bool,
}

#[derive(Clone)]
pub struct IngestService {
    inner: Arc<Inner>,
}

impl IngestService {
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        enrichment: Arc<EnrichmentClient>,
        pool: Arc<WorkerPool>,
        streamers: Arc<StreamerHub>,
        writer: Arc<dyn CatalogWriter>,
        refresher: Arc<dyn CacheRefresher>,
        notifier: Arc<ChatNotifier>,
        poster: Option<Arc<Poster>>,
        use_caption: bool,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                queue: Arc::new(MessageQueue::new()),
                worker: Mutex::new(None),
                enrichment,
                pool,
                streamers,
                writer,
                refresher,
                notifier,
                poster,
                use_caption,
            }),
        }
    }

    #[must_use]
    pub fn queue(&self) -> &Arc<MessageQueue<IngestItem>> {
        &self.inner.queue
    }

    /// Enqueue a message, (re)starting the worker if it is absent or
    /// has terminated.
    pub fn enqueue(&self, message: IngestItem, update_cache: bool) {
        self.ensure_worker(update_cache);
        self.inner.queue.put(message);
    }

    /// Make sure exactly one consumer task is running.
    pub fn ensure_worker(&self, update_cache: bool) {
        let mut worker = self.inner.worker.lock();
        let running = worker.as_ref().is_some_and(|handle| !handle.is_finished());
        if !running {
            info!("starting media processing worker");
            let inner = self.inner.clone();
            *worker = Some(tokio::spawn(run_worker(inner, update_cache)));
        }
    }

    /// Drain the queue, then stop the worker.
    pub async fn shutdown(&self) {
        self.inner.queue.join().await;
        if let Some(handle) = self.inner.worker.lock().take() {
            handle.abort();
        }
    }
}

async fn run_worker(inner: Arc<Inner>, update_cache: bool) {
    loop {
        let message = inner.queue.get().await;
        info!(message_id = message.id, "processing queued media");
        handle_message(&inner, message, update_cache).await;
        tokio::time::sleep(ITEM_PACING).await;
        inner.queue.task_done();
    }
}

async fn handle_message(inner: &Arc<Inner>, message: IngestItem, update_cache: bool) {
    let chat_id = message.chat_id;
    match process_message(inner, &message, update_cache).await {
        Ok(()) => {}
        Err(Error::FloodWait(seconds)) => {
            warn!(seconds, "flood wait while processing media");
            inner
                .notifier
                .warning(&format!("⚠️ FloodWait error: waiting for {seconds}s"))
                .await;
            reply(inner, chat_id, &format!(
                "Rate limit exceeded. Waiting for {seconds} seconds."
            ))
            .await;
            tokio::time::sleep(Duration::from_secs(seconds)).await;
            // Try again later: same item, tail of the queue.
            inner.queue.put(message);
        }
        Err(e) => {
            error!("error processing media: {e}");
            inner
                .notifier
                .error("Error processing media", Some(&e as &(dyn std::fmt::Display + Send + Sync)))
                .await;
            reply(inner, chat_id, &format!("Error: {e}")).await;
        }
    }
}

async fn process_message(
    inner: &Arc<Inner>,
    message: &IngestItem,
    update_cache: bool,
) -> Result<()> {
    if message.ingestible_media().is_none() {
        return Ok(());
    }

    let derived = derive_title(message, inner.use_caption);
    let title = sanitize_title(&derived);

    let (client, lease) = inner.pool.lease()?;
    let streamer = inner.streamers.streamer_for(&client);
    let record = inner
        .enrichment
        .resolve(&title, &streamer, lease, message)
        .await?;

    let (outcome, kind) = match &record {
        EnrichedRecord::Movie(movie) => {
            info!(title = %movie.title, "processing movie");
            (inner.writer.upsert_movie(movie).await?, "Movie")
        }
        EnrichedRecord::Show(show) => {
            info!(title = %show.title, "processing show");
            (inner.writer.upsert_show(show).await?, "Show")
        }
    };

    let status_word = match outcome.status {
        UpsertStatus::Inserted => "inserted",
        UpsertStatus::Updated => "updated",
    };
    inner
        .notifier
        .info(&format!(
            "✅ {kind} **{}** {status_word} successfully",
            record.title()
        ))
        .await;

    if update_cache {
        info!("triggering cache update after catalog upsert");
        let refresher = inner.refresher.clone();
        tokio::spawn(async move { refresher.refresh().await });
    }

    if let Some(poster) = &inner.poster {
        poster.post(&record).await;
    }

    Ok(())
}

/// Title source: caption (falling back to text) when configured, else
/// the attachment's file name, else its unique id.
fn derive_title(message: &ChatMessage, use_caption: bool) -> String {
    let from_media = || {
        message.media.as_ref().and_then(|m| {
            m.locator
                .file_name
                .clone()
                .or_else(|| Some(m.locator.unique_id.clone()))
        })
    };

    if use_caption {
        message
            .caption
            .clone()
            .or_else(|| message.text.clone())
            .or_else(from_media)
            .unwrap_or_default()
    } else {
        from_media().unwrap_or_default()
    }
}

async fn reply(inner: &Arc<Inner>, chat_id: i64, text: &str) {
    let conn = inner.pool.primary().connection().clone();
    if let Err(e) = conn.send_message(chat_id, text).await {
        warn!("failed to reply in chat {chat_id}: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MovieRecord, ShowRecord};
    use crate::repository::{UpsertOutcome, UpsertStatus};
    use crate::service::catalog::{MockCacheRefresher, MockCatalogWriter};
    use crate::service::enrich::tmdb::MockMetadataProvider;
    use crate::service::enrich::{EnrichmentClient, MediaProbe};
    use crate::service::notifier::ChatNotifier;
    use crate::upstream::client::WorkerClient;
    use crate::upstream::memory::{MemoryPlatform, SentMessage};
    use crate::upstream::pool::WorkerPool;
    use crate::upstream::wire::MediaKind;
    use serde_json::Map;
    use std::collections::BTreeMap;

    const AUTH_CHAT: i64 = -1002000000000;

    fn movie_record(mid: i64) -> MovieRecord {
        MovieRecord {
            mid,
            title: "Blade Runner".to_string(),
            original_title: "Blade Runner".to_string(),
            release_date: Some("1982-06-25".to_string()),
            overview: None,
            poster_path: None,
            backdrop_path: None,
            runtime: None,
            popularity: None,
            vote_average: None,
            vote_count: None,
            genres: vec![],
            cast: vec![],
            directors: vec![],
            studios: vec![],
            links: vec![],
            logo: None,
            trailer: None,
            quality: vec![],
            extra: Map::new(),
        }
    }

    struct Harness {
        platform: MemoryPlatform,
        pool: Arc<WorkerPool>,
    }

    async fn harness() -> Harness {
        let platform = MemoryPlatform::new(2);
        let conn = platform.connect(0, "token", true).await.expect("connect");
        let mut clients = BTreeMap::new();
        clients.insert(0, Arc::new(WorkerClient::new(0, conn)));
        Harness {
            platform,
            pool: Arc::new(WorkerPool::for_tests(clients)),
        }
    }

    fn service(
        harness: &Harness,
        provider: MockMetadataProvider,
        writer: MockCatalogWriter,
        refresher: MockCacheRefresher,
        probe_dir: &std::path::Path,
    ) -> IngestService {
        let enrichment = Arc::new(EnrichmentClient::new(
            Arc::new(provider),
            MediaProbe::new(probe_dir),
        ));
        let primary = harness.pool.primary().connection().clone();
        IngestService::new(
            enrichment,
            harness.pool.clone(),
            Arc::new(StreamerHub::new()),
            Arc::new(writer),
            Arc::new(refresher),
            Arc::new(ChatNotifier::new(primary, -100999)),
            None,
            false,
        )
    }

    #[tokio::test]
    async fn movie_message_is_enriched_and_upserted() {
        let harness = harness().await;
        let message = harness.platform.add_media_message(
            AUTH_CHAT,
            11,
            MediaKind::Video,
            2,
            "AgADBQADvid1",
            Some("Blade.Runner.1982.1080p.mkv"),
            Some("video/x-matroska"),
            vec![0u8; 256],
        );

        let mut provider = MockMetadataProvider::new();
        provider
            .expect_movie()
            .withf(|title, year| title == "Blade Runner" && *year == Some(1982))
            .returning(|_, _| Ok(movie_record(78)));

        let mut writer = MockCatalogWriter::new();
        writer
            .expect_upsert_movie()
            .withf(|record| {
                record.quality.len() == 1
                    && record.quality[0].msg_id == 11
                    && record.quality[0].chat_id == AUTH_CHAT
                    && record.quality[0].file_hash == "AgADBQ"
            })
            .times(1)
            .returning(|record| {
                Ok(UpsertOutcome {
                    status: UpsertStatus::Inserted,
                    id: record.mid,
                })
            });

        let mut refresher = MockCacheRefresher::new();
        refresher.expect_refresh().times(1).returning(|| ());

        let dir = tempfile::tempdir().expect("tempdir");
        let service = service(&harness, provider, writer, refresher, dir.path());

        tokio::time::pause();
        service.enqueue(message, true);
        service.queue().join().await;
        tokio::task::yield_now().await;

        let sent = harness.platform.sent_messages();
        assert!(sent.iter().any(|m| matches!(
            m,
            SentMessage::Text { chat_id, text }
                if *chat_id == -100999 && text.contains("✅ Movie **Blade Runner** inserted")
        )));
        // Probe lease and any stream leases are all released.
        assert_eq!(harness.pool.loads()[&0], 0);
    }

    #[tokio::test]
    async fn flood_wait_requeues_the_same_item() {
        let harness = harness().await;
        let message = harness.platform.add_media_message(
            AUTH_CHAT,
            12,
            MediaKind::Video,
            2,
            "AgADBQADvid2",
            Some("Stalker.1979.720p.mkv"),
            None,
            vec![0u8; 64],
        );

        let mut provider = MockMetadataProvider::new();
        provider
            .expect_movie()
            .returning(|_, _| Ok(movie_record(79)));

        let mut writer = MockCatalogWriter::new();
        let mut call = 0u32;
        writer.expect_upsert_movie().times(2).returning(move |record| {
            call += 1;
            if call == 1 {
                Err(Error::FloodWait(0))
            } else {
                Ok(UpsertOutcome {
                    status: UpsertStatus::Updated,
                    id: record.mid,
                })
            }
        });

        let mut refresher = MockCacheRefresher::new();
        refresher.expect_refresh().returning(|| ());

        let dir = tempfile::tempdir().expect("tempdir");
        let service = service(&harness, provider, writer, refresher, dir.path());

        tokio::time::pause();
        service.enqueue(message, true);
        service.queue().join().await;

        let sent = harness.platform.sent_messages();
        assert!(sent.iter().any(|m| matches!(
            m,
            SentMessage::Text { chat_id, text }
                if *chat_id == AUTH_CHAT && text.contains("Rate limit exceeded")
        )));
        assert!(sent.iter().any(|m| matches!(
            m,
            SentMessage::Text { text, .. } if text.contains("updated successfully")
        )));
    }

    #[tokio::test]
    async fn enrichment_failure_is_reported_and_queue_advances() {
        let harness = harness().await;
        let message = harness.platform.add_media_message(
            AUTH_CHAT,
            13,
            MediaKind::Video,
            2,
            "AgADBQADvid3",
            Some("Unknown.Movie.2020.mkv"),
            None,
            vec![0u8; 64],
        );

        let mut provider = MockMetadataProvider::new();
        provider
            .expect_movie()
            .returning(|title, _| Err(Error::NotFound(format!("No movie results for '{title}'"))));

        let writer = MockCatalogWriter::new();
        let refresher = MockCacheRefresher::new();

        let dir = tempfile::tempdir().expect("tempdir");
        let service = service(&harness, provider, writer, refresher, dir.path());

        tokio::time::pause();
        service.enqueue(message, true);
        tokio::time::timeout(Duration::from_secs(30), service.queue().join())
            .await
            .expect("queue drains");

        let sent = harness.platform.sent_messages();
        assert!(sent.iter().any(|m| matches!(
            m,
            SentMessage::Text { chat_id, text }
                if *chat_id == AUTH_CHAT && text.starts_with("Error:")
        )));
    }

    #[tokio::test]
    async fn show_episode_routes_to_show_upsert() {
        let harness = harness().await;
        let message = harness.platform.add_media_message(
            AUTH_CHAT,
            14,
            MediaKind::Video,
            2,
            "AgADBQADvid4",
            Some("The.Expanse.S02E03.1080p.mkv"),
            None,
            vec![0u8; 64],
        );

        let mut provider = MockMetadataProvider::new();
        provider
            .expect_episode()
            .withf(|title, season, episode| {
                title == "The Expanse" && *season == 2 && *episode == 3
            })
            .returning(|_, season, episode| {
                use crate::models::{Episode, Season};
                Ok(ShowRecord {
                    sid: 63639,
                    title: "The Expanse".to_string(),
                    original_title: "The Expanse".to_string(),
                    release_date: None,
                    overview: None,
                    poster_path: None,
                    backdrop_path: None,
                    popularity: None,
                    vote_average: None,
                    vote_count: None,
                    genres: vec![],
                    cast: vec![],
                    creators: vec![],
                    studios: vec![],
                    links: vec![],
                    logo: None,
                    trailer: None,
                    season: vec![Season {
                        season_number: i64::from(season),
                        episodes: vec![Episode {
                            episode_number: i64::from(episode),
                            name: "Static".to_string(),
                            overview: None,
                            still_path: None,
                            air_date: None,
                            quality: vec![],
                        }],
                    }],
                    total_seasons: None,
                    total_episodes: None,
                    status: None,
                    extra: Map::new(),
                })
            });

        let mut writer = MockCatalogWriter::new();
        writer
            .expect_upsert_show()
            .withf(|record: &ShowRecord| {
                record
                    .find_episode(2, 3)
                    .map(|e| e.quality.len() == 1 && e.quality[0].msg_id == 14)
                    .unwrap_or(false)
            })
            .times(1)
            .returning(|record| {
                Ok(UpsertOutcome {
                    status: UpsertStatus::Inserted,
                    id: record.sid,
                })
            });

        let mut refresher = MockCacheRefresher::new();
        refresher.expect_refresh().returning(|| ());

        let dir = tempfile::tempdir().expect("tempdir");
        let service = service(&harness, provider, writer, refresher, dir.path());

        tokio::time::pause();
        service.enqueue(message, true);
        service.queue().join().await;
    }

    #[test]
    fn title_derivation_prefers_caption_when_configured() {
        let message = ChatMessage {
            id: 1,
            chat_id: 2,
            from_user: None,
            text: Some("fallback text".to_string()),
            caption: Some("Caption Title 2020".to_string()),
            media: None,
        };
        assert_eq!(derive_title(&message, true), "Caption Title 2020");

        let mut no_caption = message.clone();
        no_caption.caption = None;
        assert_eq!(derive_title(&no_caption, true), "fallback text");
    }
}
