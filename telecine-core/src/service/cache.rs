//! Periodic catalog cache: hero slider, latest lists, and trending
//! snapshots refreshed in the background and read lock-free by the API
//! layer.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{error, info};

use crate::error::Result;
use crate::models::{HeroItem, MediaCard, MediaType, TrendingEntries};
use crate::repository::{ConfigRepository, MovieRepository, ShowRepository};

pub const REFRESH_INTERVAL: Duration = Duration::from_secs(180);

/// Wall-clock ceiling for one refresh run.
pub const REFRESH_TIMEOUT: Duration = Duration::from_secs(60);

const HERO_LIMIT: i64 = 3;
const LATEST_LIMIT: i64 = 21;

#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheSnapshot {
    pub hero_slider: Vec<HeroItem>,
    pub latest_movies: Vec<MediaCard>,
    pub latest_shows: Vec<MediaCard>,
    pub trending: TrendingEntries,
    pub last_updated: i64,
}

pub struct CatalogCache {
    movies: MovieRepository,
    shows: ShowRepository,
    configs: ConfigRepository,
    snapshot: RwLock<CacheSnapshot>,
    /// At most one refresh in flight at a time.
    refresh_guard: Mutex<()>,
}

impl CatalogCache {
    #[must_use]
    pub fn new(
        movies: MovieRepository,
        shows: ShowRepository,
        configs: ConfigRepository,
    ) -> Arc<Self> {
        Arc::new(Self {
            movies,
            shows,
            configs,
            snapshot: RwLock::new(CacheSnapshot::default()),
            refresh_guard: Mutex::new(()),
        })
    }

    /// Refresh all sections from the store. Each section tolerates its
    /// own failure and keeps the previous data; `last_updated` advances
    /// once the run completes.
    pub async fn update_all(&self) {
        let _guard = self.refresh_guard.lock().await;
        info!("starting cache update");

        let (hero, latest, trending) = tokio::join!(
            self.build_hero_slider(),
            self.build_latest(),
            self.build_trending(),
        );

        {
            let mut snapshot = self.snapshot.write();
            match hero {
                Ok(items) => snapshot.hero_slider = items,
                Err(e) => error!("error updating hero slider cache: {e}"),
            }
            match latest {
                Ok((movies, shows)) => {
                    snapshot.latest_movies = movies;
                    snapshot.latest_shows = shows;
                }
                Err(e) => error!("error updating latest entries cache: {e}"),
            }
            match trending {
                Ok(entries) => snapshot.trending = entries,
                Err(e) => error!("error updating trending cache: {e}"),
            }
            snapshot.last_updated = Utc::now().timestamp();
        }
        info!("cache update completed");
    }

    /// 3 newest movies + 3 newest shows merged newest-first by internal
    /// id, projected metadata-lite.
    async fn build_hero_slider(&self) -> Result<Vec<HeroItem>> {
        let (movies, shows) = tokio::try_join!(
            self.movies.latest_with_ids(HERO_LIMIT),
            self.shows.latest_with_ids(HERO_LIMIT),
        )?;

        let mut items: Vec<(i64, HeroItem)> = movies
            .into_iter()
            .map(|(id, record)| (id, record.hero_item()))
            .chain(shows.into_iter().map(|(id, record)| (id, record.hero_item())))
            .collect();
        items.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(items.into_iter().map(|(_, item)| item).collect())
    }

    async fn build_latest(&self) -> Result<(Vec<MediaCard>, Vec<MediaCard>)> {
        let (movies, shows) = tokio::try_join!(
            self.movies.latest_with_ids(LATEST_LIMIT),
            self.shows.latest_with_ids(LATEST_LIMIT),
        )?;
        Ok((
            movies.into_iter().map(|(_, record)| record.card()).collect(),
            shows.into_iter().map(|(_, record)| record.card()).collect(),
        ))
    }

    /// Resolve the curated trending ids to cards; missing ids are
    /// skipped.
    async fn build_trending(&self) -> Result<TrendingEntries> {
        let config = self.configs.get_trending().await?;

        let mut movie_cards = Vec::with_capacity(config.movie.len());
        for mid in &config.movie {
            if let Some(record) = self.movies.find_by_id(*mid).await? {
                movie_cards.push(record.card());
            }
        }

        let mut show_cards = Vec::with_capacity(config.show.len());
        for sid in &config.show {
            if let Some(record) = self.shows.find_by_id(*sid).await? {
                show_cards.push(record.card());
            }
        }

        Ok(TrendingEntries {
            movie: movie_cards,
            show: show_cards,
        })
    }

    /// Periodic refresher: initial fill, then a fixed cadence with a
    /// per-run timeout. A timed-out run is cancelled and the previous
    /// snapshot (including `last_updated`) stays visible.
    pub async fn run_refresher(self: Arc<Self>) {
        self.update_all().await;

        let mut interval = tokio::time::interval(REFRESH_INTERVAL);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        interval.tick().await;

        loop {
            interval.tick().await;
            if tokio::time::timeout(REFRESH_TIMEOUT, self.update_all())
                .await
                .is_err()
            {
                error!(
                    "cache update timed out after {} seconds",
                    REFRESH_TIMEOUT.as_secs()
                );
            }
        }
    }

    // Snapshot readers: never touch the store.

    #[must_use]
    pub fn hero_slider(&self) -> Vec<HeroItem> {
        self.snapshot.read().hero_slider.clone()
    }

    #[must_use]
    pub fn latest(&self, media_type: MediaType, limit: usize) -> Vec<MediaCard> {
        let snapshot = self.snapshot.read();
        let source = match media_type {
            MediaType::Movie => &snapshot.latest_movies,
            MediaType::Show => &snapshot.latest_shows,
        };
        source.iter().take(limit).cloned().collect()
    }

    #[must_use]
    pub fn trending(&self) -> TrendingEntries {
        self.snapshot.read().trending.clone()
    }

    /// Trending entries as one combined list (each card already carries
    /// its media type).
    #[must_use]
    pub fn trending_combined(&self) -> Vec<MediaCard> {
        let trending = self.trending();
        trending
            .movie
            .into_iter()
            .chain(trending.show)
            .collect()
    }

    #[must_use]
    pub fn last_updated(&self) -> i64 {
        self.snapshot.read().last_updated
    }
}
