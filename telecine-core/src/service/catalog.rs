//! Catalog queries behind the HTTP API and the ingestion pipeline.

use std::num::NonZeroUsize;
use std::sync::Arc;

use async_trait::async_trait;
use lru::LruCache;
use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::models::{
    MediaCard, MediaType, MovieRecord, Page, PageParams, ScoredCard, ShowRecord, TrendingEntries,
    UserRecord,
};
use crate::repository::{
    ConfigRepository, DeleteOutcome, MovieRepository, RegisterStatus, ShowRepository, SortOrder,
    UpsertOutcome, UserRepository,
};
use crate::service::token::StreamClaims;

/// Cached cross-type search results for frequently repeated queries.
const SEARCH_MEMO_CAPACITY: usize = 100;

/// Upstream coordinates of the file backing one quality variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoSource {
    pub msg_id: i64,
    pub chat_id: i64,
    pub file_hash: String,
}

/// The writes the ingestion worker performs, behind a seam so the
/// worker can be exercised without a live store.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CatalogWriter: Send + Sync {
    async fn upsert_movie(&self, record: &MovieRecord) -> Result<UpsertOutcome>;
    async fn upsert_show(&self, record: &ShowRecord) -> Result<UpsertOutcome>;
}

/// Cache refresh trigger fired after successful ingest upserts.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CacheRefresher: Send + Sync {
    async fn refresh(&self);
}

#[async_trait]
impl CacheRefresher for super::cache::CatalogCache {
    async fn refresh(&self) {
        self.update_all().await;
    }
}

pub struct CatalogService {
    movies: MovieRepository,
    shows: ShowRepository,
    users: UserRepository,
    configs: ConfigRepository,
    merge_movie_qualities_by_type: bool,
    search_memo: Mutex<LruCache<(String, i64), Vec<ScoredCard>>>,
}

impl CatalogService {
    #[must_use]
    pub fn new(
        movies: MovieRepository,
        shows: ShowRepository,
        users: UserRepository,
        configs: ConfigRepository,
        merge_movie_qualities_by_type: bool,
    ) -> Arc<Self> {
        let capacity = NonZeroUsize::new(SEARCH_MEMO_CAPACITY).expect("capacity is non-zero");
        Arc::new(Self {
            movies,
            shows,
            users,
            configs,
            merge_movie_qualities_by_type,
            search_memo: Mutex::new(LruCache::new(capacity)),
        })
    }

    pub async fn movie_details(&self, mid: i64) -> Result<MovieRecord> {
        self.movies
            .find_by_id(mid)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Movie with ID {mid} not found")))
    }

    pub async fn show_details(&self, sid: i64) -> Result<ShowRecord> {
        self.shows
            .find_by_id(sid)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Show with ID {sid} not found")))
    }

    pub async fn paginated(
        &self,
        media_type: MediaType,
        params: PageParams,
        sort_by: &str,
    ) -> Result<Page<MediaCard>> {
        let sort = SortOrder::parse(sort_by);
        let (items, total) = match media_type {
            MediaType::Movie => self.movies.find_paginated(params, sort).await?,
            MediaType::Show => self.shows.find_paginated(params, sort).await?,
        };
        Ok(Page::new(items, total, params))
    }

    /// Fuzzy search across both collections, merged and re-sorted by
    /// score descending. Results are memoized per (query, limit).
    pub async fn search_all(&self, query: &str, limit: i64) -> Result<Vec<ScoredCard>> {
        let memo_key = (query.to_lowercase(), limit);
        if let Some(results) = self.search_memo.lock().get(&memo_key).cloned() {
            return Ok(results);
        }

        let (movies, shows) = tokio::try_join!(
            self.movies.search_fuzzy(query, limit),
            self.shows.search_fuzzy(query, limit),
        )?;

        let mut combined: Vec<ScoredCard> = movies.into_iter().chain(shows).collect();
        combined.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        self.search_memo.lock().put(memo_key, combined.clone());
        Ok(combined)
    }

    pub async fn search_substring(
        &self,
        media_type: MediaType,
        query: &str,
    ) -> Result<Vec<MediaCard>> {
        match media_type {
            MediaType::Movie => self.movies.search_by_title(query).await,
            MediaType::Show => self.shows.search_by_title(query).await,
        }
    }

    pub async fn similar(
        &self,
        media_type: MediaType,
        genres: &[String],
        limit: i64,
    ) -> Result<Vec<MediaCard>> {
        match media_type {
            MediaType::Movie => self.movies.find_similar(genres, limit).await,
            MediaType::Show => self.shows.find_similar(genres, limit).await,
        }
    }

    /// Persist the curated trending ids and return them resolved to
    /// cards for the admin response.
    pub async fn save_trending(
        &self,
        movie_ids: &[i64],
        show_ids: &[i64],
    ) -> Result<TrendingEntries> {
        self.configs.save_trending(movie_ids, show_ids).await?;

        let mut movie_cards = Vec::with_capacity(movie_ids.len());
        for mid in movie_ids {
            if let Some(record) = self.movies.find_by_id(*mid).await? {
                movie_cards.push(record.card());
            }
        }
        let mut show_cards = Vec::with_capacity(show_ids.len());
        for sid in show_ids {
            if let Some(record) = self.shows.find_by_id(*sid).await? {
                show_cards.push(record.card());
            }
        }
        Ok(TrendingEntries {
            movie: movie_cards,
            show: show_cards,
        })
    }

    /// Resolve a verified stream token to the upstream coordinates of
    /// its quality variant.
    pub async fn video_source(&self, claims: &StreamClaims) -> Result<VideoSource> {
        let id: i64 = claims
            .id
            .parse()
            .map_err(|_| Error::InvalidInput("Invalid content id".to_string()))?;

        match claims.media_type {
            MediaType::Movie => {
                let movie = self.movie_details(id).await?;
                if movie.quality.is_empty() {
                    return Err(Error::NotFound(format!(
                        "No quality options available for movie {id}"
                    )));
                }
                let variant = movie.quality.get(claims.quality_index).ok_or_else(|| {
                    Error::InvalidInput(format!(
                        "Invalid quality index. Available range: 0-{}",
                        movie.quality.len() - 1
                    ))
                })?;
                if variant.file_hash.is_empty() {
                    return Err(Error::NotFound(
                        "File hash not found for selected quality".to_string(),
                    ));
                }
                Ok(VideoSource {
                    msg_id: variant.msg_id,
                    chat_id: variant.chat_id,
                    file_hash: variant.file_hash.clone(),
                })
            }
            MediaType::Show => {
                let (season_number, episode_number) =
                    match (claims.season_number, claims.episode_number) {
                        (Some(season), Some(episode)) => (season, episode),
                        _ => {
                            return Err(Error::InvalidInput(
                                "Season number and episode number are required for shows"
                                    .to_string(),
                            ))
                        }
                    };

                let show = self.show_details(id).await?;
                let episode = show
                    .season
                    .iter()
                    .find(|s| s.season_number == season_number)
                    .ok_or_else(|| Error::NotFound(format!("Season {season_number} not found")))?
                    .episodes
                    .iter()
                    .find(|e| e.episode_number == episode_number)
                    .ok_or_else(|| {
                        Error::NotFound(format!(
                            "Episode {episode_number} not found in season {season_number}"
                        ))
                    })?;

                if episode.quality.is_empty() {
                    return Err(Error::NotFound(
                        "No quality options available for episode".to_string(),
                    ));
                }
                let variant = episode.quality.get(claims.quality_index).ok_or_else(|| {
                    Error::InvalidInput(format!(
                        "Invalid quality index. Available range: 0-{}",
                        episode.quality.len() - 1
                    ))
                })?;
                if variant.file_hash.is_empty() || variant.msg_id == 0 || variant.chat_id == 0 {
                    return Err(Error::NotFound(
                        "File coordinates not found for selected quality".to_string(),
                    ));
                }
                Ok(VideoSource {
                    msg_id: variant.msg_id,
                    chat_id: variant.chat_id,
                    file_hash: variant.file_hash.clone(),
                })
            }
        }
    }

    pub async fn delete_movie(&self, mid: i64) -> Result<DeleteOutcome> {
        self.movies.delete(mid).await
    }

    pub async fn delete_show(&self, sid: i64) -> Result<DeleteOutcome> {
        self.shows.delete(sid).await
    }

    pub async fn register_user(&self, user: &UserRecord) -> Result<(RegisterStatus, UserRecord)> {
        self.users.register(user).await
    }

    pub async fn find_user(&self, user_id: i64) -> Result<Option<UserRecord>> {
        self.users.find_by_id(user_id).await
    }
}

#[async_trait]
impl CatalogWriter for CatalogService {
    async fn upsert_movie(&self, record: &MovieRecord) -> Result<UpsertOutcome> {
        self.movies
            .upsert(record, self.merge_movie_qualities_by_type)
            .await
    }

    async fn upsert_show(&self, record: &ShowRecord) -> Result<UpsertOutcome> {
        self.shows.upsert(record).await
    }
}
