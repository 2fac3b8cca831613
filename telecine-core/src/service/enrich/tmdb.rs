//! Metadata provider client.
//!
//! Looks up movies and episodes, then layers on supplementary data
//! (images, external ids, credits, videos) with per-call failure
//! tolerance: a failed supplementary fetch degrades the record instead
//! of failing the lookup. Results, including failures, are memoized in
//! a small LRU keyed by the lookup arguments.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lru::LruCache;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Map;
use tracing::warn;

use crate::config::MetadataConfig;
use crate::error::{Error, Result};
use crate::models::{CastMember, Episode, MovieRecord, Season, ShowRecord};

const MEMO_CAPACITY: usize = 100;
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_CAST: usize = 20;

/// Async metadata lookup at the seam the ingestion worker depends on.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    /// Movie lookup; qualities are left empty for the caller to fill.
    async fn movie(&self, title: &str, year: Option<i32>) -> Result<MovieRecord>;

    /// Episode lookup; the returned record carries exactly one season
    /// with exactly one episode, qualities left empty.
    async fn episode(&self, title: &str, season: i32, episode: i32) -> Result<ShowRecord>;
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum MemoKey {
    Movie(String, Option<i32>),
    Episode(String, i32, i32),
}

#[derive(Clone)]
enum CachedLookup {
    Movie(std::result::Result<MovieRecord, String>),
    Show(std::result::Result<ShowRecord, String>),
}

pub struct TmdbClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    language: String,
    region: String,
    memo: Mutex<LruCache<MemoKey, CachedLookup>>,
}

impl TmdbClient {
    pub fn new(config: &MetadataConfig) -> Result<Arc<Self>> {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::Internal(format!("failed to build metadata client: {e}")))?;

        let capacity = NonZeroUsize::new(MEMO_CAPACITY).expect("memo capacity is non-zero");
        Ok(Arc::new(Self {
            http,
            api_key: config.api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            language: config.language.clone(),
            region: config.region.clone(),
            memo: Mutex::new(LruCache::new(capacity)),
        }))
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http
            .get(&url)
            .query(&[
                ("api_key", self.api_key.as_str()),
                ("language", self.language.as_str()),
            ])
            .query(query)
            .send()
            .await
            .map_err(|e| Error::UpstreamUnavailable(format!("metadata request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::UpstreamUnavailable(format!(
                "metadata provider returned {} for {path}",
                response.status()
            )));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| Error::UpstreamUnavailable(format!("malformed metadata reply: {e}")))
    }

    async fn search_movie(&self, title: &str, year: Option<i32>) -> Result<i64> {
        let mut query = vec![
            ("query", title.to_string()),
            ("region", self.region.clone()),
        ];
        if let Some(year) = year {
            query.push(("year", year.to_string()));
        }
        let reply: SearchReply = self.get_json("/search/movie", &query).await?;
        reply
            .results
            .first()
            .map(|hit| hit.id)
            .ok_or_else(|| Error::NotFound(format!("No movie results for '{title}'")))
    }

    async fn search_tv(&self, title: &str) -> Result<i64> {
        let query = vec![("query", title.to_string())];
        let reply: SearchReply = self.get_json("/search/tv", &query).await?;
        reply
            .results
            .first()
            .map(|hit| hit.id)
            .ok_or_else(|| Error::NotFound(format!("No show results for '{title}'")))
    }

    /// Supplementary fetches tolerate individual failures: images,
    /// external ids, credits, and videos each degrade to empty.
    async fn movie_supplements(
        &self,
        movie_id: i64,
        record: &mut MovieRecord,
    ) {
        match self
            .get_json::<ImagesReply>(
                &format!("/movie/{movie_id}/images"),
                &[("include_image_language", "en,id,null".to_string())],
            )
            .await
        {
            Ok(images) => record.logo = pick_logo(&images),
            Err(e) => warn!(movie_id, "images fetch failed: {e}"),
        }

        match self
            .get_json::<ExternalIdsReply>(&format!("/movie/{movie_id}/external_ids"), &[])
            .await
        {
            Ok(ids) => {
                if let Some(link) = imdb_link(&ids) {
                    record.links.push(link);
                }
            }
            Err(e) => warn!(movie_id, "external ids fetch failed: {e}"),
        }

        match self
            .get_json::<CreditsReply>(&format!("/movie/{movie_id}/credits"), &[])
            .await
        {
            Ok(credits) => {
                record.cast = top_cast(&credits);
                record.directors = credits
                    .crew
                    .iter()
                    .filter(|member| member.job.as_deref() == Some("Director"))
                    .map(|member| member.name.clone())
                    .collect();
            }
            Err(e) => warn!(movie_id, "credits fetch failed: {e}"),
        }

        match self
            .get_json::<VideosReply>(&format!("/movie/{movie_id}/videos"), &[])
            .await
        {
            Ok(videos) => record.trailer = pick_trailer(&videos),
            Err(e) => warn!(movie_id, "videos fetch failed: {e}"),
        }
    }

    async fn show_supplements(&self, show_id: i64, record: &mut ShowRecord) {
        match self
            .get_json::<ImagesReply>(
                &format!("/tv/{show_id}/images"),
                &[("include_image_language", "en,id,null".to_string())],
            )
            .await
        {
            Ok(images) => record.logo = pick_logo(&images),
            Err(e) => warn!(show_id, "images fetch failed: {e}"),
        }

        match self
            .get_json::<ExternalIdsReply>(&format!("/tv/{show_id}/external_ids"), &[])
            .await
        {
            Ok(ids) => {
                if let Some(link) = imdb_link(&ids) {
                    record.links.push(link);
                }
            }
            Err(e) => warn!(show_id, "external ids fetch failed: {e}"),
        }

        match self
            .get_json::<CreditsReply>(&format!("/tv/{show_id}/credits"), &[])
            .await
        {
            Ok(credits) => record.cast = top_cast(&credits),
            Err(e) => warn!(show_id, "credits fetch failed: {e}"),
        }

        match self
            .get_json::<VideosReply>(&format!("/tv/{show_id}/videos"), &[])
            .await
        {
            Ok(videos) => record.trailer = pick_trailer(&videos),
            Err(e) => warn!(show_id, "videos fetch failed: {e}"),
        }
    }

    async fn fetch_movie(&self, title: &str, year: Option<i32>) -> Result<MovieRecord> {
        let movie_id = self.search_movie(title, year).await?;
        let details: MovieDetailsReply =
            self.get_json(&format!("/movie/{movie_id}"), &[]).await?;

        let mut record = MovieRecord {
            mid: details.id,
            title: details.title.unwrap_or_default(),
            original_title: details.original_title.unwrap_or_default(),
            release_date: details.release_date,
            overview: details.overview,
            poster_path: details.poster_path,
            backdrop_path: details.backdrop_path,
            runtime: details.runtime,
            popularity: details.popularity,
            vote_average: details.vote_average,
            vote_count: details.vote_count,
            genres: details.genres.into_iter().map(|g| g.name).collect(),
            cast: Vec::new(),
            directors: Vec::new(),
            studios: details
                .production_companies
                .into_iter()
                .map(|c| c.name)
                .collect(),
            links: Vec::new(),
            logo: None,
            trailer: None,
            quality: Vec::new(),
            extra: Map::new(),
        };

        self.movie_supplements(movie_id, &mut record).await;
        Ok(record)
    }

    async fn fetch_episode(
        &self,
        title: &str,
        season_number: i32,
        episode_number: i32,
    ) -> Result<ShowRecord> {
        let show_id = self.search_tv(title).await?;
        let details: TvDetailsReply = self.get_json(&format!("/tv/{show_id}"), &[]).await?;

        let mut record = ShowRecord {
            sid: details.id,
            title: details.name.unwrap_or_default(),
            original_title: details.original_name.unwrap_or_default(),
            release_date: details.first_air_date,
            overview: details.overview,
            poster_path: details.poster_path,
            backdrop_path: details.backdrop_path,
            popularity: details.popularity,
            vote_average: details.vote_average,
            vote_count: details.vote_count,
            genres: details.genres.into_iter().map(|g| g.name).collect(),
            cast: Vec::new(),
            creators: details.created_by.into_iter().map(|c| c.name).collect(),
            studios: details
                .production_companies
                .into_iter()
                .map(|c| c.name)
                .collect(),
            links: Vec::new(),
            logo: None,
            trailer: None,
            season: Vec::new(),
            total_seasons: details.number_of_seasons,
            total_episodes: details.number_of_episodes,
            status: details.status,
            extra: Map::new(),
        };

        self.show_supplements(show_id, &mut record).await;

        let episode_details: EpisodeDetailsReply = self
            .get_json(
                &format!("/tv/{show_id}/season/{season_number}/episode/{episode_number}"),
                &[],
            )
            .await?;

        record.season = vec![Season {
            season_number: i64::from(season_number),
            episodes: vec![Episode {
                episode_number: i64::from(episode_number),
                name: episode_details
                    .name
                    .unwrap_or_else(|| format!("Episode {episode_number}")),
                overview: episode_details.overview,
                still_path: episode_details.still_path,
                air_date: episode_details.air_date,
                quality: Vec::new(),
            }],
        }];
        if let Some(runtime) = episode_details.runtime {
            record
                .extra
                .insert("episode_runtime".to_string(), runtime.into());
        }

        Ok(record)
    }
}

#[async_trait]
impl MetadataProvider for TmdbClient {
    async fn movie(&self, title: &str, year: Option<i32>) -> Result<MovieRecord> {
        let key = MemoKey::Movie(title.to_lowercase(), year);
        if let Some(CachedLookup::Movie(cached)) = self.memo.lock().get(&key).cloned() {
            return cached.map_err(Error::Internal);
        }

        let looked_up = self.fetch_movie(title, year).await;
        let cached = match &looked_up {
            Ok(record) => Ok(record.clone()),
            Err(e) => Err(e.to_string()),
        };
        self.memo.lock().put(key, CachedLookup::Movie(cached));
        looked_up
    }

    async fn episode(&self, title: &str, season: i32, episode: i32) -> Result<ShowRecord> {
        let key = MemoKey::Episode(title.to_lowercase(), season, episode);
        if let Some(CachedLookup::Show(cached)) = self.memo.lock().get(&key).cloned() {
            return cached.map_err(Error::Internal);
        }

        let looked_up = self.fetch_episode(title, season, episode).await;
        let cached = match &looked_up {
            Ok(record) => Ok(record.clone()),
            Err(e) => Err(e.to_string()),
        };
        self.memo.lock().put(key, CachedLookup::Show(cached));
        looked_up
    }
}

/// English logo, else Indonesian, else none.
fn pick_logo(images: &ImagesReply) -> Option<String> {
    images
        .logos
        .iter()
        .find(|logo| logo.iso_639_1.as_deref() == Some("en"))
        .or_else(|| {
            images
                .logos
                .iter()
                .find(|logo| logo.iso_639_1.as_deref() == Some("id"))
        })
        .map(|logo| logo.file_path.clone())
}

fn imdb_link(ids: &ExternalIdsReply) -> Option<String> {
    ids.imdb_id
        .as_deref()
        .filter(|id| !id.is_empty())
        .map(|id| format!("https://www.imdb.com/title/{id}"))
}

fn top_cast(credits: &CreditsReply) -> Vec<CastMember> {
    credits
        .cast
        .iter()
        .take(MAX_CAST)
        .map(|member| CastMember {
            name: member.name.clone(),
            character: member.character.clone().unwrap_or_default(),
            image_url: member.profile_path.clone(),
        })
        .collect()
}

/// YouTube trailer, preferring one whose name contains "official".
fn pick_trailer(videos: &VideosReply) -> Option<String> {
    let trailers: Vec<&VideoEntry> = videos
        .results
        .iter()
        .filter(|video| {
            video.site.eq_ignore_ascii_case("youtube")
                && video.kind.eq_ignore_ascii_case("trailer")
        })
        .collect();

    let chosen = trailers
        .iter()
        .find(|video| video.name.to_lowercase().contains("official"))
        .or_else(|| trailers.first())?;
    Some(format!("https://www.youtube.com/watch?v={}", chosen.key))
}

#[derive(Debug, Deserialize)]
struct SearchReply {
    #[serde(default)]
    results: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct NamedEntry {
    name: String,
}

#[derive(Debug, Deserialize)]
struct MovieDetailsReply {
    id: i64,
    title: Option<String>,
    original_title: Option<String>,
    release_date: Option<String>,
    overview: Option<String>,
    poster_path: Option<String>,
    backdrop_path: Option<String>,
    runtime: Option<i64>,
    popularity: Option<f64>,
    vote_average: Option<f64>,
    vote_count: Option<i64>,
    #[serde(default)]
    genres: Vec<NamedEntry>,
    #[serde(default)]
    production_companies: Vec<NamedEntry>,
}

#[derive(Debug, Deserialize)]
struct TvDetailsReply {
    id: i64,
    name: Option<String>,
    original_name: Option<String>,
    first_air_date: Option<String>,
    overview: Option<String>,
    poster_path: Option<String>,
    backdrop_path: Option<String>,
    popularity: Option<f64>,
    vote_average: Option<f64>,
    vote_count: Option<i64>,
    #[serde(default)]
    genres: Vec<NamedEntry>,
    #[serde(default)]
    production_companies: Vec<NamedEntry>,
    #[serde(default)]
    created_by: Vec<NamedEntry>,
    number_of_seasons: Option<i64>,
    number_of_episodes: Option<i64>,
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EpisodeDetailsReply {
    name: Option<String>,
    overview: Option<String>,
    still_path: Option<String>,
    air_date: Option<String>,
    runtime: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct ImagesReply {
    #[serde(default)]
    logos: Vec<ImageEntry>,
}

#[derive(Debug, Deserialize)]
struct ImageEntry {
    file_path: String,
    iso_639_1: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ExternalIdsReply {
    imdb_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreditsReply {
    #[serde(default)]
    cast: Vec<CastEntry>,
    #[serde(default)]
    crew: Vec<CrewEntry>,
}

#[derive(Debug, Deserialize)]
struct CastEntry {
    name: String,
    character: Option<String>,
    profile_path: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CrewEntry {
    name: String,
    job: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VideosReply {
    #[serde(default)]
    results: Vec<VideoEntry>,
}

#[derive(Debug, Deserialize)]
struct VideoEntry {
    site: String,
    #[serde(rename = "type")]
    kind: String,
    name: String,
    key: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client_for(server: &MockServer) -> Arc<TmdbClient> {
        let config = MetadataConfig {
            api_key: "k".to_string(),
            base_url: server.uri(),
            ..MetadataConfig::default()
        };
        TmdbClient::new(&config).expect("client")
    }

    async fn mount_movie_core(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/search/movie"))
            .and(query_param("query", "Blade Runner"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [{"id": 78}]
            })))
            .mount(server)
            .await;

        Mock::given(method("GET"))
            .and(path("/movie/78"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": 78,
                "title": "Blade Runner",
                "original_title": "Blade Runner",
                "release_date": "1982-06-25",
                "overview": "Replicants.",
                "poster_path": "/poster.jpg",
                "backdrop_path": "/backdrop.jpg",
                "runtime": 117,
                "popularity": 80.5,
                "vote_average": 7.9,
                "vote_count": 12000,
                "genres": [{"id": 878, "name": "Science Fiction"}],
                "production_companies": [{"id": 1, "name": "Warner Bros."}]
            })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn movie_lookup_with_full_supplements() {
        let server = MockServer::start().await;
        mount_movie_core(&server).await;

        Mock::given(method("GET"))
            .and(path("/movie/78/images"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "logos": [
                    {"file_path": "/logo-id.png", "iso_639_1": "id"},
                    {"file_path": "/logo-en.png", "iso_639_1": "en"}
                ]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/movie/78/external_ids"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "imdb_id": "tt0083658"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/movie/78/credits"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "cast": (0..25).map(|i| json!({
                    "name": format!("Actor {i}"),
                    "character": format!("Role {i}"),
                    "profile_path": null
                })).collect::<Vec<_>>(),
                "crew": [
                    {"name": "Ridley Scott", "job": "Director"},
                    {"name": "Someone Else", "job": "Producer"}
                ]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/movie/78/videos"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [
                    {"site": "YouTube", "type": "Trailer", "name": "Teaser", "key": "aaa"},
                    {"site": "YouTube", "type": "Trailer", "name": "Official Trailer", "key": "bbb"},
                    {"site": "Vimeo", "type": "Trailer", "name": "Official", "key": "ccc"}
                ]
            })))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let record = client.movie("Blade Runner", Some(1982)).await.expect("movie");

        assert_eq!(record.mid, 78);
        assert_eq!(record.logo.as_deref(), Some("/logo-en.png"));
        assert_eq!(record.links, vec!["https://www.imdb.com/title/tt0083658"]);
        assert_eq!(record.cast.len(), 20);
        assert_eq!(record.directors, vec!["Ridley Scott"]);
        assert_eq!(
            record.trailer.as_deref(),
            Some("https://www.youtube.com/watch?v=bbb")
        );
        assert_eq!(record.studios, vec!["Warner Bros."]);
        assert!(record.quality.is_empty());
    }

    #[tokio::test]
    async fn supplementary_failures_degrade_gracefully() {
        let server = MockServer::start().await;
        mount_movie_core(&server).await;
        // images/external_ids/credits/videos all unmocked → 404.

        let client = client_for(&server).await;
        let record = client.movie("Blade Runner", None).await.expect("movie");
        assert_eq!(record.mid, 78);
        assert_eq!(record.logo, None);
        assert!(record.links.is_empty());
        assert!(record.cast.is_empty());
        assert_eq!(record.trailer, None);
    }

    #[tokio::test]
    async fn no_search_results_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search/movie"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": []})))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let err = client.movie("Nonexistent", None).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn lookups_are_memoized() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/search/movie"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [{"id": 78}]
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/movie/78"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 78})))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let first = client.movie("Blade Runner", None).await.expect("movie");
        let second = client.movie("blade runner", None).await.expect("movie");
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn episode_lookup_builds_single_episode_record() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/search/tv"))
            .and(query_param("query", "The Expanse"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [{"id": 63639}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/tv/63639"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": 63639,
                "name": "The Expanse",
                "original_name": "The Expanse",
                "first_air_date": "2015-12-14",
                "number_of_seasons": 6,
                "number_of_episodes": 62,
                "status": "Ended",
                "created_by": [{"id": 1, "name": "Mark Fergus"}],
                "genres": [{"id": 18, "name": "Drama"}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/tv/63639/season/2/episode/3"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "Static",
                "overview": "Fallout.",
                "still_path": "/still.jpg",
                "air_date": "2017-02-08",
                "runtime": 44
            })))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let record = client.episode("The Expanse", 2, 3).await.expect("episode");

        assert_eq!(record.sid, 63639);
        assert_eq!(record.total_seasons, Some(6));
        assert_eq!(record.creators, vec!["Mark Fergus"]);
        let episode = record.find_episode(2, 3).expect("episode present");
        assert_eq!(episode.name, "Static");
        assert_eq!(episode.air_date.as_deref(), Some("2017-02-08"));
        assert_eq!(record.extra["episode_runtime"], 44);
    }
}
