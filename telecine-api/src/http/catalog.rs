//! Catalog endpoints: cached front-page data, details, pagination,
//! search, similarity, trending administration, and user lookup.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use telecine_core::models::{
    HeroItem, MediaCard, MediaType, MovieRecord, Page, PageParams, ScoredCard, ShowRecord,
    TrendingEntries,
};

use super::auth::AdminToken;
use super::{AppError, AppResult, AppState};

const DEFAULT_LATEST_LIMIT: usize = 21;
const MIN_QUERY_LEN: usize = 2;
const MAX_SEARCH_LIMIT: i64 = 50;
const DEFAULT_SEARCH_LIMIT: i64 = 20;
const SIMILAR_LIMIT: i64 = 20;

fn parse_media_type(raw: &str) -> AppResult<MediaType> {
    MediaType::parse(raw)
        .ok_or_else(|| AppError::bad_request("Media type must be 'movie' or 'show'"))
}

/// GET /api/v1/heroslider — cached hero items.
pub async fn hero_slider(State(state): State<AppState>) -> Json<Vec<HeroItem>> {
    Json(state.cache.hero_slider())
}

#[derive(Debug, Deserialize)]
pub struct LatestQuery {
    pub limit: Option<usize>,
}

/// GET /api/v1/getlatest/{media_type} — newest entries from the cache.
pub async fn get_latest(
    State(state): State<AppState>,
    Path(media_type): Path<String>,
    Query(query): Query<LatestQuery>,
) -> AppResult<Json<Vec<MediaCard>>> {
    let media_type = parse_media_type(&media_type)?;
    let limit = match query.limit {
        Some(0) => return Err(AppError::bad_request("limit must be greater than 0")),
        Some(limit) => limit,
        None => DEFAULT_LATEST_LIMIT,
    };
    Ok(Json(state.cache.latest(media_type, limit)))
}

/// GET /api/v1/getMovieDetails/{mid} — full movie document.
pub async fn movie_details(
    State(state): State<AppState>,
    Path(mid): Path<i64>,
) -> AppResult<Json<MovieRecord>> {
    let record = state.catalog.movie_details(mid).await?;
    Ok(Json(record))
}

/// GET /api/v1/getShowDetails/{sid} — full show document.
pub async fn show_details(
    State(state): State<AppState>,
    Path(sid): Path<i64>,
) -> AppResult<Json<ShowRecord>> {
    let record = state.catalog.show_details(sid).await?;
    Ok(Json(record))
}

#[derive(Debug, Deserialize)]
pub struct PaginatedQuery {
    pub page: Option<u32>,
    pub items_per_page: Option<u32>,
    pub sort_by: Option<String>,
}

/// GET /api/v1/paginated/{media_type} — paginated card list.
pub async fn paginated(
    State(state): State<AppState>,
    Path(media_type): Path<String>,
    Query(query): Query<PaginatedQuery>,
) -> AppResult<Json<Page<MediaCard>>> {
    let media_type = parse_media_type(&media_type)?;
    let params = PageParams::new(query.page, query.items_per_page);
    let sort_by = query.sort_by.as_deref().unwrap_or("new");
    let page = state.catalog.paginated(media_type, params, sort_by).await?;
    Ok(Json(page))
}

/// GET /api/v1/trending — combined trending list from the cache.
pub async fn trending(State(state): State<AppState>) -> Json<Vec<MediaCard>> {
    Json(state.cache.trending_combined())
}

#[derive(Debug, Deserialize)]
pub struct TrendingBody {
    pub movie: Vec<i64>,
    pub show: Vec<i64>,
}

#[derive(Debug, Serialize)]
pub struct TrendingReply {
    pub status: String,
    pub data: TrendingEntries,
}

/// POST /api/v1/update_trending — write the curated trending ids.
/// Admin token required.
pub async fn update_trending(
    _admin: AdminToken,
    State(state): State<AppState>,
    Json(body): Json<TrendingBody>,
) -> AppResult<Json<TrendingReply>> {
    let data = state.catalog.save_trending(&body.movie, &body.show).await?;

    // Refresh the snapshot so readers see the new selection promptly.
    let cache = state.cache.clone();
    tokio::spawn(async move { cache.update_all().await });

    Ok(Json(TrendingReply {
        status: "success".to_string(),
        data,
    }))
}

#[derive(Debug, Deserialize)]
pub struct SearchAllQuery {
    pub query: String,
    pub limit: Option<i64>,
}

/// GET /api/v1/search — fuzzy search across movies and shows.
pub async fn search_all(
    State(state): State<AppState>,
    Query(query): Query<SearchAllQuery>,
) -> AppResult<Json<Vec<ScoredCard>>> {
    if query.query.len() < MIN_QUERY_LEN {
        return Err(AppError::bad_request(format!(
            "query must be at least {MIN_QUERY_LEN} characters"
        )));
    }
    let limit = query.limit.unwrap_or(DEFAULT_SEARCH_LIMIT);
    if !(1..=MAX_SEARCH_LIMIT).contains(&limit) {
        return Err(AppError::bad_request(format!(
            "limit must be between 1 and {MAX_SEARCH_LIMIT}"
        )));
    }
    let results = state.catalog.search_all(&query.query, limit).await?;
    Ok(Json(results))
}

#[derive(Debug, Deserialize)]
pub struct SearchMediaQuery {
    pub query: String,
}

/// GET /api/v1/search/{media_type} — substring title search.
pub async fn search_media(
    State(state): State<AppState>,
    Path(media_type): Path<String>,
    Query(query): Query<SearchMediaQuery>,
) -> AppResult<Json<Vec<MediaCard>>> {
    let media_type = parse_media_type(&media_type)?;
    if query.query.len() < MIN_QUERY_LEN {
        return Err(AppError::bad_request(format!(
            "query must be at least {MIN_QUERY_LEN} characters"
        )));
    }
    let results = state
        .catalog
        .search_substring(media_type, &query.query)
        .await?;
    Ok(Json(results))
}

/// GET /api/v1/similar?media_type=&genres=… — 1–2 genre keywords.
/// Accepts repeated `genres` parameters.
pub async fn similar(
    State(state): State<AppState>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> AppResult<Json<Vec<MediaCard>>> {
    let mut media_type = None;
    let mut genres = Vec::new();
    for (key, value) in pairs {
        match key.as_str() {
            "media_type" => media_type = Some(value),
            "genres" => genres.push(value),
            _ => {}
        }
    }

    let media_type = media_type
        .ok_or_else(|| AppError::bad_request("media_type query parameter is required"))?;
    let media_type = parse_media_type(&media_type)?;

    if genres.is_empty() || genres.len() > 2 {
        return Err(AppError::bad_request("Must provide 1-2 genre keywords"));
    }

    let results = state
        .catalog
        .similar(media_type, &genres, SIMILAR_LIMIT)
        .await?;
    Ok(Json(results))
}

/// GET /api/v1/user/{user_id} — registered-user lookup.
pub async fn check_user(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> AppResult<Json<Value>> {
    match state.catalog.find_user(user_id).await? {
        Some(user) => Ok(Json(json!({
            "status": "success",
            "message": "User found",
            "user": user,
        }))),
        None => Err(AppError::not_found(format!(
            "User {user_id} not found in database"
        ))),
    }
}
