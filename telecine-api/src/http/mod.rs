// Module: http
// HTTP/JSON REST API in front of the catalog and the streaming pipeline

pub mod auth;
pub mod catalog;
pub mod error;
pub mod stream;

use std::sync::Arc;

use axum::{
    http::Method,
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use telecine_core::service::{CatalogCache, CatalogService, TokenService};
use telecine_core::upstream::{StreamerHub, WorkerPool};
use telecine_core::Config;

pub use error::{AppError, AppResult};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub tokens: TokenService,
    pub catalog: Arc<CatalogService>,
    pub cache: Arc<CatalogCache>,
    pub pool: Arc<WorkerPool>,
    pub streamers: Arc<StreamerHub>,
}

/// Create the HTTP router with all routes and global layers.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/login", post(auth::login))
        .route("/api/v1/auth-check", get(auth::auth_check))
        .route("/api/v1/heroslider", get(catalog::hero_slider))
        .route("/api/v1/getlatest/{media_type}", get(catalog::get_latest))
        .route("/api/v1/getMovieDetails/{mid}", get(catalog::movie_details))
        .route("/api/v1/getShowDetails/{sid}", get(catalog::show_details))
        .route("/api/v1/paginated/{media_type}", get(catalog::paginated))
        .route("/api/v1/trending", get(catalog::trending))
        .route("/api/v1/update_trending", post(catalog::update_trending))
        .route("/api/v1/search", get(catalog::search_all))
        .route("/api/v1/search/{media_type}", get(catalog::search_media))
        .route("/api/v1/similar", get(catalog::similar))
        .route("/api/v1/user/{user_id}", get(catalog::check_user))
        .route(
            "/api/v1/dl/{id}",
            get(stream::stream_handler).options(stream::stream_preflight),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer())
        .with_state(state)
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
}
