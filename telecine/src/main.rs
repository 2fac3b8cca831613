mod bot;
mod migrations;
mod server;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use telecine_core::logging;
use telecine_core::repository::{
    ConfigRepository, MovieRepository, ShowRepository, UserRepository,
};
use telecine_core::service::cache::CatalogCache;
use telecine_core::service::enrich::{EnrichmentClient, MediaProbe, TmdbClient};
use telecine_core::service::notifier::Poster;
use telecine_core::service::{CatalogService, ChatNotifier, IngestService, TokenService};
use telecine_core::upstream::gateway::GatewayConnector;
use telecine_core::upstream::{StreamerHub, WorkerPool};
use telecine_core::Config;

use bot::BotContext;
use server::TelecineServer;
use telecine_api::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Load and validate configuration
    let config = Config::load(Some("config.toml"))
        .map_err(|e| anyhow::anyhow!("failed to load configuration: {e}"))?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;
    let config = Arc::new(config);

    // 2. Initialize logging
    logging::init_logging(&config.logging)?;
    info!("Telecine backend starting...");
    info!("HTTP address: {}", config.http_address());

    // 3. Initialize the store
    let pg = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .acquire_timeout(Duration::from_secs(config.database.connect_timeout_seconds))
        .idle_timeout(Duration::from_secs(config.database.idle_timeout_seconds))
        .connect(config.database_url())
        .await?;
    migrations::run_migrations(&pg).await?;

    let movies = MovieRepository::new(pg.clone());
    let shows = ShowRepository::new(pg.clone());
    let users = UserRepository::new(pg.clone());
    let configs = ConfigRepository::new(pg.clone());

    let catalog = CatalogService::new(
        movies.clone(),
        shows.clone(),
        users,
        configs.clone(),
        config.catalog.merge_movie_qualities_by_type,
    );
    let cache = CatalogCache::new(movies, shows, configs);

    // 4. Connect the worker-client pool through the session gateway
    let connector = Arc::new(GatewayConnector::new(
        config.upstream.gateway_addr.clone(),
        config.upstream.api_id,
        config.upstream.api_hash.clone(),
    ));
    let pool = Arc::new(WorkerPool::start(connector, &config.upstream).await?);
    info!("Upstream clients started successfully");

    let streamers = Arc::new(StreamerHub::new());
    let tokens = TokenService::new(&config.auth.site_secret);

    let primary = pool.primary().connection().clone();
    let notifier = Arc::new(ChatNotifier::new(primary.clone(), config.upstream.logs_chat));
    let poster = config
        .upstream
        .post_updates
        .then(|| Arc::new(Poster::new(primary, config.upstream.post_chat)));

    // 5. Enrichment pipeline and ingestion worker
    let metadata = TmdbClient::new(&config.metadata)?;
    let enrichment = Arc::new(EnrichmentClient::new(
        metadata,
        MediaProbe::new(config.catalog.probe_dir.clone()),
    ));
    let ingest = IngestService::new(
        enrichment,
        pool.clone(),
        streamers.clone(),
        catalog.clone(),
        cache.clone(),
        notifier.clone(),
        poster,
        config.upstream.use_caption,
    );

    // 6. Supervised catalog-cache refresher
    info!("Starting cache manager...");
    let _cache_task = spawn_supervised_refresher(cache.clone(), notifier.clone());

    // 7. Bot dispatcher on the primary client
    let bot_ctx = Arc::new(BotContext {
        config: config.clone(),
        pool: pool.clone(),
        ingest: ingest.clone(),
        catalog: catalog.clone(),
        notifier: notifier.clone(),
    });
    let _dispatcher_task = tokio::spawn(bot::run_dispatcher(bot_ctx));

    notifier.info("🚀 Bot started successfully!").await;

    // 8. HTTP server (runs until SIGINT/SIGTERM, then drains)
    info!("Initializing web server...");
    let state = AppState {
        config: config.clone(),
        tokens,
        catalog,
        cache,
        pool: pool.clone(),
        streamers,
    };
    TelecineServer::new(config, state, ingest, pool, pg, notifier)
        .start()
        .await
}

/// Keep the cache refresher alive: a crash is reported to the log chat
/// and the task restarted instead of dying silently.
fn spawn_supervised_refresher(
    cache: Arc<CatalogCache>,
    notifier: Arc<ChatNotifier>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let handle = tokio::spawn(cache.clone().run_refresher());
            match handle.await {
                Ok(()) => warn!("cache refresher exited, restarting"),
                Err(e) => {
                    error!("cache manager crashed: {e}");
                    notifier
                        .error("❌ Cache manager crashed", Some(&e as &(dyn std::fmt::Display + Send + Sync)))
                        .await;
                }
            }
            tokio::time::sleep(Duration::from_secs(10)).await;
        }
    })
}
