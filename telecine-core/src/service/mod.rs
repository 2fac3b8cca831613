pub mod cache;
pub mod catalog;
pub mod enrich;
pub mod ingest;
pub mod notifier;
pub mod token;

pub use cache::{CacheSnapshot, CatalogCache};
pub use catalog::{CatalogService, VideoSource};
pub use enrich::EnrichmentClient;
pub use ingest::{IngestItem, IngestService, MessageQueue};
pub use notifier::ChatNotifier;
pub use token::{AdminClaims, StreamClaims, TokenService};
