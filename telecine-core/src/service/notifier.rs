//! Operational notices to the log chat and poster cards to the
//! broadcast channel, sent through the primary upstream client.

use std::sync::Arc;

use tracing::warn;

use crate::models::year_of;
use crate::service::enrich::EnrichedRecord;
use crate::upstream::wire::Connection;

const POSTER_IMAGE_BASE: &str = "https://image.tmdb.org/t/p/w500";

/// Sends leveled notices to the configured logs chat. A chat id of 0
/// disables sending; failures are logged locally and swallowed so a
/// broken log chat never takes down the pipeline.
pub struct ChatNotifier {
    conn: Arc<dyn Connection>,
    logs_chat: i64,
}

impl ChatNotifier {
    #[must_use]
    pub fn new(conn: Arc<dyn Connection>, logs_chat: i64) -> Self {
        Self { conn, logs_chat }
    }

    async fn send_log(&self, level: &str, message: &str) {
        if self.logs_chat == 0 {
            return;
        }
        let formatted = format!("**[{level}]** {message}");
        if let Err(e) = self.conn.send_message(self.logs_chat, &formatted).await {
            warn!("failed to send log notice to chat: {e}");
        }
    }

    pub async fn info(&self, message: &str) {
        self.send_log("INFO", message).await;
    }

    pub async fn warning(&self, message: &str) {
        self.send_log("WARNING", message).await;
    }

    pub async fn error(&self, message: &str, exception: Option<&(dyn std::fmt::Display + Send + Sync)>) {
        let formatted = match exception {
            Some(e) => format!("{message}\n\n**Exception:** `{e}`"),
            None => message.to_string(),
        };
        self.send_log("ERROR", &formatted).await;
    }
}

/// Posts a formatted poster card for newly ingested content.
pub struct Poster {
    conn: Arc<dyn Connection>,
    post_chat: i64,
}

impl Poster {
    #[must_use]
    pub fn new(conn: Arc<dyn Connection>, post_chat: i64) -> Self {
        Self { conn, post_chat }
    }

    pub async fn post(&self, record: &EnrichedRecord) {
        if self.post_chat == 0 {
            return;
        }
        let Some((poster_path, caption)) = poster_card(record) else {
            warn!("record has no poster card to publish");
            return;
        };
        let photo_url = format!("{POSTER_IMAGE_BASE}{poster_path}");
        if let Err(e) = self.conn.send_photo(self.post_chat, &photo_url, &caption).await {
            warn!("failed to post update card: {e}");
        }
    }
}

/// Poster path and caption for a freshly ingested record, or `None`
/// when the record carries no poster or quality variant.
#[must_use]
pub fn poster_card(record: &EnrichedRecord) -> Option<(String, String)> {
    match record {
        EnrichedRecord::Movie(movie) => {
            let poster = movie.poster_path.clone()?;
            let quality = movie.quality.first()?;
            let year = year_of(movie.release_date.as_deref())
                .map(|y| y.to_string())
                .unwrap_or_default();
            let stars = movie
                .cast
                .iter()
                .take(4)
                .map(|member| member.name.clone())
                .collect::<Vec<_>>()
                .join(",");
            let caption = format!(
                "`{title}` `({year})`\n\
                 **Quality :** `{quality}`\n\
                 **Size :** `{size}`\n\n\
                 **Genres :** `{genres}`\n\
                 **Score ⭐️:** `{score}` ~ `{votes} votes`\n\
                 **Director 📽:** `{directors}`\n\
                 **Stars 👥:** `{stars}`\n\n\
                 **Story Line :** {overview}",
                title = movie.title,
                year = year,
                quality = quality.kind,
                size = quality.size,
                genres = movie.genres.join(", "),
                score = movie.vote_average.unwrap_or(0.0),
                votes = movie.vote_count.unwrap_or(0),
                directors = movie.directors.join(","),
                stars = stars,
                overview = movie.overview.clone().unwrap_or_default(),
            );
            Some((poster, caption))
        }
        EnrichedRecord::Show(show) => {
            let poster = show.poster_path.clone()?;
            let season = show.season.first()?;
            let episode = season.episodes.first()?;
            let quality = episode.quality.first()?;
            let year = year_of(show.release_date.as_deref())
                .map(|y| y.to_string())
                .unwrap_or_default();
            let stars = show
                .cast
                .iter()
                .take(4)
                .map(|member| member.name.clone())
                .collect::<Vec<_>>()
                .join(",");
            let caption = format!(
                "`{title}` `({year})` `Season {season_number} Episode {episode_number}`\n\
                 **Quality :** `{quality}`\n\
                 **Size :** `{size}`\n\n\
                 **Genres :** `{genres}`\n\
                 **Score ⭐️:** `{score}` ~ `{votes} votes`\n\
                 **Creator 📽:** `{creators}`\n\
                 **Stars 👥:** `{stars}`\n\n\
                 **Story Line :** {overview}",
                title = show.title,
                year = year,
                season_number = season.season_number,
                episode_number = episode.episode_number,
                quality = quality.kind,
                size = quality.size,
                genres = show.genres.join(", "),
                score = show.vote_average.unwrap_or(0.0),
                votes = show.vote_count.unwrap_or(0),
                creators = show.creators.join(","),
                stars = stars,
                overview = show.overview.clone().unwrap_or_default(),
            );
            Some((poster, caption))
        }
    }
}
