//! Deep-link file delivery: `/start file_<id>_<kind>_<q>_<s>_<e>`
//! resolves the referenced quality variant, forwards the stored message
//! with the author dropped, and schedules its deletion.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};

use telecine_core::models::MediaType;
use telecine_core::service::StreamClaims;
use telecine_core::upstream::wire::ChatMessage;

use super::BotContext;

/// Content coordinates parsed from a start payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileLinkRequest {
    pub id: i64,
    pub media_type: MediaType,
    pub quality_index: usize,
    pub season: i64,
    pub episode: i64,
}

/// Parse `file_<id>_<kind>_<qualityIdx>_<season>_<episode>` out of a
/// `/start` command. `kind` is `m` or `s`; movie links carry
/// placeholder season/episode values.
#[must_use]
pub fn parse_start_payload(text: &str) -> Option<FileLinkRequest> {
    let payload = text.split("file_").nth(1)?;
    let details: Vec<&str> = payload.split('_').collect();
    if details.len() < 5 {
        return None;
    }

    let id: i64 = details[0].parse().ok()?;
    let media_type = match details[1] {
        "m" => MediaType::Movie,
        "s" => MediaType::Show,
        _ => return None,
    };
    let quality_index: usize = details[2].parse().ok()?;
    // Movie links carry non-numeric placeholders here.
    let season: i64 = details[3].parse().unwrap_or(0);
    let episode: i64 = details[4].parse().unwrap_or(0);

    Some(FileLinkRequest {
        id,
        media_type,
        quality_index,
        season,
        episode,
    })
}

pub async fn handle_file_link(ctx: Arc<BotContext>, message: ChatMessage) {
    let conn = ctx.pool.primary().connection().clone();
    let chat_id = message.chat_id;

    let _ = conn
        .send_message(chat_id, "Processing your request, please wait...")
        .await;

    let Some(request) = message.text.as_deref().and_then(parse_start_payload) else {
        let _ = conn.send_message(chat_id, "Invalid file link format.").await;
        return;
    };

    // The stream-token resolver already knows how to walk the quality
    // coordinates; reuse it with a synthetic claims payload.
    let claims = StreamClaims {
        id: request.id.to_string(),
        media_type: request.media_type,
        quality_index: request.quality_index,
        season_number: (request.media_type == MediaType::Show).then_some(request.season),
        episode_number: (request.media_type == MediaType::Show).then_some(request.episode),
        expiry: 0.0,
    };

    let source = match ctx.catalog.video_source(&claims).await {
        Ok(source) => source,
        Err(e) => {
            error!("failed to resolve file link: {e}");
            let _ = conn
                .send_message(chat_id, "Sorry, the requested file was not found.")
                .await;
            return;
        }
    };

    let _ = conn
        .send_message(chat_id, "Found your file! Forwarding it now...")
        .await;

    match conn
        .forward_message(chat_id, source.chat_id, source.msg_id, true)
        .await
    {
        Ok(forwarded_id) => {
            let minutes = ctx.config.upstream.delete_after_minutes;
            let delete_conn = conn.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(60 * minutes)).await;
                match delete_conn.delete_message(chat_id, forwarded_id).await {
                    Ok(()) => info!(chat_id, forwarded_id, "auto-deleted forwarded file"),
                    Err(e) => error!("failed to auto-delete message {forwarded_id}: {e}"),
                }
            });

            let _ = conn
                .send_message(
                    chat_id,
                    &format!(
                        "Please forward this file to your saved messages. \
                         It will be deleted in {minutes} minutes."
                    ),
                )
                .await;
        }
        Err(e) => {
            error!("failed to forward file: {e}");
            let _ = conn
                .send_message(
                    chat_id,
                    "Sorry, an error occurred while processing your request.",
                )
                .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_show_payload() {
        let request = parse_start_payload("/start file_7_s_1_2_3").expect("parse");
        assert_eq!(
            request,
            FileLinkRequest {
                id: 7,
                media_type: MediaType::Show,
                quality_index: 1,
                season: 2,
                episode: 3,
            }
        );
    }

    #[test]
    fn parses_movie_payload_with_placeholders() {
        let request = parse_start_payload("/start file_42_m_0_None_None").expect("parse");
        assert_eq!(request.media_type, MediaType::Movie);
        assert_eq!(request.id, 42);
        assert_eq!(request.season, 0);
        assert_eq!(request.episode, 0);
    }

    #[test]
    fn rejects_malformed_payloads() {
        assert!(parse_start_payload("/start file_42_m_0").is_none());
        assert!(parse_start_payload("/start file_abc_m_0_0_0").is_none());
        assert!(parse_start_payload("/start file_42_x_0_0_0").is_none());
        assert!(parse_start_payload("/start hello").is_none());
    }
}
