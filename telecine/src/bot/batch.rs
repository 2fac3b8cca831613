//! Batch seeder: enumerate a message-link range and queue every media
//! message for ingestion.

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use regex::Regex;
use tracing::{error, info, warn};

use telecine_core::service::ingest::MessageQueue;
use telecine_core::upstream::wire::{ChatMessage, Connection, WireError};

use super::BotContext;

static MESSAGE_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https://t\.me/(?:c/)?([^/]+)/(\d+)").expect("link pattern must compile")
});

/// Pause between message fetches, randomized to stay under the
/// platform's enumeration limits.
const ENUMERATION_PAUSE_SECS: (u64, u64) = (30, 60);

const PROGRESS_EVERY: i64 = 50;

/// Chat referenced by a message link: numeric identifiers get the
/// `-100` supergroup prefix, alphabetic ones pass through as usernames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatRef {
    Id(i64),
    Username(String),
}

#[must_use]
pub fn parse_message_link(link: &str) -> Option<(ChatRef, i64)> {
    let caps = MESSAGE_LINK.captures(link)?;
    let identifier = caps.get(1)?.as_str();
    let message_id: i64 = caps.get(2)?.as_str().parse().ok()?;

    let chat = if identifier.chars().all(|c| c.is_ascii_digit()) {
        ChatRef::Id(format!("-100{identifier}").parse().ok()?)
    } else {
        ChatRef::Username(identifier.to_string())
    };
    Some((chat, message_id))
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BatchStats {
    pub checked: i64,
    pub queued: usize,
}

pub async fn run_batch_command(ctx: Arc<BotContext>, message: ChatMessage) {
    let conn = ctx.pool.primary().connection().clone();
    let chat_id = message.chat_id;
    let text = message.text.clone().unwrap_or_default();
    let parts: Vec<&str> = text.split_whitespace().collect();

    if parts.len() < 3 {
        let _ = conn
            .send_message(
                chat_id,
                "⚠️ Please provide both start and end message links.\n\
                 Example: `/batch https://t.me/c/123456789/123 https://t.me/c/123456789/456`",
            )
            .await;
        return;
    }

    let Some((start_chat, start_id)) = parse_message_link(parts[1]) else {
        let _ = conn
            .send_message(chat_id, "⚠️ Invalid start link format.")
            .await;
        return;
    };
    let Some((end_chat, end_id)) = parse_message_link(parts[2]) else {
        let _ = conn
            .send_message(chat_id, "⚠️ Invalid end link format.")
            .await;
        return;
    };

    if start_chat != end_chat {
        let _ = conn
            .send_message(chat_id, "⚠️ Both links must be from the same chat!")
            .await;
        return;
    }

    let target_chat = match &start_chat {
        ChatRef::Id(id) => *id,
        ChatRef::Username(username) => match conn.resolve_chat(username).await {
            Ok(id) => id,
            Err(e) => {
                error!("failed to resolve chat username: {e}");
                let _ = conn
                    .send_message(chat_id, "⚠️ Could not resolve the linked chat.")
                    .await;
                return;
            }
        },
    };

    let (from_id, to_id) = if end_id < start_id {
        (end_id, start_id)
    } else {
        (start_id, end_id)
    };
    let total = to_id - from_id + 1;

    // The batch worker runs without per-item cache refreshes.
    ctx.ingest.ensure_worker(false);

    let _ = conn
        .send_message(
            chat_id,
            &format!("🔄 Processing {total} messages from ID {from_id} to {to_id}"),
        )
        .await;
    ctx.notifier
        .info(&format!(
            "Starting batch processing of {total} messages from chat {target_chat}"
        ))
        .await;

    let queue_size_before = ctx.ingest.queue().len();
    let stats = enumerate_range(
        &conn,
        ctx.ingest.queue(),
        target_chat,
        from_id,
        to_id,
        Some((chat_id, total)),
    )
    .await;

    let final_queue_size = ctx.ingest.queue().len();
    let queue_change = final_queue_size.saturating_sub(queue_size_before);
    let _ = conn
        .send_message(
            chat_id,
            &format!(
                "✅ Batch processing completed!\n\
                 • Checked {} messages\n\
                 • Queued {} media files for processing\n\
                 • Current queue size: {final_queue_size} (+{queue_change})",
                stats.checked, stats.queued
            ),
        )
        .await;
    ctx.notifier
        .info(&format!(
            "Completed batch processing: {} media files queued from {} messages",
            stats.queued, stats.checked
        ))
        .await;
}

/// Enumerate `[from_id, to_id]` in order, queueing every media message.
/// Missing messages are skipped; flood waits are honored in place; the
/// loop pauses a randomized 30–60 seconds between fetches.
pub(crate) async fn enumerate_range(
    conn: &Arc<dyn Connection>,
    queue: &Arc<MessageQueue<ChatMessage>>,
    target_chat: i64,
    from_id: i64,
    to_id: i64,
    progress_to: Option<(i64, i64)>,
) -> BatchStats {
    let mut stats = BatchStats::default();
    let mut current = from_id;

    while current <= to_id {
        match conn.get_messages(target_chat, current).await {
            Ok(Some(message)) if message.ingestible_media().is_some() => {
                queue.put(message);
                stats.queued += 1;
            }
            Ok(_) => {}
            Err(WireError::FloodWait(seconds)) => {
                if let Some((status_chat, _)) = progress_to {
                    let _ = conn
                        .send_message(
                            status_chat,
                            &format!("⏳ Rate limited. Waiting for {seconds} seconds..."),
                        )
                        .await;
                }
                tokio::time::sleep(Duration::from_secs(seconds)).await;
                // Retry the same message id after the wait.
                continue;
            }
            Err(e) => {
                warn!(message_id = current, "error fetching message: {e}");
            }
        }

        let pause = rand::random_range(ENUMERATION_PAUSE_SECS.0..=ENUMERATION_PAUSE_SECS.1);
        tokio::time::sleep(Duration::from_secs(pause)).await;

        stats.checked += 1;
        current += 1;

        if let Some((status_chat, total)) = progress_to {
            if stats.checked % PROGRESS_EVERY == 0 {
                let progress = (stats.checked as f64 / total as f64) * 100.0;
                let _ = conn
                    .send_message(
                        status_chat,
                        &format!(
                            "🔄 Progress: {progress:.1}%\n\
                             • Checked: {}/{total} messages\n\
                             • Media queued: {} files\n\
                             • Queue size: {}",
                            stats.checked,
                            stats.queued,
                            queue.len()
                        ),
                    )
                    .await;
            }
        }
    }

    info!(
        checked = stats.checked,
        queued = stats.queued,
        "batch enumeration finished"
    );
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use telecine_core::upstream::memory::MemoryPlatform;
    use telecine_core::upstream::wire::MediaKind;

    #[test]
    fn numeric_identifier_gets_supergroup_prefix() {
        let (chat, message_id) =
            parse_message_link("https://t.me/c/123456789/123").expect("parse");
        assert_eq!(chat, ChatRef::Id(-100123456789));
        assert_eq!(message_id, 123);
    }

    #[test]
    fn alphabetic_identifier_is_a_username() {
        let (chat, message_id) = parse_message_link("https://t.me/somechannel/55").expect("parse");
        assert_eq!(chat, ChatRef::Username("somechannel".to_string()));
        assert_eq!(message_id, 55);
    }

    #[test]
    fn invalid_links_are_rejected() {
        assert!(parse_message_link("https://example.com/c/1/2").is_none());
        assert!(parse_message_link("t.me/c/1/2").is_none());
        assert!(parse_message_link("https://t.me/c/123456789/abc").is_none());
    }

    #[tokio::test]
    async fn enumeration_queues_only_media_messages() {
        let chat = -100123456789i64;
        let platform = MemoryPlatform::new(2);
        for id in [1000i64, 1002, 1005] {
            platform.add_media_message(
                chat,
                id,
                MediaKind::Video,
                2,
                &format!("uniq{id}"),
                Some("file.mkv"),
                None,
                vec![0u8; 8],
            );
        }
        platform.add_text_message(chat, 1001, None, "just text");
        // 1003, 1004 missing entirely.

        let conn = platform.connect(0, "token", true).await.expect("connect");
        let queue = Arc::new(MessageQueue::new());

        tokio::time::pause();
        let stats = enumerate_range(&conn, &queue, chat, 1000, 1005, None).await;

        assert_eq!(stats.checked, 6);
        assert_eq!(stats.queued, 3);
        assert_eq!(queue.len(), 3);
    }

    #[tokio::test]
    async fn reversed_range_is_swapped_before_enumeration() {
        // The swap happens in run_batch_command; mirror it here over
        // the parsed pair to pin the behavior.
        let (start, end) = (1010i64, 1000i64);
        let (from_id, to_id) = if end < start { (end, start) } else { (start, end) };
        assert_eq!((from_id, to_id), (1000, 1010));
    }

    #[tokio::test]
    async fn flood_wait_retries_the_same_message() {
        let chat = -100123456789i64;
        let platform = MemoryPlatform::new(2);
        platform.add_media_message(
            chat,
            2000,
            MediaKind::Video,
            2,
            "uniq2000",
            None,
            None,
            vec![0u8; 8],
        );
        platform.flood_next_get_messages(5);

        let conn = platform.connect(0, "token", true).await.expect("connect");
        let queue = Arc::new(MessageQueue::new());

        tokio::time::pause();
        let stats = enumerate_range(&conn, &queue, chat, 2000, 2000, None).await;

        assert_eq!(stats.checked, 1);
        assert_eq!(stats.queued, 1);
    }
}
