//! Bot surface: routes platform updates into the ingestion queue, the
//! batch seeder, and the deep-link forwarder.

pub mod batch;
pub mod links;
pub mod register;

use std::sync::Arc;

use tracing::{info, warn};

use telecine_core::service::{CatalogService, ChatNotifier, IngestService};
use telecine_core::upstream::wire::{ChatMessage, Update};
use telecine_core::upstream::WorkerPool;
use telecine_core::Config;

pub struct BotContext {
    pub config: Arc<Config>,
    pub pool: Arc<WorkerPool>,
    pub ingest: IngestService,
    pub catalog: Arc<CatalogService>,
    pub notifier: Arc<ChatNotifier>,
}

/// Consume updates from the primary client until the connection ends.
pub async fn run_dispatcher(ctx: Arc<BotContext>) {
    let conn = ctx.pool.primary().connection().clone();
    info!("bot dispatcher started");
    loop {
        match conn.next_update().await {
            Ok(Update::Message { message }) => dispatch(&ctx, message),
            Err(e) => {
                warn!("update stream ended: {e}");
                break;
            }
        }
    }
}

fn dispatch(ctx: &Arc<BotContext>, message: ChatMessage) {
    if let Some(text) = message.text.as_deref() {
        if is_private_chat(message.chat_id) && text.starts_with("/start file_") {
            let ctx = ctx.clone();
            tokio::spawn(async move { links::handle_file_link(ctx, message).await });
            return;
        }

        if is_private_chat(message.chat_id) && text.trim_start().starts_with("/register") {
            let ctx = ctx.clone();
            tokio::spawn(async move { register::handle_register(ctx, message).await });
            return;
        }

        if text.starts_with("/batch") && is_sudo(ctx, message.from_user) {
            let ctx = ctx.clone();
            tokio::spawn(async move { batch::run_batch_command(ctx, message).await });
            return;
        }
    }

    // Media from an ingestion source chat feeds the queue.
    if ctx.config.upstream.auth_chats.contains(&message.chat_id) {
        if let Some(attachment) = message.ingestible_media() {
            let title = attachment
                .locator
                .file_name
                .clone()
                .unwrap_or_else(|| "Unknown file".to_string());
            info!(title = %title, "queued media for processing");
            ctx.ingest.enqueue(message, true);
        }
    }
}

fn is_private_chat(chat_id: i64) -> bool {
    chat_id > 0
}

fn is_sudo(ctx: &BotContext, user: Option<i64>) -> bool {
    user.is_some_and(|id| ctx.config.upstream.owner_ids.contains(&id))
}
