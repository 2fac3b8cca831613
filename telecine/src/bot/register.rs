//! User registration: `/register` in a private chat creates the user
//! record (insert-if-absent) and reports the granted access window.

use std::sync::Arc;

use tracing::{error, info};

use telecine_core::models::UserRecord;
use telecine_core::repository::RegisterStatus;
use telecine_core::upstream::wire::ChatMessage;

use super::BotContext;

pub async fn handle_register(ctx: Arc<BotContext>, message: ChatMessage) {
    let conn = ctx.pool.primary().connection().clone();
    let chat_id = message.chat_id;

    if !ctx.config.upstream.registration_open {
        let _ = conn
            .send_message(chat_id, "❌ Registration is currently disabled.")
            .await;
        return;
    }

    let Some(user_id) = message.from_user else {
        let _ = conn
            .send_message(chat_id, "❌ Unable to get user information.")
            .await;
        return;
    };

    match ctx.catalog.register_user(&UserRecord::new(user_id)).await {
        Ok((RegisterStatus::Registered, user)) => {
            info!(user_id, "user registered");
            ctx.notifier
                .info(&format!("✅ New user registered: {user_id}"))
                .await;
            let _ = conn
                .send_message(
                    chat_id,
                    &format!(
                        "✅ **Registration Successful!**\n\n\
                         👤 **User ID:** `{user_id}`\n\
                         📅 **Registration Date:** {}\n\
                         🎬 **Subscribed for:** {} days\n\n\
                         Welcome to {}! You can now access media files.",
                        user.registration_date.format("%Y-%m-%d %H:%M:%S"),
                        user.slimit,
                        ctx.config.metadata.site_name,
                    ),
                )
                .await;
        }
        Ok((RegisterStatus::AlreadyExists, user)) => {
            let _ = conn
                .send_message(
                    chat_id,
                    &format!(
                        "ℹ️ **Already Registered!**\n\n\
                         👤 **User ID:** `{user_id}`\n\
                         📅 **Registration Date:** {}\n\n\
                         You are already registered and can access media files.",
                        user.registration_date.format("%Y-%m-%d %H:%M:%S"),
                    ),
                )
                .await;
        }
        Err(e) => {
            error!("registration failed: {e}");
            let _ = conn
                .send_message(chat_id, "❌ Registration failed. Please try again later.")
                .await;
        }
    }
}
