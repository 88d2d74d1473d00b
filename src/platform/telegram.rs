use std::sync::Arc;

use anyhow::Result;
use teloxide::prelude::*;
use tracing::{info, warn};

use crate::bot::{respond, AppState};
use crate::dispatcher::InboundEvent;

/// Long-poll Telegram until the process is stopped.
pub async fn run(state: Arc<AppState>) -> Result<()> {
    let bot = state.bot.clone();

    info!("Starting Telegram long polling...");

    let handler = Update::filter_message()
        .filter_map(|msg: Message, state: Arc<AppState>| {
            InboundEvent::from_message(&msg, state.username.as_deref())
        })
        .endpoint(handle_event);

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .default_handler(|upd| async move {
            warn!("Unhandled update: {:?}", upd.id);
        })
        .error_handler(LoggingErrorHandler::with_custom_text("telegram"))
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}

async fn handle_event(event: InboundEvent, state: Arc<AppState>) -> ResponseResult<()> {
    respond(&state, event).await;
    Ok(())
}
