use std::sync::Arc;

use anyhow::Result;
use teloxide::prelude::*;
use teloxide::types::BotCommand;
use tracing::{error, info, warn};

use crate::config::ServerConfig;
use crate::contract::BalanceSource;
use crate::dispatcher::{handle_event, InboundEvent};
use crate::platform;

/// Shared application state, built once in `main` and read-only afterwards.
pub struct AppState {
    pub bot: Bot,
    pub balances: Arc<dyn BalanceSource>,
    /// Our `@username`, used to tell our commands from other bots' in groups.
    pub username: Option<String>,
}

impl AppState {
    pub fn new(bot: Bot, balances: Arc<dyn BalanceSource>, username: Option<String>) -> Self {
        Self {
            bot,
            balances,
            username,
        }
    }
}

/// Look up the bot's username. Failure is logged; commands then match
/// regardless of any `@` suffix.
pub async fn fetch_username(bot: &Bot) -> Option<String> {
    match bot.get_me().await {
        Ok(me) => me.user.username,
        Err(e) => {
            warn!("Failed to fetch bot identity: {}", e);
            None
        }
    }
}

/// Start the bot in whichever transport the configuration selects.
pub async fn run(state: Arc<AppState>, server: &ServerConfig) -> Result<()> {
    register_commands(&state.bot).await;

    if server.production {
        info!("Production mode: serving webhook on port {}", server.port);
        platform::webhook::run(state, server).await
    } else {
        info!("Development mode: long polling");
        platform::telegram::run(state).await
    }
}

async fn register_commands(bot: &Bot) {
    let commands = vec![
        BotCommand::new("start", "Show the welcome message"),
        BotCommand::new("check", "Check the NFT balance of a wallet address"),
    ];
    if let Err(e) = bot.set_my_commands(commands).await {
        warn!("Failed to register bot commands: {}", e);
    }
}

/// Handle one event end to end. Failures to deliver the reply are logged and
/// swallowed; nothing here can take the transport down.
pub async fn respond(state: &AppState, event: InboundEvent) {
    info!(
        "Message from {:?} in chat {}: {:?}",
        event.sender, event.chat_id.0, event.kind
    );

    let reply = handle_event(&event, state.balances.as_ref()).await;

    if let Err(e) = state.bot.send_message(reply.chat_id, reply.text).await {
        error!("Failed to send reply to chat {}: {}", reply.chat_id.0, e);
    }
}
