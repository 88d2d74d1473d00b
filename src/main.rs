mod address;
mod bot;
mod config;
mod contract;
mod dispatcher;
mod platform;

use std::sync::Arc;

use anyhow::{Context, Result};
use teloxide::Bot;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::bot::AppState;
use crate::config::Config;
use crate::contract::ContractClient;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,nft_balance_bot=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load configuration")?;

    info!("Configuration loaded successfully");
    info!("  RPC: {}", config.chain.rpc_url);
    info!("  Contract: {}", config.chain.contract_address);
    info!("  ABI: {}", config.chain.abi_path.display());
    info!(
        "  Mode: {}",
        if config.server.production {
            "webhook"
        } else {
            "polling"
        }
    );

    let abi = config.chain.load_abi()?;
    let contract = ContractClient::new(
        &config.chain.rpc_url,
        config.chain.contract_address()?,
        abi,
    )?;

    match contract.chain_id().await {
        Ok(chain_id) => info!("Connected to chain {}", chain_id),
        Err(e) => warn!("Could not reach RPC node at {}: {}", config.chain.rpc_url, e),
    }

    let bot = Bot::new(&config.telegram.bot_token);
    let username = bot::fetch_username(&bot).await;
    if let Some(name) = &username {
        info!("Running as @{}", name);
    }
    let state = Arc::new(AppState::new(bot, Arc::new(contract), username));

    info!("Bot is starting...");
    bot::run(state, &config.server).await?;

    Ok(())
}
