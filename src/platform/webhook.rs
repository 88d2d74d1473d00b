use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use teloxide::prelude::*;
use teloxide::types::UpdateKind;
use tracing::{debug, info, warn};

use crate::bot::{respond, AppState};
use crate::config::ServerConfig;
use crate::dispatcher::InboundEvent;

/// Register the public webhook URL with Telegram and serve updates until
/// Ctrl-C.
pub async fn run(state: Arc<AppState>, server: &ServerConfig) -> Result<()> {
    let url: reqwest::Url = server
        .webhook_url(state.bot.token())?
        .parse()
        .context("Invalid webhook URL")?;

    state
        .bot
        .set_webhook(url)
        .await
        .context("Failed to register webhook with Telegram")?;
    info!(
        "Webhook registered under {}",
        server.webhook_base_url.as_deref().unwrap_or_default()
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], server.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;

    info!("Listening on {}", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    Ok(())
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/{token}", post(receive_update))
        .with_state(state)
}

async fn health() -> &'static str {
    "OK"
}

/// Acknowledge as soon as the payload parses; the reply is produced on a
/// separate task so Telegram never waits on the chain.
async fn receive_update(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
    body: Bytes,
) -> Response {
    if token != state.bot.token() {
        return StatusCode::NOT_FOUND.into_response();
    }

    if let Err(e) = serde_json::from_slice::<serde_json::Value>(&body) {
        warn!("Rejected webhook payload: {}", e);
        return (StatusCode::BAD_REQUEST, format!("Invalid JSON: {e}")).into_response();
    }

    // Deserialize from the raw bytes: teloxide's `Update` does not survive a
    // round trip through `serde_json::Value`.
    match serde_json::from_slice::<Update>(&body) {
        Ok(update) => match event_from_update(&update, state.username.as_deref()) {
            Some(event) => {
                tokio::spawn(async move {
                    respond(&state, event).await;
                });
            }
            None => debug!("Ignoring update {:?}", update.id),
        },
        Err(e) => warn!("Acknowledging unrecognised update: {}", e),
    }

    StatusCode::OK.into_response()
}

fn event_from_update(update: &Update, username: Option<&str>) -> Option<InboundEvent> {
    match &update.kind {
        UpdateKind::Message(msg) => InboundEvent::from_message(msg, username),
        UpdateKind::Error(raw) => {
            warn!("Could not decode update {:?}: {}", update.id, raw);
            None
        }
        _ => None,
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down webhook server");
}
