mod bot;
mod config;
mod event;
mod identity_map;
mod replicator;
mod telegram;
mod transport;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use teloxide::prelude::*;
use teloxide::types::ChatId;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::bot::AppState;
use crate::config::Config;
use crate::replicator::Replicator;
use crate::telegram::TelegramTransport;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,channelcast=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    info!("Loading configuration from: {}", config_path.display());
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    let source = ChatId(config.relay.source_channel);
    let targets: Vec<ChatId> = config
        .relay
        .target_channels
        .iter()
        .copied()
        .map(ChatId)
        .collect();

    info!("Monitoring source channel: {}", source.0);
    info!("Replicating to {} target channels", targets.len());
    if config.relay.reply_sync {
        info!("Reply sync from target channels is enabled");
    }

    let bot = Bot::new(config.telegram.bot_token.clone());
    let transport = Arc::new(TelegramTransport::new(bot.clone()));
    let replicator = Replicator::new(source, targets, config.relay.map_capacity, transport);

    let state = Arc::new(AppState {
        replicator,
        reply_sync: config.relay.reply_sync,
    });

    info!("Bot is starting...");
    bot::run(bot, state).await?;

    Ok(())
}
