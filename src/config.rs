use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub telegram: TelegramConfig,
    pub relay: RelayConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RelayConfig {
    /// The channel whose posts are replicated outward.
    pub source_channel: i64,
    /// Destinations, in dispatch order.
    pub target_channels: Vec<i64>,
    /// How many recent source messages stay resolvable as reply parents.
    #[serde(default = "default_map_capacity")]
    pub map_capacity: usize,
    /// Echo posts from target channels back to the source channel.
    #[serde(default)]
    pub reply_sync: bool,
}

fn default_map_capacity() -> usize {
    8192
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_toml(&content)
    }

    fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).context("Failed to parse config file")?;

        if config.relay.target_channels.is_empty() {
            bail!("relay.target_channels must name at least one channel");
        }
        if config
            .relay
            .target_channels
            .contains(&config.relay.source_channel)
        {
            bail!("relay.source_channel must not appear in relay.target_channels");
        }
        if config.relay.map_capacity == 0 {
            bail!("relay.map_capacity must be at least 1");
        }

        Ok(config)
    }
}
