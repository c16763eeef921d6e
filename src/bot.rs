use std::sync::Arc;

use anyhow::Result;
use teloxide::prelude::*;
use tracing::{debug, error, info, warn};

use crate::replicator::{ReplicationReport, Replicator, TargetOutcome};
use crate::telegram;

/// Shared application state
pub struct AppState {
    pub replicator: Replicator,
    pub reply_sync: bool,
}

/// Start the Telegram bot
pub async fn run(bot: Bot, state: Arc<AppState>) -> Result<()> {
    info!("Starting Telegram bot...");

    let handler = Update::filter_channel_post().endpoint(handle_channel_post);

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .default_handler(|upd| async move {
            warn!("Unhandled update: {:?}", upd.id);
        })
        .error_handler(LoggingErrorHandler::with_custom_text("channelcast"))
        .build()
        .dispatch()
        .await;

    Ok(())
}

async fn handle_channel_post(msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let event = telegram::post_event(&msg);

    match state.replicator.on_post(&event).await {
        ReplicationReport::Dispatched(outcomes) => {
            let kind = event
                .payload
                .as_ref()
                .map(|p| p.kind_name())
                .unwrap_or("unknown");
            for (target, outcome) in outcomes {
                match outcome {
                    TargetOutcome::Replicated(replica) => info!(
                        "Replicated {} message {} to channel {} as {}",
                        kind, event.message_id.0, target.0, replica.0
                    ),
                    TargetOutcome::Failed(err) => error!(
                        "Error replicating message {} to channel {}: {}",
                        event.message_id.0, target.0, err
                    ),
                }
            }
        }
        ReplicationReport::Unclassifiable => {
            debug!(
                "Skipping post {} in channel {}: no known content kind",
                event.message_id.0, event.channel.0
            );
        }
        ReplicationReport::Filtered => {
            if state.reply_sync && state.replicator.is_target(event.channel) {
                if let Err(err) = state.replicator.sync_reply(&event).await {
                    error!(
                        "Error syncing reply from channel {}: {:#}",
                        event.channel.0, err
                    );
                }
            }
        }
    }

    Ok(())
}
