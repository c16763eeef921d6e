use anyhow::Result;
use async_trait::async_trait;
use teloxide::types::{ChatId, FileId, MessageId};

use crate::event::FormattingRange;

/// Outbound surface of the messaging provider: one typed send per
/// content kind, each optionally threading the new message as a reply
/// to an existing one in that channel, returning the new message id.
#[async_trait]
pub trait ChannelTransport: Send + Sync {
    async fn send_text(
        &self,
        target: ChatId,
        text: &str,
        ranges: &[FormattingRange],
        reply_to: Option<MessageId>,
    ) -> Result<MessageId>;

    async fn send_photo(
        &self,
        target: ChatId,
        media: &FileId,
        caption: Option<&str>,
        ranges: &[FormattingRange],
        reply_to: Option<MessageId>,
    ) -> Result<MessageId>;

    async fn send_video(
        &self,
        target: ChatId,
        media: &FileId,
        caption: Option<&str>,
        ranges: &[FormattingRange],
        reply_to: Option<MessageId>,
    ) -> Result<MessageId>;

    async fn send_document(
        &self,
        target: ChatId,
        media: &FileId,
        caption: Option<&str>,
        ranges: &[FormattingRange],
        reply_to: Option<MessageId>,
    ) -> Result<MessageId>;

    async fn send_audio(
        &self,
        target: ChatId,
        media: &FileId,
        caption: Option<&str>,
        ranges: &[FormattingRange],
        reply_to: Option<MessageId>,
    ) -> Result<MessageId>;

    async fn send_voice(
        &self,
        target: ChatId,
        media: &FileId,
        caption: Option<&str>,
        ranges: &[FormattingRange],
        reply_to: Option<MessageId>,
    ) -> Result<MessageId>;

    async fn send_animation(
        &self,
        target: ChatId,
        media: &FileId,
        caption: Option<&str>,
        ranges: &[FormattingRange],
        reply_to: Option<MessageId>,
    ) -> Result<MessageId>;

    /// Human-readable name of a channel, for reply-sync attribution.
    async fn channel_display_name(&self, channel: ChatId) -> Result<String>;
}
