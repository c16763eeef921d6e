use anyhow::{Context, Result};
use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{
    ChatId, FileId, InputFile, Message, MessageEntity, MessageEntityKind, MessageId,
    ReplyParameters,
};
use url::Url;
use tracing::debug;

use crate::event::{FormattingRange, PostEvent, RawPost, SpanKind};
use crate::transport::ChannelTransport;

/// Lower a teloxide channel post into the core's provider-neutral
/// event, classifying the content once at ingestion.
pub fn post_event(msg: &Message) -> PostEvent {
    let raw = RawPost {
        text: msg.text().map(str::to_owned),
        entities: from_entities(msg.entities().unwrap_or_default()),
        caption: msg.caption().map(str::to_owned),
        caption_entities: from_entities(msg.caption_entities().unwrap_or_default()),
        // Telegram sends every resolution of a photo; the last is the largest.
        photo: msg
            .photo()
            .and_then(|sizes| sizes.last())
            .map(|p| p.file.id.clone()),
        video: msg.video().map(|v| v.file.id.clone()),
        document: msg.document().map(|d| d.file.id.clone()),
        audio: msg.audio().map(|a| a.file.id.clone()),
        voice: msg.voice().map(|v| v.file.id.clone()),
        animation: msg.animation().map(|a| a.file.id.clone()),
    };

    PostEvent {
        channel: msg.chat.id,
        message_id: msg.id,
        reply_parent: msg.reply_to_message().map(|parent| parent.id),
        channel_title: msg.chat.title().map(str::to_owned),
        payload: raw.classify(),
    }
}

fn from_entities(entities: &[MessageEntity]) -> Vec<FormattingRange> {
    entities
        .iter()
        .filter_map(|entity| {
            let (kind, url) = match &entity.kind {
                MessageEntityKind::Bold => (SpanKind::Bold, None),
                MessageEntityKind::Italic => (SpanKind::Italic, None),
                MessageEntityKind::Underline => (SpanKind::Underline, None),
                MessageEntityKind::Strikethrough => (SpanKind::Strikethrough, None),
                MessageEntityKind::Spoiler => (SpanKind::Spoiler, None),
                MessageEntityKind::Code => (SpanKind::Code, None),
                MessageEntityKind::Pre { .. } => (SpanKind::Pre, None),
                MessageEntityKind::TextLink { url } => (SpanKind::TextLink, Some(url.to_string())),
                MessageEntityKind::Url => (SpanKind::Url, None),
                MessageEntityKind::Mention => (SpanKind::Mention, None),
                MessageEntityKind::Hashtag => (SpanKind::Hashtag, None),
                MessageEntityKind::BotCommand => (SpanKind::BotCommand, None),
                MessageEntityKind::Blockquote => (SpanKind::Blockquote, None),
                other => {
                    debug!("Dropping unsupported entity kind: {:?}", other);
                    return None;
                }
            };
            Some(FormattingRange {
                kind,
                offset: entity.offset,
                length: entity.length,
                url,
            })
        })
        .collect()
}

fn to_entities(ranges: &[FormattingRange]) -> Vec<MessageEntity> {
    ranges
        .iter()
        .filter_map(|range| {
            let kind = match range.kind {
                SpanKind::Bold => MessageEntityKind::Bold,
                SpanKind::Italic => MessageEntityKind::Italic,
                SpanKind::Underline => MessageEntityKind::Underline,
                SpanKind::Strikethrough => MessageEntityKind::Strikethrough,
                SpanKind::Spoiler => MessageEntityKind::Spoiler,
                SpanKind::Code => MessageEntityKind::Code,
                SpanKind::Pre => MessageEntityKind::Pre { language: None },
                SpanKind::TextLink => {
                    let url = range.url.as_deref().and_then(|u| Url::parse(u).ok())?;
                    MessageEntityKind::TextLink { url }
                }
                SpanKind::Url => MessageEntityKind::Url,
                SpanKind::Mention => MessageEntityKind::Mention,
                SpanKind::Hashtag => MessageEntityKind::Hashtag,
                SpanKind::BotCommand => MessageEntityKind::BotCommand,
                SpanKind::Blockquote => MessageEntityKind::Blockquote,
            };
            Some(MessageEntity {
                kind,
                offset: range.offset,
                length: range.length,
            })
        })
        .collect()
}

/// [`ChannelTransport`] backed by the Telegram Bot API.
pub struct TelegramTransport {
    bot: Bot,
}

impl TelegramTransport {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

macro_rules! send_media {
    ($self:ident.$method:ident, $target:expr, $media:expr, $caption:expr, $ranges:expr, $reply_to:expr) => {{
        let mut req = $self.bot.$method($target, InputFile::file_id($media.clone()));
        if let Some(caption) = $caption {
            req = req.caption(caption);
        }
        let entities = to_entities($ranges);
        if !entities.is_empty() {
            req = req.caption_entities(entities);
        }
        if let Some(reply_to) = $reply_to {
            req = req.reply_parameters(ReplyParameters::new(reply_to));
        }
        let sent = req
            .await
            .with_context(|| format!("{} to channel {} failed", stringify!($method), $target.0))?;
        Ok(sent.id)
    }};
}

#[async_trait]
impl ChannelTransport for TelegramTransport {
    async fn send_text(
        &self,
        target: ChatId,
        text: &str,
        ranges: &[FormattingRange],
        reply_to: Option<MessageId>,
    ) -> Result<MessageId> {
        let mut req = self.bot.send_message(target, text);
        let entities = to_entities(ranges);
        if !entities.is_empty() {
            req = req.entities(entities);
        }
        if let Some(reply_to) = reply_to {
            req = req.reply_parameters(ReplyParameters::new(reply_to));
        }
        let sent = req
            .await
            .with_context(|| format!("send_message to channel {} failed", target.0))?;
        Ok(sent.id)
    }

    async fn send_photo(
        &self,
        target: ChatId,
        media: &FileId,
        caption: Option<&str>,
        ranges: &[FormattingRange],
        reply_to: Option<MessageId>,
    ) -> Result<MessageId> {
        send_media!(self.send_photo, target, media, caption, ranges, reply_to)
    }

    async fn send_video(
        &self,
        target: ChatId,
        media: &FileId,
        caption: Option<&str>,
        ranges: &[FormattingRange],
        reply_to: Option<MessageId>,
    ) -> Result<MessageId> {
        send_media!(self.send_video, target, media, caption, ranges, reply_to)
    }

    async fn send_document(
        &self,
        target: ChatId,
        media: &FileId,
        caption: Option<&str>,
        ranges: &[FormattingRange],
        reply_to: Option<MessageId>,
    ) -> Result<MessageId> {
        send_media!(self.send_document, target, media, caption, ranges, reply_to)
    }

    async fn send_audio(
        &self,
        target: ChatId,
        media: &FileId,
        caption: Option<&str>,
        ranges: &[FormattingRange],
        reply_to: Option<MessageId>,
    ) -> Result<MessageId> {
        send_media!(self.send_audio, target, media, caption, ranges, reply_to)
    }

    async fn send_voice(
        &self,
        target: ChatId,
        media: &FileId,
        caption: Option<&str>,
        ranges: &[FormattingRange],
        reply_to: Option<MessageId>,
    ) -> Result<MessageId> {
        send_media!(self.send_voice, target, media, caption, ranges, reply_to)
    }

    async fn send_animation(
        &self,
        target: ChatId,
        media: &FileId,
        caption: Option<&str>,
        ranges: &[FormattingRange],
        reply_to: Option<MessageId>,
    ) -> Result<MessageId> {
        send_media!(self.send_animation, target, media, caption, ranges, reply_to)
    }

    async fn channel_display_name(&self, channel: ChatId) -> Result<String> {
        let chat = self
            .bot
            .get_chat(channel)
            .await
            .with_context(|| format!("get_chat for channel {} failed", channel.0))?;
        Ok(chat
            .title()
            .map(str::to_owned)
            .unwrap_or_else(|| channel.0.to_string()))
    }
}
