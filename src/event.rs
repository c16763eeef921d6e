use teloxide::types::{ChatId, FileId, MessageId};

/// A span of rich-text formatting over a message body.
///
/// Offsets and lengths are UTF-16 code units, following Telegram's
/// entity convention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormattingRange {
    pub kind: SpanKind,
    pub offset: usize,
    pub length: usize,
    /// Link target, only meaningful for [`SpanKind::TextLink`].
    pub url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpanKind {
    Bold,
    Italic,
    Underline,
    Strikethrough,
    Spoiler,
    Code,
    Pre,
    TextLink,
    Url,
    Mention,
    Hashtag,
    BotCommand,
    Blockquote,
}

/// The content of a post, classified into exactly one kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentPayload {
    Text {
        text: String,
        ranges: Vec<FormattingRange>,
    },
    Photo {
        media: FileId,
        caption: Option<String>,
        ranges: Vec<FormattingRange>,
    },
    Video {
        media: FileId,
        caption: Option<String>,
        ranges: Vec<FormattingRange>,
    },
    Document {
        media: FileId,
        caption: Option<String>,
        ranges: Vec<FormattingRange>,
    },
    Audio {
        media: FileId,
        caption: Option<String>,
        ranges: Vec<FormattingRange>,
    },
    Voice {
        media: FileId,
        caption: Option<String>,
        ranges: Vec<FormattingRange>,
    },
    Animation {
        media: FileId,
        caption: Option<String>,
        ranges: Vec<FormattingRange>,
    },
}

impl ContentPayload {
    pub fn kind_name(&self) -> &'static str {
        match self {
            ContentPayload::Text { .. } => "text",
            ContentPayload::Photo { .. } => "photo",
            ContentPayload::Video { .. } => "video",
            ContentPayload::Document { .. } => "document",
            ContentPayload::Audio { .. } => "audio",
            ContentPayload::Voice { .. } => "voice",
            ContentPayload::Animation { .. } => "animation",
        }
    }

    /// The human-visible text: the body for `Text`, the caption for
    /// media kinds, empty if the media carries no caption.
    pub fn effective_text(&self) -> &str {
        match self {
            ContentPayload::Text { text, .. } => text,
            ContentPayload::Photo { caption, .. }
            | ContentPayload::Video { caption, .. }
            | ContentPayload::Document { caption, .. }
            | ContentPayload::Audio { caption, .. }
            | ContentPayload::Voice { caption, .. }
            | ContentPayload::Animation { caption, .. } => caption.as_deref().unwrap_or(""),
        }
    }

    /// Formatting ranges over [`effective_text`](Self::effective_text).
    pub fn effective_ranges(&self) -> &[FormattingRange] {
        match self {
            ContentPayload::Text { ranges, .. }
            | ContentPayload::Photo { ranges, .. }
            | ContentPayload::Video { ranges, .. }
            | ContentPayload::Document { ranges, .. }
            | ContentPayload::Audio { ranges, .. }
            | ContentPayload::Voice { ranges, .. }
            | ContentPayload::Animation { ranges, .. } => ranges,
        }
    }
}

/// A provider-shaped post before classification: several optional
/// content fields may be populated at once.
#[derive(Debug, Clone, Default)]
pub struct RawPost {
    pub text: Option<String>,
    pub entities: Vec<FormattingRange>,
    pub caption: Option<String>,
    pub caption_entities: Vec<FormattingRange>,
    pub photo: Option<FileId>,
    pub video: Option<FileId>,
    pub document: Option<FileId>,
    pub audio: Option<FileId>,
    pub voice: Option<FileId>,
    pub animation: Option<FileId>,
}

impl RawPost {
    /// Classify into exactly one content kind. The first populated
    /// field wins, in the provider's own precedence order:
    /// text > photo > video > document > audio > voice > animation.
    pub fn classify(self) -> Option<ContentPayload> {
        let RawPost {
            text,
            entities,
            caption,
            caption_entities,
            photo,
            video,
            document,
            audio,
            voice,
            animation,
        } = self;

        if let Some(text) = text {
            return Some(ContentPayload::Text {
                text,
                ranges: entities,
            });
        }
        if let Some(media) = photo {
            return Some(ContentPayload::Photo {
                media,
                caption,
                ranges: caption_entities,
            });
        }
        if let Some(media) = video {
            return Some(ContentPayload::Video {
                media,
                caption,
                ranges: caption_entities,
            });
        }
        if let Some(media) = document {
            return Some(ContentPayload::Document {
                media,
                caption,
                ranges: caption_entities,
            });
        }
        if let Some(media) = audio {
            return Some(ContentPayload::Audio {
                media,
                caption,
                ranges: caption_entities,
            });
        }
        if let Some(media) = voice {
            return Some(ContentPayload::Voice {
                media,
                caption,
                ranges: caption_entities,
            });
        }
        if let Some(media) = animation {
            return Some(ContentPayload::Animation {
                media,
                caption,
                ranges: caption_entities,
            });
        }
        None
    }
}

/// A new post surfaced by the inbound feed, lowered to provider-neutral
/// form and classified once at ingestion.
#[derive(Debug, Clone)]
pub struct PostEvent {
    pub channel: ChatId,
    pub message_id: MessageId,
    /// `None` when the post matched no known content kind.
    pub payload: Option<ContentPayload>,
    pub reply_parent: Option<MessageId>,
    /// Display title of the originating channel, when the feed carries one.
    pub channel_title: Option<String>,
}
