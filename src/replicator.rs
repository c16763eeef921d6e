use std::sync::Arc;

use futures::future::join_all;
use teloxide::types::{ChatId, MessageId};
use tracing::debug;

use crate::event::{ContentPayload, FormattingRange, PostEvent};
use crate::identity_map::IdentityMap;
use crate::transport::ChannelTransport;

/// Result of one per-target dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetOutcome {
    Replicated(MessageId),
    Failed(String),
}

/// What happened to one inbound post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplicationReport {
    /// Not from the configured source channel.
    Filtered,
    /// Matched no known content kind; nothing was dispatched.
    Unclassifiable,
    /// One outcome per configured target, in configuration order.
    Dispatched(Vec<(ChatId, TargetOutcome)>),
}

/// Fans every source-channel post out to the target channels,
/// re-parenting replies per target through the [`IdentityMap`].
pub struct Replicator {
    source_channel: ChatId,
    targets: Vec<ChatId>,
    map: IdentityMap,
    transport: Arc<dyn ChannelTransport>,
}

impl Replicator {
    pub fn new(
        source_channel: ChatId,
        targets: Vec<ChatId>,
        map_capacity: usize,
        transport: Arc<dyn ChannelTransport>,
    ) -> Self {
        Self {
            source_channel,
            targets,
            map: IdentityMap::new(map_capacity),
            transport,
        }
    }

    pub fn is_target(&self, channel: ChatId) -> bool {
        self.targets.contains(&channel)
    }

    /// Replicate one inbound post to every target channel. Failures are
    /// reported per target in the returned value; nothing escapes this
    /// boundary, so one bad post never stops the inbound stream.
    pub async fn on_post(&self, event: &PostEvent) -> ReplicationReport {
        if event.channel != self.source_channel {
            return ReplicationReport::Filtered;
        }

        // Register before any send so a reply arriving mid-flight has a
        // well-defined (if still empty) record to resolve against.
        self.map.register(event.message_id).await;

        let Some(payload) = event.payload.as_ref() else {
            debug!(
                "Post {} matched no known content kind, skipping",
                event.message_id.0
            );
            return ReplicationReport::Unclassifiable;
        };

        // Each target touches its own (source, target) map entry, so
        // the fan-out is safe to run concurrently.
        let sends = self.targets.iter().map(|&target| async move {
            let outcome = self.replicate_to(target, event, payload).await;
            (target, outcome)
        });
        ReplicationReport::Dispatched(join_all(sends).await)
    }

    async fn replicate_to(
        &self,
        target: ChatId,
        event: &PostEvent,
        payload: &ContentPayload,
    ) -> TargetOutcome {
        // A parent that was never replicated to this target degrades
        // to a top-level post rather than an error.
        let reply_to = match event.reply_parent {
            Some(parent) => self.map.resolve_replica_parent(parent, target).await,
            None => None,
        };

        match self.dispatch(target, payload, reply_to).await {
            Ok(replica) => {
                self.map
                    .record_replica(event.message_id, target, replica)
                    .await;
                TargetOutcome::Replicated(replica)
            }
            Err(err) => TargetOutcome::Failed(format!("{err:#}")),
        }
    }

    async fn dispatch(
        &self,
        target: ChatId,
        payload: &ContentPayload,
        reply_to: Option<MessageId>,
    ) -> anyhow::Result<MessageId> {
        let t = self.transport.as_ref();
        match payload {
            ContentPayload::Text { text, ranges } => {
                t.send_text(target, text, ranges, reply_to).await
            }
            ContentPayload::Photo {
                media,
                caption,
                ranges,
            } => {
                t.send_photo(target, media, caption.as_deref(), ranges, reply_to)
                    .await
            }
            ContentPayload::Video {
                media,
                caption,
                ranges,
            } => {
                t.send_video(target, media, caption.as_deref(), ranges, reply_to)
                    .await
            }
            ContentPayload::Document {
                media,
                caption,
                ranges,
            } => {
                t.send_document(target, media, caption.as_deref(), ranges, reply_to)
                    .await
            }
            ContentPayload::Audio {
                media,
                caption,
                ranges,
            } => {
                t.send_audio(target, media, caption.as_deref(), ranges, reply_to)
                    .await
            }
            ContentPayload::Voice {
                media,
                caption,
                ranges,
            } => {
                t.send_voice(target, media, caption.as_deref(), ranges, reply_to)
                    .await
            }
            ContentPayload::Animation {
                media,
                caption,
                ranges,
            } => {
                t.send_animation(target, media, caption.as_deref(), ranges, reply_to)
                    .await
            }
        }
    }

    /// Echo a post from a target channel back to the source channel as
    /// a new top-level message, prefixed with the originating channel's
    /// name. One-way and unthreaded; formatting ranges are shifted past
    /// the inserted prefix.
    pub async fn sync_reply(&self, event: &PostEvent) -> anyhow::Result<()> {
        let (text, ranges) = match event.payload.as_ref() {
            Some(payload) => (payload.effective_text(), payload.effective_ranges()),
            None => ("", &[] as &[FormattingRange]),
        };

        let name = match self.transport.channel_display_name(event.channel).await {
            Ok(name) => name,
            Err(err) => {
                debug!(
                    "channel_display_name failed for {}: {:#}",
                    event.channel.0, err
                );
                event
                    .channel_title
                    .clone()
                    .unwrap_or_else(|| event.channel.0.to_string())
            }
        };

        let prefix = attribution_prefix(&name);
        // Telegram entity offsets count UTF-16 code units.
        let shift = prefix.encode_utf16().count();
        let body = format!("{prefix}{text}");
        let shifted = shift_ranges(ranges, shift);

        self.transport
            .send_text(self.source_channel, &body, &shifted, None)
            .await?;
        Ok(())
    }
}

fn attribution_prefix(channel_name: &str) -> String {
    format!("💬 Reply from {channel_name}:\n")
}

fn shift_ranges(ranges: &[FormattingRange], shift: usize) -> Vec<FormattingRange> {
    ranges
        .iter()
        .map(|range| FormattingRange {
            offset: range.offset + shift,
            ..range.clone()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;

    use anyhow::bail;
    use async_trait::async_trait;
    use teloxide::types::FileId;

    use crate::event::SpanKind;

    const SOURCE: ChatId = ChatId(-1000);
    const T1: ChatId = ChatId(-1001);
    const T2: ChatId = ChatId(-1002);

    #[derive(Debug, Clone, PartialEq)]
    struct Sent {
        kind: &'static str,
        target: ChatId,
        text: String,
        media: Option<FileId>,
        ranges: Vec<FormattingRange>,
        reply_to: Option<MessageId>,
    }

    #[derive(Default)]
    struct MockTransport {
        sent: Mutex<Vec<Sent>>,
        failing: Mutex<HashSet<ChatId>>,
        display_name: Option<String>,
        next_id: Mutex<i32>,
    }

    impl MockTransport {
        fn named(name: &str) -> Self {
            Self {
                display_name: Some(name.to_string()),
                ..Default::default()
            }
        }

        fn fail_target(&self, target: ChatId) {
            self.failing.lock().unwrap().insert(target);
        }

        fn heal_target(&self, target: ChatId) {
            self.failing.lock().unwrap().remove(&target);
        }

        fn sent(&self) -> Vec<Sent> {
            self.sent.lock().unwrap().clone()
        }

        fn record(
            &self,
            kind: &'static str,
            target: ChatId,
            text: &str,
            media: Option<&FileId>,
            ranges: &[FormattingRange],
            reply_to: Option<MessageId>,
        ) -> anyhow::Result<MessageId> {
            if self.failing.lock().unwrap().contains(&target) {
                bail!("transport unavailable for {}", target.0);
            }
            let mut next = self.next_id.lock().unwrap();
            *next += 1;
            self.sent.lock().unwrap().push(Sent {
                kind,
                target,
                text: text.to_string(),
                media: media.cloned(),
                ranges: ranges.to_vec(),
                reply_to,
            });
            Ok(MessageId(*next))
        }
    }

    #[async_trait]
    impl ChannelTransport for MockTransport {
        async fn send_text(
            &self,
            target: ChatId,
            text: &str,
            ranges: &[FormattingRange],
            reply_to: Option<MessageId>,
        ) -> anyhow::Result<MessageId> {
            self.record("text", target, text, None, ranges, reply_to)
        }

        async fn send_photo(
            &self,
            target: ChatId,
            media: &FileId,
            caption: Option<&str>,
            ranges: &[FormattingRange],
            reply_to: Option<MessageId>,
        ) -> anyhow::Result<MessageId> {
            self.record(
                "photo",
                target,
                caption.unwrap_or(""),
                Some(media),
                ranges,
                reply_to,
            )
        }

        async fn send_video(
            &self,
            target: ChatId,
            media: &FileId,
            caption: Option<&str>,
            ranges: &[FormattingRange],
            reply_to: Option<MessageId>,
        ) -> anyhow::Result<MessageId> {
            self.record(
                "video",
                target,
                caption.unwrap_or(""),
                Some(media),
                ranges,
                reply_to,
            )
        }

        async fn send_document(
            &self,
            target: ChatId,
            media: &FileId,
            caption: Option<&str>,
            ranges: &[FormattingRange],
            reply_to: Option<MessageId>,
        ) -> anyhow::Result<MessageId> {
            self.record(
                "document",
                target,
                caption.unwrap_or(""),
                Some(media),
                ranges,
                reply_to,
            )
        }

        async fn send_audio(
            &self,
            target: ChatId,
            media: &FileId,
            caption: Option<&str>,
            ranges: &[FormattingRange],
            reply_to: Option<MessageId>,
        ) -> anyhow::Result<MessageId> {
            self.record(
                "audio",
                target,
                caption.unwrap_or(""),
                Some(media),
                ranges,
                reply_to,
            )
        }

        async fn send_voice(
            &self,
            target: ChatId,
            media: &FileId,
            caption: Option<&str>,
            ranges: &[FormattingRange],
            reply_to: Option<MessageId>,
        ) -> anyhow::Result<MessageId> {
            self.record(
                "voice",
                target,
                caption.unwrap_or(""),
                Some(media),
                ranges,
                reply_to,
            )
        }

        async fn send_animation(
            &self,
            target: ChatId,
            media: &FileId,
            caption: Option<&str>,
            ranges: &[FormattingRange],
            reply_to: Option<MessageId>,
        ) -> anyhow::Result<MessageId> {
            self.record(
                "animation",
                target,
                caption.unwrap_or(""),
                Some(media),
                ranges,
                reply_to,
            )
        }

        async fn channel_display_name(&self, channel: ChatId) -> anyhow::Result<String> {
            match &self.display_name {
                Some(name) => Ok(name.clone()),
                None => bail!("no chat info for {}", channel.0),
            }
        }
    }

    fn replicator(transport: Arc<MockTransport>) -> Replicator {
        Replicator::new(SOURCE, vec![T1, T2], 64, transport)
    }

    fn text_event(id: i32, text: &str, reply_parent: Option<i32>) -> PostEvent {
        PostEvent {
            channel: SOURCE,
            message_id: MessageId(id),
            payload: Some(ContentPayload::Text {
                text: text.to_string(),
                ranges: Vec::new(),
            }),
            reply_parent: reply_parent.map(MessageId),
            channel_title: None,
        }
    }

    fn replica_id(report: &ReplicationReport, target: ChatId) -> MessageId {
        let ReplicationReport::Dispatched(outcomes) = report else {
            panic!("expected Dispatched, got {:?}", report);
        };
        match outcomes.iter().find(|(t, _)| *t == target) {
            Some((_, TargetOutcome::Replicated(id))) => *id,
            other => panic!("expected Replicated for {}, got {:?}", target.0, other),
        }
    }

    #[tokio::test]
    async fn replicates_text_to_every_target_and_maps_ids() {
        let transport = Arc::new(MockTransport::default());
        let replicator = replicator(transport.clone());

        let report = replicator.on_post(&text_event(1, "hello", None)).await;

        let r1 = replica_id(&report, T1);
        let r2 = replica_id(&report, T2);
        assert_ne!(r1, r2);

        let sent = transport.sent();
        assert_eq!(sent.len(), 2);
        assert!(sent.iter().all(|s| s.kind == "text" && s.text == "hello"));
        assert!(sent.iter().all(|s| s.reply_to.is_none()));

        assert_eq!(
            replicator
                .map
                .resolve_replica_parent(MessageId(1), T1)
                .await,
            Some(r1)
        );
        assert_eq!(
            replicator
                .map
                .resolve_replica_parent(MessageId(1), T2)
                .await,
            Some(r2)
        );
    }

    #[tokio::test]
    async fn reply_is_reparented_per_target() {
        let transport = Arc::new(MockTransport::default());
        let replicator = replicator(transport.clone());

        let report = replicator.on_post(&text_event(1, "hello", None)).await;
        let r1 = replica_id(&report, T1);
        let r2 = replica_id(&report, T2);

        replicator.on_post(&text_event(2, "reply", Some(1))).await;

        let replies: Vec<_> = transport
            .sent()
            .into_iter()
            .filter(|s| s.text == "reply")
            .collect();
        assert_eq!(replies.len(), 2);
        for sent in replies {
            let expected = if sent.target == T1 { r1 } else { r2 };
            assert_eq!(sent.reply_to, Some(expected));
        }
    }

    #[tokio::test]
    async fn reply_to_failed_replica_degrades_to_top_level() {
        let transport = Arc::new(MockTransport::default());
        let replicator = replicator(transport.clone());

        transport.fail_target(T2);
        let report = replicator.on_post(&text_event(1, "hello", None)).await;
        let r1 = replica_id(&report, T1);

        let ReplicationReport::Dispatched(outcomes) = &report else {
            panic!("expected Dispatched");
        };
        assert!(matches!(
            outcomes.iter().find(|(t, _)| *t == T2),
            Some((_, TargetOutcome::Failed(_)))
        ));

        transport.heal_target(T2);
        replicator.on_post(&text_event(2, "reply", Some(1))).await;

        let replies: Vec<_> = transport
            .sent()
            .into_iter()
            .filter(|s| s.text == "reply")
            .collect();
        assert_eq!(replies.len(), 2);
        for sent in replies {
            if sent.target == T1 {
                assert_eq!(sent.reply_to, Some(r1));
            } else {
                assert_eq!(sent.reply_to, None);
            }
        }
    }

    #[tokio::test]
    async fn one_target_failure_does_not_block_the_other() {
        let transport = Arc::new(MockTransport::default());
        let replicator = replicator(transport.clone());

        transport.fail_target(T1);
        let report = replicator.on_post(&text_event(1, "hello", None)).await;

        let r2 = replica_id(&report, T2);
        assert_eq!(
            replicator
                .map
                .resolve_replica_parent(MessageId(1), T1)
                .await,
            None
        );
        assert_eq!(
            replicator
                .map
                .resolve_replica_parent(MessageId(1), T2)
                .await,
            Some(r2)
        );
    }

    #[tokio::test]
    async fn foreign_channel_posts_are_filtered() {
        let transport = Arc::new(MockTransport::default());
        let replicator = replicator(transport.clone());

        let mut event = text_event(1, "elsewhere", None);
        event.channel = ChatId(-9999);

        assert_eq!(
            replicator.on_post(&event).await,
            ReplicationReport::Filtered
        );
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn unclassifiable_post_dispatches_nothing() {
        let transport = Arc::new(MockTransport::default());
        let replicator = replicator(transport.clone());

        let event = PostEvent {
            channel: SOURCE,
            message_id: MessageId(1),
            payload: None,
            reply_parent: None,
            channel_title: None,
        };

        assert_eq!(
            replicator.on_post(&event).await,
            ReplicationReport::Unclassifiable
        );
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn photo_caption_and_ranges_are_forwarded_unchanged() {
        let transport = Arc::new(MockTransport::default());
        let replicator = replicator(transport.clone());

        let ranges = vec![FormattingRange {
            kind: SpanKind::Bold,
            offset: 0,
            length: 4,
            url: None,
        }];
        let event = PostEvent {
            channel: SOURCE,
            message_id: MessageId(1),
            payload: Some(ContentPayload::Photo {
                media: FileId("photo-abc".to_string()),
                caption: Some("**bold** link".to_string()),
                ranges: ranges.clone(),
            }),
            reply_parent: None,
            channel_title: None,
        };

        replicator.on_post(&event).await;

        let sent = transport.sent();
        assert_eq!(sent.len(), 2);
        for s in sent {
            assert_eq!(s.kind, "photo");
            assert_eq!(s.media, Some(FileId("photo-abc".to_string())));
            assert_eq!(s.text, "**bold** link");
            assert_eq!(s.ranges, ranges);
        }
    }

    #[tokio::test]
    async fn sync_reply_prefixes_and_shifts_ranges() {
        let transport = Arc::new(MockTransport::named("Alerts"));
        let replicator = replicator(transport.clone());

        let event = PostEvent {
            channel: T1,
            message_id: MessageId(5),
            payload: Some(ContentPayload::Text {
                text: "ok".to_string(),
                ranges: vec![FormattingRange {
                    kind: SpanKind::Italic,
                    offset: 0,
                    length: 2,
                    url: None,
                }],
            }),
            reply_parent: None,
            channel_title: Some("Alerts".to_string()),
        };

        replicator.sync_reply(&event).await.unwrap();

        let prefix = "💬 Reply from Alerts:\n";
        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].target, SOURCE);
        assert_eq!(sent[0].text, format!("{prefix}ok"));
        assert_eq!(sent[0].reply_to, None);
        assert_eq!(sent[0].ranges.len(), 1);
        assert_eq!(sent[0].ranges[0].offset, prefix.encode_utf16().count());
        assert_eq!(sent[0].ranges[0].length, 2);
    }

    #[tokio::test]
    async fn sync_reply_falls_back_to_carried_title() {
        let transport = Arc::new(MockTransport::default());
        let replicator = replicator(transport.clone());

        let event = PostEvent {
            channel: T2,
            message_id: MessageId(6),
            payload: Some(ContentPayload::Text {
                text: "ping".to_string(),
                ranges: Vec::new(),
            }),
            reply_parent: None,
            channel_title: Some("Backup".to_string()),
        };

        replicator.sync_reply(&event).await.unwrap();

        let sent = transport.sent();
        assert_eq!(sent[0].text, "💬 Reply from Backup:\nping");
    }
}
