//! Relay dispatcher — routes inbound channel events to the destination.
//!
//! Every event goes through route lookup, the dedup guard, keyword
//! admission, text cleanup and caption composition before exactly one
//! send call. Failures affect only the event being processed.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::channels::{DestinationClient, InboundEvent, MediaKind, SourceClient};
use crate::routing::RoutingTable;
use crate::store::Storage;
use crate::text::{TextCleaner, admits_keywords};

pub struct RelayDispatcher {
    store: Arc<dyn Storage>,
    table: Arc<RoutingTable>,
    source: Arc<dyn SourceClient>,
    dest: Arc<dyn DestinationClient>,
    keywords: Vec<String>,
    cleaner: TextCleaner,
    send_delay: Duration,
}

impl RelayDispatcher {
    pub fn new(
        store: Arc<dyn Storage>,
        table: Arc<RoutingTable>,
        source: Arc<dyn SourceClient>,
        dest: Arc<dyn DestinationClient>,
        keywords: Vec<String>,
        remove_patterns: Vec<String>,
        send_delay: Duration,
    ) -> Self {
        Self {
            store,
            table,
            source,
            dest,
            keywords,
            cleaner: TextCleaner::new(remove_patterns),
            send_delay,
        }
    }

    /// Process one inbound channel event end to end.
    ///
    /// Never returns an error: everything that can go wrong is logged and
    /// drops only this event, so the next one is unaffected.
    pub async fn handle(&self, event: &InboundEvent) {
        let snapshot = self.table.snapshot();
        let Some(route) = snapshot.get(event.chat_id) else {
            debug!(chat_id = event.chat_id, "No route for chat; dropping");
            return;
        };
        if !route.enabled {
            debug!(route_id = route.id, "Route disabled; dropping");
            return;
        }

        match self.store.has_forwarded(event.chat_id, event.message_id).await {
            Ok(true) => {
                debug!(
                    chat_id = event.chat_id,
                    message_id = event.message_id,
                    "Duplicate message; skipping"
                );
                return;
            }
            Ok(false) => {}
            Err(e) => {
                warn!(message_id = event.message_id, "Dedup check failed: {e}");
                return;
            }
        }

        let text = event.text.as_deref().unwrap_or("");
        if text.is_empty() && event.media.is_none() {
            debug!(message_id = event.message_id, "No text or media; skipping");
            return;
        }

        // Keyword admission is all-or-nothing per message: a rejected text
        // drops any attached media too. Media-only messages bypass it.
        if !text.is_empty() && !admits_keywords(text, &self.keywords) {
            debug!(message_id = event.message_id, "Filtered by keywords");
            return;
        }

        let body = self.cleaner.cleanse(text);
        let composed = if route.caption.is_empty() {
            body
        } else if body.is_empty() {
            route.caption.clone()
        } else {
            format!("{body}\n\n{}", route.caption)
        };
        let caption = if composed.is_empty() {
            None
        } else {
            Some(composed.as_str())
        };

        // Exactly one of the three send branches runs.
        let sent = match &event.media {
            Some(media) => {
                let bytes = match self.source.fetch_media(media).await {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        warn!(message_id = event.message_id, "Media fetch failed: {e}");
                        return;
                    }
                };
                let result = match media.kind {
                    MediaKind::Photo => {
                        self.dest
                            .send_photo(&route.dest_address, bytes, caption)
                            .await
                    }
                    MediaKind::Video => {
                        self.dest
                            .send_video(&route.dest_address, bytes, caption)
                            .await
                    }
                };
                match result {
                    Ok(()) => {
                        info!(
                            message_id = event.message_id,
                            source = %route.source_ref,
                            dest = %route.dest_address,
                            kind = ?media.kind,
                            "Forwarded media message"
                        );
                        true
                    }
                    Err(e) => {
                        warn!(message_id = event.message_id, "Send failed: {e}");
                        false
                    }
                }
            }
            None => {
                let Some(text) = caption else {
                    debug!(message_id = event.message_id, "Nothing left to send");
                    return;
                };
                match self.dest.send_text(&route.dest_address, text).await {
                    Ok(()) => {
                        info!(
                            message_id = event.message_id,
                            source = %route.source_ref,
                            dest = %route.dest_address,
                            "Forwarded text message"
                        );
                        true
                    }
                    Err(e) => {
                        warn!(message_id = event.message_id, "Send failed: {e}");
                        false
                    }
                }
            }
        };

        // A failed send is dropped without marking, by design: there is
        // no retry mechanism, and marking would suppress a redelivery.
        if !sent {
            return;
        }

        if let Err(e) = self
            .store
            .record_forwarded(event.chat_id, event.message_id)
            .await
        {
            warn!(message_id = event.message_id, "Failed to record forward: {e}");
        }

        // Pacing: cooperative pause before the next event is processed.
        tokio::time::sleep(self.send_delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    use crate::channels::{EventStream, MediaAttachment};
    use crate::error::{DispatchError, ResolutionError, SourceError};
    use crate::routing::ChannelRoute;
    use crate::store::SqliteStore;

    struct FakeSource {
        media_bytes: Vec<u8>,
        fail_fetch: bool,
    }

    #[async_trait]
    impl SourceClient for FakeSource {
        async fn subscribe(&self) -> Result<EventStream, SourceError> {
            Ok(Box::pin(futures::stream::empty()))
        }

        async fn resolve_entity(&self, reference: &str) -> Result<i64, ResolutionError> {
            Err(ResolutionError::NotFound(reference.to_string()))
        }

        async fn fetch_media(&self, _media: &MediaAttachment) -> Result<Vec<u8>, DispatchError> {
            if self.fail_fetch {
                return Err(DispatchError::MediaFetch("boom".into()));
            }
            Ok(self.media_bytes.clone())
        }

        async fn send_message(&self, _chat_id: i64, _text: &str) -> Result<(), SourceError> {
            Ok(())
        }
    }

    #[derive(Debug, PartialEq)]
    enum Sent {
        Text { dest: String, text: String },
        Photo { dest: String, bytes: Vec<u8>, caption: Option<String> },
        Video { dest: String, bytes: Vec<u8>, caption: Option<String> },
    }

    #[derive(Default)]
    struct FakeDest {
        sent: Mutex<Vec<Sent>>,
        fail: bool,
    }

    #[async_trait]
    impl DestinationClient for FakeDest {
        async fn send_text(&self, dest: &str, text: &str) -> Result<(), DispatchError> {
            if self.fail {
                return Err(DispatchError::SendFailed {
                    method: "sendMessage",
                    reason: "down".into(),
                });
            }
            self.sent.lock().unwrap().push(Sent::Text {
                dest: dest.into(),
                text: text.into(),
            });
            Ok(())
        }

        async fn send_photo(
            &self,
            dest: &str,
            bytes: Vec<u8>,
            caption: Option<&str>,
        ) -> Result<(), DispatchError> {
            if self.fail {
                return Err(DispatchError::SendFailed {
                    method: "sendPhoto",
                    reason: "down".into(),
                });
            }
            self.sent.lock().unwrap().push(Sent::Photo {
                dest: dest.into(),
                bytes,
                caption: caption.map(String::from),
            });
            Ok(())
        }

        async fn send_video(
            &self,
            dest: &str,
            bytes: Vec<u8>,
            caption: Option<&str>,
        ) -> Result<(), DispatchError> {
            if self.fail {
                return Err(DispatchError::SendFailed {
                    method: "sendVideo",
                    reason: "down".into(),
                });
            }
            self.sent.lock().unwrap().push(Sent::Video {
                dest: dest.into(),
                bytes,
                caption: caption.map(String::from),
            });
            Ok(())
        }
    }

    struct Fixture {
        dispatcher: RelayDispatcher,
        store: Arc<dyn Storage>,
        dest: Arc<FakeDest>,
    }

    async fn fixture(route: ChannelRoute, keywords: &[&str], fail: Fail) -> Fixture {
        let store: Arc<dyn Storage> = Arc::new(SqliteStore::open_memory().await.unwrap());
        let table = Arc::new(RoutingTable::new());
        table.publish(vec![route]);
        let source = Arc::new(FakeSource {
            media_bytes: vec![1, 2, 3],
            fail_fetch: matches!(fail, Fail::Fetch),
        });
        let dest = Arc::new(FakeDest {
            fail: matches!(fail, Fail::Send),
            ..Default::default()
        });
        let dispatcher = RelayDispatcher::new(
            Arc::clone(&store),
            table,
            source,
            Arc::clone(&dest) as Arc<dyn DestinationClient>,
            keywords.iter().map(|k| k.to_string()).collect(),
            vec![],
            Duration::ZERO,
        );
        Fixture {
            dispatcher,
            store,
            dest,
        }
    }

    #[derive(Clone, Copy)]
    enum Fail {
        None,
        Fetch,
        Send,
    }

    fn route(caption: &str, enabled: bool) -> ChannelRoute {
        ChannelRoute {
            id: 1,
            source_chat_id: -100123,
            source_ref: "@demo".into(),
            dest_address: "@demoBale".into(),
            caption: caption.into(),
            enabled,
        }
    }

    fn text_event(message_id: i64, text: &str) -> InboundEvent {
        InboundEvent {
            sender_id: None,
            chat_id: -100123,
            message_id,
            text: Some(text.into()),
            media: None,
            is_private: false,
        }
    }

    fn photo_event(message_id: i64, text: Option<&str>) -> InboundEvent {
        InboundEvent {
            sender_id: None,
            chat_id: -100123,
            message_id,
            text: text.map(String::from),
            media: Some(MediaAttachment {
                kind: MediaKind::Photo,
                file_id: "f1".into(),
            }),
            is_private: false,
        }
    }

    #[tokio::test]
    async fn forwards_text_with_caption_appended() {
        let f = fixture(route("Sponsored", true), &[], Fail::None).await;
        f.dispatcher.handle(&text_event(1, "Hello world")).await;

        let sent = f.dest.sent.lock().unwrap();
        assert_eq!(
            *sent,
            vec![Sent::Text {
                dest: "@demoBale".into(),
                text: "Hello world\n\nSponsored".into(),
            }]
        );
        drop(sent);
        assert!(f.store.has_forwarded(-100123, 1).await.unwrap());
    }

    #[tokio::test]
    async fn photo_only_no_caption_sends_none() {
        let f = fixture(route("", true), &[], Fail::None).await;
        f.dispatcher.handle(&photo_event(2, None)).await;

        let sent = f.dest.sent.lock().unwrap();
        assert_eq!(
            *sent,
            vec![Sent::Photo {
                dest: "@demoBale".into(),
                bytes: vec![1, 2, 3],
                caption: None,
            }]
        );
    }

    #[tokio::test]
    async fn photo_with_empty_text_uses_route_caption_alone() {
        let f = fixture(route("Sponsored", true), &[], Fail::None).await;
        f.dispatcher.handle(&photo_event(3, None)).await;

        let sent = f.dest.sent.lock().unwrap();
        assert_eq!(
            *sent,
            vec![Sent::Photo {
                dest: "@demoBale".into(),
                bytes: vec![1, 2, 3],
                caption: Some("Sponsored".into()),
            }]
        );
    }

    #[tokio::test]
    async fn video_event_uses_send_video() {
        let f = fixture(route("", true), &[], Fail::None).await;
        let event = InboundEvent {
            media: Some(MediaAttachment {
                kind: MediaKind::Video,
                file_id: "v1".into(),
            }),
            ..photo_event(4, Some("clip"))
        };
        f.dispatcher.handle(&event).await;

        let sent = f.dest.sent.lock().unwrap();
        assert!(matches!(
            &sent[..],
            [Sent::Video { caption: Some(c), .. }] if c == "clip"
        ));
    }

    #[tokio::test]
    async fn duplicate_event_sends_nothing() {
        let f = fixture(route("", true), &[], Fail::None).await;
        f.dispatcher.handle(&text_event(5, "first")).await;
        f.dispatcher.handle(&text_event(5, "first again")).await;

        assert_eq!(f.dest.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unknown_chat_and_disabled_route_drop() {
        let f = fixture(route("", false), &[], Fail::None).await;
        f.dispatcher.handle(&text_event(6, "hi")).await;

        let mut other = text_event(7, "hi");
        other.chat_id = -999;
        f.dispatcher.handle(&other).await;

        assert!(f.dest.sent.lock().unwrap().is_empty());
        assert!(!f.store.has_forwarded(-100123, 6).await.unwrap());
    }

    #[tokio::test]
    async fn disabling_leaves_existing_forward_records() {
        let f = fixture(route("", false), &[], Fail::None).await;
        f.store.record_forwarded(-100123, 1).await.unwrap();

        f.dispatcher.handle(&text_event(2, "hi")).await;
        assert!(f.store.has_forwarded(-100123, 1).await.unwrap());
        assert!(f.dest.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn keyword_rejection_drops_entire_event_including_media() {
        let f = fixture(route("", true), &["breaking"], Fail::None).await;
        f.dispatcher
            .handle(&photo_event(8, Some("boring update")))
            .await;
        assert!(f.dest.sent.lock().unwrap().is_empty());
        assert!(!f.store.has_forwarded(-100123, 8).await.unwrap());

        // But a media-only event with no text bypasses the filter.
        f.dispatcher.handle(&photo_event(9, None)).await;
        assert_eq!(f.dest.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn keyword_match_admits() {
        let f = fixture(route("", true), &["breaking"], Fail::None).await;
        f.dispatcher.handle(&text_event(10, "BREAKING: news")).await;
        assert_eq!(f.dest.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn empty_event_dropped() {
        let f = fixture(route("", true), &[], Fail::None).await;
        let mut event = text_event(11, "");
        event.text = None;
        f.dispatcher.handle(&event).await;
        assert!(f.dest.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn text_cleansed_to_empty_with_no_caption_sends_nothing() {
        let f = fixture(route("", true), &[], Fail::None).await;
        f.dispatcher.handle(&text_event(12, "@just_a_mention")).await;
        assert!(f.dest.sent.lock().unwrap().is_empty());
        assert!(!f.store.has_forwarded(-100123, 12).await.unwrap());
    }

    #[tokio::test]
    async fn send_failure_is_not_recorded() {
        let f = fixture(route("", true), &[], Fail::Send).await;
        f.dispatcher.handle(&text_event(13, "hello")).await;

        assert!(f.dest.sent.lock().unwrap().is_empty());
        assert!(
            !f.store.has_forwarded(-100123, 13).await.unwrap(),
            "failed sends must stay eligible for redelivery"
        );
    }

    #[tokio::test]
    async fn fetch_failure_is_not_recorded() {
        let f = fixture(route("", true), &[], Fail::Fetch).await;
        f.dispatcher.handle(&photo_event(14, Some("pic"))).await;

        assert!(f.dest.sent.lock().unwrap().is_empty());
        assert!(!f.store.has_forwarded(-100123, 14).await.unwrap());
    }
}
