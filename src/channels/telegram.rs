//! Telegram source transport — long-polls the Bot API for updates.
//!
//! Monitored channels arrive as `channel_post` updates; the admin dialog
//! arrives as private `message` updates. Media bytes are fetched through
//! `getFile` plus the file download endpoint.

use async_trait::async_trait;
use tracing::{info, warn};

use crate::channels::{EventStream, InboundEvent, MediaAttachment, MediaKind, SourceClient};
use crate::error::{DispatchError, ResolutionError, SourceError};

/// Telegram source — connects to the Bot API via long-polling.
pub struct TelegramSource {
    bot_token: String,
    client: reqwest::Client,
}

impl TelegramSource {
    pub fn new(bot_token: String) -> Self {
        Self {
            bot_token,
            client: reqwest::Client::new(),
        }
    }

    fn api_url(&self, method: &str) -> String {
        format!("https://api.telegram.org/bot{}/{method}", self.bot_token)
    }

    fn file_url(&self, file_path: &str) -> String {
        format!(
            "https://api.telegram.org/file/bot{}/{file_path}",
            self.bot_token
        )
    }
}

/// Normalize a channel reference for `getChat`.
///
/// Accepts `@handle`, a bare handle, a `t.me` link, or a raw numeric id.
/// Numeric ids resolve to themselves without a network call.
fn normalize_reference(reference: &str) -> Reference {
    let trimmed = reference.trim();
    if let Ok(chat_id) = trimmed.parse::<i64>() {
        return Reference::ChatId(chat_id);
    }

    let handle = trimmed
        .strip_prefix("https://t.me/")
        .or_else(|| trimmed.strip_prefix("http://t.me/"))
        .or_else(|| trimmed.strip_prefix("t.me/"))
        .unwrap_or(trimmed);
    let handle = handle.trim_start_matches('@');
    // Links may carry a trailing path segment (t.me/chan/42).
    let handle = handle.split('/').next().unwrap_or(handle);

    Reference::Handle(format!("@{handle}"))
}

enum Reference {
    ChatId(i64),
    Handle(String),
}

/// One `getUpdates` long-poll round.
async fn poll_updates(
    client: &reqwest::Client,
    bot_token: &str,
    offset: i64,
) -> Result<serde_json::Value, SourceError> {
    let url = format!("https://api.telegram.org/bot{bot_token}/getUpdates");
    let body = serde_json::json!({
        "offset": offset,
        "timeout": 30,
        "allowed_updates": ["message", "channel_post"]
    });

    let resp = client
        .post(&url)
        .json(&body)
        .send()
        .await
        .map_err(|e| SourceError::Poll(e.to_string()))?;

    resp.json()
        .await
        .map_err(|e| SourceError::Poll(format!("malformed response: {e}")))
}

/// Parse one `getUpdates` entry into an `InboundEvent`.
///
/// Returns `None` for update kinds the bridge does not handle (edits,
/// callback queries, service messages without content).
fn parse_update(update: &serde_json::Value) -> Option<InboundEvent> {
    let message = update.get("message").or_else(|| update.get("channel_post"))?;

    let chat = message.get("chat")?;
    let chat_id = chat.get("id").and_then(serde_json::Value::as_i64)?;
    let is_private = chat.get("type").and_then(|t| t.as_str()) == Some("private");

    let message_id = message
        .get("message_id")
        .and_then(serde_json::Value::as_i64)?;

    let sender_id = message
        .get("from")
        .and_then(|f| f.get("id"))
        .and_then(serde_json::Value::as_i64);

    // Media messages carry their text in "caption".
    let text = message
        .get("text")
        .or_else(|| message.get("caption"))
        .and_then(|t| t.as_str())
        .map(String::from);

    let media = if let Some(sizes) = message.get("photo").and_then(serde_json::Value::as_array) {
        // The Bot API lists photo sizes smallest-first; take the largest.
        sizes
            .last()
            .and_then(|s| s.get("file_id"))
            .and_then(|f| f.as_str())
            .map(|file_id| MediaAttachment {
                kind: MediaKind::Photo,
                file_id: file_id.to_string(),
            })
    } else {
        message
            .get("video")
            .and_then(|v| v.get("file_id"))
            .and_then(|f| f.as_str())
            .map(|file_id| MediaAttachment {
                kind: MediaKind::Video,
                file_id: file_id.to_string(),
            })
    };

    Some(InboundEvent {
        sender_id,
        chat_id,
        message_id,
        text,
        media,
        is_private,
    })
}

#[async_trait]
impl SourceClient for TelegramSource {
    async fn subscribe(&self) -> Result<EventStream, SourceError> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let bot_token = self.bot_token.clone();
        let client = self.client.clone();

        tokio::spawn(async move {
            let mut offset: i64 = 0;

            info!("Telegram source listening for updates...");

            loop {
                let data = match poll_updates(&client, &bot_token, offset).await {
                    Ok(d) => d,
                    Err(e) => {
                        warn!("{e}");
                        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                        continue;
                    }
                };

                if let Some(results) = data.get("result").and_then(serde_json::Value::as_array) {
                    for update in results {
                        if let Some(uid) =
                            update.get("update_id").and_then(serde_json::Value::as_i64)
                        {
                            offset = uid + 1;
                        }

                        let Some(event) = parse_update(update) else {
                            continue;
                        };

                        if tx.send(event).is_err() {
                            info!("Telegram update consumer closed");
                            return;
                        }
                    }
                }
            }
        });

        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        });

        Ok(Box::pin(stream))
    }

    async fn resolve_entity(&self, reference: &str) -> Result<i64, ResolutionError> {
        let handle = match normalize_reference(reference) {
            Reference::ChatId(chat_id) => return Ok(chat_id),
            Reference::Handle(handle) => handle,
        };

        let resp = self
            .client
            .post(self.api_url("getChat"))
            .json(&serde_json::json!({ "chat_id": handle }))
            .send()
            .await
            .map_err(|e| ResolutionError::Transport(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(ResolutionError::NotFound(reference.to_string()));
        }

        let data: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| ResolutionError::Transport(e.to_string()))?;

        data.get("result")
            .and_then(|r| r.get("id"))
            .and_then(serde_json::Value::as_i64)
            .ok_or_else(|| ResolutionError::NotFound(reference.to_string()))
    }

    async fn fetch_media(&self, media: &MediaAttachment) -> Result<Vec<u8>, DispatchError> {
        let resp = self
            .client
            .post(self.api_url("getFile"))
            .json(&serde_json::json!({ "file_id": media.file_id }))
            .send()
            .await
            .map_err(|e| DispatchError::MediaFetch(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(DispatchError::MediaFetch(format!(
                "getFile returned {}",
                resp.status()
            )));
        }

        let data: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| DispatchError::MediaFetch(e.to_string()))?;

        let file_path = data
            .get("result")
            .and_then(|r| r.get("file_path"))
            .and_then(|p| p.as_str())
            .ok_or_else(|| DispatchError::MediaFetch("getFile result has no file_path".into()))?;

        let file_resp = self
            .client
            .get(self.file_url(file_path))
            .send()
            .await
            .map_err(|e| DispatchError::MediaFetch(e.to_string()))?;

        if !file_resp.status().is_success() {
            return Err(DispatchError::MediaFetch(format!(
                "file download returned {}",
                file_resp.status()
            )));
        }

        let bytes = file_resp
            .bytes()
            .await
            .map_err(|e| DispatchError::MediaFetch(e.to_string()))?;
        Ok(bytes.to_vec())
    }

    async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), SourceError> {
        let resp = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&serde_json::json!({
                "chat_id": chat_id,
                "text": text,
            }))
            .send()
            .await
            .map_err(|e| SourceError::Send(e.to_string()))?;

        if !resp.status().is_success() {
            let err = resp.text().await.unwrap_or_default();
            return Err(SourceError::Send(format!("sendMessage failed: {err}")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_and_file_urls() {
        let source = TelegramSource::new("123:ABC".into());
        assert_eq!(
            source.api_url("getUpdates"),
            "https://api.telegram.org/bot123:ABC/getUpdates"
        );
        assert_eq!(
            source.file_url("photos/file_1.jpg"),
            "https://api.telegram.org/file/bot123:ABC/photos/file_1.jpg"
        );
    }

    // ── Reference normalization ─────────────────────────────────────

    #[test]
    fn normalize_numeric_id() {
        match normalize_reference(" -1001234567890 ") {
            Reference::ChatId(id) => assert_eq!(id, -1001234567890),
            Reference::Handle(_) => panic!("expected chat id"),
        }
    }

    #[test]
    fn normalize_handles_and_links() {
        for reference in [
            "@mychannel",
            "mychannel",
            "https://t.me/mychannel",
            "http://t.me/mychannel",
            "t.me/mychannel",
            "https://t.me/mychannel/42",
        ] {
            match normalize_reference(reference) {
                Reference::Handle(h) => assert_eq!(h, "@mychannel", "input: {reference}"),
                Reference::ChatId(_) => panic!("expected handle for {reference}"),
            }
        }
    }

    // ── Update parsing ──────────────────────────────────────────────

    #[test]
    fn parse_private_text_message() {
        let update = serde_json::json!({
            "update_id": 1,
            "message": {
                "message_id": 10,
                "from": { "id": 424242 },
                "chat": { "id": 424242, "type": "private" },
                "text": "/panel"
            }
        });

        let event = parse_update(&update).unwrap();
        assert!(event.is_private);
        assert_eq!(event.sender_id, Some(424242));
        assert_eq!(event.chat_id, 424242);
        assert_eq!(event.message_id, 10);
        assert_eq!(event.text.as_deref(), Some("/panel"));
        assert!(event.media.is_none());
    }

    #[test]
    fn parse_channel_post_with_photo_takes_largest_size() {
        let update = serde_json::json!({
            "update_id": 2,
            "channel_post": {
                "message_id": 77,
                "chat": { "id": -1001234, "type": "channel" },
                "caption": "look at this",
                "photo": [
                    { "file_id": "small", "width": 90 },
                    { "file_id": "medium", "width": 320 },
                    { "file_id": "large", "width": 1280 }
                ]
            }
        });

        let event = parse_update(&update).unwrap();
        assert!(!event.is_private);
        assert_eq!(event.sender_id, None);
        assert_eq!(event.chat_id, -1001234);
        assert_eq!(event.text.as_deref(), Some("look at this"));
        let media = event.media.unwrap();
        assert_eq!(media.kind, MediaKind::Photo);
        assert_eq!(media.file_id, "large");
    }

    #[test]
    fn parse_channel_post_with_video() {
        let update = serde_json::json!({
            "update_id": 3,
            "channel_post": {
                "message_id": 78,
                "chat": { "id": -1001234, "type": "channel" },
                "video": { "file_id": "vid123" }
            }
        });

        let event = parse_update(&update).unwrap();
        assert_eq!(event.text, None);
        let media = event.media.unwrap();
        assert_eq!(media.kind, MediaKind::Video);
        assert_eq!(media.file_id, "vid123");
    }

    #[test]
    fn parse_skips_unhandled_updates() {
        let edited = serde_json::json!({
            "update_id": 4,
            "edited_message": { "message_id": 5 }
        });
        assert!(parse_update(&edited).is_none());

        let empty = serde_json::json!({ "update_id": 5 });
        assert!(parse_update(&empty).is_none());
    }
}
